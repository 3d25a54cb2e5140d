pub mod error;
pub mod input_event;
pub mod input_event_buffer;
