pub mod error;
pub mod handler_context;
pub mod handler_registry;
