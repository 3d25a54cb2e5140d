pub mod error;
pub mod relocation_coordinator;
pub mod relocation_host;
pub mod relocation_item;
