pub mod device;
pub mod device_registry;
pub mod error;
