pub mod channel;
pub mod channel_registry;
pub mod descriptor;
pub mod dispatch;
pub mod error;
pub mod subscription;
