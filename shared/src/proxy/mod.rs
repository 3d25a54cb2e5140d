pub mod error;
pub mod event_proxy;
pub mod network_proxy;
pub mod timer_proxy;
