pub mod relay;
pub mod relay_config;
pub mod service;
