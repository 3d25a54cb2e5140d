//! # Nomad Server
//! A relay that devices connect to. It queues transaction envelopes for the
//! session they are addressed to, broadcasts relocation events, and answers
//! service calls through registered service gateways.

#![deny(
    trivial_casts,
    trivial_numeric_casts,
    unstable_features,
    unused_import_braces
)]

mod error;
mod relay;

pub use error::RelayError;
pub use relay::{
    relay::Relay,
    relay_config::RelayConfig,
    service::{FnService, ServiceGateway, ServiceResult},
};
