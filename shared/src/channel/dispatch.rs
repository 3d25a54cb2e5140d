use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    channel::subscription::Subscription, mediation::error::MediationError, message::Message,
    types::InstanceId,
};

/// A mediated message addressed to one subscriber on another device
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteDelivery {
    pub instance_id: InstanceId,
    pub operation: String,
    pub message: Message,
}

/// Per-subscriber delivery failure. Logged by the channel; never fails the
/// publish as a whole.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DeliveryError {
    /// Nobody on this channel handles the operation for this instance
    #[error("No handler for operation {operation} on instance {instance_id}")]
    HandlerNotFound {
        instance_id: String,
        operation: String,
    },

    /// Mediation of the message for this subscriber failed
    #[error("Mediation failed: {0}")]
    Mediation(#[from] MediationError),

    /// The subscriber's container refused the message
    #[error("Instance {instance_id} rejected delivery: {reason}")]
    Rejected { instance_id: String, reason: String },

    /// No device is known to host the subscriber
    #[error("No route to instance {instance_id}")]
    NoRoute { instance_id: String },
}

/// The runtime side of a channel: where local deliveries go and how remote
/// subscribers are reached
pub trait ChannelDispatch {
    fn is_local(&self, instance_id: &str) -> bool;

    fn deliver_local(
        &mut self,
        channel: &str,
        subscription: &Subscription,
        message: Message,
    ) -> Result<(), DeliveryError>;

    fn forward_remote(&mut self, channel: &str, delivery: RemoteDelivery) -> Result<(), DeliveryError>;
}

/// Outcome counters of one publish or drain
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub delivered: usize,
    pub forwarded: usize,
    pub failed: usize,
    pub buffered: usize,
}

impl PublishReport {
    pub fn buffered(count: usize) -> Self {
        Self {
            buffered: count,
            ..Default::default()
        }
    }

    pub fn merge(&mut self, other: PublishReport) {
        self.delivered += other.delivered;
        self.forwarded += other.forwarded;
        self.failed += other.failed;
        self.buffered += other.buffered;
    }
}
