use thiserror::Error;

use crate::mediation::error::MediationError;

/// Errors that can occur while wiring or publishing on a channel
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ChannelError {
    /// Descriptor lacks a required part; the channel is not created
    #[error("Malformed channel descriptor {channel:?}: {reason}")]
    MalformedDescriptor {
        channel: String,
        reason: &'static str,
    },

    /// Descriptor JSON could not be parsed
    #[error("Channel descriptor could not be parsed: {reason}")]
    UnparsableDescriptor { reason: String },

    /// A receiver's transform expression does not compile
    #[error("Invalid transform for {instance_id} on channel {channel}: {error}")]
    InvalidTransform {
        channel: String,
        instance_id: String,
        #[source]
        error: MediationError,
    },

    /// The channel is blocked and its FIFO holds as many messages as allowed
    #[error("Channel {channel} buffer is full ({capacity} messages); publisher must retry after unblock")]
    BufferFull { channel: String, capacity: usize },

    /// A channel with this name is already wired
    #[error("Channel {channel} is already wired")]
    ChannelAlreadyWired { channel: String },

    /// No channel with this name is wired
    #[error("Channel {channel} is not wired")]
    ChannelNotFound { channel: String },
}
