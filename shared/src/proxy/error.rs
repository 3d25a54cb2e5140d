use thiserror::Error;

use crate::{buffer::error::BufferError, component::ComponentError, handler::error::HandlerError};

/// Errors raised by a component's event proxies
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProxyError {
    /// An inject was attempted in the wrong blocking state. Fatal for the
    /// relocation that issued it.
    #[error("Protocol violation on {instance_id}: {operation} while the proxy is {}", if *.blocked { "blocked" } else { "not blocked" })]
    ProtocolState {
        instance_id: String,
        operation: &'static str,
        blocked: bool,
    },

    /// The component has no handler mapped for messages on this channel
    #[error("Instance {instance_id} has no handler mapped on channel {channel}")]
    NoMapping { instance_id: String, channel: String },

    /// A bounded buffer rejected the event
    #[error(transparent)]
    Buffer(#[from] BufferError),

    /// A continuation could not be resolved
    #[error(transparent)]
    Handler(#[from] HandlerError),

    /// The component's handler failed
    #[error(transparent)]
    Component(#[from] ComponentError),
}

impl ProxyError {
    pub fn is_protocol_violation(&self) -> bool {
        matches!(self, ProxyError::ProtocolState { .. })
    }
}
