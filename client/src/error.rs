use thiserror::Error;

use nomad_shared::{ChannelError, ComponentError, DeviceError, ProxyError};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error(transparent)]
    Proxy(#[from] ProxyError),

    #[error(transparent)]
    Component(#[from] ComponentError),

    /// No container for this instance on this device
    #[error("Instance {instance_id} is not hosted on {session_id}")]
    UnknownInstance {
        instance_id: String,
        session_id: String,
    },

    /// A container for this instance already exists on this device
    #[error("Instance {instance_id} already exists on {session_id}")]
    InstanceExists {
        instance_id: String,
        session_id: String,
    },

    /// No constructor registered for this component kind
    #[error("No component kind {kind} registered")]
    UnknownKind { kind: String },
}

impl RuntimeError {
    /// A proxy was driven in the wrong blocking state
    pub fn is_protocol_violation(&self) -> bool {
        matches!(self, RuntimeError::Proxy(error) if error.is_protocol_violation())
    }
}
