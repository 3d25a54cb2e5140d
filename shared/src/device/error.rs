use thiserror::Error;

/// Errors that can occur while registering devices or tracking which device
/// hosts a component instance
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    /// Device descriptor is missing a required field
    #[error("Malformed device descriptor: missing {field}")]
    MalformedDescriptor { field: &'static str },

    /// Device descriptor JSON could not be parsed
    #[error("Device descriptor could not be parsed: {reason}")]
    UnparsableDescriptor { reason: String },

    /// A device with this session id is already registered
    #[error("Device {session_id} is already registered")]
    DeviceAlreadyRegistered { session_id: String },

    /// No device is registered under this session id
    #[error("Device {session_id} is not registered")]
    DeviceNotRegistered { session_id: String },

    /// The local device cannot be deregistered from its own registry
    #[error("Cannot deregister the local device {session_id}")]
    CannotDeregisterLocal { session_id: String },

    /// Instance has no hosting record
    #[error("Component instance {instance_id} is not hosted by any known device")]
    InstanceNotHosted { instance_id: String },
}
