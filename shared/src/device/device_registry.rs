use std::collections::HashMap;

use log::{debug, warn};

use crate::{
    device::{
        device::{Device, ServiceEndpoint},
        error::DeviceError,
    },
    types::{InstanceId, SessionId},
};

/// Knows every device this runtime can talk to and which device hosts each
/// component instance. "Local" means hosted by the device this registry was
/// created for.
pub struct DeviceRegistry {
    local_session: SessionId,
    devices: HashMap<SessionId, Device>,
    hosting: HashMap<InstanceId, SessionId>,
}

impl DeviceRegistry {
    pub fn new(local: Device) -> Result<Self, DeviceError> {
        local.validate()?;
        let local_session = local.session_id.clone();
        let mut devices = HashMap::new();
        devices.insert(local_session.clone(), local);
        Ok(Self {
            local_session,
            devices,
            hosting: HashMap::new(),
        })
    }

    pub fn local_session(&self) -> &SessionId {
        &self.local_session
    }

    pub fn local_device(&self) -> Option<&Device> {
        self.devices.get(&self.local_session)
    }

    pub fn register_device(&mut self, device: Device) -> Result<(), DeviceError> {
        device.validate()?;
        if self.devices.contains_key(&device.session_id) {
            return Err(DeviceError::DeviceAlreadyRegistered {
                session_id: device.session_id,
            });
        }
        debug!("Registered device {}", device.session_id);
        self.devices.insert(device.session_id.clone(), device);
        Ok(())
    }

    /// Removes a remote device together with every hosting record pointing at it
    pub fn deregister_device(&mut self, session_id: &str) -> Result<Device, DeviceError> {
        if session_id == self.local_session {
            return Err(DeviceError::CannotDeregisterLocal {
                session_id: session_id.to_string(),
            });
        }
        let device =
            self.devices
                .remove(session_id)
                .ok_or_else(|| DeviceError::DeviceNotRegistered {
                    session_id: session_id.to_string(),
                })?;
        self.hosting.retain(|_, host| host != session_id);
        Ok(device)
    }

    pub fn device(&self, session_id: &str) -> Option<&Device> {
        self.devices.get(session_id)
    }

    pub fn has_device(&self, session_id: &str) -> bool {
        self.devices.contains_key(session_id)
    }

    /// Records that `instance_id` now lives on `session_id`, replacing any
    /// previous host
    pub fn assign_instance(&mut self, instance_id: &str, session_id: &str) -> Result<(), DeviceError> {
        if !self.devices.contains_key(session_id) {
            return Err(DeviceError::DeviceNotRegistered {
                session_id: session_id.to_string(),
            });
        }
        if let Some(previous) = self
            .hosting
            .insert(instance_id.to_string(), session_id.to_string())
        {
            if previous != session_id {
                debug!(
                    "Instance {} moved from {} to {}",
                    instance_id, previous, session_id
                );
            }
        }
        Ok(())
    }

    pub fn release_instance(&mut self, instance_id: &str) -> Option<SessionId> {
        self.hosting.remove(instance_id)
    }

    pub fn host_of(&self, instance_id: &str) -> Option<&SessionId> {
        self.hosting.get(instance_id)
    }

    pub fn try_host_of(&self, instance_id: &str) -> Result<&SessionId, DeviceError> {
        self.hosting
            .get(instance_id)
            .ok_or_else(|| DeviceError::InstanceNotHosted {
                instance_id: instance_id.to_string(),
            })
    }

    /// An instance with no hosting record is never local
    pub fn is_local(&self, instance_id: &str) -> bool {
        match self.hosting.get(instance_id) {
            Some(host) => *host == self.local_session,
            None => {
                warn!("Instance {} has no hosting record", instance_id);
                false
            }
        }
    }

    pub fn instances_on(&self, session_id: &str) -> Vec<InstanceId> {
        let mut instances: Vec<InstanceId> = self
            .hosting
            .iter()
            .filter(|(_, host)| host.as_str() == session_id)
            .map(|(instance, _)| instance.clone())
            .collect();
        instances.sort();
        instances
    }

    /// Looks up a service in the local device's service registry
    pub fn local_service(&self, name: &str) -> Option<&ServiceEndpoint> {
        self.local_device().and_then(|device| device.service(name))
    }
}
