use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{device::error::DeviceError, types::SessionId};

/// Name/version pair describing a runtime or operating system
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformDescriptor {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
}

impl PlatformDescriptor {
    pub fn new(name: &str, version: &str) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
        }
    }
}

/// A service reachable from a device
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceEndpoint {
    pub url: String,
    #[serde(default = "default_protocol")]
    pub protocol: String,
}

fn default_protocol() -> String {
    "http".to_string()
}

/// Identity of one runtime container: a browser session, a phone, a TV
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub session_id: SessionId,
    pub runtime: PlatformDescriptor,
    #[serde(default)]
    pub os: PlatformDescriptor,
    #[serde(default)]
    pub services: HashMap<String, ServiceEndpoint>,
}

impl Device {
    pub fn new(session_id: &str, runtime: PlatformDescriptor, os: PlatformDescriptor) -> Self {
        Self {
            session_id: session_id.to_string(),
            runtime,
            os,
            services: HashMap::new(),
        }
    }

    /// Parses and validates a JSON device descriptor
    pub fn from_json(json: &str) -> Result<Self, DeviceError> {
        let device: Device =
            serde_json::from_str(json).map_err(|error| DeviceError::UnparsableDescriptor {
                reason: error.to_string(),
            })?;
        device.validate()?;
        Ok(device)
    }

    pub fn validate(&self) -> Result<(), DeviceError> {
        if self.session_id.trim().is_empty() {
            return Err(DeviceError::MalformedDescriptor {
                field: "sessionId",
            });
        }
        if self.runtime.name.trim().is_empty() {
            return Err(DeviceError::MalformedDescriptor {
                field: "runtime.name",
            });
        }
        Ok(())
    }

    pub fn add_service(&mut self, name: &str, endpoint: ServiceEndpoint) {
        self.services.insert(name.to_string(), endpoint);
    }

    pub fn service(&self, name: &str) -> Option<&ServiceEndpoint> {
        self.services.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_descriptor() {
        let device = Device::from_json(
            r#"{
                "sessionId": "tv-1",
                "runtime": {"name": "webkit", "version": "6"},
                "os": {"name": "linux", "version": "6.1"},
                "services": {"weather": {"url": "https://weather.example/api"}}
            }"#,
        )
        .unwrap();

        assert_eq!(device.session_id, "tv-1");
        assert_eq!(device.service("weather").unwrap().protocol, "http");
    }

    #[test]
    fn rejects_blank_session() {
        let result = Device::from_json(r#"{"sessionId": " ", "runtime": {"name": "webkit"}}"#);
        assert_eq!(
            result,
            Err(DeviceError::MalformedDescriptor {
                field: "sessionId"
            })
        );
    }

    #[test]
    fn rejects_missing_runtime() {
        let result = Device::from_json(r#"{"sessionId": "phone"}"#);
        assert!(matches!(
            result,
            Err(DeviceError::UnparsableDescriptor { .. })
        ));
    }
}
