use std::collections::{HashMap, VecDeque};

use log::{debug, info, warn};
use serde_json::json;

use nomad_shared::{Device, DeviceError, Envelope, Millis, Payload, ServiceCall, SessionId};

use crate::{
    error::RelayError,
    relay::{relay_config::RelayConfig, service::ServiceGateway},
};

/// Routes envelopes between connected devices.
///
/// Every connected session has a FIFO queue the device drains with
/// [`Relay::drain`]. Envelopes addressed to one session land in its queue;
/// broadcasts land in every queue but the sender's. Service calls never
/// reach a queue: the relay answers them through the gateway registered
/// for the service and queues the response for the calling session.
pub struct Relay {
    config: RelayConfig,
    devices: HashMap<SessionId, Device>,
    queues: HashMap<SessionId, VecDeque<Envelope>>,
    services: HashMap<String, Box<dyn ServiceGateway>>,
}

impl Relay {
    pub fn new(config: RelayConfig) -> Self {
        Self {
            config,
            devices: HashMap::new(),
            queues: HashMap::new(),
            services: HashMap::new(),
        }
    }

    // Sessions

    pub fn connect(&mut self, device: Device) -> Result<(), RelayError> {
        device.validate()?;
        if self.devices.contains_key(&device.session_id) {
            return Err(DeviceError::DeviceAlreadyRegistered {
                session_id: device.session_id,
            }
            .into());
        }
        info!("Session {} connected", device.session_id);
        self.queues
            .insert(device.session_id.clone(), VecDeque::new());
        self.devices.insert(device.session_id.clone(), device);
        Ok(())
    }

    /// Disconnects a session and returns what it never drained
    pub fn disconnect(&mut self, session_id: &str) -> Result<Vec<Envelope>, RelayError> {
        self.devices
            .remove(session_id)
            .ok_or_else(|| RelayError::NotConnected {
                session_id: session_id.to_string(),
            })?;
        info!("Session {} disconnected", session_id);
        Ok(self
            .queues
            .remove(session_id)
            .map(Vec::from)
            .unwrap_or_default())
    }

    pub fn is_connected(&self, session_id: &str) -> bool {
        self.devices.contains_key(session_id)
    }

    pub fn device(&self, session_id: &str) -> Option<&Device> {
        self.devices.get(session_id)
    }

    pub fn sessions(&self) -> Vec<SessionId> {
        let mut sessions: Vec<SessionId> = self.devices.keys().cloned().collect();
        sessions.sort();
        sessions
    }

    // Services

    pub fn add_service<G: ServiceGateway + 'static>(&mut self, name: &str, gateway: G) {
        self.services.insert(name.to_string(), Box::new(gateway));
    }

    pub fn has_service(&self, name: &str) -> bool {
        self.services.contains_key(name)
    }

    // Routing

    /// Queues an envelope for its addressee, or for every other session when
    /// it has none
    pub fn route(&mut self, envelope: Envelope) -> Result<(), RelayError> {
        envelope.validate()?;
        if !self.is_connected(&envelope.source) {
            return Err(RelayError::NotConnected {
                session_id: envelope.source,
            });
        }

        if let Payload::ServiceCall(call) = &envelope.payload {
            let response = self.answer(&envelope.source, call.clone(), envelope.timestamp);
            return self.enqueue(response);
        }

        match envelope.target.clone() {
            Some(_) => self.enqueue(envelope),
            None => self.broadcast(envelope),
        }
    }

    /// Routes every envelope, stopping at none. Returns the failures.
    pub fn route_all(&mut self, envelopes: Vec<Envelope>) -> Vec<RelayError> {
        envelopes
            .into_iter()
            .filter_map(|envelope| self.route(envelope).err())
            .inspect(|error| warn!("Routing failed: {}", error))
            .collect()
    }

    pub fn drain(&mut self, session_id: &str) -> Vec<Envelope> {
        self.queues
            .get_mut(session_id)
            .map(|queue| queue.drain(..).collect())
            .unwrap_or_default()
    }

    pub fn queued(&self, session_id: &str) -> usize {
        self.queues.get(session_id).map_or(0, VecDeque::len)
    }

    /// True while any session has envelopes waiting
    pub fn has_pending(&self) -> bool {
        self.queues.values().any(|queue| !queue.is_empty())
    }

    fn answer(&mut self, caller: &str, call: ServiceCall, timestamp: Millis) -> Envelope {
        let (payload, failed) = match self.services.get_mut(&call.service) {
            Some(gateway) => match gateway.call(&call.operation, &call.args) {
                Ok(payload) => (payload, false),
                Err(payload) => (payload, true),
            },
            None => {
                warn!("No gateway for service {}", call.service);
                (json!({ "error": format!("unknown service {}", call.service) }), true)
            }
        };
        debug!(
            "{}.{} for {} answered (failed: {})",
            call.service, call.operation, call.instance_id, failed
        );
        Envelope::service_response(
            caller,
            caller,
            call.correlation_id,
            &call.instance_id,
            payload,
            failed,
            timestamp,
        )
    }

    fn enqueue(&mut self, envelope: Envelope) -> Result<(), RelayError> {
        let session_id = envelope.target.clone().unwrap_or_default();
        let capacity = self.config.max_queued_per_session;
        let queue = self
            .queues
            .get_mut(&session_id)
            .ok_or_else(|| RelayError::NotConnected {
                session_id: session_id.clone(),
            })?;
        if queue.len() >= capacity {
            return Err(RelayError::QueueFull {
                session_id,
                capacity,
            });
        }
        queue.push_back(envelope);
        Ok(())
    }

    /// Queues a copy for every session but the sender, or for none when any
    /// of them is full
    fn broadcast(&mut self, envelope: Envelope) -> Result<(), RelayError> {
        let capacity = self.config.max_queued_per_session;
        let mut recipients: Vec<SessionId> = self
            .queues
            .keys()
            .filter(|session_id| **session_id != envelope.source)
            .cloned()
            .collect();
        recipients.sort();

        if let Some(full) = recipients
            .iter()
            .find(|session_id| self.queued(session_id) >= capacity)
        {
            return Err(RelayError::QueueFull {
                session_id: full.clone(),
                capacity,
            });
        }
        for session_id in recipients {
            let copy = envelope.clone().readdressed(&session_id);
            if let Some(queue) = self.queues.get_mut(&session_id) {
                queue.push_back(copy);
            }
        }
        Ok(())
    }
}

impl Default for Relay {
    fn default() -> Self {
        Self::new(RelayConfig::default())
    }
}
