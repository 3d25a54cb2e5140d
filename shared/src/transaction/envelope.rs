//! Command and event envelopes exchanged between devices through the relay.
//!
//! `APP` envelopes carry application traffic (remote publishes, service
//! calls and responses). `SYS` envelopes carry relocation commands and the
//! progress events a coordinator emits.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    channel::dispatch::RemoteDelivery,
    proxy::network_proxy::ServiceCall,
    relocation::status::{RelocationCondition, RelocationStatus},
    transaction::error::TransactionError,
    types::{ChannelName, CorrelationId, InstanceId, MigrationId, Millis, SessionId},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Level {
    App,
    Sys,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Tag {
    Publish,
    ServiceCall,
    ServiceResponse,
    MigrationStart,
    MigrationProgress,
    MigrationCancel,
    MigrationComplete,
    MigrationFailed,
}

impl Tag {
    pub fn level(self) -> Level {
        match self {
            Tag::Publish | Tag::ServiceCall | Tag::ServiceResponse => Level::App,
            _ => Level::Sys,
        }
    }
}

/// Relocation fields of a `SYS` envelope
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelocationPayload {
    pub app_id: String,
    pub app_version: String,
    pub app_instance_id: String,
    pub migration_id: MigrationId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancel_cause: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancel_cause_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component: Option<InstanceId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<RelocationStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<RelocationCondition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Payload {
    /// Copies mediated on the publishing device, one per remote subscriber
    #[serde(rename_all = "camelCase")]
    RemotePublish {
        channel: ChannelName,
        deliveries: Vec<RemoteDelivery>,
    },
    ServiceCall(ServiceCall),
    #[serde(rename_all = "camelCase")]
    ServiceResponse {
        correlation_id: CorrelationId,
        instance_id: InstanceId,
        payload: Value,
        #[serde(default)]
        failed: bool,
    },
    Relocation(RelocationPayload),
}

impl Payload {
    fn name(&self) -> &'static str {
        match self {
            Payload::RemotePublish { .. } => "remote publish",
            Payload::ServiceCall(_) => "service call",
            Payload::ServiceResponse { .. } => "service response",
            Payload::Relocation(_) => "relocation",
        }
    }

    fn fits(&self, tag: Tag) -> bool {
        match self {
            Payload::RemotePublish { .. } => tag == Tag::Publish,
            Payload::ServiceCall(_) => tag == Tag::ServiceCall,
            Payload::ServiceResponse { .. } => tag == Tag::ServiceResponse,
            Payload::Relocation(_) => tag.level() == Level::Sys,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub level: Level,
    pub tag: Tag,
    /// Session that produced the envelope
    pub source: SessionId,
    /// Addressed session; `None` is a broadcast to every other session
    #[serde(default)]
    pub target: Option<SessionId>,
    pub payload: Payload,
    pub timestamp: Millis,
}

impl Envelope {
    pub fn new(tag: Tag, source: &str, target: Option<&str>, payload: Payload, timestamp: Millis) -> Self {
        Self {
            level: tag.level(),
            tag,
            source: source.to_string(),
            target: target.map(str::to_string),
            payload,
            timestamp,
        }
    }

    pub fn remote_publish(
        source: &str,
        target: &str,
        channel: &str,
        deliveries: Vec<RemoteDelivery>,
        timestamp: Millis,
    ) -> Self {
        Self::new(
            Tag::Publish,
            source,
            Some(target),
            Payload::RemotePublish {
                channel: channel.to_string(),
                deliveries,
            },
            timestamp,
        )
    }

    pub fn service_call(source: &str, call: ServiceCall, timestamp: Millis) -> Self {
        Self::new(Tag::ServiceCall, source, Some(source), Payload::ServiceCall(call), timestamp)
    }

    pub fn service_response(
        source: &str,
        target: &str,
        correlation_id: CorrelationId,
        instance_id: &str,
        payload: Value,
        failed: bool,
        timestamp: Millis,
    ) -> Self {
        Self::new(
            Tag::ServiceResponse,
            source,
            Some(target),
            Payload::ServiceResponse {
                correlation_id,
                instance_id: instance_id.to_string(),
                payload,
                failed,
            },
            timestamp,
        )
    }

    pub fn relocation(tag: Tag, source: &str, payload: RelocationPayload, timestamp: Millis) -> Self {
        Self::new(tag, source, None, Payload::Relocation(payload), timestamp)
    }

    /// Same envelope addressed to another session
    pub fn readdressed(mut self, target: &str) -> Self {
        self.target = Some(target.to_string());
        self
    }

    pub fn relocation_payload(&self) -> Option<&RelocationPayload> {
        match &self.payload {
            Payload::Relocation(payload) => Some(payload),
            _ => None,
        }
    }

    pub fn validate(&self) -> Result<(), TransactionError> {
        if !self.payload.fits(self.tag) || self.level != self.tag.level() {
            return Err(TransactionError::TagMismatch {
                tag: format!("{:?}", self.tag),
                payload: self.payload.name(),
            });
        }
        Ok(())
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    pub fn from_json(json: &str) -> Result<Self, TransactionError> {
        let envelope: Envelope =
            serde_json::from_str(json).map_err(|error| TransactionError::UnparsableEnvelope {
                reason: error.to_string(),
            })?;
        envelope.validate()?;
        Ok(envelope)
    }
}
