use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{
    channel::error::ChannelError,
    mediation::mediator::{ChannelParam, ParamType},
    types::{InstanceId, Side},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelType {
    /// Sender participants publish, receiver participants consume
    Link,
    /// Reversed link: receiver participants publish back to the senders
    Backlink,
    /// Link whose consumers take the value as a property
    PropLink,
}

impl ChannelType {
    /// Which declared side publishes on a channel of this type
    pub fn publishing_side(self) -> Side {
        match self {
            ChannelType::Link | ChannelType::PropLink => Side::Publisher,
            ChannelType::Backlink => Side::Consumer,
        }
    }
}

/// One component's endpoint on a channel, as declared by the composition
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub instance_id: InstanceId,
    /// Event published by this participant
    #[serde(default)]
    pub event_name: Option<String>,
    /// Operation invoked on this participant
    #[serde(default)]
    pub operation: Option<String>,
    /// Property set on this participant (PropLink consumers)
    #[serde(default)]
    pub property: Option<String>,
    /// Declared parameter order of the event or operation
    #[serde(default)]
    pub params: Vec<String>,
    /// Target parameter → transform expression
    #[serde(default)]
    pub transforms: HashMap<String, String>,
}

impl Participant {
    pub fn publisher(instance_id: &str, event_name: &str, params: &[&str]) -> Self {
        Self {
            instance_id: instance_id.to_string(),
            event_name: Some(event_name.to_string()),
            params: params.iter().map(|p| p.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn consumer(instance_id: &str, operation: &str, params: &[&str]) -> Self {
        Self {
            instance_id: instance_id.to_string(),
            operation: Some(operation.to_string()),
            params: params.iter().map(|p| p.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn property_consumer(instance_id: &str, operation: &str, property: &str) -> Self {
        Self {
            instance_id: instance_id.to_string(),
            operation: Some(operation.to_string()),
            property: Some(property.to_string()),
            ..Default::default()
        }
    }

    pub fn with_transform(mut self, target: &str, expression: &str) -> Self {
        self.transforms
            .insert(target.to_string(), expression.to_string());
        self
    }

    /// Name under which this participant publishes. Participants that only
    /// declare an operation publish under that name.
    pub fn published_event(&self) -> Option<&str> {
        self.event_name.as_deref().or(self.operation.as_deref())
    }

    /// Operation invoked when this participant consumes
    pub fn consumed_operation(&self) -> Option<&str> {
        self.operation.as_deref().or(self.event_name.as_deref())
    }
}

/// A channel as declared by the composition model. Every field is optional
/// here so a missing one surfaces as a `MalformedDescriptor` error from
/// [`ChannelDescriptor::validate`] rather than a parse error.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelDescriptor {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: Option<ChannelType>,
    #[serde(default)]
    pub sender_role: Option<String>,
    #[serde(default)]
    pub receiver_role: Option<String>,
    #[serde(default)]
    pub sender: Vec<Participant>,
    #[serde(default)]
    pub receiver: Vec<Participant>,
    #[serde(default)]
    pub params: Vec<ChannelParam>,
    #[serde(default)]
    pub threshold: Option<usize>,
}

impl ChannelDescriptor {
    pub fn new(name: &str, kind: ChannelType, sender_role: &str, receiver_role: &str) -> Self {
        Self {
            name: Some(name.to_string()),
            kind: Some(kind),
            sender_role: Some(sender_role.to_string()),
            receiver_role: Some(receiver_role.to_string()),
            ..Default::default()
        }
    }

    pub fn link(name: &str) -> Self {
        Self::new(name, ChannelType::Link, "sender", "receiver")
    }

    pub fn sender(mut self, participant: Participant) -> Self {
        self.sender.push(participant);
        self
    }

    pub fn receiver(mut self, participant: Participant) -> Self {
        self.receiver.push(participant);
        self
    }

    pub fn param(mut self, name: &str, kind: ParamType) -> Self {
        self.params.push(ChannelParam {
            name: name.to_string(),
            kind,
        });
        self
    }

    pub fn threshold(mut self, threshold: usize) -> Self {
        self.threshold = Some(threshold);
        self
    }

    pub fn from_json(json: &str) -> Result<Self, ChannelError> {
        serde_json::from_str(json).map_err(|error| ChannelError::UnparsableDescriptor {
            reason: error.to_string(),
        })
    }

    pub fn display_name(&self) -> String {
        self.name.clone().unwrap_or_default()
    }

    pub fn validate(&self) -> Result<(), ChannelError> {
        let malformed = |reason: &'static str| ChannelError::MalformedDescriptor {
            channel: self.display_name(),
            reason,
        };

        if self.name.as_deref().map_or(true, |name| name.trim().is_empty()) {
            return Err(malformed("missing name"));
        }
        let Some(kind) = self.kind else {
            return Err(malformed("missing type"));
        };
        if self.sender_role.as_deref().map_or(true, str::is_empty) {
            return Err(malformed("missing sender role"));
        }
        if self.receiver_role.as_deref().map_or(true, str::is_empty) {
            return Err(malformed("missing receiver role"));
        }
        if self.sender.is_empty() {
            return Err(malformed("no sender participants"));
        }
        if self.receiver.is_empty() {
            return Err(malformed("no receiver participants"));
        }
        if self
            .sender
            .iter()
            .chain(self.receiver.iter())
            .any(|participant| participant.instance_id.is_empty())
        {
            return Err(malformed("participant without instance id"));
        }

        let (publishers, consumers) = self.sides(kind);
        if publishers.iter().any(|p| p.published_event().is_none()) {
            return Err(malformed("publishing participant without event name"));
        }
        if consumers.iter().any(|p| p.consumed_operation().is_none()) {
            return Err(malformed("consuming participant without operation"));
        }
        if kind == ChannelType::PropLink && consumers.iter().any(|p| p.property.is_none()) {
            return Err(malformed("property link consumer without property"));
        }
        Ok(())
    }

    /// (publishers, consumers) for a channel of `kind`
    pub fn sides(&self, kind: ChannelType) -> (&[Participant], &[Participant]) {
        match kind.publishing_side() {
            Side::Publisher => (&self.sender, &self.receiver),
            Side::Consumer => (&self.receiver, &self.sender),
        }
    }
}
