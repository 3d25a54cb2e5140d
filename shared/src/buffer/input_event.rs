use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    handler::handler_context::HandlerContext,
    message::Message,
    types::{ChannelName, CorrelationId, EventId, Millis},
};

/// Where an inbound call lands on the component
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum CallTarget {
    /// Invoke an operation with an already mediated message
    Operation { name: String, message: Message },
    /// Set a property through a property link
    Property {
        operation: String,
        property: String,
        value: Value,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum InputEventKind {
    Call {
        channel: ChannelName,
        target: CallTarget,
    },
    IntervalStart {
        period: Millis,
    },
    IntervalTick,
    Timeout,
    NetworkResponse {
        payload: Value,
        failed: bool,
    },
}

impl InputEventKind {
    pub fn name(&self) -> &'static str {
        match self {
            InputEventKind::Call { .. } => "call",
            InputEventKind::IntervalStart { .. } => "interval-start",
            InputEventKind::IntervalTick => "interval-tick",
            InputEventKind::Timeout => "timeout",
            InputEventKind::NetworkResponse { .. } => "network-response",
        }
    }
}

/// Something that happened to a component while it could not, or had not
/// yet, processed it
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InputEvent {
    pub id: EventId,
    pub context: HandlerContext,
    pub kind: InputEventKind,
}

impl InputEvent {
    pub fn correlation_id(&self) -> CorrelationId {
        self.context.correlation_id()
    }
}
