use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    buffer::{input_event::InputEvent, input_event_buffer::BufferSnapshot},
    channel::subscription::HandlerSpec,
    component::ComponentDescriptor,
    handler::handler_context::HandlerRecord,
    message::Message,
    proxy::network_proxy::ServiceCall,
    types::{ChannelName, Millis},
};

/// Everything a component needs to resume on another container
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentSnapshot {
    pub descriptor: ComponentDescriptor,
    /// Declared property values, in declaration order
    pub properties: Map<String, Value>,
    pub buffer: BufferSnapshot,
    pub handlers: Vec<HandlerRecord>,
    pub mappings: Vec<(ChannelName, HandlerSpec)>,
    /// Messages the blocked proxy held back from its channels
    #[serde(default)]
    pub outbound: Vec<Message>,
    /// Service calls the blocked proxy held back
    #[serde(default)]
    pub held_calls: Vec<ServiceCall>,
    /// Next service call sequence number of the source container
    #[serde(default)]
    pub call_sequence: u64,
    /// Source clock reading at capture; timers are rebased against it
    pub captured_at: Millis,
}

impl ComponentSnapshot {
    pub fn instance_id(&self) -> &str {
        &self.descriptor.instance_id
    }

    /// Appends events received elsewhere after capture, numbered after the
    /// snapshot's own events
    pub fn append_downstream(&mut self, events: Vec<InputEvent>) {
        for mut event in events {
            event.id = self.buffer.next_id;
            self.buffer.next_id += 1;
            self.buffer.downstream.push(event);
        }
    }

    pub fn to_json(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    pub fn from_json(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }
}
