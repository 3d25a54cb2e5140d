use std::{cell::RefCell, rc::Rc};

use serde_json::{Map, Value};

use nomad_client::ComponentKinds;
use nomad_shared::{
    Capabilities, Component, ComponentContext, ComponentError, InstanceId, Message, Millis,
    SessionId,
};

/// One operation call seen by a [`RecordingComponent`]
#[derive(Clone, Debug, PartialEq)]
pub struct Invocation {
    pub session_id: SessionId,
    pub instance_id: InstanceId,
    pub operation: String,
    pub body: Value,
    pub at: Millis,
}

/// Invocations of every recording component of a test, across devices
#[derive(Clone, Default)]
pub struct Journal(Rc<RefCell<Vec<Invocation>>>);

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, invocation: Invocation) {
        self.0.borrow_mut().push(invocation);
    }

    pub fn entries(&self) -> Vec<Invocation> {
        self.0.borrow().clone()
    }

    pub fn of(&self, instance_id: &str, operation: &str) -> Vec<Invocation> {
        self.0
            .borrow()
            .iter()
            .filter(|entry| entry.instance_id == instance_id && entry.operation == operation)
            .cloned()
            .collect()
    }

    /// `field` of every `operation` body `instance_id` received, in order
    pub fn values(&self, instance_id: &str, operation: &str, field: &str) -> Vec<Value> {
        self.of(instance_id, operation)
            .into_iter()
            .map(|entry| entry.body.get(field).cloned().unwrap_or(Value::Null))
            .collect()
    }

    pub fn clear(&self) {
        self.0.borrow_mut().clear();
    }
}

/// A component that records every operation call and turns a few
/// operations into effects:
///
/// * `arm {handler, delay}` sets a timeout
/// * `repeat {period}` sets an `onTick` interval
/// * `fetch {service, operation, arg}` calls a service, answered on `onFetched`
/// * `echo {..}` publishes `onEcho` with the same body
/// * `fail` fails
pub struct RecordingComponent {
    session_id: SessionId,
    instance_id: InstanceId,
    journal: Journal,
    properties: Map<String, Value>,
}

impl RecordingComponent {
    pub fn new(session_id: &str, instance_id: &str, journal: &Journal) -> Self {
        Self {
            session_id: session_id.to_string(),
            instance_id: instance_id.to_string(),
            journal: journal.clone(),
            properties: Map::new(),
        }
    }

    fn seen(&self) -> u64 {
        self.properties
            .get("seen")
            .and_then(Value::as_u64)
            .unwrap_or(0)
    }
}

fn text<'a>(message: &'a Message, field: &str, default: &'a str) -> &'a str {
    message
        .get(field)
        .and_then(Value::as_str)
        .unwrap_or(default)
}

fn number(message: &Message, field: &str) -> u64 {
    message.get(field).and_then(Value::as_u64).unwrap_or(0)
}

impl Component for RecordingComponent {
    fn capabilities(&self) -> Capabilities {
        Capabilities::all()
    }

    fn set_property(&mut self, name: &str, value: Value) -> Result<(), ComponentError> {
        self.properties.insert(name.to_string(), value);
        Ok(())
    }

    fn get_property(&self, name: &str) -> Option<Value> {
        self.properties.get(name).cloned()
    }

    fn invoke_operation(
        &mut self,
        name: &str,
        message: &Message,
        ctx: &mut ComponentContext,
    ) -> Result<(), ComponentError> {
        self.journal.record(Invocation {
            session_id: self.session_id.clone(),
            instance_id: self.instance_id.clone(),
            operation: name.to_string(),
            body: Value::Object(message.body.clone()),
            at: ctx.now(),
        });
        let seen = self.seen() + 1;
        self.properties.insert("seen".to_string(), Value::from(seen));

        match name {
            "arm" => {
                let handler = text(message, "handler", "onTimer");
                ctx.set_timeout(handler, number(message, "delay"), vec![]);
            }
            "repeat" => {
                ctx.set_interval("onTick", number(message, "period"), vec![]);
            }
            "fetch" => {
                let arg = message.get("arg").cloned().unwrap_or(Value::Null);
                ctx.call_service(
                    text(message, "service", "weather"),
                    text(message, "operation", "today"),
                    vec![arg],
                    "onFetched",
                );
            }
            "echo" => ctx.publish(Message::with_body("onEcho", message.body.clone())),
            "fail" => {
                return Err(ComponentError::Failed {
                    operation: name.to_string(),
                    reason: "asked to".to_string(),
                })
            }
            _ => {}
        }
        Ok(())
    }
}

/// Component kinds for one device: `recorder` builds a [`RecordingComponent`]
/// writing to `journal`
pub fn recording_kinds(session_id: &str, journal: &Journal) -> ComponentKinds {
    let session_id = session_id.to_string();
    let journal = journal.clone();
    ComponentKinds::new().with_kind("recorder", move |descriptor| {
        Box::new(RecordingComponent::new(
            &session_id,
            &descriptor.instance_id,
            &journal,
        ))
    })
}
