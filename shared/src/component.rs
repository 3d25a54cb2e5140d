use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::{
    handler::handler_context::HandlerContext,
    message::Message,
    types::{CorrelationId, InstanceId, Millis},
};

/// Optional parts of the component contract
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Capability {
    Init,
    Show,
    Hide,
    Enable,
    Disable,
    Dispose,
    SetProperty,
    GetProperty,
    Invoke,
}

impl Capability {
    pub const ALL: [Capability; 9] = [
        Capability::Init,
        Capability::Show,
        Capability::Hide,
        Capability::Enable,
        Capability::Disable,
        Capability::Dispose,
        Capability::SetProperty,
        Capability::GetProperty,
        Capability::Invoke,
    ];

    const fn bit(self) -> u16 {
        1 << (self as u16)
    }

    pub fn name(self) -> &'static str {
        match self {
            Capability::Init => "init",
            Capability::Show => "show",
            Capability::Hide => "hide",
            Capability::Enable => "enable",
            Capability::Disable => "disable",
            Capability::Dispose => "dispose",
            Capability::SetProperty => "setProperty",
            Capability::GetProperty => "getProperty",
            Capability::Invoke => "invokeOperation",
        }
    }
}

/// The set of optional methods a component actually implements. Read once
/// when the component is instantiated; calls outside the set are no-ops.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Capabilities(u16);

impl Capabilities {
    pub const fn none() -> Self {
        Self(0)
    }

    pub fn all() -> Self {
        Capability::ALL.iter().copied().collect()
    }

    pub const fn with(self, capability: Capability) -> Self {
        Self(self.0 | capability.bit())
    }

    pub const fn contains(self, capability: Capability) -> bool {
        self.0 & capability.bit() != 0
    }
}

impl FromIterator<Capability> for Capabilities {
    fn from_iter<T: IntoIterator<Item = Capability>>(iter: T) -> Self {
        iter.into_iter()
            .fold(Capabilities::none(), |caps, capability| caps.with(capability))
    }
}

/// Errors a component reports back to its container
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ComponentError {
    /// Operation is not part of the component's interface
    #[error("Component {instance_id} has no operation {operation}")]
    UnknownOperation {
        instance_id: String,
        operation: String,
    },

    /// Property is not declared by the component
    #[error("Component {instance_id} has no property {property}")]
    UnknownProperty {
        instance_id: String,
        property: String,
    },

    /// Arguments did not match what the operation expects
    #[error("Invalid argument for {operation}: {reason}")]
    InvalidArgument { operation: String, reason: String },

    /// The component's own logic failed
    #[error("Operation {operation} failed: {reason}")]
    Failed { operation: String, reason: String },

    /// Operation invoked before `init`
    #[error("Component {instance_id} is not initialized")]
    NotInitialized { instance_id: String },
}

/// Outward effects a component records while handling a call. Components
/// never call back into the runtime directly; the runtime applies effects
/// once the current dispatch returns.
#[derive(Clone, Debug, PartialEq)]
pub enum Effect {
    Publish(Message),
    SetTimeout {
        context: HandlerContext,
        delay: Millis,
    },
    SetInterval {
        context: HandlerContext,
        period: Millis,
    },
    ClearTimer {
        correlation_id: CorrelationId,
    },
    CallService {
        context: HandlerContext,
        service: String,
        operation: String,
        args: Vec<Value>,
    },
}

/// Handed to every component call; collects effects
pub struct ComponentContext {
    instance_id: InstanceId,
    now: Millis,
    correlation_id: Option<CorrelationId>,
    next_call: u64,
    effects: Vec<Effect>,
}

impl ComponentContext {
    pub fn new(instance_id: &str, now: Millis, correlation_id: Option<CorrelationId>) -> Self {
        Self {
            instance_id: instance_id.to_string(),
            now,
            correlation_id,
            next_call: 0,
            effects: Vec::new(),
        }
    }

    /// Numbers service calls from `next_call` on, so identical calls in
    /// flight get distinct correlation ids
    pub fn with_call_sequence(mut self, next_call: u64) -> Self {
        self.next_call = next_call;
        self
    }

    /// Sequence number the next service call will take
    pub fn call_sequence(&self) -> u64 {
        self.next_call
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn now(&self) -> Millis {
        self.now
    }

    /// Correlation id of the continuation that triggered this call, if any
    pub fn correlation_id(&self) -> Option<CorrelationId> {
        self.correlation_id
    }

    fn context_for(&self, handler: &str, args: Vec<Value>) -> HandlerContext {
        HandlerContext::new(handler, &self.instance_id, args)
    }

    pub fn publish(&mut self, message: Message) {
        self.effects.push(Effect::Publish(message));
    }

    /// Arms a one-shot timer calling operation `handler` with `args`.
    /// Identical (handler, args) pairs share one timer.
    pub fn set_timeout(&mut self, handler: &str, delay: Millis, args: Vec<Value>) -> CorrelationId {
        let context = self.context_for(handler, args);
        let correlation_id = context.correlation_id();
        self.effects.push(Effect::SetTimeout { context, delay });
        correlation_id
    }

    pub fn set_interval(&mut self, handler: &str, period: Millis, args: Vec<Value>) -> CorrelationId {
        let context = self.context_for(handler, args);
        let correlation_id = context.correlation_id();
        self.effects.push(Effect::SetInterval { context, period });
        correlation_id
    }

    pub fn clear_timer(&mut self, correlation_id: CorrelationId) {
        self.effects.push(Effect::ClearTimer { correlation_id });
    }

    /// Calls `operation` on a named service; the response is delivered to
    /// operation `handler`
    pub fn call_service(
        &mut self,
        service: &str,
        operation: &str,
        args: Vec<Value>,
        handler: &str,
    ) -> CorrelationId {
        let mut context_args = vec![
            Value::from(service),
            Value::from(operation),
            Value::from(self.next_call),
        ];
        context_args.extend(args.iter().cloned());
        self.next_call += 1;
        let context = self.context_for(handler, context_args);
        let correlation_id = context.correlation_id();
        self.effects.push(Effect::CallService {
            context,
            service: service.to_string(),
            operation: operation.to_string(),
            args,
        });
        correlation_id
    }

    pub fn take_effects(&mut self) -> Vec<Effect> {
        std::mem::take(&mut self.effects)
    }
}

/// Everything needed to (re)create a component instance
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentDescriptor {
    pub instance_id: InstanceId,
    pub kind: String,
    /// Properties captured when the component is serialised
    #[serde(default)]
    pub properties: Vec<String>,
    #[serde(default)]
    pub config: Value,
}

impl ComponentDescriptor {
    pub fn new(instance_id: &str, kind: &str) -> Self {
        Self {
            instance_id: instance_id.to_string(),
            kind: kind.to_string(),
            properties: Vec::new(),
            config: Value::Null,
        }
    }

    pub fn with_properties(mut self, properties: &[&str]) -> Self {
        self.properties = properties.iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn with_config(mut self, config: Value) -> Self {
        self.config = config;
        self
    }
}

/// The component contract. Every method is optional; `capabilities` tells the
/// container which ones are real.
pub trait Component {
    fn capabilities(&self) -> Capabilities;

    fn init(&mut self, _ctx: &mut ComponentContext) -> Result<(), ComponentError> {
        Ok(())
    }
    fn show(&mut self) {}
    fn hide(&mut self) {}
    fn enable(&mut self) {}
    fn disable(&mut self) {}
    fn dispose(&mut self) {}

    fn set_property(&mut self, _name: &str, _value: Value) -> Result<(), ComponentError> {
        Ok(())
    }

    fn get_property(&self, _name: &str) -> Option<Value> {
        None
    }

    fn invoke_operation(
        &mut self,
        _name: &str,
        _message: &Message,
        _ctx: &mut ComponentContext,
    ) -> Result<(), ComponentError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn capabilities_collect_and_check() {
        let caps: Capabilities = [Capability::Show, Capability::Invoke].into_iter().collect();
        assert!(caps.contains(Capability::Show));
        assert!(caps.contains(Capability::Invoke));
        assert!(!caps.contains(Capability::Dispose));
        assert!(Capabilities::all().contains(Capability::GetProperty));
    }

    #[test]
    fn context_ids_match_handler_contexts() {
        let mut ctx = ComponentContext::new("clock", 0, None);
        let id = ctx.set_timeout("tick", 100, vec![json!(1)]);
        assert_eq!(
            id,
            HandlerContext::new("tick", "clock", vec![json!(1)]).correlation_id()
        );
        assert_eq!(ctx.take_effects().len(), 1);
        assert!(ctx.take_effects().is_empty());
    }

    #[test]
    fn identical_service_calls_get_distinct_ids() {
        let mut ctx = ComponentContext::new("weather", 0, None).with_call_sequence(4);
        let first = ctx.call_service("weather", "today", vec![json!("Oslo")], "onFetched");
        let second = ctx.call_service("weather", "today", vec![json!("Oslo")], "onFetched");

        assert_ne!(first, second);
        assert_eq!(ctx.call_sequence(), 6);
        assert_eq!(
            first,
            HandlerContext::new(
                "onFetched",
                "weather",
                vec![json!("weather"), json!("today"), json!(4), json!("Oslo")]
            )
            .correlation_id()
        );
    }
}
