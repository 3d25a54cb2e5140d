use serde_json::Value;

use crate::{
    buffer::input_event_buffer::InputEventBuffer,
    component::ComponentError,
    handler::handler_registry::HandlerContextRegistry,
    message::Message,
    types::{CorrelationId, Millis},
};

/// What a component's container exposes to that component's proxies.
///
/// The input event buffer and handler registry behind this trait belong to
/// exactly one component; nothing else reaches them.
pub trait ContainerContract {
    fn instance_id(&self) -> &str;

    fn input_event_buffer(&mut self) -> &mut InputEventBuffer;

    fn handler_registry(&mut self) -> &mut HandlerContextRegistry;

    fn set_property(
        &mut self,
        name: &str,
        value: Value,
        correlation_id: Option<CorrelationId>,
    ) -> Result<(), ComponentError>;

    fn invoke_operation(
        &mut self,
        name: &str,
        message: &Message,
        correlation_id: Option<CorrelationId>,
    ) -> Result<(), ComponentError>;

    fn component_config(&self) -> &Value;

    fn is_initialized(&self) -> bool;

    /// Current reading of the owning runtime's logical clock
    fn now(&self) -> Millis;
}
