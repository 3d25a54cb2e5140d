use std::collections::VecDeque;

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    buffer::{error::BufferError, input_event::InputEventKind},
    container::ContainerContract,
    handler::{
        error::HandlerError,
        handler_context::{Continuation, HandlerContext},
    },
    message::Message,
    proxy::error::ProxyError,
    types::{CorrelationId, InstanceId},
};

/// An outbound call to a named service on the hosting device
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceCall {
    pub correlation_id: CorrelationId,
    pub instance_id: InstanceId,
    pub service: String,
    pub operation: String,
    #[serde(default)]
    pub args: Vec<Value>,
}

/// Builds the message a response handler receives
pub fn response_message(handler: &str, payload: Value, failed: bool) -> Message {
    Message::new(handler)
        .with("payload", payload)
        .with("failed", failed)
}

/// Outbound service calls and their responses for one component
pub struct NetworkProxy {
    instance_id: InstanceId,
    blocked: bool,
    held: VecDeque<ServiceCall>,
    max_held: usize,
}

impl NetworkProxy {
    pub fn new(instance_id: &str, max_held: usize) -> Self {
        Self {
            instance_id: instance_id.to_string(),
            blocked: false,
            held: VecDeque::new(),
            max_held,
        }
    }

    pub fn is_blocked(&self) -> bool {
        self.blocked
    }

    pub fn held_len(&self) -> usize {
        self.held.len()
    }

    pub fn block(&mut self) {
        self.blocked = true;
    }

    pub fn held_calls(&self) -> Vec<ServiceCall> {
        self.held.iter().cloned().collect()
    }

    /// Puts calls held by another proxy ahead of the ones held here
    pub fn restore_held(&mut self, calls: Vec<ServiceCall>) {
        for call in calls.into_iter().rev() {
            self.held.push_front(call);
        }
    }

    /// Clears the flag and releases held calls in the order they were made
    pub fn unblock(&mut self) -> Vec<ServiceCall> {
        self.blocked = false;
        self.held.drain(..).collect()
    }

    /// Registers the pending call and returns it for sending, or holds it
    /// while blocked
    pub fn call(
        &mut self,
        container: &mut dyn ContainerContract,
        context: HandlerContext,
        service: &str,
        operation: &str,
        args: Vec<Value>,
    ) -> Result<Option<ServiceCall>, ProxyError> {
        if self.blocked && self.held.len() >= self.max_held {
            return Err(BufferError::BufferFull {
                buffer: "outbound call",
                capacity: self.max_held,
            }
            .into());
        }

        let correlation_id = container.handler_registry().register(
            context,
            Continuation::PendingCall {
                service: service.to_string(),
                operation: operation.to_string(),
            },
        );
        let call = ServiceCall {
            correlation_id,
            instance_id: self.instance_id.clone(),
            service: service.to_string(),
            operation: operation.to_string(),
            args,
        };

        if self.blocked {
            debug!(
                "{}: holding call {}.{} until unblock",
                self.instance_id, service, operation
            );
            self.held.push_back(call);
            return Ok(None);
        }
        Ok(Some(call))
    }

    /// Hands a response to its pending call's handler, or records it
    /// downstream while blocked. The pending record is consumed when the
    /// handler runs, so a duplicate response finds nothing to resolve.
    pub fn on_response(
        &mut self,
        container: &mut dyn ContainerContract,
        correlation_id: CorrelationId,
        payload: Value,
        failed: bool,
    ) -> Result<(), ProxyError> {
        let record = container.handler_registry().try_get(correlation_id)?;
        if !matches!(record.continuation, Continuation::PendingCall { .. }) {
            return Err(HandlerError::WrongContinuation {
                correlation_id,
                expected: "pending-call",
                actual: record.continuation.kind_name(),
            }
            .into());
        }
        let context = record.context.clone();

        if self.blocked {
            container
                .input_event_buffer()
                .push_downstream(context, InputEventKind::NetworkResponse { payload, failed })?;
            return Ok(());
        }
        self.resolve(container, correlation_id, payload, failed)
    }

    /// Runs a buffered response
    pub fn replay(
        &mut self,
        container: &mut dyn ContainerContract,
        context: &HandlerContext,
        payload: Value,
        failed: bool,
    ) -> Result<(), ProxyError> {
        let correlation_id = context.correlation_id();
        if !container.handler_registry().contains(correlation_id) {
            warn!(
                "{}: response {:#018x} already handled, dropping replay",
                self.instance_id, correlation_id
            );
            return Ok(());
        }
        self.resolve(container, correlation_id, payload, failed)
    }

    fn resolve(
        &mut self,
        container: &mut dyn ContainerContract,
        correlation_id: CorrelationId,
        payload: Value,
        failed: bool,
    ) -> Result<(), ProxyError> {
        let record = container
            .handler_registry()
            .remove(correlation_id)
            .ok_or(HandlerError::NotFound { correlation_id })?;
        let message = response_message(&record.context.handler, payload, failed);
        container.invoke_operation(&record.context.handler, &message, Some(correlation_id))?;
        Ok(())
    }
}
