//! ## `EventProxy` – a component's gate to the runtime
//!
//! Every message entering or leaving a component passes through its proxy.
//! The proxy owns two sub-proxies ([`TimerProxy`], [`NetworkProxy`]) and
//! blocks and unblocks them together with itself.
//!
//! ### Blocked
//! * `publish` appends to the outbound FIFO.
//! * `notify` records one downstream call event per matching mapping in the
//!   container's input event buffer.
//! * Timer firings and network responses are recorded downstream by the
//!   sub-proxies; outbound calls are held.
//! * `inject_event` is allowed; it replays a captured continuation.
//!
//! ### Unblocked
//! * `publish` forwards immediately, `notify` invokes the component.
//! * `inject_downstream_event` is allowed; `unblock` uses it to drain the
//!   downstream log in arrival order.
//!
//! Injecting in the wrong state is a protocol violation and fails with
//! [`ProxyError::ProtocolState`].

use std::collections::{HashMap, VecDeque};

use log::{debug, info, warn};
use serde_json::Value;

use crate::{
    buffer::{
        error::BufferError,
        input_event::{CallTarget, InputEvent, InputEventKind},
    },
    channel::subscription::HandlerSpec,
    config::BufferConfig,
    container::ContainerContract,
    handler::handler_context::HandlerContext,
    mediation::mediator::remap_positionally,
    message::Message,
    proxy::{
        error::ProxyError,
        network_proxy::{NetworkProxy, ServiceCall},
        timer_proxy::TimerProxy,
    },
    types::{ChannelName, InstanceId},
};

/// What became of a published message
#[derive(Clone, Debug, PartialEq)]
pub enum PublishOutcome {
    /// Pass it on to the channels now
    Forward(Message),
    /// Held until unblock
    Buffered,
}

/// Traffic released by [`EventProxy::unblock`]
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Released {
    /// Messages published while blocked, in publish order
    pub messages: Vec<Message>,
    /// Service calls made while blocked, in call order
    pub calls: Vec<ServiceCall>,
    /// Downstream events replayed
    pub replayed: usize,
}

pub struct EventProxy {
    instance_id: InstanceId,
    blocked: bool,
    mappings: HashMap<ChannelName, Vec<HandlerSpec>>,
    outbound: VecDeque<Message>,
    max_outbound: usize,
    timers: TimerProxy,
    network: NetworkProxy,
}

impl EventProxy {
    pub fn new(instance_id: &str, config: &BufferConfig) -> Self {
        Self {
            instance_id: instance_id.to_string(),
            blocked: false,
            mappings: HashMap::new(),
            outbound: VecDeque::new(),
            max_outbound: config.max_buffered,
            timers: TimerProxy::new(instance_id),
            network: NetworkProxy::new(instance_id, config.max_buffered),
        }
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn timers(&mut self) -> &mut TimerProxy {
        &mut self.timers
    }

    pub fn network(&mut self) -> &mut NetworkProxy {
        &mut self.network
    }

    pub fn network_ref(&self) -> &NetworkProxy {
        &self.network
    }

    // Operation mappings

    /// Returns `false` if the mapping was already present
    pub fn add_operation_mapping(&mut self, channel: &str, handler: HandlerSpec) -> bool {
        let handlers = self.mappings.entry(channel.to_string()).or_default();
        if handlers.contains(&handler) {
            return false;
        }
        handlers.push(handler);
        true
    }

    /// Removes every mapping of `operation` on `channel`
    pub fn remove_operation_mapping(&mut self, channel: &str, operation: &str) -> bool {
        let Some(handlers) = self.mappings.get_mut(channel) else {
            return false;
        };
        let before = handlers.len();
        handlers.retain(|handler| handler.operation_name() != operation);
        let removed = before != handlers.len();
        if handlers.is_empty() {
            self.mappings.remove(channel);
        }
        removed
    }

    pub fn mappings_for(&self, channel: &str) -> &[HandlerSpec] {
        self.mappings
            .get(channel)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Every mapping, sorted by channel, in a form that can be re-registered
    /// verbatim on a fresh proxy
    pub fn recorded_mappings(&self) -> Vec<(ChannelName, HandlerSpec)> {
        let mut channels: Vec<&ChannelName> = self.mappings.keys().collect();
        channels.sort();
        channels
            .into_iter()
            .flat_map(|channel| {
                self.mappings[channel]
                    .iter()
                    .map(move |handler| (channel.clone(), handler.clone()))
            })
            .collect()
    }

    // Blocking

    pub fn is_blocked(&self) -> bool {
        self.blocked
    }

    pub fn outbound_len(&self) -> usize {
        self.outbound.len()
    }

    /// Messages published while blocked, oldest first
    pub fn held_messages(&self) -> Vec<Message> {
        self.outbound.iter().cloned().collect()
    }

    /// Puts traffic held by another proxy for the same component ahead of
    /// what this proxy holds
    pub fn restore_held(&mut self, messages: Vec<Message>, calls: Vec<ServiceCall>) {
        for message in messages.into_iter().rev() {
            self.outbound.push_front(message);
        }
        self.network.restore_held(calls);
    }

    pub fn block(&mut self) {
        self.blocked = true;
        self.timers.block();
        self.network.block();
        info!("Proxy {} blocked", self.instance_id);
    }

    /// Clears every blocked flag, replays the container's downstream log in
    /// arrival order and releases the held outbound traffic. Replay failures
    /// of single events are logged and do not stop the drain.
    pub fn unblock(&mut self, container: &mut dyn ContainerContract) -> Released {
        self.blocked = false;
        self.timers.unblock();
        let calls = self.network.unblock();

        let mut replayed = 0;
        while let Some(event) = container.input_event_buffer().pop_downstream() {
            replayed += 1;
            if let Err(error) = self.inject_downstream_event(container, event) {
                warn!("Proxy {}: downstream replay failed: {}", self.instance_id, error);
            }
        }

        let messages: Vec<Message> = self.outbound.drain(..).collect();
        info!(
            "Proxy {} unblocked: {} replayed, {} message(s) and {} call(s) released",
            self.instance_id,
            replayed,
            messages.len(),
            calls.len()
        );
        Released {
            messages,
            calls,
            replayed,
        }
    }

    // Outbound

    pub fn publish(&mut self, message: Message) -> Result<PublishOutcome, ProxyError> {
        if !self.blocked {
            return Ok(PublishOutcome::Forward(message));
        }
        if self.outbound.len() >= self.max_outbound {
            return Err(BufferError::BufferFull {
                buffer: "outbound message",
                capacity: self.max_outbound,
            }
            .into());
        }
        debug!("Proxy {} holding {}", self.instance_id, message.name);
        self.outbound.push_back(message);
        Ok(PublishOutcome::Buffered)
    }

    // Inbound

    /// Delivers a channel message to every handler mapped on `channel`.
    /// Returns how many handlers ran (or were recorded, while blocked).
    /// While blocked the message is recorded for every handler or, when the
    /// downstream log lacks room for all of them, for none.
    pub fn notify(
        &mut self,
        container: &mut dyn ContainerContract,
        channel: &str,
        message: &Message,
    ) -> Result<usize, ProxyError> {
        self.notify_matching(container, channel, None, message)
    }

    /// Like [`EventProxy::notify`], restricted to the mappings of `operation`
    pub fn notify_operation(
        &mut self,
        container: &mut dyn ContainerContract,
        channel: &str,
        operation: &str,
        message: &Message,
    ) -> Result<usize, ProxyError> {
        self.notify_matching(container, channel, Some(operation), message)
    }

    fn notify_matching(
        &mut self,
        container: &mut dyn ContainerContract,
        channel: &str,
        operation: Option<&str>,
        message: &Message,
    ) -> Result<usize, ProxyError> {
        let handlers: Vec<HandlerSpec> = self
            .mappings_for(channel)
            .iter()
            .filter(|handler| operation.map_or(true, |op| handler.operation_name() == op))
            .cloned()
            .collect();
        if handlers.is_empty() {
            return Err(ProxyError::NoMapping {
                instance_id: self.instance_id.clone(),
                channel: channel.to_string(),
            });
        }

        if self.blocked {
            let buffer = container.input_event_buffer();
            if buffer.downstream_room() < handlers.len() {
                return Err(BufferError::BufferFull {
                    buffer: "input event",
                    capacity: buffer.downstream_capacity(),
                }
                .into());
            }
        }

        let mut handled = 0;
        for handler in handlers {
            let (context, target) = call_for(channel, &handler, message);

            if self.blocked {
                let kind = InputEventKind::Call {
                    channel: channel.to_string(),
                    target,
                };
                container.input_event_buffer().push_downstream(context, kind)?;
                handled += 1;
                continue;
            }

            match self.run_call(container, &context, target) {
                Ok(()) => handled += 1,
                Err(error) => warn!(
                    "Proxy {}: handler {} on channel {} failed: {}",
                    self.instance_id,
                    handler.operation_name(),
                    channel,
                    error
                ),
            }
        }
        Ok(handled)
    }

    /// Replays a captured event. Only legal while blocked.
    pub fn inject_event(
        &mut self,
        container: &mut dyn ContainerContract,
        event: InputEvent,
    ) -> Result<(), ProxyError> {
        if !self.blocked {
            return Err(ProxyError::ProtocolState {
                instance_id: self.instance_id.clone(),
                operation: "inject_event",
                blocked: false,
            });
        }
        self.dispatch(container, event)
    }

    /// Replays an event that arrived while blocked. Only legal once unblocked.
    pub fn inject_downstream_event(
        &mut self,
        container: &mut dyn ContainerContract,
        event: InputEvent,
    ) -> Result<(), ProxyError> {
        if self.blocked {
            return Err(ProxyError::ProtocolState {
                instance_id: self.instance_id.clone(),
                operation: "inject_downstream_event",
                blocked: true,
            });
        }
        self.dispatch(container, event)
    }

    /// Replays every downstream event through [`EventProxy::inject_event`],
    /// oldest first. Each event leaves the buffer before it runs.
    pub fn replay_downstream(&mut self, container: &mut dyn ContainerContract) -> Result<usize, ProxyError> {
        let mut replayed = 0;
        while let Some(event) = container.input_event_buffer().pop_downstream() {
            match self.inject_event(container, event) {
                Ok(()) => {}
                Err(error) if error.is_protocol_violation() => return Err(error),
                Err(error) => warn!("Proxy {}: replay failed: {}", self.instance_id, error),
            }
            replayed += 1;
        }
        Ok(replayed)
    }

    fn dispatch(&mut self, container: &mut dyn ContainerContract, event: InputEvent) -> Result<(), ProxyError> {
        debug!(
            "Proxy {} replaying {} event {}",
            self.instance_id,
            event.kind.name(),
            event.id
        );
        let InputEvent { context, kind, .. } = event;
        match kind {
            InputEventKind::Call { target, .. } => self.run_call(container, &context, target),
            InputEventKind::IntervalStart { .. } | InputEventKind::IntervalTick | InputEventKind::Timeout => {
                self.timers.replay(container, &context, &kind)
            }
            InputEventKind::NetworkResponse { payload, failed } => {
                self.network.replay(container, &context, payload, failed)
            }
        }
    }

    fn run_call(
        &mut self,
        container: &mut dyn ContainerContract,
        context: &HandlerContext,
        target: CallTarget,
    ) -> Result<(), ProxyError> {
        match target {
            CallTarget::Operation { name, message } => {
                container.invoke_operation(&name, &message, None)?;
            }
            CallTarget::Property {
                operation,
                property,
                value,
            } => {
                let activity = container.input_event_buffer().push_activity(
                    context.clone(),
                    InputEventKind::Call {
                        channel: context.context_id.clone(),
                        target: CallTarget::Property {
                            operation,
                            property: property.clone(),
                            value: value.clone(),
                        },
                    },
                );
                let result = container.set_property(&property, value, Some(context.correlation_id()));
                container.input_event_buffer().complete_activity(activity)?;
                result?;
            }
        }
        Ok(())
    }
}

/// The handler context and call target one mapping makes of a message
fn call_for(channel: &str, handler: &HandlerSpec, message: &Message) -> (HandlerContext, CallTarget) {
    match handler {
        HandlerSpec::Operation { name, params } => {
            let mediated = message.rebody(remap_positionally(&message.body, params));
            let context = HandlerContext::new(name, channel, vec![Value::Object(mediated.body.clone())]);
            (
                context,
                CallTarget::Operation {
                    name: name.clone(),
                    message: mediated,
                },
            )
        }
        HandlerSpec::Property {
            operation,
            property,
        } => {
            let value = message
                .get(property)
                .or_else(|| message.body.values().next())
                .cloned()
                .unwrap_or(Value::Null);
            let context = HandlerContext::new(operation, channel, vec![value.clone()]);
            (
                context,
                CallTarget::Property {
                    operation: operation.clone(),
                    property: property.clone(),
                    value,
                },
            )
        }
    }
}
