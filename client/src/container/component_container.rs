use log::{debug, warn};
use serde_json::{Map, Value};

use nomad_shared::{
    BufferConfig, Capabilities, Capability, ChannelName, Component, ComponentContext,
    ComponentDescriptor, ComponentError, ComponentSnapshot, ContainerContract, CorrelationId,
    Effect, EventId, EventProxy, HandlerContextRegistry, HandlerSpec, InputEvent,
    InputEventBuffer, InputEventKind, Message, Millis,
};

/// The part of a container its proxies see
pub struct ContainerCore {
    descriptor: ComponentDescriptor,
    component: Box<dyn Component>,
    capabilities: Capabilities,
    buffer: InputEventBuffer,
    registry: HandlerContextRegistry,
    initialized: bool,
    now: Millis,
    effects: Vec<Effect>,
    /// Set once a snapshot is restored; downstream events numbered below it
    /// came from that snapshot
    restored_from: Option<EventId>,
    /// Events received before the snapshot arrived, kept for compensation
    received_early: Vec<InputEvent>,
    /// Next service call sequence number
    call_sequence: u64,
}

impl ContainerCore {
    fn context(&self, correlation_id: Option<CorrelationId>) -> ComponentContext {
        ComponentContext::new(&self.descriptor.instance_id, self.now, correlation_id)
            .with_call_sequence(self.call_sequence)
    }

    fn collect(&mut self, mut ctx: ComponentContext) {
        self.call_sequence = ctx.call_sequence();
        self.effects.extend(ctx.take_effects());
    }
}

impl ContainerContract for ContainerCore {
    fn instance_id(&self) -> &str {
        &self.descriptor.instance_id
    }

    fn input_event_buffer(&mut self) -> &mut InputEventBuffer {
        &mut self.buffer
    }

    fn handler_registry(&mut self) -> &mut HandlerContextRegistry {
        &mut self.registry
    }

    fn set_property(
        &mut self,
        name: &str,
        value: Value,
        _correlation_id: Option<CorrelationId>,
    ) -> Result<(), ComponentError> {
        if !self.capabilities.contains(Capability::SetProperty) {
            debug!(
                "{} has no setProperty, ignoring {}",
                self.descriptor.instance_id, name
            );
            return Ok(());
        }
        self.component.set_property(name, value)
    }

    fn invoke_operation(
        &mut self,
        name: &str,
        message: &Message,
        correlation_id: Option<CorrelationId>,
    ) -> Result<(), ComponentError> {
        if !self.initialized {
            return Err(ComponentError::NotInitialized {
                instance_id: self.descriptor.instance_id.clone(),
            });
        }
        if !self.capabilities.contains(Capability::Invoke) {
            debug!(
                "{} has no invokeOperation, ignoring {}",
                self.descriptor.instance_id, name
            );
            return Ok(());
        }
        let mut ctx = self.context(correlation_id);
        let result = self.component.invoke_operation(name, message, &mut ctx);
        self.collect(ctx);
        result
    }

    fn component_config(&self) -> &Value {
        &self.descriptor.config
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn now(&self) -> Millis {
        self.now
    }
}

/// Hosts one component instance together with its event proxy, input event
/// buffer and handler registry
pub struct ComponentContainer {
    core: ContainerCore,
    proxy: EventProxy,
}

impl ComponentContainer {
    pub fn new(
        descriptor: ComponentDescriptor,
        component: Box<dyn Component>,
        config: &BufferConfig,
        now: Millis,
    ) -> Self {
        let capabilities = component.capabilities();
        let proxy = EventProxy::new(&descriptor.instance_id, config);
        Self {
            core: ContainerCore {
                descriptor,
                component,
                capabilities,
                buffer: InputEventBuffer::new(config),
                registry: HandlerContextRegistry::new(),
                initialized: false,
                now,
                effects: Vec::new(),
                restored_from: None,
                received_early: Vec::new(),
                call_sequence: 0,
            },
            proxy,
        }
    }

    pub fn instance_id(&self) -> &str {
        &self.core.descriptor.instance_id
    }

    pub fn descriptor(&self) -> &ComponentDescriptor {
        &self.core.descriptor
    }

    pub fn capabilities(&self) -> Capabilities {
        self.core.capabilities
    }

    pub fn is_initialized(&self) -> bool {
        self.core.initialized
    }

    /// Splits the container into the proxy and the contract it drives
    pub fn parts(&mut self) -> (&mut EventProxy, &mut ContainerCore) {
        (&mut self.proxy, &mut self.core)
    }

    pub fn proxy(&self) -> &EventProxy {
        &self.proxy
    }

    pub fn buffer(&self) -> &InputEventBuffer {
        &self.core.buffer
    }

    pub fn registry(&self) -> &HandlerContextRegistry {
        &self.core.registry
    }

    pub fn set_clock(&mut self, now: Millis) {
        self.core.now = now;
    }

    pub fn take_effects(&mut self) -> Vec<Effect> {
        std::mem::take(&mut self.core.effects)
    }

    pub fn has_effects(&self) -> bool {
        !self.core.effects.is_empty()
    }

    // Lifecycle

    pub fn initialize(&mut self) -> Result<(), ComponentError> {
        if self.core.initialized {
            return Ok(());
        }
        self.core.initialized = true;
        if self.core.capabilities.contains(Capability::Init) {
            let mut ctx = self.core.context(None);
            let result = self.core.component.init(&mut ctx);
            self.core.collect(ctx);
            if let Err(error) = result {
                self.core.initialized = false;
                return Err(error);
            }
        }
        Ok(())
    }

    pub fn show(&mut self) {
        if self.core.capabilities.contains(Capability::Show) {
            self.core.component.show();
        }
    }

    pub fn hide(&mut self) {
        if self.core.capabilities.contains(Capability::Hide) {
            self.core.component.hide();
        }
    }

    pub fn enable(&mut self) {
        if self.core.capabilities.contains(Capability::Enable) {
            self.core.component.enable();
        }
    }

    pub fn disable(&mut self) {
        if self.core.capabilities.contains(Capability::Disable) {
            self.core.component.disable();
        }
    }

    pub fn dispose(&mut self) {
        if self.core.capabilities.contains(Capability::Dispose) {
            self.core.component.dispose();
        }
        self.core.initialized = false;
    }

    // Calls from the host application

    /// Invokes an operation directly, outside any channel
    pub fn invoke(&mut self, operation: &str, message: &Message) -> Result<(), ComponentError> {
        self.core.invoke_operation(operation, message, None)
    }

    pub fn property(&self, name: &str) -> Option<Value> {
        if !self.core.capabilities.contains(Capability::GetProperty) {
            return None;
        }
        self.core.component.get_property(name)
    }

    // Relocation

    /// Current values of the declared properties, in declaration order
    pub fn properties(&self) -> Map<String, Value> {
        self.core
            .descriptor
            .properties
            .iter()
            .filter_map(|name| self.property(name).map(|value| (name.clone(), value)))
            .collect()
    }

    pub fn snapshot(&self) -> ComponentSnapshot {
        ComponentSnapshot {
            descriptor: self.core.descriptor.clone(),
            properties: self.properties(),
            buffer: self.core.buffer.snapshot(),
            handlers: self.core.registry.snapshot(),
            mappings: self.proxy.recorded_mappings(),
            outbound: self.proxy.held_messages(),
            held_calls: self.proxy.network_ref().held_calls(),
            call_sequence: self.core.call_sequence,
            captured_at: self.core.now,
        }
    }

    pub fn register_mappings(&mut self, mappings: &[(ChannelName, HandlerSpec)]) {
        for (channel, handler) in mappings {
            self.proxy.add_operation_mapping(channel, handler.clone());
        }
    }

    /// Applies a snapshot's property values, buffered events and
    /// continuations. Property failures are logged and skipped.
    pub fn restore(&mut self, snapshot: ComponentSnapshot) {
        for (name, value) in snapshot.properties {
            if let Err(error) = self.core.set_property(&name, value, None) {
                warn!(
                    "{}: restoring property {} failed: {}",
                    self.instance_id(),
                    name,
                    error
                );
            }
        }
        self.core.call_sequence = self.core.call_sequence.max(snapshot.call_sequence);
        let boundary = snapshot.buffer.next_id;
        self.core.restored_from = Some(boundary);
        self.proxy.restore_held(snapshot.outbound, snapshot.held_calls);
        self.core.buffer.restore(snapshot.buffer);
        self.core.received_early = self
            .core
            .buffer
            .downstream()
            .filter(|event| event.id >= boundary && is_external(event))
            .cloned()
            .collect();
        let now = self.core.now;
        self.core
            .registry
            .restore(snapshot.handlers, snapshot.captured_at, now);
    }

    /// Calls and network responses this container received from the outside
    /// rather than from a restored snapshot, oldest first. Handed back to the
    /// source when a relocation is compensated.
    pub fn late_events(&self) -> Vec<InputEvent> {
        let boundary = self.core.restored_from;
        let mut events = self.core.received_early.clone();
        let pending = self
            .core
            .buffer
            .downstream()
            .filter(|event| boundary.map_or(true, |first| event.id >= first))
            .filter(|event| is_external(event))
            .filter(|event| !events.iter().any(|early| early.id == event.id))
            .cloned()
            .collect::<Vec<_>>();
        events.extend(pending);
        events
    }
}

fn is_external(event: &InputEvent) -> bool {
    matches!(
        event.kind,
        InputEventKind::Call { .. } | InputEventKind::NetworkResponse { .. }
    )
}
