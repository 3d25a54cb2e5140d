use std::collections::{HashMap, HashSet};

use log::{debug, info, warn};
use serde_json::json;

use nomad_shared::{
    Channel, ChannelDescriptor, ChannelName, ChannelRegistry, ComponentDescriptor,
    ComponentSnapshot, ContainerContract, Device, DeviceRegistry, Effect, Envelope, HandlerSpec,
    CorrelationId, InputEvent, InstanceId, Message, Millis, Payload, ProxyError, PublishOutcome, PublishReport,
    ServiceCall,
};

use crate::{
    container::{component_container::ComponentContainer, component_kinds::ComponentFactory},
    coordinator::relocation_host::RelocationHost,
    error::RuntimeError,
    runtime::hub::Hub,
    runtime_config::RuntimeConfig,
};

/// One device's event loop.
///
/// Single-threaded: every public call runs to completion, including the
/// effects it triggers (see [`Runtime::pump`]), before returning. Traffic for
/// other devices collects in an outbox drained with [`Runtime::take_outgoing`].
pub struct Runtime {
    config: RuntimeConfig,
    devices: DeviceRegistry,
    channels: ChannelRegistry,
    containers: HashMap<InstanceId, ComponentContainer>,
    factory: Box<dyn ComponentFactory>,
    clock: Millis,
    outbox: Vec<Envelope>,
    /// Relocating instances each channel is blocked for
    channel_holds: HashMap<ChannelName, HashSet<InstanceId>>,
    /// Reintegrated instances whose state has not been transferred yet
    awaiting_state: HashSet<InstanceId>,
    /// Service responses for local instances that cannot take them yet
    parked: HashMap<InstanceId, Vec<Envelope>>,
}

impl Runtime {
    pub fn new<F: ComponentFactory + 'static>(
        local: Device,
        factory: F,
        config: RuntimeConfig,
    ) -> Result<Self, RuntimeError> {
        let devices = DeviceRegistry::new(local)?;
        let channels = ChannelRegistry::new(config.buffers.clone());
        Ok(Self {
            config,
            devices,
            channels,
            containers: HashMap::new(),
            factory: Box::new(factory),
            clock: 0,
            outbox: Vec::new(),
            channel_holds: HashMap::new(),
            awaiting_state: HashSet::new(),
            parked: HashMap::new(),
        })
    }

    // Accessors

    pub fn session_id(&self) -> &str {
        self.devices.local_session()
    }

    pub fn clock(&self) -> Millis {
        self.clock
    }

    pub fn devices(&self) -> &DeviceRegistry {
        &self.devices
    }

    pub fn channel(&self, name: &str) -> Option<&Channel> {
        self.channels.get(name)
    }

    pub fn container(&self, instance_id: &str) -> Option<&ComponentContainer> {
        self.containers.get(instance_id)
    }

    pub fn container_mut(&mut self, instance_id: &str) -> Option<&mut ComponentContainer> {
        self.containers.get_mut(instance_id)
    }

    pub fn instances(&self) -> Vec<InstanceId> {
        let mut instances: Vec<InstanceId> = self.containers.keys().cloned().collect();
        instances.sort();
        instances
    }

    fn try_container_mut(&mut self, instance_id: &str) -> Result<&mut ComponentContainer, RuntimeError> {
        let session_id = self.devices.local_session().clone();
        self.containers
            .get_mut(instance_id)
            .ok_or_else(|| RuntimeError::UnknownInstance {
                instance_id: instance_id.to_string(),
                session_id,
            })
    }

    fn split(&mut self) -> (&mut ChannelRegistry, Hub<'_>) {
        let hub = Hub {
            devices: &self.devices,
            containers: &mut self.containers,
            outbox: &mut self.outbox,
            clock: self.clock,
        };
        (&mut self.channels, hub)
    }

    // Devices

    pub fn register_device(&mut self, device: Device) -> Result<(), RuntimeError> {
        self.devices.register_device(device)?;
        Ok(())
    }

    /// Records where an instance lives. Service responses parked here for an
    /// instance that now lives elsewhere are forwarded to it.
    pub fn assign_host(&mut self, instance_id: &str, session_id: &str) -> Result<(), RuntimeError> {
        self.devices.assign_instance(instance_id, session_id)?;
        if session_id != self.devices.local_session().as_str() {
            for envelope in self.parked.remove(instance_id).unwrap_or_default() {
                debug!("Forwarding parked response for {} to {}", instance_id, session_id);
                self.outbox.push(envelope.readdressed(session_id));
            }
        }
        Ok(())
    }

    // Wiring

    /// Wires a channel and maps it on every local subscriber's proxy
    pub fn wire_channel(&mut self, descriptor: ChannelDescriptor) -> Result<(), RuntimeError> {
        let channel = self.channels.wire(descriptor)?;
        let name = channel.name().to_string();
        let subscriptions = channel.subscribers().to_vec();
        for subscription in subscriptions {
            if let Some(container) = self.containers.get_mut(&subscription.instance_id) {
                container.register_mappings(&[(name.clone(), subscription.handler)]);
            }
        }
        Ok(())
    }

    pub fn tear_down_channel(&mut self, name: &str) -> Result<(), RuntimeError> {
        let channel = self.channels.tear_down(name)?;
        for subscription in channel.subscribers() {
            if let Some(container) = self.containers.get_mut(&subscription.instance_id) {
                let (proxy, _) = container.parts();
                proxy.remove_operation_mapping(name, subscription.operation());
            }
        }
        self.channel_holds.remove(name);
        Ok(())
    }

    // Components

    /// Creates a container for the descriptor on this device and maps it on
    /// the channels it subscribes to
    pub fn instantiate(&mut self, descriptor: ComponentDescriptor) -> Result<(), RuntimeError> {
        let instance_id = descriptor.instance_id.clone();
        if self.containers.contains_key(&instance_id) {
            return Err(RuntimeError::InstanceExists {
                instance_id,
                session_id: self.devices.local_session().clone(),
            });
        }

        let component = self.factory.create(&descriptor)?;
        let local = self.devices.local_session().clone();
        self.assign_host(&instance_id, &local)?;

        let mut container =
            ComponentContainer::new(descriptor, component, &self.config.buffers, self.clock);
        container.register_mappings(&self.channels.consumer_mappings(&instance_id));
        self.containers.insert(instance_id.clone(), container);
        info!("Instantiated {} on {}", instance_id, local);
        Ok(())
    }

    pub fn initialize(&mut self, instance_id: &str) -> Result<(), RuntimeError> {
        self.try_container_mut(instance_id)?.initialize()?;
        self.pump();
        Ok(())
    }

    /// Makes a component publish, as if it raised the event itself
    pub fn publish(&mut self, instance_id: &str, message: Message) -> Result<PublishReport, RuntimeError> {
        let report = self.publish_from(instance_id, message)?;
        self.pump();
        Ok(report)
    }

    /// Calls an operation on a local component from the host application
    pub fn invoke(&mut self, instance_id: &str, operation: &str, message: &Message) -> Result<(), RuntimeError> {
        self.try_container_mut(instance_id)?.invoke(operation, message)?;
        self.pump();
        Ok(())
    }

    fn publish_from(&mut self, instance_id: &str, message: Message) -> Result<PublishReport, RuntimeError> {
        let container = self.try_container_mut(instance_id)?;
        let (proxy, _) = container.parts();
        match proxy.publish(message)? {
            PublishOutcome::Forward(message) => self.route_outbound(instance_id, message),
            PublishOutcome::Buffered => Ok(PublishReport::buffered(1)),
        }
    }

    /// Hands a message that left a proxy to every channel carrying it. A full
    /// channel buffer fails the call after the other channels have been served.
    fn route_outbound(&mut self, instance_id: &str, message: Message) -> Result<PublishReport, RuntimeError> {
        let names = self.channels.publishing_channels(instance_id, &message.name);
        if names.is_empty() {
            debug!("{} published {} on no channel", instance_id, message.name);
        }

        let (channels, mut hub) = self.split();
        let mut report = PublishReport::default();
        let mut first_error = None;
        for name in names {
            let Some(channel) = channels.get_mut(&name) else {
                continue;
            };
            match channel.publish_local_message(instance_id, message.clone(), &mut hub) {
                Ok(published) => report.merge(published),
                Err(error) => {
                    warn!("{} could not publish {} on {}: {}", instance_id, message.name, name, error);
                    first_error.get_or_insert(error);
                }
            }
        }
        match first_error {
            Some(error) => Err(error.into()),
            None => Ok(report),
        }
    }

    // Effects

    /// Applies the effects components recorded, until none are left or the
    /// configured number of rounds is reached
    pub fn pump(&mut self) {
        for _ in 0..self.config.max_pump_rounds {
            let mut pending: Vec<InstanceId> = self
                .containers
                .iter()
                .filter(|(_, container)| container.has_effects())
                .map(|(id, _)| id.clone())
                .collect();
            if pending.is_empty() {
                return;
            }
            pending.sort();
            for instance_id in pending {
                let effects = match self.containers.get_mut(&instance_id) {
                    Some(container) => container.take_effects(),
                    None => continue,
                };
                for effect in effects {
                    if let Err(error) = self.apply_effect(&instance_id, effect) {
                        warn!("{}: effect failed: {}", instance_id, error);
                    }
                }
            }
        }
        warn!(
            "Effects still pending after {} rounds",
            self.config.max_pump_rounds
        );
    }

    fn apply_effect(&mut self, instance_id: &str, effect: Effect) -> Result<(), RuntimeError> {
        if let Effect::Publish(message) = effect {
            self.publish_from(instance_id, message)?;
            return Ok(());
        }

        let container = self.try_container_mut(instance_id)?;
        let (proxy, core) = container.parts();
        match effect {
            Effect::SetTimeout { context, delay } => {
                proxy.timers().set_timeout(core, context, delay);
            }
            Effect::SetInterval { context, period } => {
                proxy.timers().set_interval(core, context, period)?;
            }
            Effect::ClearTimer { correlation_id } => {
                proxy.timers().clear(core, correlation_id);
            }
            Effect::CallService {
                context,
                service,
                operation,
                args,
            } => {
                let call = proxy
                    .network()
                    .call(core, context, &service, &operation, args)?;
                if let Some(call) = call {
                    self.dispatch_call(call)?;
                }
            }
            Effect::Publish(_) => {}
        }
        Ok(())
    }

    /// Sends a call to the local service gateway. A service this device does
    /// not offer resolves the call as failed.
    fn dispatch_call(&mut self, call: ServiceCall) -> Result<(), RuntimeError> {
        if self.devices.local_service(&call.service).is_some() {
            let envelope = Envelope::service_call(self.devices.local_session(), call, self.clock);
            self.outbox.push(envelope);
            return Ok(());
        }

        warn!("{}: no service {} on this device", call.instance_id, call.service);
        let payload = json!({ "error": format!("unknown service {}", call.service) });
        let container = self.try_container_mut(&call.instance_id)?;
        let (proxy, core) = container.parts();
        proxy
            .network()
            .on_response(core, call.correlation_id, payload, true)?;
        Ok(())
    }

    // Time

    fn set_clock(&mut self, now: Millis) {
        self.clock = now;
        for container in self.containers.values_mut() {
            container.set_clock(now);
        }
    }

    /// Moves the clock forward, firing due timers in due order
    pub fn advance(&mut self, elapsed: Millis) {
        let until = self.clock + elapsed;
        let mut deferred: HashSet<(InstanceId, CorrelationId)> = HashSet::new();
        loop {
            let next = self
                .containers
                .iter()
                .flat_map(|(instance_id, container)| {
                    container
                        .registry()
                        .armed_timers()
                        .into_iter()
                        .map(move |(correlation_id, due)| (due, instance_id.clone(), correlation_id))
                })
                .filter(|(due, instance_id, correlation_id)| {
                    *due <= until && !deferred.contains(&(instance_id.clone(), *correlation_id))
                })
                .min();
            let Some((due, instance_id, correlation_id)) = next else {
                break;
            };

            self.set_clock(due.max(self.clock));
            if let Some(container) = self.containers.get_mut(&instance_id) {
                let (proxy, core) = container.parts();
                if let Err(error) = proxy.timers().fire(core, correlation_id) {
                    warn!("{}: timer {:#018x} failed: {}", instance_id, correlation_id, error);
                    if core.handler_registry().contains(correlation_id) {
                        // still armed, retried on the next advance
                        deferred.insert((instance_id.clone(), correlation_id));
                    }
                }
            }
            self.pump();
        }
        self.set_clock(until);
    }

    // Remote traffic

    pub fn take_outgoing(&mut self) -> Vec<Envelope> {
        std::mem::take(&mut self.outbox)
    }

    pub fn has_outgoing(&self) -> bool {
        !self.outbox.is_empty()
    }

    /// Handles an envelope routed to this device
    pub fn receive(&mut self, envelope: Envelope) -> Result<(), RuntimeError> {
        let result = match envelope.payload {
            Payload::RemotePublish { .. } => self.receive_publish(envelope),
            Payload::ServiceResponse { .. } => self.receive_response(envelope),
            Payload::ServiceCall(_) | Payload::Relocation(_) => {
                debug!("{} ignores {:?} envelope", self.session_id(), envelope.tag);
                Ok(())
            }
        };
        self.pump();
        result
    }

    fn receive_publish(&mut self, envelope: Envelope) -> Result<(), RuntimeError> {
        let Payload::RemotePublish {
            channel,
            deliveries,
        } = envelope.payload
        else {
            return Ok(());
        };
        let (channels, mut hub) = self.split();
        channels
            .try_get_mut(&channel)?
            .publish_remote_message(deliveries, &mut hub)?;
        Ok(())
    }

    fn receive_response(&mut self, envelope: Envelope) -> Result<(), RuntimeError> {
        let Payload::ServiceResponse { instance_id, .. } = &envelope.payload else {
            return Ok(());
        };
        let instance_id = instance_id.clone();

        let ready = self.containers.contains_key(&instance_id)
            && !self.awaiting_state.contains(&instance_id);
        if ready {
            let Payload::ServiceResponse {
                correlation_id,
                payload,
                failed,
                ..
            } = envelope.payload
            else {
                return Ok(());
            };
            let container = self.try_container_mut(&instance_id)?;
            let (proxy, core) = container.parts();
            proxy
                .network()
                .on_response(core, correlation_id, payload, failed)?;
            return Ok(());
        }

        match self.devices.host_of(&instance_id).cloned() {
            Some(host) if host == *self.devices.local_session() => {
                debug!("Parking response for {} until it can take it", instance_id);
                self.parked.entry(instance_id).or_default().push(envelope);
                Ok(())
            }
            Some(host) => {
                debug!("Forwarding response for {} to {}", instance_id, host);
                self.outbox.push(envelope.readdressed(&host));
                Ok(())
            }
            None => Err(RuntimeError::UnknownInstance {
                instance_id,
                session_id: self.devices.local_session().clone(),
            }),
        }
    }

    // Blocking

    fn release_channels(&mut self, instance_id: &str) {
        let released: Vec<ChannelName> = self
            .channel_holds
            .iter_mut()
            .filter_map(|(name, holders)| {
                (holders.remove(instance_id) && holders.is_empty()).then(|| name.clone())
            })
            .collect();
        for name in released {
            self.channel_holds.remove(&name);
            let (channels, mut hub) = self.split();
            if let Some(channel) = channels.get_mut(&name) {
                let report = channel.unblock(&mut hub);
                debug!("Channel {} drained: {:?}", name, report);
            }
        }
    }
}

impl RelocationHost for Runtime {
    fn session_id(&self) -> &str {
        self.devices.local_session()
    }

    fn now(&self) -> Millis {
        self.clock
    }

    fn block_component(&mut self, instance_id: &str) -> Result<(), RuntimeError> {
        let container = self.try_container_mut(instance_id)?;
        let (proxy, _) = container.parts();
        proxy.block();
        self.hold_channels(instance_id)
    }

    fn hold_channels(&mut self, instance_id: &str) -> Result<(), RuntimeError> {
        for name in self.channels.channels_of(instance_id) {
            self.channel_holds
                .entry(name.clone())
                .or_default()
                .insert(instance_id.to_string());
            if let Some(channel) = self.channels.get_mut(&name) {
                channel.block();
            }
        }
        Ok(())
    }

    fn serialise_component(&mut self, instance_id: &str) -> Result<ComponentSnapshot, RuntimeError> {
        let container = self.try_container_mut(instance_id)?;
        if !container.proxy().is_blocked() {
            return Err(ProxyError::ProtocolState {
                instance_id: instance_id.to_string(),
                operation: "serialise",
                blocked: false,
            }
            .into());
        }
        Ok(container.snapshot())
    }

    fn disintegrate_component(&mut self, instance_id: &str) -> Result<ComponentSnapshot, RuntimeError> {
        let snapshot = self.serialise_component(instance_id)?;
        if let Some(mut container) = self.containers.remove(instance_id) {
            container.dispose();
        }
        info!("Disintegrated {} on {}", instance_id, self.session_id());
        Ok(snapshot)
    }

    fn reintegrate_component(&mut self, descriptor: &ComponentDescriptor) -> Result<(), RuntimeError> {
        let instance_id = descriptor.instance_id.clone();
        self.instantiate(descriptor.clone())?;
        self.awaiting_state.insert(instance_id.clone());
        let container = self.try_container_mut(&instance_id)?;
        let (proxy, _) = container.parts();
        proxy.block();
        Ok(())
    }

    fn initialize_component(
        &mut self,
        instance_id: &str,
        mappings: &[(ChannelName, HandlerSpec)],
    ) -> Result<(), RuntimeError> {
        let container = self.try_container_mut(instance_id)?;
        container.initialize()?;
        container.register_mappings(mappings);
        self.pump();
        Ok(())
    }

    fn transfer_state(&mut self, instance_id: &str, snapshot: ComponentSnapshot) -> Result<(), RuntimeError> {
        let container = self.try_container_mut(instance_id)?;
        container.restore(snapshot);
        let (proxy, core) = container.parts();
        let replayed = proxy.replay_downstream(core)?;
        debug!("{}: replayed {} event(s) from snapshot", core.instance_id(), replayed);
        self.awaiting_state.remove(instance_id);

        for envelope in self.parked.remove(instance_id).unwrap_or_default() {
            if let Err(error) = self.receive_response(envelope) {
                warn!("{}: parked response failed: {}", instance_id, error);
            }
        }
        self.pump();
        Ok(())
    }

    fn unblock_component(&mut self, instance_id: &str) -> Result<(), RuntimeError> {
        if let Some(container) = self.containers.get_mut(instance_id) {
            let (proxy, core) = container.parts();
            let released = proxy.unblock(core);
            for message in released.messages {
                if let Err(error) = self.route_outbound(instance_id, message) {
                    warn!("{}: released message failed: {}", instance_id, error);
                }
            }
            for call in released.calls {
                if let Err(error) = self.dispatch_call(call) {
                    warn!("{}: released call failed: {}", instance_id, error);
                }
            }
        }
        self.release_channels(instance_id);
        self.pump();
        Ok(())
    }

    fn discard_component(&mut self, instance_id: &str) -> Result<Vec<InputEvent>, RuntimeError> {
        self.awaiting_state.remove(instance_id);
        let Some(mut container) = self.containers.remove(instance_id) else {
            debug!("{}: nothing to discard on {}", instance_id, self.session_id());
            return Ok(Vec::new());
        };
        let late = container.late_events();
        container.dispose();
        info!(
            "Discarded {} on {} ({} late event(s))",
            instance_id,
            self.session_id(),
            late.len()
        );
        Ok(late)
    }

    fn assign_host(&mut self, instance_id: &str, session_id: &str) -> Result<(), RuntimeError> {
        Runtime::assign_host(self, instance_id, session_id)
    }
}
