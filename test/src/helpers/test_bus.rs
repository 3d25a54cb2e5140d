use serde_json::{json, Value};

use nomad_client::{
    RelocationCoordinator, RelocationError, RelocationHosts, RelocationRequest, Runtime,
    RuntimeConfig,
};
use nomad_server::{FnService, Relay, RelayConfig};
use nomad_shared::{ChannelDescriptor, ComponentDescriptor, Envelope, Message, Millis, Tag};

use crate::helpers::{fixtures::device, recording_component::recording_kinds, Journal};

const MAX_EXCHANGE_ROUNDS: usize = 32;
const MAX_MIGRATION_STEPS: usize = 64;

/// Several runtimes connected through one relay, with a coordinator driving
/// migrations between them. Every runtime can build `recorder` components
/// writing to the same [`Journal`]; the relay answers the `weather` service.
pub struct TestBus {
    relay: Relay,
    runtimes: Vec<Runtime>,
    coordinator: RelocationCoordinator,
    events: Vec<Envelope>,
    errors: Vec<String>,
}

impl TestBus {
    pub fn new(sessions: &[&str], journal: &Journal) -> Self {
        Self::with_config(sessions, journal, RuntimeConfig::default())
    }

    pub fn with_config(sessions: &[&str], journal: &Journal, config: RuntimeConfig) -> Self {
        let mut relay = Relay::new(RelayConfig::default());
        relay.add_service(
            "weather",
            FnService(|operation: &str, args: &[Value]| match operation {
                "today" => Ok(json!({ "city": args.first().cloned(), "sky": "clear" })),
                other => Err(json!({ "error": format!("no operation {}", other) })),
            }),
        );

        let mut runtimes = Vec::new();
        for session_id in sessions {
            let mut runtime = Runtime::new(
                device(session_id),
                recording_kinds(session_id, journal),
                config.clone(),
            )
            .unwrap();
            for other in sessions.iter().filter(|other| *other != session_id) {
                runtime.register_device(device(other)).unwrap();
            }
            relay.connect(device(session_id)).unwrap();
            runtimes.push(runtime);
        }

        Self {
            relay,
            runtimes,
            coordinator: RelocationCoordinator::new("coordinator"),
            events: Vec::new(),
            errors: Vec::new(),
        }
    }

    fn index_of(&self, session_id: &str) -> usize {
        self.runtimes
            .iter()
            .position(|runtime| runtime.session_id() == session_id)
            .unwrap_or_else(|| panic!("no runtime {}", session_id))
    }

    pub fn runtime(&self, session_id: &str) -> &Runtime {
        &self.runtimes[self.index_of(session_id)]
    }

    pub fn runtime_mut(&mut self, session_id: &str) -> &mut Runtime {
        let index = self.index_of(session_id);
        &mut self.runtimes[index]
    }

    pub fn relay_mut(&mut self) -> &mut Relay {
        &mut self.relay
    }

    pub fn coordinator(&self) -> &RelocationCoordinator {
        &self.coordinator
    }

    pub fn coordinator_mut(&mut self) -> &mut RelocationCoordinator {
        &mut self.coordinator
    }

    // Setup

    /// Wires the channel on every runtime
    pub fn wire(&mut self, descriptor: ChannelDescriptor) {
        for runtime in self.runtimes.iter_mut() {
            runtime.wire_channel(descriptor.clone()).unwrap();
        }
    }

    /// Hosts a component on one runtime and tells the others where it lives
    pub fn place(&mut self, descriptor: ComponentDescriptor, session_id: &str) {
        let instance_id = descriptor.instance_id.clone();
        let host = self.runtime_mut(session_id);
        host.instantiate(descriptor).unwrap();
        host.initialize(&instance_id).unwrap();
        for runtime in self.runtimes.iter_mut() {
            if runtime.session_id() != session_id {
                runtime.assign_host(&instance_id, session_id).unwrap();
            }
        }
    }

    pub fn host_of(&self, instance_id: &str) -> Option<String> {
        self.runtimes
            .iter()
            .find(|runtime| runtime.container(instance_id).is_some())
            .map(|runtime| runtime.session_id().to_string())
    }

    // Traffic

    /// Makes `instance_id` publish from wherever it is hosted, then lets the
    /// resulting traffic settle
    pub fn publish(&mut self, instance_id: &str, message: Message) {
        let host = self
            .host_of(instance_id)
            .unwrap_or_else(|| panic!("{} is hosted nowhere", instance_id));
        if let Err(error) = self.runtime_mut(&host).publish(instance_id, message) {
            self.errors.push(error.to_string());
        }
        self.exchange();
    }

    /// Calls an operation on a component from its host application, then
    /// lets the resulting traffic settle
    pub fn invoke(&mut self, instance_id: &str, operation: &str, message: Message) {
        let host = self
            .host_of(instance_id)
            .unwrap_or_else(|| panic!("{} is hosted nowhere", instance_id));
        if let Err(error) = self
            .runtime_mut(&host)
            .invoke(instance_id, operation, &message)
        {
            self.errors.push(error.to_string());
        }
        self.exchange();
    }

    /// Moves envelopes between runtimes and relay until nothing is left in
    /// flight
    pub fn exchange(&mut self) {
        for _ in 0..MAX_EXCHANGE_ROUNDS {
            let mut moved = false;
            for runtime in self.runtimes.iter_mut() {
                let outgoing = runtime.take_outgoing();
                moved |= !outgoing.is_empty();
                for error in self.relay.route_all(outgoing) {
                    self.errors.push(error.to_string());
                }
            }
            for runtime in self.runtimes.iter_mut() {
                for envelope in self.relay.drain(runtime.session_id()) {
                    moved = true;
                    if let Err(error) = runtime.receive(envelope) {
                        self.errors.push(error.to_string());
                    }
                }
            }
            if !moved {
                return;
            }
        }
        panic!("traffic did not settle after {} rounds", MAX_EXCHANGE_ROUNDS);
    }

    /// Advances every runtime's clock, then lets the traffic settle
    pub fn advance(&mut self, elapsed: Millis) {
        for runtime in self.runtimes.iter_mut() {
            runtime.advance(elapsed);
        }
        self.exchange();
    }

    // Migrations

    pub fn begin(&mut self, request: RelocationRequest) {
        let now = self.runtime(&request.source).clock();
        self.coordinator.begin(request, now).unwrap();
        self.events.extend(self.coordinator.take_events());
    }

    /// Runs one phase without moving any traffic between runtimes
    pub fn step_quietly(
        &mut self,
        migration_id: &str,
        source: &str,
        target: &str,
    ) -> Result<bool, RelocationError> {
        let (source, target) = (self.index_of(source), self.index_of(target));
        let (source, target) = pair_mut(&mut self.runtimes, source, target);
        let mut hosts = RelocationHosts::new(source, target);
        let finished = self.coordinator.step(migration_id, &mut hosts);
        self.events.extend(self.coordinator.take_events());
        finished
    }

    /// Runs one phase, then lets the traffic settle
    pub fn step(&mut self, migration_id: &str, source: &str, target: &str) -> bool {
        let finished = self.step_quietly(migration_id, source, target).unwrap();
        self.exchange();
        finished
    }

    /// Moves components from `source` to `target` in one uninterrupted
    /// migration
    pub fn relocate(&mut self, migration_id: &str, components: &[&str], source: &str, target: &str) {
        self.begin(RelocationRequest::new(migration_id, components, source, target));
        for _ in 0..MAX_MIGRATION_STEPS {
            if self.step(migration_id, source, target) {
                return;
            }
        }
        panic!("migration {} did not finish", migration_id);
    }

    /// Coordinator envelopes emitted so far
    pub fn events(&self) -> &[Envelope] {
        &self.events
    }

    pub fn events_tagged(&self, tag: Tag) -> Vec<&Envelope> {
        self.events.iter().filter(|event| event.tag == tag).collect()
    }

    /// Failures seen while moving traffic, as text
    pub fn errors(&self) -> &[String] {
        &self.errors
    }
}

fn pair_mut(runtimes: &mut [Runtime], first: usize, second: usize) -> (&mut Runtime, &mut Runtime) {
    assert_ne!(first, second, "a pair needs two runtimes");
    if first < second {
        let (left, right) = runtimes.split_at_mut(second);
        (&mut left[first], &mut right[0])
    } else {
        let (left, right) = runtimes.split_at_mut(first);
        (&mut right[0], &mut left[second])
    }
}
