use nomad_shared::{ChannelName, ComponentDescriptor, ComponentSnapshot, HandlerSpec, InputEvent, Millis};

use crate::error::RuntimeError;

/// What the relocation coordinator needs from a device taking part in a
/// relocation, either as source or as target
pub trait RelocationHost {
    fn session_id(&self) -> &str;

    fn now(&self) -> Millis;

    /// Blocks the component's proxies and every channel it takes part in
    fn block_component(&mut self, instance_id: &str) -> Result<(), RuntimeError>;

    /// Blocks the channels the component takes part in on this device,
    /// whether or not it hosts the component
    fn hold_channels(&mut self, instance_id: &str) -> Result<(), RuntimeError>;

    /// Captures a snapshot of a blocked component
    fn serialise_component(&mut self, instance_id: &str) -> Result<ComponentSnapshot, RuntimeError>;

    /// Captures a final snapshot, then tears the component down
    fn disintegrate_component(&mut self, instance_id: &str) -> Result<ComponentSnapshot, RuntimeError>;

    /// Instantiates a blocked copy of the component that waits for its state
    fn reintegrate_component(&mut self, descriptor: &ComponentDescriptor) -> Result<(), RuntimeError>;

    fn initialize_component(
        &mut self,
        instance_id: &str,
        mappings: &[(ChannelName, HandlerSpec)],
    ) -> Result<(), RuntimeError>;

    /// Applies the snapshot and replays its buffered events
    fn transfer_state(&mut self, instance_id: &str, snapshot: ComponentSnapshot) -> Result<(), RuntimeError>;

    /// Unblocks the component, if hosted here, and releases the channels
    /// blocked for it
    fn unblock_component(&mut self, instance_id: &str) -> Result<(), RuntimeError>;

    /// Drops a reintegrated copy and returns the events it received from the
    /// outside
    fn discard_component(&mut self, instance_id: &str) -> Result<Vec<InputEvent>, RuntimeError>;

    fn assign_host(&mut self, instance_id: &str, session_id: &str) -> Result<(), RuntimeError>;
}

/// The two devices of one migration
pub struct RelocationHosts<'a> {
    pub source: &'a mut dyn RelocationHost,
    pub target: &'a mut dyn RelocationHost,
}

impl<'a> RelocationHosts<'a> {
    pub fn new(source: &'a mut dyn RelocationHost, target: &'a mut dyn RelocationHost) -> Self {
        Self { source, target }
    }
}
