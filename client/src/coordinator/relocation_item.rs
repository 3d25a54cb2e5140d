//! ## `RelocationItem` – one component moving between two devices
//!
//! ```text
//!  DEFAULT → BLOCK → SERIALISE → DISINTEGRATE → REINTEGRATE
//!          → INITIALIZE → TRANSFER_STATE → UNBLOCK → RUN
//! ```
//!
//! Each call to [`RelocationItem::step`] runs exactly one phase. A phase is
//! never interrupted, so cancellation takes effect at the next step.
//!
//! Reversing walks the same lattice backwards, undoing one phase per step:
//!
//! * `TRANSFER_STATE`, `INITIALIZE` – step back; the target copy is dropped
//!   at `REINTEGRATE`.
//! * `REINTEGRATE` – discard the target copy, keep the events it received
//!   from the outside in the snapshot, point hosting back at the source.
//! * `DISINTEGRATE` – rebuild the source instance from the snapshot.
//! * `SERIALISE` – drop the snapshot.
//! * `BLOCK` – unblock the source and release the target's channels; the
//!   item ends in `REVERSE_SUCCESS`.
//!
//! Once `UNBLOCK` is reached there is nothing left to undo; a failure from
//! there on, or while reversing, ends the item in `ERROR`.

use log::{info, warn};

use nomad_shared::{
    ComponentSnapshot, InstanceId, RelocationCondition, RelocationStatus, SessionId,
};

use crate::coordinator::{
    error::RelocationError,
    relocation_coordinator::CancelRequest,
    relocation_host::RelocationHosts,
};

#[derive(Clone, Debug)]
pub struct RelocationItem {
    component: InstanceId,
    source: SessionId,
    target: SessionId,
    status: RelocationStatus,
    condition: RelocationCondition,
    history: Vec<RelocationStatus>,
    snapshot: Option<ComponentSnapshot>,
    error: Option<RelocationError>,
    cancel: Option<CancelRequest>,
}

impl RelocationItem {
    pub fn new(component: &str, source: &str, target: &str) -> Self {
        Self {
            component: component.to_string(),
            source: source.to_string(),
            target: target.to_string(),
            status: RelocationStatus::Default,
            condition: RelocationCondition::Default,
            history: vec![RelocationStatus::Default],
            snapshot: None,
            error: None,
            cancel: None,
        }
    }

    pub fn component(&self) -> &str {
        &self.component
    }

    pub fn status(&self) -> RelocationStatus {
        self.status
    }

    pub fn condition(&self) -> RelocationCondition {
        self.condition
    }

    /// Every status the item entered, in order
    pub fn history(&self) -> &[RelocationStatus] {
        &self.history
    }

    pub fn snapshot(&self) -> Option<&ComponentSnapshot> {
        self.snapshot.as_ref()
    }

    pub fn error(&self) -> Option<&RelocationError> {
        self.error.as_ref()
    }

    pub fn cancel_request(&self) -> Option<&CancelRequest> {
        self.cancel.as_ref()
    }

    pub fn is_terminal(&self) -> bool {
        self.condition.is_terminal()
    }

    pub fn progress(&self) -> u8 {
        self.status.progress()
    }

    /// Starts compensating. Returns false when the item is past the point
    /// where a cancellation can take effect.
    pub(crate) fn cancel(&mut self, request: CancelRequest) -> bool {
        if self.is_terminal() || self.condition.is_reversing() {
            return false;
        }
        if self.status >= RelocationStatus::Unblock {
            warn!(
                "Cancel of {} ignored at {} (cause {})",
                self.component, self.status, request.cause
            );
            return false;
        }
        info!(
            "Cancelling relocation of {} at {}: {}",
            self.component, self.status, request.text
        );
        self.condition = RelocationCondition::Reverse;
        self.cancel = Some(request);
        true
    }

    /// Runs one phase, forwards or backwards. Does nothing once terminal.
    pub(crate) fn step(&mut self, hosts: &mut RelocationHosts<'_>) {
        if self.is_terminal() {
            return;
        }
        if self.condition.is_reversing() {
            if let Err(error) = self.step_back(hosts) {
                warn!(
                    "Compensating {} failed at {}: {}",
                    self.component, self.status, error
                );
                self.condition = RelocationCondition::Error;
                self.error = Some(error);
            }
            return;
        }

        let Some(phase) = self.status.next() else {
            self.condition = RelocationCondition::Success;
            return;
        };
        match self.run_phase(phase, hosts) {
            Ok(()) => {
                self.enter(phase);
                if phase == RelocationStatus::Run {
                    self.condition = RelocationCondition::Success;
                    info!("{} runs on {}", self.component, self.target);
                }
            }
            Err(error) => self.fail(phase, error),
        }
    }

    fn enter(&mut self, status: RelocationStatus) {
        self.status = status;
        self.history.push(status);
    }

    fn fail(&mut self, phase: RelocationStatus, error: RelocationError) {
        warn!("{} failed to enter {}: {}", self.component, phase, error);

        if error.is_protocol_violation() || phase >= RelocationStatus::Unblock {
            self.condition = RelocationCondition::Error;
        } else {
            // A failed phase may have done part of its work; entering it
            // lets compensation undo that part too.
            if matches!(
                phase,
                RelocationStatus::Block
                    | RelocationStatus::Reintegrate
                    | RelocationStatus::Initialize
                    | RelocationStatus::TransferState
            ) {
                self.enter(phase);
            }
            self.condition = RelocationCondition::Reverse;
        }
        self.error = Some(error);
    }

    fn require_snapshot(&self) -> Result<&ComponentSnapshot, RelocationError> {
        self.snapshot
            .as_ref()
            .ok_or_else(|| RelocationError::MissingSnapshot {
                instance_id: self.component.clone(),
            })
    }

    fn run_phase(
        &mut self,
        phase: RelocationStatus,
        hosts: &mut RelocationHosts<'_>,
    ) -> Result<(), RelocationError> {
        let id = self.component.as_str();
        match phase {
            RelocationStatus::Default => {}
            RelocationStatus::Block => {
                hosts.source.block_component(id)?;
                hosts.target.hold_channels(id)?;
            }
            RelocationStatus::Serialise => {
                self.snapshot = Some(hosts.source.serialise_component(id)?);
            }
            RelocationStatus::Disintegrate => {
                self.snapshot = Some(hosts.source.disintegrate_component(id)?);
            }
            RelocationStatus::Reintegrate => {
                let descriptor = self.require_snapshot()?.descriptor.clone();
                hosts.target.reintegrate_component(&descriptor)?;
                hosts.target.assign_host(id, &self.target)?;
                hosts.source.assign_host(id, &self.target)?;
            }
            RelocationStatus::Initialize => {
                let mappings = self.require_snapshot()?.mappings.clone();
                hosts.target.initialize_component(id, &mappings)?;
            }
            RelocationStatus::TransferState => {
                let snapshot = self.require_snapshot()?.clone();
                hosts.target.transfer_state(id, snapshot)?;
            }
            RelocationStatus::Unblock => {
                hosts.target.unblock_component(id)?;
                hosts.source.unblock_component(id)?;
            }
            RelocationStatus::Run => {}
        }
        Ok(())
    }

    fn step_back(&mut self, hosts: &mut RelocationHosts<'_>) -> Result<(), RelocationError> {
        let id = self.component.clone();
        match self.status {
            RelocationStatus::Default => {
                self.condition = RelocationCondition::ReverseSuccess;
            }
            RelocationStatus::TransferState => self.enter(RelocationStatus::Initialize),
            RelocationStatus::Initialize => self.enter(RelocationStatus::Reintegrate),
            RelocationStatus::Reintegrate => {
                let late = hosts.target.discard_component(&id)?;
                hosts.target.assign_host(&id, &self.source)?;
                hosts.source.assign_host(&id, &self.source)?;
                let snapshot =
                    self.snapshot
                        .as_mut()
                        .ok_or_else(|| RelocationError::MissingSnapshot {
                            instance_id: id.clone(),
                        })?;
                snapshot.append_downstream(late);
                self.enter(RelocationStatus::Disintegrate);
            }
            RelocationStatus::Disintegrate => {
                let snapshot = self.require_snapshot()?.clone();
                hosts.source.reintegrate_component(&snapshot.descriptor)?;
                hosts.source.initialize_component(&id, &snapshot.mappings)?;
                hosts.source.transfer_state(&id, snapshot)?;
                self.enter(RelocationStatus::Serialise);
            }
            RelocationStatus::Serialise => {
                self.snapshot = None;
                self.enter(RelocationStatus::Block);
            }
            RelocationStatus::Block => {
                hosts.source.unblock_component(&id)?;
                hosts.target.unblock_component(&id)?;
                self.condition = RelocationCondition::ReverseSuccess;
                info!("Relocation of {} reversed", id);
            }
            RelocationStatus::Unblock | RelocationStatus::Run => {
                return Err(RelocationError::CannotCompensate {
                    instance_id: id,
                    status: self.status.to_string(),
                });
            }
        }
        Ok(())
    }
}
