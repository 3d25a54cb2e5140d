//! ## `InputEventBuffer` – per-component event log
//!
//! Two ordered logs live side by side:
//!
//! * **activity** – events the component has started handling but not yet
//!   finished (a property-link update between `setProperty` and its
//!   completion). An entry is removed as soon as it is handled.
//! * **downstream** – events that arrived while the component's proxy was
//!   blocked. Entries are appended in arrival order and popped off the front
//!   right before they are replayed, so each one is replayed exactly once.
//!
//! A relocation captures both logs in a [`BufferSnapshot`] and restores them
//! ahead of anything the target container received in the meantime.

use std::collections::VecDeque;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::{
    buffer::{
        error::BufferError,
        input_event::{InputEvent, InputEventKind},
    },
    config::BufferConfig,
    handler::handler_context::HandlerContext,
    types::EventId,
};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BufferSnapshot {
    pub next_id: EventId,
    pub activity: Vec<InputEvent>,
    pub downstream: Vec<InputEvent>,
}

impl BufferSnapshot {
    pub fn is_empty(&self) -> bool {
        self.activity.is_empty() && self.downstream.is_empty()
    }
}

pub struct InputEventBuffer {
    next_id: EventId,
    activity: Vec<InputEvent>,
    downstream: VecDeque<InputEvent>,
    max_downstream: usize,
}

impl InputEventBuffer {
    pub fn new(config: &BufferConfig) -> Self {
        Self {
            next_id: 0,
            activity: Vec::new(),
            downstream: VecDeque::new(),
            max_downstream: config.max_buffered,
        }
    }

    fn generate_id(&mut self) -> EventId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    // Activity

    pub fn push_activity(&mut self, context: HandlerContext, kind: InputEventKind) -> EventId {
        let id = self.generate_id();
        self.activity.push(InputEvent { id, context, kind });
        id
    }

    pub fn complete_activity(&mut self, event_id: EventId) -> Result<InputEvent, BufferError> {
        let index = self
            .activity
            .iter()
            .position(|event| event.id == event_id)
            .ok_or(BufferError::ActivityNotInFlight { event_id })?;
        Ok(self.activity.remove(index))
    }

    pub fn activity(&self) -> &[InputEvent] {
        &self.activity
    }

    /// Removes every in-flight event, oldest first
    pub fn take_activity(&mut self) -> Vec<InputEvent> {
        std::mem::take(&mut self.activity)
    }

    // Downstream

    pub fn push_downstream(
        &mut self,
        context: HandlerContext,
        kind: InputEventKind,
    ) -> Result<EventId, BufferError> {
        if self.downstream.len() >= self.max_downstream {
            return Err(BufferError::BufferFull {
                buffer: "input event",
                capacity: self.max_downstream,
            });
        }
        let id = self.generate_id();
        self.downstream.push_back(InputEvent { id, context, kind });
        Ok(id)
    }

    /// Removes the oldest downstream event. Callers replay what they pop;
    /// removal before replay is what makes replay exactly-once.
    pub fn pop_downstream(&mut self) -> Option<InputEvent> {
        self.downstream.pop_front()
    }

    pub fn peek_downstream(&self) -> Option<&InputEvent> {
        self.downstream.front()
    }

    pub fn downstream(&self) -> impl Iterator<Item = &InputEvent> {
        self.downstream.iter()
    }

    pub fn downstream_len(&self) -> usize {
        self.downstream.len()
    }

    pub fn downstream_capacity(&self) -> usize {
        self.max_downstream
    }

    /// How many more downstream events fit before the bound
    pub fn downstream_room(&self) -> usize {
        self.max_downstream.saturating_sub(self.downstream.len())
    }

    pub fn has_downstream(&self) -> bool {
        !self.downstream.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.activity.is_empty() && self.downstream.is_empty()
    }

    // Relocation

    pub fn snapshot(&self) -> BufferSnapshot {
        BufferSnapshot {
            next_id: self.next_id,
            activity: self.activity.clone(),
            downstream: self.downstream.iter().cloned().collect(),
        }
    }

    /// Places the snapshot's events in front of whatever this buffer already
    /// holds. Events already held were received later, so they keep their
    /// relative order but are renumbered after the snapshot's ids.
    ///
    /// Restored events are never dropped, so the merged downstream log may
    /// exceed the bound. [`InputEventBuffer::push_downstream`] then rejects
    /// until replay brings it back under the bound.
    pub fn restore(&mut self, snapshot: BufferSnapshot) {
        let held_activity = std::mem::take(&mut self.activity);
        let held_downstream = std::mem::take(&mut self.downstream);

        self.next_id = self.next_id.max(snapshot.next_id);
        self.activity = snapshot.activity;
        self.downstream = snapshot.downstream.into_iter().collect();

        for mut event in held_activity {
            event.id = self.generate_id();
            self.activity.push(event);
        }
        for mut event in held_downstream {
            event.id = self.generate_id();
            self.downstream.push_back(event);
        }
        if self.downstream.len() > self.max_downstream {
            warn!(
                "Input event log holds {} events after restore, over its bound of {}",
                self.downstream.len(),
                self.max_downstream
            );
        }
    }

    pub fn clear(&mut self) {
        self.activity.clear();
        self.downstream.clear();
    }
}
