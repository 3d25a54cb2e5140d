use std::collections::HashMap;

use log::debug;

use crate::{
    handler::{
        error::HandlerError,
        handler_context::{Continuation, HandlerContext, HandlerRecord},
    },
    types::{CorrelationId, Millis},
};

/// Maps correlation ids to the continuations a component has armed: timers,
/// intervals and outbound calls awaiting a response.
///
/// Owned by exactly one component container. Relocation moves the records,
/// never closures: the target registry is restored from a snapshot and the
/// target runtime re-arms whatever the records describe.
pub struct HandlerContextRegistry {
    records: HashMap<CorrelationId, HandlerRecord>,
}

impl HandlerContextRegistry {
    pub fn new() -> Self {
        Self {
            records: HashMap::new(),
        }
    }

    /// Registers a continuation, replacing one with the same correlation id
    pub fn register(&mut self, context: HandlerContext, continuation: Continuation) -> CorrelationId {
        let correlation_id = context.correlation_id();
        let record = HandlerRecord::new(context, continuation);
        if self.records.insert(correlation_id, record).is_some() {
            debug!("Re-armed handler {:#018x}", correlation_id);
        }
        correlation_id
    }

    pub fn get(&self, correlation_id: CorrelationId) -> Option<&HandlerRecord> {
        self.records.get(&correlation_id)
    }

    pub fn get_mut(&mut self, correlation_id: CorrelationId) -> Option<&mut HandlerRecord> {
        self.records.get_mut(&correlation_id)
    }

    pub fn try_get(&self, correlation_id: CorrelationId) -> Result<&HandlerRecord, HandlerError> {
        self.records
            .get(&correlation_id)
            .ok_or(HandlerError::NotFound { correlation_id })
    }

    pub fn contains(&self, correlation_id: CorrelationId) -> bool {
        self.records.contains_key(&correlation_id)
    }

    pub fn remove(&mut self, correlation_id: CorrelationId) -> Option<HandlerRecord> {
        self.records.remove(&correlation_id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Started timers and their due times, earliest first
    pub fn armed_timers(&self) -> Vec<(CorrelationId, Millis)> {
        let mut timers: Vec<(CorrelationId, Millis)> = self
            .records
            .iter()
            .filter_map(|(id, record)| record.continuation.due_at().map(|due| (*id, due)))
            .collect();
        timers.sort_by_key(|(id, due)| (*due, *id));
        timers
    }

    /// Copies every record, ordered by correlation id so snapshots of equal
    /// registries compare equal
    pub fn snapshot(&self) -> Vec<HandlerRecord> {
        let mut ids: Vec<&CorrelationId> = self.records.keys().collect();
        ids.sort();
        ids.into_iter()
            .filter_map(|id| self.records.get(id).cloned())
            .collect()
    }

    /// Re-registers snapshot records, shifting their due times from the
    /// clock they were captured on to this registry's clock. Records already
    /// present under the same correlation id are replaced, never duplicated.
    pub fn restore(
        &mut self,
        records: Vec<HandlerRecord>,
        captured_at: Millis,
        now: Millis,
    ) -> Vec<CorrelationId> {
        let mut restored = Vec::with_capacity(records.len());
        for mut record in records {
            record.rebase(captured_at, now);
            let correlation_id = record.correlation_id();
            self.records.insert(correlation_id, record);
            restored.push(correlation_id);
        }
        restored
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}

impl Default for HandlerContextRegistry {
    fn default() -> Self {
        Self::new()
    }
}
