use std::collections::HashMap;

use log::{debug, info, warn};

use nomad_shared::{
    Envelope, InstanceId, MigrationId, Millis, RelocationCondition, RelocationPayload, SessionId, Tag,
};

use crate::coordinator::{
    error::RelocationError, relocation_host::RelocationHosts, relocation_item::RelocationItem,
};

/// A request to move components from one device to another
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RelocationRequest {
    pub app_id: String,
    pub app_version: String,
    pub app_instance_id: String,
    pub migration_id: MigrationId,
    pub components: Vec<InstanceId>,
    pub source: SessionId,
    pub target: SessionId,
}

impl RelocationRequest {
    pub fn new(migration_id: &str, components: &[&str], source: &str, target: &str) -> Self {
        Self {
            migration_id: migration_id.to_string(),
            components: components.iter().map(|id| id.to_string()).collect(),
            source: source.to_string(),
            target: target.to_string(),
            ..Default::default()
        }
    }

    pub fn with_app(mut self, app_id: &str, app_version: &str, app_instance_id: &str) -> Self {
        self.app_id = app_id.to_string();
        self.app_version = app_version.to_string();
        self.app_instance_id = app_instance_id.to_string();
        self
    }
}

/// Why a migration, or one of its components, is being cancelled
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CancelRequest {
    pub cause: u32,
    pub text: String,
    /// `None` cancels every component of the migration
    pub component: Option<InstanceId>,
}

impl CancelRequest {
    pub fn new(cause: u32, text: &str) -> Self {
        Self {
            cause,
            text: text.to_string(),
            component: None,
        }
    }

    pub fn for_component(mut self, instance_id: &str) -> Self {
        self.component = Some(instance_id.to_string());
        self
    }
}

struct Migration {
    request: RelocationRequest,
    items: Vec<RelocationItem>,
    finished: bool,
}

impl Migration {
    fn payload(&self) -> RelocationPayload {
        RelocationPayload {
            app_id: self.request.app_id.clone(),
            app_version: self.request.app_version.clone(),
            app_instance_id: self.request.app_instance_id.clone(),
            migration_id: self.request.migration_id.clone(),
            ..Default::default()
        }
    }

    fn item_payload(&self, item: &RelocationItem) -> RelocationPayload {
        let mut payload = self.payload();
        payload.component = Some(item.component().to_string());
        payload.status = Some(item.status());
        payload.condition = Some(item.condition());
        payload.progress = Some(item.progress());
        if let Some(cancel) = item.cancel_request() {
            payload.cancel_cause = Some(cancel.cause);
            payload.cancel_cause_text = Some(cancel.text.clone());
        }
        payload
    }
}

/// Drives relocation transactions and records the progress events they
/// produce.
///
/// The coordinator owns no device: every [`step`](Self::step) is handed the
/// migration's source and target hosts.
pub struct RelocationCoordinator {
    session_id: SessionId,
    migrations: HashMap<MigrationId, Migration>,
    events: Vec<Envelope>,
}

impl RelocationCoordinator {
    pub fn new(session_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            migrations: HashMap::new(),
            events: Vec::new(),
        }
    }

    /// Starts tracking a migration. Nothing moves until it is stepped.
    pub fn begin(&mut self, request: RelocationRequest, now: Millis) -> Result<(), RelocationError> {
        let migration_id = request.migration_id.clone();
        if self.migrations.contains_key(&migration_id) {
            return Err(RelocationError::DuplicateMigration { migration_id });
        }
        if request.components.is_empty() {
            return Err(RelocationError::EmptyMigration { migration_id });
        }
        if request.source == request.target {
            return Err(RelocationError::SameHost {
                migration_id,
                session_id: request.source,
            });
        }

        info!(
            "Migration {} moves {:?} from {} to {}",
            migration_id, request.components, request.source, request.target
        );
        let items = request
            .components
            .iter()
            .map(|component| RelocationItem::new(component, &request.source, &request.target))
            .collect();
        let migration = Migration {
            request,
            items,
            finished: false,
        };
        self.events.push(Envelope::relocation(
            Tag::MigrationStart,
            &self.session_id,
            migration.payload(),
            now,
        ));
        self.migrations.insert(migration_id, migration);
        Ok(())
    }

    /// Cancels the named component, or every component, of a migration.
    /// Returns how many items started compensating; items at or past UNBLOCK
    /// are left alone.
    pub fn cancel(&mut self, migration_id: &str, request: CancelRequest) -> Result<usize, RelocationError> {
        let migration = self.try_migration_mut(migration_id)?;
        let mut reversing = 0;
        for item in migration.items.iter_mut() {
            let selected = request
                .component
                .as_deref()
                .map_or(true, |component| component == item.component());
            if selected && item.cancel(request.clone()) {
                reversing += 1;
            }
        }
        if reversing == 0 {
            warn!("Cancel of migration {} changed nothing", migration_id);
        }
        Ok(reversing)
    }

    /// Applies a cancel command received as an envelope. Other envelopes
    /// are not for the coordinator and are ignored.
    pub fn handle_envelope(&mut self, envelope: &Envelope) -> Result<bool, RelocationError> {
        if envelope.tag != Tag::MigrationCancel {
            return Ok(false);
        }
        let Some(payload) = envelope.relocation_payload() else {
            return Ok(false);
        };
        let request = CancelRequest {
            cause: payload.cancel_cause.unwrap_or_default(),
            text: payload.cancel_cause_text.clone().unwrap_or_default(),
            component: payload.component.clone(),
        };
        self.cancel(&payload.migration_id, request)?;
        Ok(true)
    }

    /// Runs one phase of every unfinished item. Returns true once the
    /// migration is finished.
    pub fn step(&mut self, migration_id: &str, hosts: &mut RelocationHosts<'_>) -> Result<bool, RelocationError> {
        let session_id = self.session_id.clone();
        let migration = self
            .migrations
            .get_mut(migration_id)
            .ok_or_else(|| RelocationError::UnknownMigration {
                migration_id: migration_id.to_string(),
            })?;
        if migration.finished {
            return Ok(true);
        }
        check_host("source", &migration.request.source, hosts.source.session_id())?;
        check_host("target", &migration.request.target, hosts.target.session_id())?;

        let mut events = Vec::new();
        for index in 0..migration.items.len() {
            let item = &mut migration.items[index];
            if item.is_terminal() {
                continue;
            }
            let before = (item.status(), item.condition());
            item.step(hosts);
            let after = (item.status(), item.condition());
            if before != after {
                debug!(
                    "{}: {}/{:?} -> {}/{:?}",
                    item.component(),
                    before.0,
                    before.1,
                    after.0,
                    after.1
                );
                let payload = migration.item_payload(&migration.items[index]);
                events.push(Envelope::relocation(
                    Tag::MigrationProgress,
                    &session_id,
                    payload,
                    hosts.source.now(),
                ));
            }
        }

        if migration.items.iter().all(RelocationItem::is_terminal) {
            migration.finished = true;
            let failed = migration
                .items
                .iter()
                .any(|item| item.condition() == RelocationCondition::Error);
            let succeeded = migration
                .items
                .iter()
                .all(|item| item.condition() == RelocationCondition::Success);

            let mut payload = migration.payload();
            let (tag, condition) = if failed {
                (Tag::MigrationFailed, RelocationCondition::Error)
            } else if succeeded {
                (Tag::MigrationComplete, RelocationCondition::Success)
            } else {
                (Tag::MigrationComplete, RelocationCondition::ReverseSuccess)
            };
            payload.condition = Some(condition);
            info!("Migration {} finished: {:?}", migration_id, condition);
            events.push(Envelope::relocation(tag, &session_id, payload, hosts.source.now()));
        }

        self.events.extend(events);
        Ok(migration.finished)
    }

    /// Steps until the migration is finished
    pub fn run(&mut self, migration_id: &str, hosts: &mut RelocationHosts<'_>) -> Result<(), RelocationError> {
        while !self.step(migration_id, hosts)? {}
        Ok(())
    }

    pub fn is_finished(&self, migration_id: &str) -> bool {
        self.migrations
            .get(migration_id)
            .map_or(false, |migration| migration.finished)
    }

    pub fn items(&self, migration_id: &str) -> Option<&[RelocationItem]> {
        self.migrations
            .get(migration_id)
            .map(|migration| migration.items.as_slice())
    }

    pub fn item(&self, migration_id: &str, component: &str) -> Option<&RelocationItem> {
        self.items(migration_id)?
            .iter()
            .find(|item| item.component() == component)
    }

    /// Progress of the least advanced item
    pub fn progress(&self, migration_id: &str) -> Option<u8> {
        self.items(migration_id)?.iter().map(RelocationItem::progress).min()
    }

    /// Forgets a finished migration
    pub fn remove(&mut self, migration_id: &str) -> Option<Vec<RelocationItem>> {
        if !self.is_finished(migration_id) {
            return None;
        }
        self.migrations
            .remove(migration_id)
            .map(|migration| migration.items)
    }

    /// Drains the start, progress and completion envelopes emitted so far
    pub fn take_events(&mut self) -> Vec<Envelope> {
        std::mem::take(&mut self.events)
    }

    fn try_migration_mut(&mut self, migration_id: &str) -> Result<&mut Migration, RelocationError> {
        self.migrations
            .get_mut(migration_id)
            .ok_or_else(|| RelocationError::UnknownMigration {
                migration_id: migration_id.to_string(),
            })
    }
}

fn check_host(role: &'static str, expected: &str, actual: &str) -> Result<(), RelocationError> {
    if expected != actual {
        return Err(RelocationError::HostMismatch {
            role,
            expected: expected.to_string(),
            actual: actual.to_string(),
        });
    }
    Ok(())
}
