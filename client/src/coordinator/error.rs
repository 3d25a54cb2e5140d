use thiserror::Error;

use crate::error::RuntimeError;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RelocationError {
    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    /// A migration with this id is already tracked
    #[error("Migration {migration_id} already exists")]
    DuplicateMigration { migration_id: String },

    #[error("Migration {migration_id} is unknown")]
    UnknownMigration { migration_id: String },

    /// A migration must move at least one component
    #[error("Migration {migration_id} names no component")]
    EmptyMigration { migration_id: String },

    /// Source and target are the same session
    #[error("Migration {migration_id} moves components from {session_id} to itself")]
    SameHost {
        migration_id: String,
        session_id: String,
    },

    /// The hosts handed to a step are not the migration's source and target
    #[error("Expected {expected} as {role} of the migration, got {actual}")]
    HostMismatch {
        role: &'static str,
        expected: String,
        actual: String,
    },

    /// A phase needed the snapshot before one was captured
    #[error("No snapshot captured for {instance_id}")]
    MissingSnapshot { instance_id: String },

    /// A status reached while reversing has no compensation step
    #[error("Cannot compensate {instance_id} from {status}")]
    CannotCompensate { instance_id: String, status: String },
}

impl RelocationError {
    pub fn is_protocol_violation(&self) -> bool {
        matches!(self, RelocationError::Runtime(error) if error.is_protocol_violation())
    }
}
