use thiserror::Error;

use nomad_shared::{DeviceError, TransactionError};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RelayError {
    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error(transparent)]
    Transaction(#[from] TransactionError),

    /// The addressed session is not connected
    #[error("Session {session_id} is not connected")]
    NotConnected { session_id: String },

    /// The addressed session's queue is at its bound
    #[error("Queue for session {session_id} is full ({capacity} envelopes)")]
    QueueFull { session_id: String, capacity: usize },
}
