use thiserror::Error;

/// Errors raised by bounded buffers that fill while traffic is blocked
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BufferError {
    /// The buffer reached its configured bound; the rejected item was not stored
    #[error("{buffer} buffer is full ({capacity} entries); producer must retry after unblock")]
    BufferFull {
        buffer: &'static str,
        capacity: usize,
    },

    /// An activity event id was completed twice or never recorded
    #[error("Activity event {event_id} is not in flight")]
    ActivityNotInFlight { event_id: u64 },
}
