use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransactionError {
    /// Envelope text could not be decoded
    #[error("Unparsable envelope: {reason}")]
    UnparsableEnvelope { reason: String },

    /// The envelope's tag does not fit its payload
    #[error("Envelope tagged {tag} carries a {payload} payload")]
    TagMismatch { tag: String, payload: &'static str },
}
