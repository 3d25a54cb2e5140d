use thiserror::Error;

/// Errors that can occur while resolving an asynchronous continuation by its
/// correlation id
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandlerError {
    /// No continuation is registered under this correlation id
    #[error("No handler registered for correlation id {correlation_id:#018x}")]
    NotFound { correlation_id: u64 },

    /// The continuation exists but is of a different kind than the caller expected
    #[error("Handler {correlation_id:#018x} is a {actual} continuation, expected {expected}")]
    WrongContinuation {
        correlation_id: u64,
        expected: &'static str,
        actual: &'static str,
    },
}
