use std::default::Default;

/// Contains Config properties which will be used by the Relay
#[derive(Clone)]
pub struct RelayConfig {
    /// Upper bound on envelopes queued for one session that has not drained
    /// them yet. Routing to a full queue fails instead of dropping anything.
    pub max_queued_per_session: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            max_queued_per_session: 4096,
        }
    }
}
