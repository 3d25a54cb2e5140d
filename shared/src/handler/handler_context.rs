use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::types::{CorrelationId, Millis};

/// Identifies an asynchronous continuation without capturing it.
///
/// Two contexts built from the same handler name, context id and arguments
/// produce the same correlation id on every device, so a continuation armed
/// on one container can be re-armed on another and still be recognised.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandlerContext {
    pub handler: String,
    pub context_id: String,
    #[serde(default)]
    pub args: Vec<Value>,
}

impl HandlerContext {
    pub fn new(handler: &str, context_id: &str, args: Vec<Value>) -> Self {
        Self {
            handler: handler.to_string(),
            context_id: context_id.to_string(),
            args,
        }
    }

    pub fn correlation_id(&self) -> CorrelationId {
        let canonical = json!([self.handler, self.context_id, self.args]).to_string();
        let digest = blake3::hash(canonical.as_bytes());
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest.as_bytes()[..8]);
        u64::from_le_bytes(bytes)
    }
}

/// What kind of continuation a handler context stands for
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Continuation {
    /// One-shot timer due at `due_at` on the owning runtime's clock
    Timeout { delay: Millis, due_at: Millis },
    /// Repeating timer; `next_at` is `None` until the interval has started
    Interval { period: Millis, next_at: Option<Millis> },
    /// Outbound service call awaiting its response
    PendingCall { service: String, operation: String },
}

impl Continuation {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Continuation::Timeout { .. } => "timeout",
            Continuation::Interval { .. } => "interval",
            Continuation::PendingCall { .. } => "pending-call",
        }
    }

    /// Next instant this continuation wants to fire, if it is a started timer
    pub fn due_at(&self) -> Option<Millis> {
        match self {
            Continuation::Timeout { due_at, .. } => Some(*due_at),
            Continuation::Interval { next_at, .. } => *next_at,
            Continuation::PendingCall { .. } => None,
        }
    }
}

/// A registered continuation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HandlerRecord {
    pub context: HandlerContext,
    pub continuation: Continuation,
}

impl HandlerRecord {
    pub fn new(context: HandlerContext, continuation: Continuation) -> Self {
        Self {
            context,
            continuation,
        }
    }

    pub fn correlation_id(&self) -> CorrelationId {
        self.context.correlation_id()
    }

    /// Moves due times from one clock onto another, keeping the remaining
    /// delay. Overdue timers become due immediately on the new clock.
    pub fn rebase(&mut self, from_clock: Millis, to_clock: Millis) {
        match &mut self.continuation {
            Continuation::Timeout { due_at, .. } => {
                *due_at = to_clock + due_at.saturating_sub(from_clock);
            }
            Continuation::Interval {
                next_at: Some(next_at),
                ..
            } => {
                *next_at = to_clock + next_at.saturating_sub(from_clock);
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn correlation_id_is_reproducible() {
        let a = HandlerContext::new("refresh", "weather", vec![json!("paris"), json!(3)]);
        let b = HandlerContext::new("refresh", "weather", vec![json!("paris"), json!(3)]);
        assert_eq!(a.correlation_id(), b.correlation_id());
    }

    #[test]
    fn correlation_id_depends_on_every_part() {
        let base = HandlerContext::new("refresh", "weather", vec![json!("paris")]);
        let other_handler = HandlerContext::new("reload", "weather", vec![json!("paris")]);
        let other_context = HandlerContext::new("refresh", "map", vec![json!("paris")]);
        let other_args = HandlerContext::new("refresh", "weather", vec![json!("rome")]);

        assert_ne!(base.correlation_id(), other_handler.correlation_id());
        assert_ne!(base.correlation_id(), other_context.correlation_id());
        assert_ne!(base.correlation_id(), other_args.correlation_id());
    }

    #[test]
    fn rebase_keeps_remaining_delay() {
        let mut record = HandlerRecord::new(
            HandlerContext::new("tick", "clock", vec![]),
            Continuation::Timeout {
                delay: 500,
                due_at: 1_300,
            },
        );
        record.rebase(1_000, 40);
        assert_eq!(record.continuation.due_at(), Some(340));

        record.rebase(2_000, 10);
        assert_eq!(record.continuation.due_at(), Some(10));
    }
}
