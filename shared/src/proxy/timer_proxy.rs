use log::{debug, warn};

use crate::{
    buffer::input_event::InputEventKind,
    container::ContainerContract,
    handler::{
        error::HandlerError,
        handler_context::{Continuation, HandlerContext},
    },
    message::Message,
    proxy::error::ProxyError,
    types::{CorrelationId, InstanceId, Millis},
};

/// Timer and interval sub-proxy of one component.
///
/// Timer state lives in the container's handler registry; the proxy only
/// decides whether a firing runs now or is recorded downstream.
pub struct TimerProxy {
    instance_id: InstanceId,
    blocked: bool,
}

impl TimerProxy {
    pub fn new(instance_id: &str) -> Self {
        Self {
            instance_id: instance_id.to_string(),
            blocked: false,
        }
    }

    pub fn is_blocked(&self) -> bool {
        self.blocked
    }

    pub fn block(&mut self) {
        self.blocked = true;
    }

    pub fn unblock(&mut self) {
        self.blocked = false;
    }

    /// Arms a one-shot timer. Re-arming an identical context restarts it.
    pub fn set_timeout(
        &mut self,
        container: &mut dyn ContainerContract,
        context: HandlerContext,
        delay: Millis,
    ) -> CorrelationId {
        let due_at = container.now() + delay;
        container
            .handler_registry()
            .register(context, Continuation::Timeout { delay, due_at })
    }

    /// Arms a repeating timer. While blocked the interval is registered but
    /// not started; an interval-start event is recorded downstream instead.
    pub fn set_interval(
        &mut self,
        container: &mut dyn ContainerContract,
        context: HandlerContext,
        period: Millis,
    ) -> Result<CorrelationId, ProxyError> {
        if self.blocked {
            container
                .input_event_buffer()
                .push_downstream(context.clone(), InputEventKind::IntervalStart { period })?;
            let correlation_id = container.handler_registry().register(
                context,
                Continuation::Interval {
                    period,
                    next_at: None,
                },
            );
            debug!(
                "{}: interval {:#018x} deferred until unblock",
                self.instance_id, correlation_id
            );
            return Ok(correlation_id);
        }

        let next_at = Some(container.now() + period);
        Ok(container
            .handler_registry()
            .register(context, Continuation::Interval { period, next_at }))
    }

    /// Starts a registered interval's phase from the current clock
    pub fn start_interval(
        &mut self,
        container: &mut dyn ContainerContract,
        correlation_id: CorrelationId,
        period: Millis,
    ) -> Result<(), ProxyError> {
        let now = container.now();
        let record = container
            .handler_registry()
            .get_mut(correlation_id)
            .ok_or(HandlerError::NotFound { correlation_id })?;
        match &mut record.continuation {
            Continuation::Interval { next_at, .. } => {
                *next_at = Some(now + period);
                Ok(())
            }
            other => Err(HandlerError::WrongContinuation {
                correlation_id,
                expected: "interval",
                actual: other.kind_name(),
            }
            .into()),
        }
    }

    pub fn clear(&mut self, container: &mut dyn ContainerContract, correlation_id: CorrelationId) -> bool {
        container
            .handler_registry()
            .remove(correlation_id)
            .is_some()
    }

    /// Fires a due timer. A one-shot timer is consumed; an interval is
    /// rescheduled one period after its due time. While blocked the firing
    /// is recorded downstream instead of invoking the handler, and a firing
    /// the downstream log rejects leaves the timer armed as it was.
    pub fn fire(
        &mut self,
        container: &mut dyn ContainerContract,
        correlation_id: CorrelationId,
    ) -> Result<(), ProxyError> {
        let record = container.handler_registry().try_get(correlation_id)?.clone();

        let (kind, rescheduled) = match record.continuation {
            Continuation::Timeout { .. } => (InputEventKind::Timeout, None),
            Continuation::Interval {
                period,
                next_at: Some(due),
            } => (
                InputEventKind::IntervalTick,
                Some(Continuation::Interval {
                    period,
                    next_at: Some(due + period.max(1)),
                }),
            ),
            ref other => {
                return Err(HandlerError::WrongContinuation {
                    correlation_id,
                    expected: "started timer",
                    actual: other.kind_name(),
                }
                .into())
            }
        };

        if self.blocked {
            container
                .input_event_buffer()
                .push_downstream(record.context.clone(), kind)?;
        }

        match rescheduled {
            Some(continuation) => {
                if let Some(live) = container.handler_registry().get_mut(correlation_id) {
                    live.continuation = continuation;
                }
            }
            None => {
                container.handler_registry().remove(correlation_id);
            }
        }

        if self.blocked {
            return Ok(());
        }
        self.invoke(container, &record.context, correlation_id)
    }

    /// Runs a buffered firing. A tick whose interval was cleared since it was
    /// recorded is skipped.
    pub fn replay(
        &mut self,
        container: &mut dyn ContainerContract,
        context: &HandlerContext,
        kind: &InputEventKind,
    ) -> Result<(), ProxyError> {
        let correlation_id = context.correlation_id();
        match kind {
            InputEventKind::IntervalStart { period } => {
                self.start_interval(container, correlation_id, *period)
            }
            InputEventKind::IntervalTick => {
                if !container.handler_registry().contains(correlation_id) {
                    warn!(
                        "{}: dropping tick of cleared interval {:#018x}",
                        self.instance_id, correlation_id
                    );
                    return Ok(());
                }
                self.invoke(container, context, correlation_id)
            }
            InputEventKind::Timeout => self.invoke(container, context, correlation_id),
            _ => Ok(()),
        }
    }

    fn invoke(
        &self,
        container: &mut dyn ContainerContract,
        context: &HandlerContext,
        correlation_id: CorrelationId,
    ) -> Result<(), ProxyError> {
        let message = Message::from_args(&context.handler, &context.args);
        container.invoke_operation(&context.handler, &message, Some(correlation_id))?;
        Ok(())
    }
}
