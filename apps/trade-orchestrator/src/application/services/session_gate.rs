//! Session gate: waits for a trading session to open.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::application::ports::Clock;
use crate::domain::events::EngineEvent;
use crate::domain::guards::{SessionDecision, SessionSchedule};
use crate::infrastructure::broadcast::EventBus;

/// Result of waiting on a session schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome {
    /// The schedule allows execution now.
    Open(SessionDecision),
    /// The deadline passed first; carries the last decision.
    Expired(SessionDecision),
    /// The caller cancelled the wait.
    Cancelled,
}

/// Polls a [`SessionSchedule`] at a fixed interval.
pub struct SessionGate {
    clock: Arc<dyn Clock>,
    poll_interval: Duration,
    events: EventBus,
}

impl SessionGate {
    /// Gate reading time from `clock`.
    pub fn new(clock: Arc<dyn Clock>, poll_interval: Duration, events: EventBus) -> Self {
        Self {
            clock,
            poll_interval: poll_interval.max(Duration::from_millis(1)),
            events,
        }
    }

    /// One-shot evaluation at the clock's current time.
    pub fn check(&self, schedule: &SessionSchedule) -> SessionDecision {
        let decision = schedule.evaluate(self.clock.now());
        self.events
            .publish(EngineEvent::GuardEvaluated(decision.to_guard_decision()));
        decision
    }

    /// Poll until the schedule allows execution, `deadline` passes, or
    /// `cancel` fires.
    ///
    /// Only the opening decision and the final one are published; blocked
    /// polls are logged at debug level.
    pub async fn wait_until_open(
        &self,
        schedule: &SessionSchedule,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> GateOutcome {
        let mut polls: u32 = 0;
        loop {
            if cancel.is_cancelled() {
                return GateOutcome::Cancelled;
            }
            let decision = schedule.evaluate(self.clock.now());
            polls += 1;
            if decision.allowed {
                tracing::info!(polls, local_time = %decision.local_time, "Session open");
                self.events
                    .publish(EngineEvent::GuardEvaluated(decision.to_guard_decision()));
                return GateOutcome::Open(decision);
            }
            tracing::debug!(polls, reason = decision.reason(), local_time = %decision.local_time, "Session closed");

            let now = Instant::now();
            if now >= deadline {
                tracing::info!(polls, reason = decision.reason(), "Session wait expired");
                self.events
                    .publish(EngineEvent::GuardEvaluated(decision.to_guard_decision()));
                return GateOutcome::Expired(decision);
            }

            let wake = (now + self.poll_interval).min(deadline);
            tokio::select! {
                biased;
                () = cancel.cancelled() => return GateOutcome::Cancelled,
                () = tokio::time::sleep_until(wake) => {}
            }
        }
    }
}
