//! Engine Events
//!
//! Typed events published on the engine's event channel. Logging and
//! metrics subscribe to the channel; automation logic never calls into
//! them directly.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::domain::automation::{AutomationKind, SubscriptionStatus};
use crate::domain::guards::GuardDecision;
use crate::domain::orchestration::{RunKind, RunState};
use crate::domain::shared::{RunId, SubscriptionId, Symbol, Ticket};

/// Something observable happened inside the engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    /// A backend call failed transiently and will be retried.
    RetryScheduled {
        /// Operation name.
        operation: &'static str,
        /// Attempt that failed (1-based).
        attempt: u32,
        /// Delay before the next attempt.
        delay_ms: u64,
        /// Failure description.
        error: String,
    },
    /// The backend session was re-established.
    Reconnected {
        /// Reconnect generation after the reconnect.
        generation: u64,
    },
    /// A feed stream was (re)opened.
    FeedResubscribed {
        /// Symbol set of the stream.
        symbols: Vec<Symbol>,
    },
    /// A feed stream could not be reopened within the retry budget.
    FeedUnavailable {
        /// Symbol set of the stream.
        symbols: Vec<Symbol>,
        /// Last failure.
        error: String,
    },
    /// An automation routine started.
    AutomationStarted {
        /// Subscription id.
        id: SubscriptionId,
        /// Target ticket.
        ticket: Ticket,
        /// Automation kind.
        kind: AutomationKind,
    },
    /// An automation wrote a new stop-loss.
    StopLossModified {
        /// Subscription id.
        id: SubscriptionId,
        /// Target ticket.
        ticket: Ticket,
        /// Automation kind.
        kind: AutomationKind,
        /// Stop-loss written.
        stop_loss: Decimal,
    },
    /// An automation tick failed and was skipped.
    AutomationTickSkipped {
        /// Subscription id.
        id: SubscriptionId,
        /// Target ticket.
        ticket: Ticket,
        /// Failure description.
        error: String,
    },
    /// An automation routine ended.
    AutomationFinished {
        /// Subscription id.
        id: SubscriptionId,
        /// Target ticket.
        ticket: Ticket,
        /// Automation kind.
        kind: AutomationKind,
        /// Final status.
        status: SubscriptionStatus,
        /// Why it ended.
        reason: &'static str,
    },
    /// A guard was evaluated.
    GuardEvaluated(GuardDecision),
    /// An orchestrator run changed state.
    RunTransition {
        /// Run id.
        run_id: RunId,
        /// Run kind.
        kind: RunKind,
        /// Previous state.
        from: RunState,
        /// New state.
        to: RunState,
        /// Transition time.
        at: DateTime<Utc>,
    },
}

impl EngineEvent {
    /// Stable snake_case name of the event, used as a metrics label.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::RetryScheduled { .. } => "retry_scheduled",
            Self::Reconnected { .. } => "reconnected",
            Self::FeedResubscribed { .. } => "feed_resubscribed",
            Self::FeedUnavailable { .. } => "feed_unavailable",
            Self::AutomationStarted { .. } => "automation_started",
            Self::StopLossModified { .. } => "stop_loss_modified",
            Self::AutomationTickSkipped { .. } => "automation_tick_skipped",
            Self::AutomationFinished { .. } => "automation_finished",
            Self::GuardEvaluated(_) => "guard_evaluated",
            Self::RunTransition { .. } => "run_transition",
        }
    }
}
