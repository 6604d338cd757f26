//! Structured result of an orchestrator run.

use serde::Serialize;

use super::{RunKind, RunState};
use crate::domain::guards::GuardDecision;
use crate::domain::shared::{RunId, SubscriptionId, Ticket};
use crate::error::ExecutionError;

/// Final status reported to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Market order sent and protected.
    Done,
    /// Pending order filled and protected.
    Protected,
    /// Pending order deleted after its deadline.
    TimedOut,
    /// A spread or equity guard refused execution.
    Blocked,
    /// Session guard deadline elapsed first.
    Expired,
    /// Run cancelled by its caller.
    Cancelled,
    /// Run failed; see the error.
    Failed,
}

impl RunStatus {
    /// Whether the run placed a trade that is now protected.
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Done | Self::Protected)
    }
}

/// `{status, ticket?, error?}` plus run bookkeeping.
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    /// Run id.
    pub run_id: RunId,
    /// Workflow kind.
    pub kind: RunKind,
    /// Final status.
    pub status: RunStatus,
    /// Ticket of the order placed, if any.
    pub ticket: Option<Ticket>,
    /// Failure cause for non-success statuses.
    #[serde(serialize_with = "serialize_error")]
    pub error: Option<ExecutionError>,
    /// Automations attached by the run.
    pub subscriptions: Vec<SubscriptionId>,
    /// Guard decision that gated the run, if any.
    pub guard: Option<GuardDecision>,
    /// Every state the run passed through, starting at `Idle`.
    pub history: Vec<RunState>,
}

impl RunOutcome {
    /// Final state of the run.
    #[must_use]
    pub fn final_state(&self) -> RunState {
        self.history.last().copied().unwrap_or(RunState::Idle)
    }

    /// Whether the run passed through `state`.
    #[must_use]
    pub fn visited(&self, state: RunState) -> bool {
        self.history.contains(&state)
    }
}

fn serialize_error<S>(error: &Option<ExecutionError>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    match error {
        Some(e) => serializer.serialize_some(&serde_json::json!({
            "reason": e.reason(),
            "message": e.to_string(),
        })),
        None => serializer.serialize_none(),
    }
}
