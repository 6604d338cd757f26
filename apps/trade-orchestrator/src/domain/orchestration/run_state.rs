//! Run State Machine
//!
//! Explicit tagged state per orchestrator run. Each kind of run has its
//! own transition table; anything not listed is rejected.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Kind of orchestrator workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunKind {
    /// Market entry followed by protection.
    MarketOneShot,
    /// Pending entry with fill-or-timeout handling.
    PendingBracket,
    /// Spread gate in front of another run.
    SpreadGuarded,
    /// Session gate in front of another run.
    SessionGuarded,
    /// Buy stop and sell stop around the mid; the first fill deletes the other.
    OcoStraddle,
    /// Equity circuit breaker in front of another run.
    EquityGuarded,
}

impl fmt::Display for RunKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::MarketOneShot => "market_one_shot",
            Self::PendingBracket => "pending_bracket",
            Self::SpreadGuarded => "spread_guarded",
            Self::SessionGuarded => "session_guarded",
            Self::OcoStraddle => "oco_straddle",
            Self::EquityGuarded => "equity_guarded",
        };
        f.write_str(name)
    }
}

/// State of an orchestrator run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Not started.
    Idle,
    /// Market order accepted.
    Sent,
    /// Pending order accepted.
    Placed,
    /// Pending order observed filled.
    Filled,
    /// Pending order deleted after its deadline.
    TimedOut,
    /// Stop-loss/take-profit and automations attached.
    Protected,
    /// Market workflow finished.
    Done,
    /// Guard refused execution.
    Blocked,
    /// Session never opened before the deadline.
    Expired,
    /// Cancelled, by the caller or after a timeout deletion.
    Cancelled,
    /// Unrecoverable error.
    Failed,
}

impl RunState {
    /// Whether no further transitions are possible for `kind`.
    #[must_use]
    pub fn is_terminal(self, kind: RunKind) -> bool {
        RunStateMachine::valid_next_states(kind, self).is_empty()
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Sent => "sent",
            Self::Placed => "placed",
            Self::Filled => "filled",
            Self::TimedOut => "timed_out",
            Self::Protected => "protected",
            Self::Done => "done",
            Self::Blocked => "blocked",
            Self::Expired => "expired",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Rejected transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} run cannot move from {from} to {to}")]
pub struct RunStateError {
    /// Run kind.
    pub kind: RunKind,
    /// Current state.
    pub from: RunState,
    /// Requested state.
    pub to: RunState,
}

/// Transition tables for every run kind.
pub struct RunStateMachine;

impl RunStateMachine {
    /// Check if a transition is valid for `kind`.
    #[must_use]
    pub const fn is_valid_transition(kind: RunKind, from: RunState, to: RunState) -> bool {
        use RunState::{
            Blocked, Cancelled, Done, Expired, Failed, Filled, Idle, Placed, Protected, Sent,
            TimedOut,
        };
        match kind {
            RunKind::MarketOneShot => matches!(
                (from, to),
                (Idle, Sent)
                    | (Sent, Protected)
                    | (Protected, Done)
                    | (Idle | Sent | Protected, Failed | Cancelled)
            ),
            RunKind::PendingBracket | RunKind::OcoStraddle => matches!(
                (from, to),
                (Idle, Placed)
                    | (Placed, Filled | TimedOut)
                    | (Filled, Protected)
                    | (TimedOut, Cancelled)
                    | (Idle | Placed | Filled, Failed | Cancelled)
            ),
            RunKind::SpreadGuarded | RunKind::SessionGuarded | RunKind::EquityGuarded => matches!(
                (from, to),
                (Idle, Blocked | Expired | Cancelled | Failed)
            ),
        }
    }

    /// Validate a transition.
    pub const fn validate_transition(
        kind: RunKind,
        from: RunState,
        to: RunState,
    ) -> Result<(), RunStateError> {
        if Self::is_valid_transition(kind, from, to) {
            Ok(())
        } else {
            Err(RunStateError { kind, from, to })
        }
    }

    /// All valid next states from `from`.
    #[must_use]
    pub fn valid_next_states(kind: RunKind, from: RunState) -> Vec<RunState> {
        const ALL: [RunState; 11] = [
            RunState::Idle,
            RunState::Sent,
            RunState::Placed,
            RunState::Filled,
            RunState::TimedOut,
            RunState::Protected,
            RunState::Done,
            RunState::Blocked,
            RunState::Expired,
            RunState::Cancelled,
            RunState::Failed,
        ];
        ALL.into_iter()
            .filter(|to| Self::is_valid_transition(kind, from, *to))
            .collect()
    }
}
