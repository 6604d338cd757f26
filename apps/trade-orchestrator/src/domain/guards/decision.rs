//! Guard decision records.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Which guard produced a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GuardKind {
    /// Maximum spread gate.
    Spread,
    /// Trading-session gate.
    Session,
    /// Equity circuit breaker.
    Equity,
}

/// Outcome of one guard evaluation. Ephemeral: published, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardDecision {
    /// Guard that decided.
    pub kind: GuardKind,
    /// Configured limit, when the guard has a numeric one.
    pub threshold: Option<Decimal>,
    /// Measured value compared against the threshold.
    pub observed: Option<Decimal>,
    /// Whether execution may proceed.
    pub passed: bool,
    /// Short human-readable reason.
    pub detail: String,
    /// Evaluation time.
    pub evaluated_at: DateTime<Utc>,
}
