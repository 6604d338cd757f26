//! Error taxonomy for guarded execution.
//!
//! | Class | Variants | Retried |
//! |-------|----------|---------|
//! | Transient | `BackendUnavailable`, `DeadlineExceeded` | by the guard, then surfaced |
//! | Fatal | `RejectedRequest`, `TradeRejected`, `OrderNotFound`, `Internal` | never |
//! | Cancelled | `Cancelled` | never |

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::presets::PresetError;
use crate::domain::shared::Ticket;

/// Coarse classification of an [`ExecutionError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// The backend could not be reached in time; a later attempt may succeed.
    Transient,
    /// The request itself was refused; repeating it will not help.
    Fatal,
    /// A cancellation token fired.
    Cancelled,
}

/// Failure of an operation executed through the guard or an orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
    /// Transient failures exhausted the retry budget.
    #[error("{operation}: backend unavailable after {attempts} attempts: {message}")]
    BackendUnavailable {
        /// Operation name.
        operation: &'static str,
        /// Attempts made.
        attempts: u32,
        /// Last failure.
        message: String,
    },

    /// The deadline passed before the operation could succeed.
    #[error("{operation}: deadline exceeded")]
    DeadlineExceeded {
        /// Operation name.
        operation: &'static str,
    },

    /// Invalid volume, price or stop distance.
    #[error("{operation}: request rejected: {message}")]
    RejectedRequest {
        /// Operation name.
        operation: &'static str,
        /// Validation failure.
        message: String,
    },

    /// Trading disabled, market closed or broker-side refusal.
    #[error("{operation}: trade rejected ({code}): {message}")]
    TradeRejected {
        /// Operation name.
        operation: &'static str,
        /// Backend rejection code.
        code: i32,
        /// Backend message.
        message: String,
    },

    /// The ticket a workflow depends on is gone.
    #[error("ticket {ticket} not found")]
    OrderNotFound {
        /// Missing ticket.
        ticket: Ticket,
    },

    /// A cancellation token fired mid-operation.
    #[error("{operation}: cancelled")]
    Cancelled {
        /// Operation name.
        operation: &'static str,
    },

    /// Internal invariant violated.
    #[error("internal error: {message}")]
    Internal {
        /// Description.
        message: String,
    },
}

impl ExecutionError {
    /// Classification of the error.
    #[must_use]
    pub const fn class(&self) -> ErrorClass {
        match self {
            Self::BackendUnavailable { .. } | Self::DeadlineExceeded { .. } => ErrorClass::Transient,
            Self::Cancelled { .. } => ErrorClass::Cancelled,
            Self::RejectedRequest { .. }
            | Self::TradeRejected { .. }
            | Self::OrderNotFound { .. }
            | Self::Internal { .. } => ErrorClass::Fatal,
        }
    }

    /// Stable machine-readable reason.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::BackendUnavailable { .. } => "BACKEND_UNAVAILABLE",
            Self::DeadlineExceeded { .. } => "DEADLINE_EXCEEDED",
            Self::RejectedRequest { .. } => "REJECTED_REQUEST",
            Self::TradeRejected { .. } => "TRADE_REJECTED",
            Self::OrderNotFound { .. } => "ORDER_NOT_FOUND",
            Self::Cancelled { .. } => "CANCELLED",
            Self::Internal { .. } => "INTERNAL",
        }
    }

    /// Whether this is a cancellation rather than a failure.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// Whether a later attempt might succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self.class(), ErrorClass::Transient)
    }

    /// Local validation failure for `operation`.
    pub fn rejected(operation: &'static str, message: impl Into<String>) -> Self {
        Self::RejectedRequest {
            operation,
            message: message.into(),
        }
    }

    /// Internal invariant violation.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

impl From<PresetError> for ExecutionError {
    fn from(error: PresetError) -> Self {
        Self::rejected("validate_context", error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classes() {
        let unavailable = ExecutionError::BackendUnavailable {
            operation: "place_order",
            attempts: 6,
            message: "connection reset".into(),
        };
        assert_eq!(unavailable.class(), ErrorClass::Transient);
        assert!(unavailable.is_transient());
        assert_eq!(
            ExecutionError::TradeRejected {
                operation: "place_order",
                code: 132,
                message: "market closed".into()
            }
            .class(),
            ErrorClass::Fatal
        );
        assert!(ExecutionError::Cancelled { operation: "x" }.is_cancelled());
    }

    #[test]
    fn display_includes_operation_and_code() {
        let err = ExecutionError::TradeRejected {
            operation: "modify_order",
            code: 130,
            message: "invalid stops".into(),
        };
        assert_eq!(err.to_string(), "modify_order: trade rejected (130): invalid stops");
        assert_eq!(err.reason(), "TRADE_REJECTED");
    }

    #[test]
    fn preset_errors_become_rejections() {
        let err: ExecutionError = PresetError::OutOfRange {
            field: "sl_pips",
            expectation: "positive",
        }
        .into();
        assert_eq!(err.reason(), "REJECTED_REQUEST");
    }
}
