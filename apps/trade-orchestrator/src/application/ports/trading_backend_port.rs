//! Trading Backend Port
//!
//! Operation contracts of the remote trading terminal. The wire protocol
//! lives behind implementations of [`TradingBackend`]; every call carries
//! the timeout derived from the caller's deadline.
//!
//! # Failure classes
//!
//! | Kind | Variants |
//! |------|----------|
//! | Transient | `Network`, `Timeout`, busy/requote `Rejected` codes |
//! | SessionExpired | `SessionExpired` |
//! | Validation | `InvalidRequest` |
//! | BusinessRejection | any other `Rejected` code |

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::market::{AccountSummary, OrderSnapshot, OrderType, Quote};
use crate::domain::shared::{Side, Symbol, Ticket};

/// Live tick stream. The stream ending means the feed disconnected.
pub type TickStream = BoxStream<'static, Result<Quote, BackendError>>;

/// Terminal result codes that signal a busy or moving market rather than a refusal.
const RETRYABLE_TRADE_CODES: &[i32] = &[
    4,   // trade server is busy
    6,   // no connection with trade server
    8,   // too frequent requests
    128, // trade timeout
    135, // price changed
    136, // off quotes
    137, // broker is busy
    138, // requote
    141, // too many requests
    146, // trade context is busy
];

/// How a backend failure should be handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Retry after backoff.
    Transient,
    /// Reconnect once, then retry.
    SessionExpired,
    /// Malformed request; never retried.
    Validation,
    /// Refused by the broker; never retried.
    BusinessRejection,
}

/// Backend call failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// Connection-level failure.
    #[error("network error: {message}")]
    Network {
        /// Error details.
        message: String,
    },

    /// The call did not complete within its timeout.
    #[error("timed out after {timeout_ms}ms")]
    Timeout {
        /// Timeout that elapsed.
        timeout_ms: u64,
    },

    /// The terminal session is no longer valid.
    #[error("session expired: {message}")]
    SessionExpired {
        /// Error details.
        message: String,
    },

    /// The request failed validation (volume, price, stop distance).
    #[error("invalid request: {message}")]
    InvalidRequest {
        /// Error details.
        message: String,
    },

    /// The terminal refused the request.
    #[error("rejected ({code}): {message}")]
    Rejected {
        /// Terminal result code.
        code: i32,
        /// Error details.
        message: String,
    },
}

impl BackendError {
    /// Network failure.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Terminal refusal with `code`.
    pub fn rejected(code: i32, message: impl Into<String>) -> Self {
        Self::Rejected {
            code,
            message: message.into(),
        }
    }

    /// Validation failure.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// Classify the failure for retry decisions.
    #[must_use]
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Network { .. } | Self::Timeout { .. } => FailureKind::Transient,
            Self::SessionExpired { .. } => FailureKind::SessionExpired,
            Self::InvalidRequest { .. } => FailureKind::Validation,
            Self::Rejected { code, .. } if RETRYABLE_TRADE_CODES.contains(code) => {
                FailureKind::Transient
            }
            Self::Rejected { .. } => FailureKind::BusinessRejection,
        }
    }
}

/// New order request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceOrderRequest {
    /// Instrument.
    pub symbol: Symbol,
    /// Direction.
    pub side: Side,
    /// Market, limit or stop.
    pub order_type: OrderType,
    /// Volume in lots.
    pub volume: Decimal,
    /// Requested price; the entry trigger for pending orders.
    pub price: Option<Decimal>,
    /// Initial stop-loss.
    pub stop_loss: Option<Decimal>,
    /// Initial take-profit.
    pub take_profit: Option<Decimal>,
    /// Pending order expiry.
    pub expiration: Option<DateTime<Utc>>,
    /// Accepted slippage in points.
    pub deviation_points: u32,
    /// Strategy attribution tag.
    pub magic: u64,
    /// Order comment.
    pub comment: Option<String>,
}

/// Change to an existing order. `None` fields are left unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModifyOrderRequest {
    /// Target ticket.
    pub ticket: Ticket,
    /// New stop-loss.
    pub stop_loss: Option<Decimal>,
    /// New take-profit.
    pub take_profit: Option<Decimal>,
    /// New trigger price (pending orders only).
    pub price: Option<Decimal>,
    /// New expiry (pending orders only).
    pub expiration: Option<DateTime<Utc>>,
}

impl ModifyOrderRequest {
    /// Change only the stop-loss.
    #[must_use]
    pub const fn stop_loss(ticket: Ticket, stop_loss: Decimal) -> Self {
        Self {
            ticket,
            stop_loss: Some(stop_loss),
            take_profit: None,
            price: None,
            expiration: None,
        }
    }

    /// Set stop-loss and take-profit together.
    #[must_use]
    pub const fn protection(
        ticket: Ticket,
        stop_loss: Decimal,
        take_profit: Option<Decimal>,
    ) -> Self {
        Self {
            ticket,
            stop_loss: Some(stop_loss),
            take_profit,
            price: None,
            expiration: None,
        }
    }
}

/// Port for the remote trading terminal.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TradingBackend: Send + Sync {
    /// Latest quote for a symbol.
    async fn get_quote(&self, symbol: &Symbol, timeout: Duration) -> Result<Quote, BackendError>;

    /// Open a live tick stream for a set of symbols.
    async fn subscribe_ticks(
        &self,
        symbols: &[Symbol],
        timeout: Duration,
    ) -> Result<TickStream, BackendError>;

    /// Place a market or pending order.
    async fn place_order(
        &self,
        request: PlaceOrderRequest,
        timeout: Duration,
    ) -> Result<Ticket, BackendError>;

    /// Modify stops, price or expiry of an order.
    async fn modify_order(
        &self,
        request: ModifyOrderRequest,
        timeout: Duration,
    ) -> Result<(), BackendError>;

    /// Close a position, fully or `volume` lots. Pending orders are refused.
    async fn close_order(
        &self,
        ticket: Ticket,
        volume: Option<Decimal>,
        timeout: Duration,
    ) -> Result<(), BackendError>;

    /// Delete a pending order. A ticket that has already filled, or is
    /// unknown, is refused with an invalid-ticket rejection and left alone.
    async fn delete_order(&self, ticket: Ticket, timeout: Duration) -> Result<(), BackendError>;

    /// Tickets of every open position and pending order.
    async fn get_open_tickets(&self, timeout: Duration) -> Result<HashSet<Ticket>, BackendError>;

    /// Snapshots of every open position and pending order.
    async fn get_open_orders(&self, timeout: Duration) -> Result<Vec<OrderSnapshot>, BackendError>;

    /// Snapshot of one ticket, `None` once it is closed or deleted.
    async fn get_order(
        &self,
        ticket: Ticket,
        timeout: Duration,
    ) -> Result<Option<OrderSnapshot>, BackendError>;

    /// Balance and equity.
    async fn get_account_summary(&self, timeout: Duration) -> Result<AccountSummary, BackendError>;

    /// Re-establish the terminal session.
    async fn reconnect(&self, timeout: Duration) -> Result<(), BackendError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        assert_eq!(BackendError::network("reset").kind(), FailureKind::Transient);
        assert_eq!(
            BackendError::Timeout { timeout_ms: 10 }.kind(),
            FailureKind::Transient
        );
        assert_eq!(
            BackendError::SessionExpired {
                message: "token".into()
            }
            .kind(),
            FailureKind::SessionExpired
        );
        assert_eq!(BackendError::invalid("volume").kind(), FailureKind::Validation);
        assert_eq!(
            BackendError::rejected(146, "trade context busy").kind(),
            FailureKind::Transient
        );
        assert_eq!(
            BackendError::rejected(132, "market closed").kind(),
            FailureKind::BusinessRejection
        );
    }
}
