//! Order and account snapshots as reported by the terminal.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::shared::{Side, Symbol, Ticket};

/// How an order enters the market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    /// Executes immediately at the current price.
    Market,
    /// Pending: fills at the entry price or better.
    Limit,
    /// Pending: fills once price trades through the entry price.
    Stop,
}

impl OrderType {
    /// Whether orders of this type wait for a trigger price.
    #[must_use]
    pub const fn is_pending(self) -> bool {
        matches!(self, Self::Limit | Self::Stop)
    }
}

/// Read-only snapshot of a position or pending order.
///
/// The terminal owns the live record; snapshots are refreshed by polling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSnapshot {
    /// Terminal ticket.
    pub ticket: Ticket,
    /// Instrument symbol.
    pub symbol: Symbol,
    /// Direction.
    pub side: Side,
    /// Market for open positions, limit/stop while pending.
    pub order_type: OrderType,
    /// Volume in lots.
    pub volume: Decimal,
    /// Fill price for positions, trigger price for pending orders.
    pub open_price: Decimal,
    /// Current stop-loss, if any.
    pub stop_loss: Option<Decimal>,
    /// Current take-profit, if any.
    pub take_profit: Option<Decimal>,
    /// When the order was opened or placed.
    pub open_time: DateTime<Utc>,
    /// Strategy attribution tag.
    pub magic: u64,
    /// Free-form comment.
    pub comment: Option<String>,
    /// Floating profit in account currency (zero while pending).
    pub profit: Decimal,
}

impl OrderSnapshot {
    /// Whether this is still a pending order rather than an open position.
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        self.order_type.is_pending()
    }
}

/// Account balance snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSummary {
    /// Realized balance.
    pub balance: Decimal,
    /// Balance plus floating profit.
    pub equity: Decimal,
}
