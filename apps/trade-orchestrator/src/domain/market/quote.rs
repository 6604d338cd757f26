//! Quote / tick value object.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::shared::{Side, Symbol};

/// Top-of-book quote. Ticks delivered by the live feed use the same shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    /// Instrument symbol.
    pub symbol: Symbol,
    /// Best bid (sell) price.
    pub bid: Decimal,
    /// Best ask (buy) price.
    pub ask: Decimal,
    /// Terminal timestamp of the quote.
    pub time: DateTime<Utc>,
}

impl Quote {
    /// Create a new quote.
    #[must_use]
    pub const fn new(symbol: Symbol, bid: Decimal, ask: Decimal, time: DateTime<Utc>) -> Self {
        Self {
            symbol,
            bid,
            ask,
            time,
        }
    }

    /// Mid price.
    #[must_use]
    pub fn mid(&self) -> Decimal {
        (self.bid + self.ask) / Decimal::TWO
    }

    /// Ask minus bid, in price units.
    #[must_use]
    pub fn spread(&self) -> Decimal {
        self.ask - self.bid
    }

    /// Price a market order on `side` executes at: ask for buy, bid for sell.
    #[must_use]
    pub const fn entry_price(&self, side: Side) -> Decimal {
        match side {
            Side::Buy => self.ask,
            Side::Sell => self.bid,
        }
    }

    /// Price a position on `side` closes at: bid for buy, ask for sell.
    #[must_use]
    pub const fn exit_price(&self, side: Side) -> Decimal {
        match side {
            Side::Buy => self.bid,
            Side::Sell => self.ask,
        }
    }
}
