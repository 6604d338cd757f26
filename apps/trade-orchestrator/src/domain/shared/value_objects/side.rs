//! Position direction.

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Direction of a position or order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// Long: profits when price rises.
    Buy,
    /// Short: profits when price falls.
    Sell,
}

impl Side {
    /// `+1` for buy, `-1` for sell.
    #[must_use]
    pub const fn sign(self) -> Decimal {
        match self {
            Self::Buy => Decimal::ONE,
            Self::Sell => Decimal::NEGATIVE_ONE,
        }
    }

    /// The opposite side.
    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }

    /// Price offset `distance` in the adverse direction (where a stop-loss lives).
    #[must_use]
    pub fn stop_from(self, price: Decimal, distance: Decimal) -> Decimal {
        price - self.sign() * distance
    }

    /// Price offset `distance` in the favorable direction (where a take-profit lives).
    #[must_use]
    pub fn target_from(self, price: Decimal, distance: Decimal) -> Decimal {
        price + self.sign() * distance
    }

    /// Whether stop `candidate` protects strictly more than `current`.
    ///
    /// For a long position a higher stop is more protective, for a short a lower one.
    #[must_use]
    pub fn is_more_protective(self, candidate: Decimal, current: Decimal) -> bool {
        match self {
            Self::Buy => candidate > current,
            Self::Sell => candidate < current,
        }
    }

    /// Signed favorable move from `entry` to `price`.
    #[must_use]
    pub fn favorable_move(self, entry: Decimal, price: Decimal) -> Decimal {
        (price - entry) * self.sign()
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => f.write_str("buy"),
            Self::Sell => f.write_str("sell"),
        }
    }
}
