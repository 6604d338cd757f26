//! Instrument metadata and pip arithmetic.
//!
//! Metadata lookup itself happens outside this crate; callers hand in an
//! [`InstrumentSpec`] through the trading context.

use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::domain::shared::Symbol;

/// Static trading properties of one symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstrumentSpec {
    /// Instrument symbol.
    pub symbol: Symbol,
    /// Number of price decimals quoted by the terminal.
    pub digits: u32,
    /// Smallest price increment.
    pub point: Decimal,
    /// Volume granularity in lots.
    pub volume_step: Decimal,
    /// Minimum tradeable volume in lots.
    pub volume_min: Decimal,
    /// Maximum tradeable volume in lots.
    pub volume_max: Decimal,
    /// Account-currency value of a one-point move for one lot.
    pub tick_value: Decimal,
}

impl InstrumentSpec {
    /// Typical five-digit FX major (EURUSD-like) quoted in a USD account.
    #[must_use]
    pub fn fx_major(symbol: impl Into<Symbol>) -> Self {
        Self {
            symbol: symbol.into(),
            digits: 5,
            point: dec!(0.00001),
            volume_step: dec!(0.01),
            volume_min: dec!(0.01),
            volume_max: dec!(100),
            tick_value: dec!(1),
        }
    }

    /// Size of one pip.
    ///
    /// Fractional-pip quoting (3 or 5 digits) makes a pip ten points.
    #[must_use]
    pub fn pip_size(&self) -> Decimal {
        if matches!(self.digits, 3 | 5) {
            self.point * Decimal::TEN
        } else {
            self.point
        }
    }

    /// Convert a pip distance to a price distance.
    #[must_use]
    pub fn pips_to_price(&self, pips: Decimal) -> Decimal {
        pips * self.pip_size()
    }

    /// Convert a price distance to pips.
    #[must_use]
    pub fn price_to_pips(&self, distance: Decimal) -> Decimal {
        let pip = self.pip_size();
        if pip.is_zero() {
            return Decimal::ZERO;
        }
        distance / pip
    }

    /// Round a price onto the instrument's quoting grid.
    #[must_use]
    pub fn normalize_price(&self, price: Decimal) -> Decimal {
        price.round_dp_with_strategy(self.digits, RoundingStrategy::MidpointAwayFromZero)
    }

    /// Round a volume down to the step and clamp it into `[volume_min, volume_max]`.
    #[must_use]
    pub fn normalize_volume(&self, volume: Decimal) -> Decimal {
        let stepped = if self.volume_step.is_zero() {
            volume
        } else {
            (volume / self.volume_step).floor() * self.volume_step
        };
        stepped.max(self.volume_min).min(self.volume_max).normalize()
    }

    /// Account-currency value of a one-pip move for one lot.
    #[must_use]
    pub fn money_per_pip_per_lot(&self) -> Decimal {
        if self.point.is_zero() {
            return Decimal::ZERO;
        }
        self.tick_value * self.pip_size() / self.point
    }
}
