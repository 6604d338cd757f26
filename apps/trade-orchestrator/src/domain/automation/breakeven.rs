//! Move-to-breakeven rule.

use rust_decimal::{Decimal, RoundingStrategy};

use crate::domain::shared::Side;

/// Decides when and where a breakeven stop is placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakevenRule {
    side: Side,
    trigger: Decimal,
    plus: Decimal,
    digits: u32,
}

impl BreakevenRule {
    /// Rule arming after a `trigger` favorable move, placing the stop `plus` beyond entry.
    #[must_use]
    pub const fn new(side: Side, trigger: Decimal, plus: Decimal, digits: u32) -> Self {
        Self {
            side,
            trigger,
            plus,
            digits,
        }
    }

    /// Breakeven stop for a position entered at `entry`.
    #[must_use]
    pub fn target(&self, entry: Decimal) -> Decimal {
        self.side
            .target_from(entry, self.plus)
            .round_dp_with_strategy(self.digits, RoundingStrategy::MidpointAwayFromZero)
    }

    /// Whether price has moved at least `trigger` in favor since `entry`.
    #[must_use]
    pub fn is_triggered(&self, entry: Decimal, price: Decimal) -> bool {
        self.side.favorable_move(entry, price) >= self.trigger
    }
}
