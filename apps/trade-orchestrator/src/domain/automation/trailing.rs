//! Trailing stop rule.

use rust_decimal::{Decimal, RoundingStrategy};

use crate::domain::shared::Side;

/// Computes trailing stop candidates for one position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrailingRule {
    side: Side,
    distance: Decimal,
    step: Option<Decimal>,
    activation: Option<Decimal>,
    digits: u32,
}

impl TrailingRule {
    /// Rule trailing `distance` behind price for a position on `side`.
    #[must_use]
    pub const fn new(side: Side, distance: Decimal, step: Option<Decimal>, digits: u32) -> Self {
        Self {
            side,
            distance,
            step,
            activation: None,
            digits,
        }
    }

    /// Write nothing until price has moved `activation` in favor of the entry.
    #[must_use]
    pub const fn with_activation(mut self, activation: Option<Decimal>) -> Self {
        self.activation = activation;
        self
    }

    /// Whether the favorable move from `entry` to `price` reached the activation distance.
    ///
    /// Always true without an activation distance.
    #[must_use]
    pub fn is_active(&self, entry: Decimal, price: Decimal) -> bool {
        self.activation
            .is_none_or(|activation| self.side.favorable_move(entry, price) >= activation)
    }

    /// Stop at `price ∓ distance`, rounded to the quoting grid.
    #[must_use]
    pub fn candidate(&self, price: Decimal) -> Decimal {
        self.side
            .stop_from(price, self.distance)
            .round_dp_with_strategy(self.digits, RoundingStrategy::MidpointAwayFromZero)
    }

    /// Stop to write for `price`, given the currently protected level.
    ///
    /// `None` when the candidate would not improve protection or falls
    /// short of the configured step.
    #[must_use]
    pub fn evaluate(&self, price: Decimal, protected: Option<Decimal>) -> Option<Decimal> {
        let candidate = self.candidate(price);
        let Some(current) = protected else {
            return Some(candidate);
        };
        if !self.side.is_more_protective(candidate, current) {
            return None;
        }
        if let Some(step) = self.step {
            if (candidate - current).abs() < step {
                return None;
            }
        }
        Some(candidate)
    }
}
