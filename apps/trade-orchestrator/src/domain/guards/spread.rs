//! Spread guard.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use super::{GuardDecision, GuardKind};
use crate::domain::market::{InstrumentSpec, Quote};

/// Blocks entries while the spread is wider than a pip limit.
pub struct SpreadGuard;

impl SpreadGuard {
    /// Evaluate `quote` against `max_spread_pips`.
    ///
    /// Passes iff the spread in pips is at most the limit.
    #[must_use]
    pub fn evaluate(
        quote: &Quote,
        instrument: &InstrumentSpec,
        max_spread_pips: Decimal,
        now: DateTime<Utc>,
    ) -> GuardDecision {
        let spread_pips = instrument.price_to_pips(quote.spread());
        let passed = spread_pips <= max_spread_pips;
        let detail = if passed {
            format!("spread {spread_pips} pips within {max_spread_pips}")
        } else {
            format!("spread {spread_pips} pips exceeds {max_spread_pips}")
        };
        GuardDecision {
            kind: GuardKind::Spread,
            threshold: Some(max_spread_pips),
            observed: Some(spread_pips),
            passed,
            detail,
            evaluated_at: now,
        }
    }
}
