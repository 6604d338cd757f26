//! Risk preset: how much to risk and how to protect the position.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use super::PresetError;

/// Protection parameters for one run, in pips.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskPreset {
    /// Percentage of balance risked when the volume is sized automatically.
    pub risk_percent: Decimal,
    /// Initial stop-loss distance.
    pub sl_pips: Decimal,
    /// Initial take-profit distance. Zero disables the take-profit.
    pub tp_pips: Decimal,
    /// Trailing distance; enables a trailing automation.
    #[serde(default)]
    pub trailing_pips: Option<Decimal>,
    /// Profit in pips that activates the trailing automation. Trails from the fill when absent.
    #[serde(default)]
    pub trailing_activation_pips: Option<Decimal>,
    /// Profit that arms the breakeven automation.
    #[serde(default)]
    pub breakeven_trigger_pips: Option<Decimal>,
    /// Offset beyond entry for the breakeven stop.
    #[serde(default)]
    pub breakeven_plus_pips: Option<Decimal>,
}

impl RiskPreset {
    /// Plain stop-loss / take-profit with no automation.
    #[must_use]
    pub const fn new(risk_percent: Decimal, sl_pips: Decimal, tp_pips: Decimal) -> Self {
        Self {
            risk_percent,
            sl_pips,
            tp_pips,
            trailing_pips: None,
            trailing_activation_pips: None,
            breakeven_trigger_pips: None,
            breakeven_plus_pips: None,
        }
    }

    /// Enable trailing at `pips` distance.
    #[must_use]
    pub const fn with_trailing(mut self, pips: Decimal) -> Self {
        self.trailing_pips = Some(pips);
        self
    }

    /// Trail `distance_pips` behind price, starting only once profit reaches `activation_pips`.
    #[must_use]
    pub const fn with_trailing_activation(mut self, activation_pips: Decimal, distance_pips: Decimal) -> Self {
        self.trailing_pips = Some(distance_pips);
        self.trailing_activation_pips = Some(activation_pips);
        self
    }

    /// Enable breakeven once profit reaches `trigger_pips`, moving the stop to entry plus `plus_pips`.
    #[must_use]
    pub const fn with_breakeven(mut self, trigger_pips: Decimal, plus_pips: Decimal) -> Self {
        self.breakeven_trigger_pips = Some(trigger_pips);
        self.breakeven_plus_pips = Some(plus_pips);
        self
    }

    /// Half a percent, wide stops.
    #[must_use]
    pub fn conservative() -> Self {
        Self::new(dec!(0.5), dec!(25), dec!(50))
    }

    /// One percent, 1:2 reward.
    #[must_use]
    pub fn balanced() -> Self {
        Self::new(dec!(1.0), dec!(20), dec!(40))
    }

    /// Two percent, tight stops.
    #[must_use]
    pub fn aggressive() -> Self {
        Self::new(dec!(2.0), dec!(15), dec!(30))
    }

    /// Short holds with an aggressive trail.
    #[must_use]
    pub fn scalper() -> Self {
        Self::new(dec!(1.0), dec!(8), dec!(12)).with_trailing(dec!(6))
    }

    /// Wide targets, locks in a small gain once 20 pips up.
    #[must_use]
    pub fn walker() -> Self {
        Self::new(dec!(0.75), dec!(30), dec!(60)).with_breakeven(dec!(20), dec!(2))
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<(), PresetError> {
        if self.risk_percent <= Decimal::ZERO || self.risk_percent > dec!(100) {
            return Err(PresetError::OutOfRange {
                field: "risk_percent",
                expectation: "in (0, 100]",
            });
        }
        if self.sl_pips <= Decimal::ZERO {
            return Err(PresetError::OutOfRange {
                field: "sl_pips",
                expectation: "positive",
            });
        }
        if self.tp_pips < Decimal::ZERO {
            return Err(PresetError::OutOfRange {
                field: "tp_pips",
                expectation: "non-negative",
            });
        }
        if self.trailing_pips.is_some_and(|p| p <= Decimal::ZERO) {
            return Err(PresetError::OutOfRange {
                field: "trailing_pips",
                expectation: "positive",
            });
        }
        if self.trailing_activation_pips.is_some_and(|p| p < Decimal::ZERO) {
            return Err(PresetError::OutOfRange {
                field: "trailing_activation_pips",
                expectation: "non-negative",
            });
        }
        if self.trailing_activation_pips.is_some() && self.trailing_pips.is_none() {
            return Err(PresetError::OutOfRange {
                field: "trailing_activation_pips",
                expectation: "set together with trailing_pips",
            });
        }
        if self.breakeven_trigger_pips.is_some_and(|p| p <= Decimal::ZERO) {
            return Err(PresetError::OutOfRange {
                field: "breakeven_trigger_pips",
                expectation: "positive",
            });
        }
        if self.breakeven_plus_pips.is_some_and(|p| p < Decimal::ZERO) {
            return Err(PresetError::OutOfRange {
                field: "breakeven_plus_pips",
                expectation: "non-negative",
            });
        }
        Ok(())
    }
}

impl Default for RiskPreset {
    fn default() -> Self {
        Self::balanced()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn named_presets_validate() {
        for preset in [
            RiskPreset::conservative(),
            RiskPreset::balanced(),
            RiskPreset::aggressive(),
            RiskPreset::scalper(),
            RiskPreset::walker(),
        ] {
            assert!(preset.validate().is_ok(), "{preset:?}");
        }
    }

    #[test]
    fn walker_carries_breakeven() {
        let walker = RiskPreset::walker();
        assert_eq!(walker.breakeven_trigger_pips, Some(dec!(20)));
        assert_eq!(walker.breakeven_plus_pips, Some(dec!(2)));
        assert_eq!(walker.trailing_pips, None);
    }

    #[test]
    fn activation_needs_a_trailing_distance() {
        let mut preset = RiskPreset::balanced().with_trailing_activation(dec!(10), dec!(15));
        assert!(preset.validate().is_ok());
        preset.trailing_pips = None;
        assert!(matches!(
            preset.validate(),
            Err(PresetError::OutOfRange {
                field: "trailing_activation_pips",
                ..
            })
        ));
    }

    #[test]
    fn rejects_zero_stop() {
        let preset = RiskPreset::new(dec!(1), Decimal::ZERO, dec!(10));
        assert!(matches!(
            preset.validate(),
            Err(PresetError::OutOfRange { field: "sl_pips", .. })
        ));
    }
}
