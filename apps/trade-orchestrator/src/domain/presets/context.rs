//! Explicit per-run trading context.

use serde::{Deserialize, Serialize};

use super::{PresetError, RiskPreset, StrategyPreset};
use crate::domain::market::InstrumentSpec;

/// Everything a run needs to know about what it trades.
///
/// Passed by value into every orchestrator and automation call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradingContext {
    /// Entry parameters.
    pub strategy: StrategyPreset,
    /// Protection parameters.
    pub risk: RiskPreset,
    /// Instrument metadata for pip and volume arithmetic.
    pub instrument: InstrumentSpec,
}

impl TradingContext {
    /// Bundle presets with instrument metadata.
    #[must_use]
    pub const fn new(strategy: StrategyPreset, risk: RiskPreset, instrument: InstrumentSpec) -> Self {
        Self {
            strategy,
            risk,
            instrument,
        }
    }

    /// Validate presets and their agreement with the instrument.
    pub fn validate(&self) -> Result<(), PresetError> {
        if self.strategy.symbol != self.instrument.symbol {
            return Err(PresetError::SymbolMismatch {
                strategy: self.strategy.symbol.to_string(),
                instrument: self.instrument.symbol.to_string(),
            });
        }
        self.strategy.validate()?;
        self.risk.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::shared::Side;

    #[test]
    fn symbol_mismatch_is_rejected() {
        let ctx = TradingContext::new(
            StrategyPreset::market("EURUSD", Side::Buy),
            RiskPreset::balanced(),
            InstrumentSpec::fx_major("GBPUSD"),
        );
        assert!(matches!(
            ctx.validate(),
            Err(PresetError::SymbolMismatch { .. })
        ));
    }
}
