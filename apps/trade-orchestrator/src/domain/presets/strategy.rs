//! Strategy preset: what to trade and how to tag it.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use super::PresetError;
use crate::domain::market::OrderType;
use crate::domain::shared::{Side, Symbol};

/// Entry parameters for one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyPreset {
    /// Instrument to trade.
    pub symbol: Symbol,
    /// Direction.
    pub side: Side,
    /// Market entry or pending limit/stop entry.
    pub entry_type: OrderType,
    /// Trigger price for pending entries.
    #[serde(default)]
    pub entry_price: Option<Decimal>,
    /// Fixed volume in lots. Sized from account risk when absent.
    #[serde(default)]
    pub volume: Option<Decimal>,
    /// Strategy attribution tag.
    #[serde(default)]
    pub magic: u64,
    /// Accepted slippage for market entries, in pips.
    #[serde(default = "default_deviation_pips")]
    pub deviation_pips: Decimal,
    /// Order comment.
    #[serde(default)]
    pub comment: Option<String>,
}

fn default_deviation_pips() -> Decimal {
    dec!(2.0)
}

impl StrategyPreset {
    /// Market entry on `side`.
    #[must_use]
    pub fn market(symbol: impl Into<Symbol>, side: Side) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            entry_type: OrderType::Market,
            entry_price: None,
            volume: None,
            magic: 0,
            deviation_pips: default_deviation_pips(),
            comment: None,
        }
    }

    /// Pending limit or stop entry at `price`.
    #[must_use]
    pub fn pending(
        symbol: impl Into<Symbol>,
        side: Side,
        entry_type: OrderType,
        price: Decimal,
    ) -> Self {
        Self {
            entry_type,
            entry_price: Some(price),
            ..Self::market(symbol, side)
        }
    }

    /// Set a fixed volume.
    #[must_use]
    pub fn with_volume(mut self, volume: Decimal) -> Self {
        self.volume = Some(volume);
        self
    }

    /// Set the magic tag.
    #[must_use]
    pub fn with_magic(mut self, magic: u64) -> Self {
        self.magic = magic;
        self
    }

    /// Set the order comment.
    #[must_use]
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Check internal consistency.
    pub fn validate(&self) -> Result<(), PresetError> {
        if self.entry_type.is_pending() {
            match self.entry_price {
                None => {
                    return Err(PresetError::MissingEntryPrice {
                        entry_type: self.entry_type,
                    });
                }
                Some(price) if price <= Decimal::ZERO => {
                    return Err(PresetError::OutOfRange {
                        field: "entry_price",
                        expectation: "positive",
                    });
                }
                Some(_) => {}
            }
        }
        if self.volume.is_some_and(|v| v <= Decimal::ZERO) {
            return Err(PresetError::OutOfRange {
                field: "volume",
                expectation: "positive",
            });
        }
        if self.deviation_pips < Decimal::ZERO {
            return Err(PresetError::OutOfRange {
                field: "deviation_pips",
                expectation: "non-negative",
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn market_defaults() {
        let preset = StrategyPreset::market("eurusd", Side::Buy);
        assert_eq!(preset.symbol.as_str(), "EURUSD");
        assert_eq!(preset.deviation_pips, dec!(2.0));
        assert!(preset.validate().is_ok());
    }

    #[test]
    fn pending_requires_price() {
        let mut preset =
            StrategyPreset::pending("EURUSD", Side::Buy, OrderType::Limit, dec!(1.095));
        assert!(preset.validate().is_ok());
        preset.entry_price = None;
        assert_eq!(
            preset.validate(),
            Err(PresetError::MissingEntryPrice {
                entry_type: OrderType::Limit
            })
        );
    }

    #[test]
    fn rejects_non_positive_volume() {
        let preset = StrategyPreset::market("EURUSD", Side::Sell).with_volume(Decimal::ZERO);
        assert!(matches!(
            preset.validate(),
            Err(PresetError::OutOfRange { field: "volume", .. })
        ));
    }

    #[test]
    fn deserializes_with_defaults() {
        let preset: StrategyPreset =
            serde_json::from_str(r#"{"symbol":"gbpusd","side":"sell","entry_type":"market"}"#)
                .unwrap();
        assert_eq!(preset.symbol.as_str(), "GBPUSD");
        assert_eq!(preset.deviation_pips, dec!(2.0));
        assert_eq!(preset.magic, 0);
    }
}
