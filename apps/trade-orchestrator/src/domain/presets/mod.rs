//! Run configuration value objects.
//!
//! Presets are immutable; a run receives them bundled in a
//! [`TradingContext`] instead of reading ambient defaults, so concurrent
//! runs never observe each other's symbol, magic or deviation.

mod context;
mod risk;
mod strategy;

pub use context::TradingContext;
pub use risk::RiskPreset;
pub use strategy::StrategyPreset;

use thiserror::Error;

/// Preset validation failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PresetError {
    /// A pending entry was requested without an entry price.
    #[error("{entry_type:?} entry requires an entry price")]
    MissingEntryPrice {
        /// Requested entry type.
        entry_type: crate::domain::market::OrderType,
    },

    /// A numeric field is out of range.
    #[error("{field} must be {expectation}")]
    OutOfRange {
        /// Offending field.
        field: &'static str,
        /// What the field must satisfy.
        expectation: &'static str,
    },

    /// Strategy and instrument disagree on the symbol.
    #[error("strategy symbol {strategy} does not match instrument {instrument}")]
    SymbolMismatch {
        /// Symbol on the strategy preset.
        strategy: String,
        /// Symbol on the instrument spec.
        instrument: String,
    },
}
