//! Market context: quotes, instrument metadata and order snapshots.

mod instrument;
mod order;
mod quote;

pub use instrument::InstrumentSpec;
pub use order::{AccountSummary, OrderSnapshot, OrderType};
pub use quote::Quote;
