//! Pre-trade guards: spread, trading-session and equity gates.

mod decision;
mod equity;
mod session;
mod spread;

pub use decision::{GuardDecision, GuardKind};
pub use equity::{EquityBreach, EquityGuard, EquityLimits, EquitySnapshot};
pub use session::{
    RolloverBlackout, SessionDecision, SessionError, SessionPreset, SessionSchedule,
    SessionWindow, WindowMode,
};
pub use spread::SpreadGuard;
