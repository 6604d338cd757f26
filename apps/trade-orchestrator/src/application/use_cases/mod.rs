//! Application Use Cases
//!
//! Orchestrators drive one trading action from request to terminal state.
//! Each run owns a cancellation token; automations it attaches hang off
//! that token.

mod circuit_breaker;
mod cleanup;
mod guarded;
mod market_one_shot;
mod oco_straddle;
mod pending;
mod pending_bracket;
mod protection;
mod run;

pub use circuit_breaker::{BreakerOutcome, DailyEquity, EquityCircuitBreakerUseCase};
pub use cleanup::{CleanupReport, PanicCloseRequest, PanicCloseUseCase, ProfitFilter};
pub use guarded::{SessionGuardedUseCase, SpreadGuardedUseCase};
pub use market_one_shot::MarketOneShotUseCase;
pub use oco_straddle::{LegRisk, OcoStraddleUseCase, StraddleLegs, StraddleOutcome, StraddleRequest};
pub use pending_bracket::PendingBracketUseCase;
pub use protection::ProtectionLevels;
pub use run::RunServices;
