#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::needless_collect,
        clippy::option_if_let_else,
        clippy::default_trait_access,
        clippy::items_after_statements,
        clippy::or_fun_call
    )
)]

//! Trade Orchestrator - Rust Core Library
//!
//! Lifecycle core for trading actions against a remote trading terminal:
//! guarded backend calls, shared live feeds, background stop-loss
//! automations and cancellable entry orchestrators.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Pure trading rules
//!   - `market`: Quotes, order snapshots, instrument pip arithmetic
//!   - `presets`: Strategy and risk presets, trading context
//!   - `guards`: Spread, session and equity evaluators
//!   - `automation`: Trailing and breakeven rules, subscriptions
//!   - `orchestration`: Run state machines and outcomes
//!   - `events`: Typed engine events
//!
//! - **Application**: Ports, services and use cases
//!   - `ports`: `TradingBackend`, `Clock`
//!   - `services`: `RpcGuard`, `FeedManager`, `AutomationScheduler`,
//!     `TicketMutationQueue`, `SessionGate`
//!   - `use_cases`: Market one-shot, pending bracket, OCO straddle, spread,
//!     session and equity wrappers, panic close
//!
//! - **Infrastructure**: Adapters
//!   - `paper`: In-memory backend with scripted faults
//!   - `broadcast`: Engine event bus
//!   - `clock`: System and tokio-driven clocks
//!   - `metrics`: Counters fed from engine events
//!   - `container`: Dependency injection container
//!
//! # Data Flow
//!
//! ```text
//! Use case ──► RpcGuard ──► TradingBackend
//!    │            ▲
//!    ▼            │
//! Scheduler ──► FeedManager ──► one stream per symbol set
//!    │
//!    └──► TicketMutationQueue ──► modify_order (stop-loss only tightens)
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Pure trading rules with no I/O.
pub mod domain;

/// Application layer - Ports, services and use cases.
pub mod application;

/// Infrastructure layer - Adapters and wiring.
pub mod infrastructure;

/// Configuration loading and validation.
pub mod config;

/// Error taxonomy.
pub mod error;

/// Tracing and event logging setup.
pub mod telemetry;

// =============================================================================
// Re-exports
// =============================================================================

// Domain re-exports
pub use domain::automation::{AutomationKind, AutomationRequest, SubscriptionStatus};
pub use domain::events::EngineEvent;
pub use domain::guards::{EquityBreach, EquityLimits, GuardDecision, SessionSchedule, SpreadGuard};
pub use domain::market::{AccountSummary, InstrumentSpec, OrderSnapshot, OrderType, Quote};
pub use domain::orchestration::{RunKind, RunOutcome, RunState, RunStatus};
pub use domain::presets::{RiskPreset, StrategyPreset, TradingContext};
pub use domain::shared::{RunId, Side, SubscriptionId, Symbol, Ticket};

// Application re-exports
pub use application::ports::{BackendError, Clock, TradingBackend};
pub use application::services::{AutomationScheduler, FeedManager, RpcGuard, SessionGate};
pub use application::use_cases::{
    BreakerOutcome, CleanupReport, EquityCircuitBreakerUseCase, LegRisk, MarketOneShotUseCase,
    OcoStraddleUseCase, PanicCloseRequest, PanicCloseUseCase, PendingBracketUseCase,
    SessionGuardedUseCase, SpreadGuardedUseCase, StraddleOutcome, StraddleRequest,
};

// Infrastructure re-exports
pub use infrastructure::broadcast::EventBus;
pub use infrastructure::clock::{SystemClock, TokioClock};
pub use infrastructure::container::Container;
pub use infrastructure::paper::PaperBackend;

pub use config::{Config, ConfigError, load_config};
pub use error::{ErrorClass, ExecutionError};
