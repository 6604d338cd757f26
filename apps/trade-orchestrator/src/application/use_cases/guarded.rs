//! Guarded Wrappers
//!
//! Decorators that gate an inner orchestrator invocation:
//!
//! - [`SpreadGuardedUseCase`] reads one quote and runs the inner action only
//!   if the spread is within the limit, otherwise reports `Blocked`.
//! - [`SessionGuardedUseCase`] waits for a session window and runs the inner
//!   action when it opens, or reports `Expired` once the deadline passes.
//!
//! When the inner action runs, its outcome is returned with the guard
//! decision attached; the wrapper only reports a run of its own when it
//! stops the inner action from running.

use std::future::Future;
use std::sync::Arc;

use rust_decimal::Decimal;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::run::{RunServices, RunTracker};
use crate::application::ports::TradingBackend;
use crate::application::services::{GateOutcome, SessionGate};
use crate::domain::events::EngineEvent;
use crate::domain::guards::{GuardDecision, SessionSchedule, SpreadGuard};
use crate::domain::orchestration::{RunKind, RunOutcome, RunState, RunStatus};
use crate::domain::presets::TradingContext;
use crate::error::ExecutionError;

/// Spread gate around an inner run.
pub struct SpreadGuardedUseCase<B: ?Sized> {
    services: RunServices<B>,
}

impl<B: TradingBackend + ?Sized + 'static> SpreadGuardedUseCase<B> {
    /// Create a new SpreadGuardedUseCase.
    pub const fn new(services: RunServices<B>) -> Self {
        Self { services }
    }

    /// Evaluate the spread guard once against a fresh quote.
    pub async fn check(
        &self,
        context: &TradingContext,
        max_spread_pips: Decimal,
        cancel: &CancellationToken,
    ) -> Result<GuardDecision, ExecutionError> {
        let quote = self
            .services
            .guard
            .get_quote(&context.strategy.symbol, self.services.step_deadline(), cancel)
            .await?;
        let decision = SpreadGuard::evaluate(
            &quote,
            &context.instrument,
            max_spread_pips,
            self.services.clock.now(),
        );
        self.services
            .guard
            .events()
            .publish(EngineEvent::GuardEvaluated(decision.clone()));
        Ok(decision)
    }

    /// Run `inner` only if the spread is at most `max_spread_pips` right now.
    pub async fn execute<F, Fut>(
        &self,
        context: &TradingContext,
        max_spread_pips: Decimal,
        cancel: &CancellationToken,
        inner: F,
    ) -> RunOutcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = RunOutcome>,
    {
        let decision = match self.check(context, max_spread_pips, cancel).await {
            Ok(decision) => decision,
            Err(error) => return RunTracker::start(RunKind::SpreadGuarded, &self.services).fail(error),
        };

        if !decision.passed {
            let mut run = RunTracker::start(RunKind::SpreadGuarded, &self.services);
            tracing::info!(
                run_id = %run.run_id(),
                symbol = %context.strategy.symbol,
                detail = %decision.detail,
                "Spread guard blocked entry"
            );
            run.set_guard(decision);
            return run.end(RunState::Blocked, RunStatus::Blocked, None);
        }

        let mut outcome = inner().await;
        outcome.guard = Some(decision);
        outcome
    }
}

/// Session gate around an inner run.
pub struct SessionGuardedUseCase<B: ?Sized> {
    services: RunServices<B>,
    gate: Arc<SessionGate>,
}

impl<B: TradingBackend + ?Sized + 'static> SessionGuardedUseCase<B> {
    /// Create a new SessionGuardedUseCase.
    pub const fn new(services: RunServices<B>, gate: Arc<SessionGate>) -> Self {
        Self { services, gate }
    }

    /// Wait for `schedule` to open, then run `inner`; `Expired` if
    /// `deadline` passes first.
    pub async fn execute<F, Fut>(
        &self,
        schedule: &SessionSchedule,
        deadline: Instant,
        cancel: &CancellationToken,
        inner: F,
    ) -> RunOutcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = RunOutcome>,
    {
        match self.gate.wait_until_open(schedule, deadline, cancel).await {
            GateOutcome::Open(decision) => {
                let mut outcome = inner().await;
                outcome.guard = Some(decision.to_guard_decision());
                outcome
            }
            GateOutcome::Expired(decision) => {
                let mut run = RunTracker::start(RunKind::SessionGuarded, &self.services);
                tracing::info!(
                    run_id = %run.run_id(),
                    reason = decision.reason(),
                    "Session did not open before the deadline"
                );
                run.set_guard(decision.to_guard_decision());
                run.end(RunState::Expired, RunStatus::Expired, None)
            }
            GateOutcome::Cancelled => RunTracker::start(RunKind::SessionGuarded, &self.services)
                .fail(ExecutionError::Cancelled {
                    operation: "session_wait",
                }),
        }
    }
}
