//! Equity Circuit Breaker
//!
//! Gate and supervisor around an inner run.
//!
//! Before entry the account is checked against [`EquityLimits`]; any breach
//! reports `Blocked` and the inner run never starts. Otherwise the inner run
//! gets a child of the caller's token and equity is polled while the run and
//! the automations it attached are alive. A breach of the floor or a daily
//! limit cancels that token, which stops the run and every automation
//! hanging off it. Open positions are left to their stops.
//!
//! Daily limits are measured from the equity seen at the first check of each
//! UTC day.

use std::future::Future;
use std::sync::Arc;

use chrono::NaiveDate;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::run::{RunServices, RunTracker};
use crate::application::ports::TradingBackend;
use crate::domain::automation::SubscriptionStatus;
use crate::domain::events::EngineEvent;
use crate::domain::guards::{EquityGuard, EquityLimits, EquitySnapshot, GuardDecision};
use crate::domain::orchestration::{RunKind, RunOutcome, RunState, RunStatus};
use crate::domain::presets::TradingContext;
use crate::domain::shared::SubscriptionId;
use crate::domain::sizing::risk_percent_for_volume;
use crate::error::ExecutionError;

/// Equity at the first check of each day, shared by every breaker.
#[derive(Debug, Default)]
pub struct DailyEquity {
    start: Mutex<Option<(NaiveDate, Decimal)>>,
}

impl DailyEquity {
    /// Empty baseline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Opening equity of `day`, recording `equity` if this is its first check.
    pub fn baseline(&self, day: NaiveDate, equity: Decimal) -> Decimal {
        let mut start = self.start.lock();
        match *start {
            Some((recorded, opening)) if recorded == day => opening,
            _ => {
                tracing::debug!(%day, %equity, "Daily equity baseline recorded");
                *start = Some((day, equity));
                equity
            }
        }
    }
}

/// Result of a run behind the breaker.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerOutcome {
    /// The inner run, or the breaker's own run when it blocked entry.
    pub run: RunOutcome,
    /// Decision that stopped the run after entry, if the breaker tripped.
    pub tripped: Option<GuardDecision>,
}

/// Equity limits around an inner run.
pub struct EquityCircuitBreakerUseCase<B: ?Sized> {
    services: RunServices<B>,
    daily: Arc<DailyEquity>,
}

impl<B: TradingBackend + ?Sized + 'static> EquityCircuitBreakerUseCase<B> {
    /// Create a new EquityCircuitBreakerUseCase.
    pub const fn new(services: RunServices<B>, daily: Arc<DailyEquity>) -> Self {
        Self { services, daily }
    }

    /// Evaluate every limit once, including the entry-only ones.
    pub async fn check(
        &self,
        context: &TradingContext,
        limits: &EquityLimits,
        cancel: &CancellationToken,
    ) -> Result<GuardDecision, ExecutionError> {
        let guard = &self.services.guard;
        let account = guard
            .get_account_summary(self.services.step_deadline(), cancel)
            .await?;
        let open_positions = match limits.max_open_positions {
            Some(_) => {
                let orders = guard
                    .get_open_orders(self.services.step_deadline(), cancel)
                    .await?;
                Some(orders.iter().filter(|order| !order.is_pending()).count())
            }
            None => None,
        };
        let trade_risk_percent = limits.risk_per_trade_cap_percent.and_then(|_| match context.strategy.volume {
            Some(volume) => risk_percent_for_volume(
                account.balance,
                context.instrument.normalize_volume(volume),
                context.risk.sl_pips,
                &context.instrument,
            ),
            None => Some(context.risk.risk_percent),
        });

        let snapshot = EquitySnapshot {
            equity: account.equity,
            day_start_equity: self.day_start(account.equity),
            open_positions,
            trade_risk_percent,
        };
        Ok(self.decide(limits, &snapshot))
    }

    /// Run `inner` if every limit holds, and stop it once one breaks.
    ///
    /// `inner` receives the token its run and automations must use. Returns
    /// when the inner run has ended and none of its automations is active,
    /// when the breaker trips, or when `cancel` fires.
    pub async fn execute<F, Fut>(
        &self,
        context: &TradingContext,
        limits: &EquityLimits,
        cancel: &CancellationToken,
        inner: F,
    ) -> BreakerOutcome
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = RunOutcome>,
    {
        let decision = match self.check(context, limits, cancel).await {
            Ok(decision) => decision,
            Err(error) => {
                return BreakerOutcome {
                    run: RunTracker::start(RunKind::EquityGuarded, &self.services).fail(error),
                    tripped: None,
                };
            }
        };
        if !decision.passed {
            let mut run = RunTracker::start(RunKind::EquityGuarded, &self.services);
            tracing::info!(run_id = %run.run_id(), detail = %decision.detail, "Equity breaker blocked entry");
            run.set_guard(decision);
            return BreakerOutcome {
                run: run.end(RunState::Blocked, RunStatus::Blocked, None),
                tripped: None,
            };
        }

        let run_cancel = cancel.child_token();
        let mut poll = tokio::time::interval(self.services.config.equity_poll_interval());
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        poll.reset();
        let mut tripped = None;

        let inner_run = inner(run_cancel.clone());
        tokio::pin!(inner_run);
        let mut outcome = loop {
            tokio::select! {
                outcome = &mut inner_run => break outcome,
                _ = poll.tick(), if tripped.is_none() => {
                    tripped = self.watch(limits, &run_cancel).await;
                }
            }
        };

        if tripped.is_none() {
            while !run_cancel.is_cancelled() && self.any_active(&outcome.subscriptions) {
                tokio::select! {
                    () = run_cancel.cancelled() => break,
                    _ = poll.tick() => {
                        tripped = self.watch(limits, &run_cancel).await;
                    }
                }
            }
        }

        outcome.guard = Some(decision);
        BreakerOutcome { run: outcome, tripped }
    }

    /// One in-run equity check; trips the breaker on a breach.
    async fn watch(&self, limits: &EquityLimits, run_cancel: &CancellationToken) -> Option<GuardDecision> {
        let account = match self
            .services
            .guard
            .get_account_summary(self.services.step_deadline(), run_cancel)
            .await
        {
            Ok(account) => account,
            Err(error) if error.is_cancelled() => return None,
            Err(error) => {
                tracing::warn!(error = %error, "Equity poll failed, retrying next interval");
                return None;
            }
        };
        let snapshot = EquitySnapshot {
            equity: account.equity,
            day_start_equity: self.day_start(account.equity),
            open_positions: None,
            trade_risk_percent: None,
        };
        let decision = self.decide(limits, &snapshot);
        if decision.passed {
            return None;
        }
        tracing::warn!(equity = %account.equity, detail = %decision.detail, "Equity breaker tripped, stopping the run");
        run_cancel.cancel();
        Some(decision)
    }

    fn any_active(&self, subscriptions: &[SubscriptionId]) -> bool {
        subscriptions
            .iter()
            .any(|id| self.services.scheduler.status(*id) == Some(SubscriptionStatus::Active))
    }

    fn day_start(&self, equity: Decimal) -> Decimal {
        self.daily.baseline(self.services.clock.now().date_naive(), equity)
    }

    fn decide(&self, limits: &EquityLimits, snapshot: &EquitySnapshot) -> GuardDecision {
        let decision = EquityGuard::evaluate(limits, snapshot, self.services.clock.now());
        self.services
            .guard
            .events()
            .publish(EngineEvent::GuardEvaluated(decision.clone()));
        decision
    }
}

#[cfg(test)]
mod tests {
    use chrono::Days;
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn baseline_is_kept_for_the_day_and_reset_the_next() {
        let daily = DailyEquity::new();
        let monday = NaiveDate::from_ymd_opt(2026, 10, 12).unwrap();
        assert_eq!(daily.baseline(monday, dec!(10000)), dec!(10000));
        assert_eq!(daily.baseline(monday, dec!(9500)), dec!(10000));
        let tuesday = monday.checked_add_days(Days::new(1)).unwrap();
        assert_eq!(daily.baseline(tuesday, dec!(9500)), dec!(9500));
    }
}
