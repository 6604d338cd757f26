//! Pending Bracket Use Case
//!
//! `Idle → Placed → {Filled | TimedOut} → {Protected | Cancelled}`.
//!
//! The pending order is placed bare and polled until it fills or the
//! deadline passes. Fill and timeout are mutually exclusive:
//!
//! - a fill attaches SL/TP (anchored at the fill price) and automations once;
//! - at the deadline the order is re-read before it is deleted, and a fill
//!   seen then takes the fill path;
//! - deletion goes through `delete_order`, which the backend refuses once
//!   the ticket has filled, so a timeout never closes a live position;
//! - a refused delete is followed by one more read, and only a fill found
//!   there is protected;
//! - nothing is protected after a successful delete.

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::pending::{Waited, await_fill, delete_unless_filled, discard};
use super::protection::{apply_protection, attach_automations, deviation_points, resolve_volume};
use super::run::{RunServices, RunTracker};
use crate::application::ports::{PlaceOrderRequest, TradingBackend};
use crate::domain::market::OrderSnapshot;
use crate::domain::orchestration::{RunKind, RunOutcome, RunState, RunStatus};
use crate::domain::presets::TradingContext;
use crate::domain::shared::Ticket;
use crate::error::ExecutionError;

/// Use case for a pending entry with deferred protection.
pub struct PendingBracketUseCase<B: ?Sized> {
    services: RunServices<B>,
}

impl<B: TradingBackend + ?Sized + 'static> PendingBracketUseCase<B> {
    /// Create a new PendingBracketUseCase.
    pub const fn new(services: RunServices<B>) -> Self {
        Self { services }
    }

    /// Execute with the configured pending timeout.
    pub async fn execute(&self, context: &TradingContext, cancel: &CancellationToken) -> RunOutcome {
        self.execute_with_timeout(context, self.services.config.pending_timeout(), cancel)
            .await
    }

    /// Execute, deleting the order if it has not filled within `timeout`.
    pub async fn execute_with_timeout(
        &self,
        context: &TradingContext,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> RunOutcome {
        let mut run = RunTracker::start(RunKind::PendingBracket, &self.services);

        let ticket = match self.place(&mut run, context, cancel).await {
            Ok(ticket) => ticket,
            Err(error) => return run.fail(error),
        };
        let deadline = Instant::now() + timeout;

        let filled = match await_fill(&self.services, &[ticket], deadline, cancel).await {
            Ok(Waited::Filled(order)) => order,
            Ok(Waited::Deadline) => match delete_unless_filled(&self.services, ticket, cancel).await {
                Ok(Some(order)) => order,
                Ok(None) => {
                    tracing::info!(%ticket, "Pending order timed out");
                    if let Err(error) = run.transition(RunState::TimedOut) {
                        return run.fail(error);
                    }
                    return run.end(RunState::Cancelled, RunStatus::TimedOut, None);
                }
                Err(error) => return self.abandon(run, ticket, error).await,
            },
            Err(error) => return self.abandon(run, ticket, error).await,
        };

        match self.protect(&mut run, context, &filled, cancel).await {
            Ok(()) => run.succeed(RunStatus::Protected),
            Err(error) => run.fail(error),
        }
    }

    async fn place(
        &self,
        run: &mut RunTracker,
        context: &TradingContext,
        cancel: &CancellationToken,
    ) -> Result<Ticket, ExecutionError> {
        context.validate()?;
        let strategy = &context.strategy;
        if !strategy.entry_type.is_pending() {
            return Err(ExecutionError::rejected(
                "pending_bracket",
                "strategy entry type must be limit or stop",
            ));
        }
        let entry_price = strategy.entry_price.ok_or_else(|| {
            ExecutionError::rejected("pending_bracket", "pending entry requires an entry price")
        })?;

        let volume = resolve_volume(&self.services, context, cancel).await?;
        let request = PlaceOrderRequest {
            symbol: strategy.symbol.clone(),
            side: strategy.side,
            order_type: strategy.entry_type,
            volume,
            price: Some(context.instrument.normalize_price(entry_price)),
            stop_loss: None,
            take_profit: None,
            expiration: None,
            deviation_points: deviation_points(context),
            magic: strategy.magic,
            comment: strategy.comment.clone(),
        };
        let ticket = self
            .services
            .guard
            .place_order(&request, self.services.step_deadline(), cancel)
            .await?;
        run.set_ticket(ticket);
        run.transition(RunState::Placed)?;
        tracing::info!(
            run_id = %run.run_id(),
            %ticket,
            order_type = ?strategy.entry_type,
            %entry_price,
            "Pending order placed"
        );
        Ok(ticket)
    }

    async fn protect(
        &self,
        run: &mut RunTracker,
        context: &TradingContext,
        order: &OrderSnapshot,
        cancel: &CancellationToken,
    ) -> Result<(), ExecutionError> {
        run.transition(RunState::Filled)?;
        tracing::info!(ticket = %order.ticket, fill_price = %order.open_price, "Pending order filled");
        apply_protection(&self.services, context, order.ticket, order.open_price, cancel).await?;
        let subscriptions = attach_automations(&self.services, context, order.ticket, cancel)?;
        run.add_subscriptions(subscriptions);
        run.transition(RunState::Protected)?;
        Ok(())
    }

    /// End a run that stopped while its order was still pending.
    ///
    /// On cancellation the order is deleted best-effort before reporting.
    async fn abandon(&self, run: RunTracker, ticket: Ticket, error: ExecutionError) -> RunOutcome {
        if error.is_cancelled() {
            discard(&self.services, ticket).await;
        }
        run.fail(error)
    }
}
