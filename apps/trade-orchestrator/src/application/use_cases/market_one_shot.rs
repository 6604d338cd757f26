//! Market One-Shot Use Case
//!
//! `Idle → Sent → Protected → Done`. The market order goes out without
//! stops; SL/TP are written against the actual fill price, then the
//! requested automations are attached under the run's token.

use tokio_util::sync::CancellationToken;

use super::protection::{apply_protection, attach_automations, deviation_points, resolve_volume};
use super::run::{RunServices, RunTracker};
use crate::application::ports::{PlaceOrderRequest, TradingBackend};
use crate::domain::market::OrderType;
use crate::domain::orchestration::{RunKind, RunOutcome, RunState, RunStatus};
use crate::domain::presets::TradingContext;
use crate::error::ExecutionError;

/// Use case for a protected market entry.
pub struct MarketOneShotUseCase<B: ?Sized> {
    services: RunServices<B>,
}

impl<B: TradingBackend + ?Sized + 'static> MarketOneShotUseCase<B> {
    /// Create a new MarketOneShotUseCase.
    pub const fn new(services: RunServices<B>) -> Self {
        Self { services }
    }

    /// Execute the use case.
    ///
    /// Automations started by the run hang off `cancel`.
    pub async fn execute(&self, context: &TradingContext, cancel: &CancellationToken) -> RunOutcome {
        let mut run = RunTracker::start(RunKind::MarketOneShot, &self.services);
        match self.drive(&mut run, context, cancel).await {
            Ok(()) => run.succeed(RunStatus::Done),
            Err(error) => run.fail(error),
        }
    }

    async fn drive(
        &self,
        run: &mut RunTracker,
        context: &TradingContext,
        cancel: &CancellationToken,
    ) -> Result<(), ExecutionError> {
        context.validate()?;
        if context.strategy.entry_type != OrderType::Market {
            return Err(ExecutionError::rejected(
                "market_one_shot",
                "strategy entry type must be market",
            ));
        }
        let guard = &self.services.guard;
        let strategy = &context.strategy;

        // 1. Send
        let volume = resolve_volume(&self.services, context, cancel).await?;
        let quote = guard
            .get_quote(&strategy.symbol, self.services.step_deadline(), cancel)
            .await?;
        let request = PlaceOrderRequest {
            symbol: strategy.symbol.clone(),
            side: strategy.side,
            order_type: OrderType::Market,
            volume,
            price: Some(quote.entry_price(strategy.side)),
            stop_loss: None,
            take_profit: None,
            expiration: None,
            deviation_points: deviation_points(context),
            magic: strategy.magic,
            comment: strategy.comment.clone(),
        };
        let ticket = guard
            .place_order(&request, self.services.step_deadline(), cancel)
            .await?;
        run.set_ticket(ticket);
        run.transition(RunState::Sent)?;
        tracing::info!(run_id = %run.run_id(), %ticket, %volume, side = %strategy.side, "Market order sent");

        // 2. Protect
        let position = guard
            .get_order(ticket, self.services.step_deadline(), cancel)
            .await?
            .ok_or(ExecutionError::OrderNotFound { ticket })?;
        apply_protection(&self.services, context, ticket, position.open_price, cancel).await?;
        run.transition(RunState::Protected)?;

        // 3. Automations
        let subscriptions = attach_automations(&self.services, context, ticket, cancel)?;
        run.add_subscriptions(subscriptions);
        run.transition(RunState::Done)?;
        Ok(())
    }
}
