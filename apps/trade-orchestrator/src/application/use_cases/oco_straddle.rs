//! OCO Straddle Use Case
//!
//! `Idle → Placed → {Filled | TimedOut} → {Protected | Cancelled}`.
//!
//! A buy stop above and a sell stop below the current mid are placed bare.
//! The first leg seen filled wins:
//!
//! - the other leg is deleted exactly once, through `delete_order`;
//! - the winner gets SL/TP anchored at its fill and the requested automations;
//! - if the other leg filled before its delete, the backend refuses the
//!   delete and that position is protected as well.
//!
//! When neither leg fills before the deadline both are deleted and the run
//! reports `TimedOut`. A leg that fills during that sweep takes the fill path.

use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::pending::{Waited, await_fill, delete_unless_filled, discard};
use super::protection::{apply_protection, attach_automations, deviation_points, resolve_volume};
use super::run::{RunServices, RunTracker};
use crate::application::ports::{PlaceOrderRequest, TradingBackend};
use crate::domain::market::{OrderSnapshot, OrderType};
use crate::domain::orchestration::{RunKind, RunOutcome, RunState, RunStatus};
use crate::domain::presets::TradingContext;
use crate::domain::shared::{Side, SubscriptionId, Ticket};
use crate::error::ExecutionError;

/// Volume of each leg relative to the run's sized volume.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LegRisk {
    /// Each leg carries the full volume.
    #[default]
    Full,
    /// Each leg carries half, so the worst case of both filling risks the full amount.
    Half,
}

/// Straddle parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StraddleRequest {
    /// Distance from the mid to each stop entry.
    pub offset_pips: Decimal,
    /// Leg volume.
    #[serde(default)]
    pub leg_risk: LegRisk,
}

impl StraddleRequest {
    /// Legs `offset_pips` either side of the mid, full volume each.
    #[must_use]
    pub const fn new(offset_pips: Decimal) -> Self {
        Self {
            offset_pips,
            leg_risk: LegRisk::Full,
        }
    }

    /// Set the leg volume mode.
    #[must_use]
    pub const fn with_leg_risk(mut self, leg_risk: LegRisk) -> Self {
        self.leg_risk = leg_risk;
        self
    }
}

/// Tickets of both legs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StraddleLegs {
    /// Buy stop above the mid.
    pub buy: Ticket,
    /// Sell stop below the mid.
    pub sell: Ticket,
}

impl StraddleLegs {
    const fn other(self, ticket: Ticket) -> Ticket {
        if ticket.value() == self.buy.value() { self.sell } else { self.buy }
    }
}

/// Result of a straddle run.
#[derive(Debug, Clone, Serialize)]
pub struct StraddleOutcome {
    /// Run record; its ticket is the winning leg.
    pub run: RunOutcome,
    /// Both legs, once placed.
    pub legs: Option<StraddleLegs>,
    /// Legs that became positions, winner first.
    pub filled: Vec<Ticket>,
}

/// Use case for a one-cancels-other breakout straddle.
pub struct OcoStraddleUseCase<B: ?Sized> {
    services: RunServices<B>,
}

impl<B: TradingBackend + ?Sized + 'static> OcoStraddleUseCase<B> {
    /// Create a new OcoStraddleUseCase.
    pub const fn new(services: RunServices<B>) -> Self {
        Self { services }
    }

    /// Execute with the configured pending timeout.
    ///
    /// The strategy's side, entry type and entry price are ignored; each
    /// leg sets its own.
    pub async fn execute(
        &self,
        context: &TradingContext,
        request: StraddleRequest,
        cancel: &CancellationToken,
    ) -> StraddleOutcome {
        self.execute_with_timeout(context, request, self.services.config.pending_timeout(), cancel)
            .await
    }

    /// Execute, deleting both legs if neither fills within `timeout`.
    pub async fn execute_with_timeout(
        &self,
        context: &TradingContext,
        request: StraddleRequest,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> StraddleOutcome {
        let mut run = RunTracker::start(RunKind::OcoStraddle, &self.services);

        let (legs, prices) = match self.place(&mut run, context, request, cancel).await {
            Ok(placed) => placed,
            Err(error) => {
                return StraddleOutcome {
                    run: run.fail(error),
                    legs: None,
                    filled: Vec::new(),
                };
            }
        };
        let finish = move |run: RunOutcome, filled: Vec<Ticket>| StraddleOutcome {
            run,
            legs: Some(legs),
            filled,
        };
        let deadline = Instant::now() + timeout;

        let (winner, loser) = match await_fill(&self.services, &[legs.buy, legs.sell], deadline, cancel).await {
            Ok(Waited::Filled(order)) => {
                let other = legs.other(order.ticket);
                tracing::info!(ticket = %order.ticket, %other, "Straddle leg filled, deleting the other");
                let loser = delete_unless_filled(&self.services, other, cancel).await;
                (order, loser)
            }
            Ok(Waited::Deadline) => {
                let buy = delete_unless_filled(&self.services, legs.buy, cancel).await;
                let sell = delete_unless_filled(&self.services, legs.sell, cancel).await;
                match (buy, sell) {
                    (Ok(None), Ok(None)) => {
                        tracing::info!(buy = %legs.buy, sell = %legs.sell, "Straddle timed out");
                        if let Err(error) = run.transition(RunState::TimedOut) {
                            return finish(run.fail(error), Vec::new());
                        }
                        return finish(run.end(RunState::Cancelled, RunStatus::TimedOut, None), Vec::new());
                    }
                    (Ok(Some(order)), other) | (other, Ok(Some(order))) => (order, other),
                    (Err(error), _) | (_, Err(error)) => {
                        return finish(self.abandon(run, legs, error).await, Vec::new());
                    }
                }
            }
            Err(error) => return finish(self.abandon(run, legs, error).await, Vec::new()),
        };

        let loser_ticket = legs.other(winner.ticket);
        let mut filled = vec![winner.ticket];
        run.set_ticket(winner.ticket);
        if let Err(error) = run.transition(RunState::Filled) {
            return finish(run.fail(error), filled);
        }
        let protected = self.protect_leg(context, &winner, prices, cancel).await;
        let subscriptions = match protected {
            Ok(ids) => ids,
            Err(error) => {
                if loser.as_ref().is_err_and(ExecutionError::is_cancelled) {
                    discard(&self.services, loser_ticket).await;
                }
                return finish(run.fail(error), filled);
            }
        };
        run.add_subscriptions(subscriptions);
        if let Err(error) = run.transition(RunState::Protected) {
            return finish(run.fail(error), filled);
        }

        match loser {
            Ok(None) => finish(run.succeed(RunStatus::Protected), filled),
            Ok(Some(second)) => {
                tracing::warn!(ticket = %second.ticket, "Both straddle legs filled, protecting the second");
                filled.push(second.ticket);
                match self.protect_leg(context, &second, prices, cancel).await {
                    Ok(ids) => {
                        run.add_subscriptions(ids);
                        finish(run.succeed(RunStatus::Protected), filled)
                    }
                    Err(error) => finish(run.fail(error), filled),
                }
            }
            Err(error) => {
                if error.is_cancelled() {
                    discard(&self.services, loser_ticket).await;
                }
                finish(run.fail(error), filled)
            }
        }
    }

    async fn place(
        &self,
        run: &mut RunTracker,
        context: &TradingContext,
        request: StraddleRequest,
        cancel: &CancellationToken,
    ) -> Result<(StraddleLegs, LegPrices), ExecutionError> {
        context.validate()?;
        if request.offset_pips <= Decimal::ZERO {
            return Err(ExecutionError::rejected("oco_straddle", "offset must be positive"));
        }
        let guard = &self.services.guard;
        let instrument = &context.instrument;

        let quote = guard
            .get_quote(&context.strategy.symbol, self.services.step_deadline(), cancel)
            .await?;
        let offset = instrument.pips_to_price(request.offset_pips);
        let prices = LegPrices {
            buy: instrument.normalize_price(quote.mid() + offset),
            sell: instrument.normalize_price(quote.mid() - offset),
        };
        let mut volume = resolve_volume(&self.services, context, cancel).await?;
        if request.leg_risk == LegRisk::Half {
            volume = instrument.normalize_volume(volume / Decimal::TWO);
        }

        let buy = self.place_leg(context, Side::Buy, prices.buy, volume, cancel).await?;
        let sell = match self.place_leg(context, Side::Sell, prices.sell, volume, cancel).await {
            Ok(ticket) => ticket,
            Err(error) => {
                discard(&self.services, buy).await;
                return Err(error);
            }
        };
        let legs = StraddleLegs { buy, sell };
        run.transition(RunState::Placed)?;
        tracing::info!(
            run_id = %run.run_id(),
            %buy,
            %sell,
            buy_price = %prices.buy,
            sell_price = %prices.sell,
            %volume,
            "Straddle placed"
        );
        Ok((legs, prices))
    }

    async fn place_leg(
        &self,
        context: &TradingContext,
        side: Side,
        price: Decimal,
        volume: Decimal,
        cancel: &CancellationToken,
    ) -> Result<Ticket, ExecutionError> {
        let strategy = &context.strategy;
        let request = PlaceOrderRequest {
            symbol: strategy.symbol.clone(),
            side,
            order_type: OrderType::Stop,
            volume,
            price: Some(price),
            stop_loss: None,
            take_profit: None,
            expiration: None,
            deviation_points: deviation_points(context),
            magic: strategy.magic,
            comment: strategy.comment.clone(),
        };
        self.services
            .guard
            .place_order(&request, self.services.step_deadline(), cancel)
            .await
    }

    /// SL/TP and automations for one filled leg.
    async fn protect_leg(
        &self,
        context: &TradingContext,
        order: &OrderSnapshot,
        prices: LegPrices,
        cancel: &CancellationToken,
    ) -> Result<Vec<SubscriptionId>, ExecutionError> {
        let leg = prices.context_for(context, order.side);
        tracing::info!(ticket = %order.ticket, side = %order.side, fill_price = %order.open_price, "Straddle leg filled");
        apply_protection(&self.services, &leg, order.ticket, order.open_price, cancel).await?;
        attach_automations(&self.services, &leg, order.ticket, cancel)
    }

    /// End a run that stopped while both legs were pending.
    async fn abandon(&self, run: RunTracker, legs: StraddleLegs, error: ExecutionError) -> RunOutcome {
        if error.is_cancelled() {
            discard(&self.services, legs.buy).await;
            discard(&self.services, legs.sell).await;
        }
        run.fail(error)
    }
}

/// Entry prices of both legs.
#[derive(Debug, Clone, Copy)]
struct LegPrices {
    buy: Decimal,
    sell: Decimal,
}

impl LegPrices {
    /// The run's context as seen by the leg on `side`.
    fn context_for(self, context: &TradingContext, side: Side) -> TradingContext {
        let mut leg = context.clone();
        leg.strategy.side = side;
        leg.strategy.entry_type = OrderType::Stop;
        leg.strategy.entry_price = Some(match side {
            Side::Buy => self.buy,
            Side::Sell => self.sell,
        });
        leg
    }
}
