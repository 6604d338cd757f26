//! Automation Scheduler
//!
//! Runs one background routine per automation subscription:
//!
//! - **Trailing** follows the mid price at a fixed distance. Buffered ticks
//!   are drained and only the newest is evaluated; while a modify is in
//!   flight the newest candidate waits and is sent when the call resolves.
//! - **Breakeven** moves the stop to `entry ± plus` once, after the trigger
//!   distance is reached, then completes.
//!
//! A trailing rule with an activation distance writes nothing until price has
//! moved that far from entry; once activated it stays active.
//!
//! All stop writes go through the [`TicketMutationQueue`], so two routines
//! on one ticket never race and the stop never loosens.
//!
//! At most one active subscription of each kind exists per ticket; starting
//! another supersedes the old one. Routines complete on their own when
//! reconciliation no longer finds the ticket, and ignore ticks that are not
//! newer than the position's open time.
//!
//! A finished subscription leaves the live registry at once; only a bounded
//! history of recent ones stays queryable.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, OptionFuture};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use super::feed_manager::{FeedEvent, FeedManager, FeedSubscription};
use super::mutation_queue::TicketMutationQueue;
use super::rpc_guard::RpcGuard;
use crate::application::ports::{Clock, ModifyOrderRequest, TradingBackend};
use crate::config::AutomationConfig;
use crate::domain::automation::{
    AutomationKind, AutomationParams, AutomationRequest, AutomationSubscription, BreakevenRule,
    SubscriptionStatus, TrailingRule,
};
use crate::domain::events::EngineEvent;
use crate::domain::market::{OrderSnapshot, Quote};
use crate::domain::shared::{Side, SubscriptionId, Ticket};
use crate::error::ExecutionError;

// =============================================================================
// Registry
// =============================================================================

#[derive(Debug)]
struct Entry {
    record: AutomationSubscription,
    cancel: CancellationToken,
}

#[derive(Debug)]
struct Registry {
    live: HashMap<SubscriptionId, Entry>,
    active: HashMap<(Ticket, AutomationKind), SubscriptionId>,
    finished: VecDeque<AutomationSubscription>,
    history: usize,
}

impl Registry {
    fn new(history: usize) -> Self {
        Self {
            live: HashMap::new(),
            active: HashMap::new(),
            finished: VecDeque::with_capacity(history),
            history,
        }
    }

    /// End a live subscription with `status`. Returns the event to publish.
    fn finish(
        &mut self,
        id: SubscriptionId,
        status: SubscriptionStatus,
        reason: &'static str,
    ) -> Option<EngineEvent> {
        let Entry { mut record, cancel } = self.live.remove(&id)?;
        record.status = status;
        cancel.cancel();

        let key = (record.ticket, record.kind());
        if self.active.get(&key) == Some(&id) {
            self.active.remove(&key);
        }

        let event = EngineEvent::AutomationFinished {
            id,
            ticket: record.ticket,
            kind: record.kind(),
            status,
            reason,
        };
        if self.history > 0 {
            if self.finished.len() == self.history {
                self.finished.pop_front();
            }
            self.finished.push_back(record);
        }
        Some(event)
    }

    fn get(&self, id: SubscriptionId) -> Option<&AutomationSubscription> {
        self.live
            .get(&id)
            .map(|entry| &entry.record)
            .or_else(|| self.finished.iter().rev().find(|record| record.id == id))
    }

    fn has_active(&self, ticket: Ticket) -> bool {
        self.active.keys().any(|(t, _)| *t == ticket)
    }
}

// =============================================================================
// Scheduler
// =============================================================================

/// Owns every automation subscription and its background routine.
pub struct AutomationScheduler<B: ?Sized> {
    guard: Arc<RpcGuard<B>>,
    feeds: Arc<FeedManager<B>>,
    mutations: Arc<TicketMutationQueue>,
    registry: Arc<Mutex<Registry>>,
    config: AutomationConfig,
    clock: Arc<dyn Clock>,
    tracker: TaskTracker,
    root: CancellationToken,
}

impl<B: TradingBackend + ?Sized + 'static> AutomationScheduler<B> {
    /// Scheduler writing stops through `guard` and reading prices from `feeds`.
    pub fn new(
        guard: Arc<RpcGuard<B>>,
        feeds: Arc<FeedManager<B>>,
        mutations: Arc<TicketMutationQueue>,
        config: AutomationConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            guard,
            feeds,
            mutations,
            registry: Arc::new(Mutex::new(Registry::new(config.finished_history))),
            config,
            clock,
            tracker: TaskTracker::new(),
            root: CancellationToken::new(),
        }
    }

    /// Start an independent automation.
    pub fn start(&self, request: AutomationRequest) -> Result<SubscriptionId, ExecutionError> {
        self.spawn(request, self.root.child_token())
    }

    /// Start an automation owned by `parent`; cancelling `parent` cancels it.
    pub fn start_with_parent(
        &self,
        request: AutomationRequest,
        parent: &CancellationToken,
    ) -> Result<SubscriptionId, ExecutionError> {
        let cancel = parent.child_token();
        let id = self.spawn(request, cancel.clone())?;

        // Scheduler shutdown reaches run-owned routines too.
        let root = self.root.clone();
        self.tracker.spawn(async move {
            tokio::select! {
                () = root.cancelled() => cancel.cancel(),
                () = cancel.cancelled() => {}
            }
        });
        Ok(id)
    }

    fn spawn(
        &self,
        request: AutomationRequest,
        cancel: CancellationToken,
    ) -> Result<SubscriptionId, ExecutionError> {
        validate_request(&request)?;
        if self.root.is_cancelled() {
            return Err(ExecutionError::Cancelled {
                operation: "start_automation",
            });
        }

        let id = SubscriptionId::generate();
        let kind = request.kind();
        let record = AutomationSubscription {
            id,
            ticket: request.ticket,
            params: request.params,
            status: SubscriptionStatus::Active,
            started_at: self.clock.now(),
        };

        let superseded = {
            let mut registry = self.registry.lock();
            let previous = registry.active.get(&(request.ticket, kind)).copied();
            let superseded = previous
                .and_then(|old| registry.finish(old, SubscriptionStatus::Cancelled, "superseded"));
            registry.live.insert(
                id,
                Entry {
                    record,
                    cancel: cancel.clone(),
                },
            );
            registry.active.insert((request.ticket, kind), id);
            superseded
        };
        if let Some(event) = superseded {
            tracing::info!(ticket = %request.ticket, %kind, "Automation superseded");
            self.guard.events().publish(event);
        }

        tracing::info!(%id, ticket = %request.ticket, %kind, "Automation started");
        self.guard.events().publish(EngineEvent::AutomationStarted {
            id,
            ticket: request.ticket,
            kind,
        });

        let routine = Routine {
            id,
            ticket: request.ticket,
            kind,
            digits: request.digits,
            guard: Arc::clone(&self.guard),
            feeds: Arc::clone(&self.feeds),
            mutations: Arc::clone(&self.mutations),
            config: self.config.clone(),
            cancel,
        };
        let registry = Arc::clone(&self.registry);
        let mutations = Arc::clone(&self.mutations);
        let events = self.guard.events().clone();
        let params = request.params;
        self.tracker.spawn(async move {
            let exit = routine.run(params).await;
            let (event, orphaned) = {
                let mut registry = registry.lock();
                let event = registry.finish(id, exit.status, exit.reason);
                (event, !registry.has_active(routine.ticket))
            };
            if exit.reason == POSITION_CLOSED && orphaned {
                mutations.forget(routine.ticket);
            }
            if let Some(event) = event {
                tracing::info!(%id, status = %exit.status, reason = exit.reason, "Automation finished");
                events.publish(event);
            }
        });

        Ok(id)
    }

    /// Stop a subscription. Returns `false` if it was not active.
    pub fn stop(&self, id: SubscriptionId) -> bool {
        let event = self
            .registry
            .lock()
            .finish(id, SubscriptionStatus::Cancelled, "stopped");
        match event {
            Some(event) => {
                tracing::info!(%id, "Automation stopped");
                self.guard.events().publish(event);
                true
            }
            None => false,
        }
    }

    /// Stop every active subscription on `ticket`. Returns how many were stopped.
    pub fn stop_ticket(&self, ticket: Ticket) -> usize {
        let ids: Vec<SubscriptionId> = self
            .registry
            .lock()
            .active
            .iter()
            .filter(|((t, _), _)| *t == ticket)
            .map(|(_, id)| *id)
            .collect();
        ids.into_iter().filter(|id| self.stop(*id)).count()
    }

    /// Current status of a live or recently finished subscription.
    pub fn status(&self, id: SubscriptionId) -> Option<SubscriptionStatus> {
        self.registry.lock().get(id).map(|record| record.status)
    }

    /// Snapshot of a live or recently finished subscription.
    pub fn subscription(&self, id: SubscriptionId) -> Option<AutomationSubscription> {
        self.registry.lock().get(id).cloned()
    }

    /// Live subscriptions followed by the retained finished ones, oldest first.
    pub fn subscriptions(&self) -> Vec<AutomationSubscription> {
        let registry = self.registry.lock();
        registry
            .live
            .values()
            .map(|entry| entry.record.clone())
            .chain(registry.finished.iter().cloned())
            .collect()
    }

    /// Number of subscriptions whose routine is still running.
    pub fn live_count(&self) -> usize {
        self.registry.lock().live.len()
    }

    /// Active subscriptions on `ticket`.
    pub fn active_for(&self, ticket: Ticket) -> Vec<AutomationSubscription> {
        let registry = self.registry.lock();
        registry
            .active
            .iter()
            .filter(|((t, _), _)| *t == ticket)
            .filter_map(|(_, id)| registry.live.get(id))
            .map(|entry| entry.record.clone())
            .collect()
    }

    /// Cancel every routine and wait for all of them to exit.
    pub async fn shutdown(&self) {
        self.root.cancel();
        self.tracker.close();
        self.tracker.wait().await;
        tracing::info!("Automation scheduler stopped");
    }
}

fn validate_request(request: &AutomationRequest) -> Result<(), ExecutionError> {
    match request.params {
        AutomationParams::Trailing {
            distance,
            step,
            activation,
        } => {
            if distance <= Decimal::ZERO {
                return Err(ExecutionError::rejected(
                    "start_automation",
                    "trailing distance must be positive",
                ));
            }
            if step.is_some_and(|s| s < Decimal::ZERO) {
                return Err(ExecutionError::rejected(
                    "start_automation",
                    "trailing step must not be negative",
                ));
            }
            if activation.is_some_and(|a| a < Decimal::ZERO) {
                return Err(ExecutionError::rejected(
                    "start_automation",
                    "trailing activation must not be negative",
                ));
            }
        }
        AutomationParams::Breakeven { trigger, plus } => {
            if trigger <= Decimal::ZERO || plus < Decimal::ZERO {
                return Err(ExecutionError::rejected(
                    "start_automation",
                    "breakeven trigger must be positive and plus non-negative",
                ));
            }
            if plus >= trigger {
                return Err(ExecutionError::rejected(
                    "start_automation",
                    "breakeven plus must be below the trigger",
                ));
            }
        }
    }
    Ok(())
}

// =============================================================================
// Routines
// =============================================================================

const POSITION_CLOSED: &str = "position_closed";

/// How a routine ended.
struct Exit {
    status: SubscriptionStatus,
    reason: &'static str,
}

impl Exit {
    const fn cancelled() -> Self {
        Self {
            status: SubscriptionStatus::Cancelled,
            reason: "cancelled",
        }
    }

    const fn feed_closed() -> Self {
        Self {
            status: SubscriptionStatus::Cancelled,
            reason: "feed_closed",
        }
    }

    const fn completed(reason: &'static str) -> Self {
        Self {
            status: SubscriptionStatus::Completed,
            reason,
        }
    }
}

type StopWrite = BoxFuture<'static, Result<Option<Decimal>, ExecutionError>>;

struct Routine<B: ?Sized> {
    id: SubscriptionId,
    ticket: Ticket,
    kind: AutomationKind,
    digits: u32,
    guard: Arc<RpcGuard<B>>,
    feeds: Arc<FeedManager<B>>,
    mutations: Arc<TicketMutationQueue>,
    config: AutomationConfig,
    cancel: CancellationToken,
}

impl<B: TradingBackend + ?Sized + 'static> Routine<B> {
    async fn run(&self, params: AutomationParams) -> Exit {
        let position = match self.await_position().await {
            Ok(position) => position,
            Err(exit) => return exit,
        };
        self.mutations
            .observe(self.ticket, position.side, position.stop_loss)
            .await;

        let feed = match self.feeds.subscribe([position.symbol.clone()]) {
            Ok(feed) => feed,
            Err(error) if error.is_cancelled() => return Exit::cancelled(),
            Err(error) => {
                tracing::error!(id = %self.id, error = %error, "Automation could not open feed");
                return Exit::cancelled();
            }
        };

        match params {
            AutomationParams::Trailing {
                distance,
                step,
                activation,
            } => {
                let rule = TrailingRule::new(position.side, distance, step, self.digits)
                    .with_activation(activation);
                self.trail(&position, rule, feed).await
            }
            AutomationParams::Breakeven { trigger, plus } => {
                let rule = BreakevenRule::new(position.side, trigger, plus, self.digits);
                self.breakeven(&position, rule, feed).await
            }
        }
    }

    /// Wait until the ticket is an open position.
    async fn await_position(&self) -> Result<OrderSnapshot, Exit> {
        loop {
            let deadline = Instant::now() + self.config.modify_timeout();
            match self.guard.get_order(self.ticket, deadline, &self.cancel).await {
                Ok(Some(order)) if !order.is_pending() => return Ok(order),
                Ok(Some(_)) => {
                    tracing::debug!(id = %self.id, ticket = %self.ticket, "Ticket still pending");
                }
                Ok(None) => return Err(Exit::completed(POSITION_CLOSED)),
                Err(error) if error.is_cancelled() => return Err(Exit::cancelled()),
                Err(error) => self.skip(&error),
            }
            tokio::select! {
                () = self.cancel.cancelled() => return Err(Exit::cancelled()),
                () = tokio::time::sleep(self.config.reconcile_interval()) => {}
            }
        }
    }

    async fn trail(
        &self,
        position: &OrderSnapshot,
        rule: TrailingRule,
        mut feed: FeedSubscription,
    ) -> Exit {
        let side = position.side;
        let mut reconcile = self.reconcile_timer();
        let mut activated = false;
        let mut inflight: Option<StopWrite> = None;
        let mut inflight_target: Option<Decimal> = None;
        let mut queued: Option<Decimal> = None;
        let mut applied: Option<Decimal> = None;

        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    if let Some(write) = inflight.take() {
                        self.settle_write(write).await;
                    }
                    return Exit::cancelled();
                }
                Some(result) = OptionFuture::from(inflight.as_mut()) => {
                    inflight = None;
                    inflight_target = None;
                    match result {
                        Ok(Some(stop)) => {
                            applied = Some(stop);
                            self.applied(stop);
                        }
                        Ok(None) => {}
                        Err(error) if error.is_cancelled() => return Exit::cancelled(),
                        Err(error) => self.skip(&error),
                    }
                    // Last writer wins: only the newest candidate queued during the call is sent.
                    if let Some(next) = queued.take() {
                        let reference = best(side, self.mutations.snapshot(self.ticket), applied);
                        if reference.is_none_or(|current| side.is_more_protective(next, current)) {
                            inflight = Some(self.write_stop(side, next));
                            inflight_target = Some(next);
                        }
                    }
                }
                _ = reconcile.tick() => {
                    if let Some(exit) = self.reconcile().await {
                        return exit;
                    }
                }
                event = feed.recv() => {
                    let Some(event) = event else {
                        return Exit::feed_closed();
                    };
                    let Some(quote) = latest_tick(event, &mut feed, position.open_time) else {
                        continue;
                    };
                    if !activated {
                        if !rule.is_active(position.open_price, quote.mid()) {
                            continue;
                        }
                        activated = true;
                        tracing::info!(
                            id = %self.id,
                            ticket = %self.ticket,
                            price = %quote.mid(),
                            "Trailing activated"
                        );
                    }
                    let reference = best(
                        side,
                        best(side, self.mutations.snapshot(self.ticket), applied),
                        best(side, inflight_target, queued),
                    );
                    let Some(candidate) = rule.evaluate(quote.mid(), reference) else {
                        continue;
                    };
                    if inflight.is_some() {
                        queued = Some(candidate);
                    } else {
                        inflight = Some(self.write_stop(side, candidate));
                        inflight_target = Some(candidate);
                    }
                }
            }
        }
    }

    async fn breakeven(
        &self,
        position: &OrderSnapshot,
        rule: BreakevenRule,
        mut feed: FeedSubscription,
    ) -> Exit {
        let mut reconcile = self.reconcile_timer();
        let entry = position.open_price;
        let target = rule.target(entry);

        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => return Exit::cancelled(),
                _ = reconcile.tick() => {
                    if let Some(exit) = self.reconcile().await {
                        return exit;
                    }
                }
                event = feed.recv() => {
                    let Some(event) = event else {
                        return Exit::feed_closed();
                    };
                    let Some(quote) = latest_tick(event, &mut feed, position.open_time) else {
                        continue;
                    };
                    if !rule.is_triggered(entry, quote.mid()) {
                        continue;
                    }
                    match self.write_stop(position.side, target).await {
                        Ok(Some(stop)) => {
                            self.applied(stop);
                            return Exit::completed("breakeven_applied");
                        }
                        Ok(None) => {
                            tracing::info!(id = %self.id, ticket = %self.ticket, "Stop already at or beyond breakeven");
                            return Exit::completed("already_protected");
                        }
                        Err(error) if error.is_cancelled() => return Exit::cancelled(),
                        Err(error) => self.skip(&error),
                    }
                }
            }
        }
    }

    /// Queue a stop write on the ticket; resolves to the stop applied, if any.
    ///
    /// A routine cancelled while the write waits for the lease sends
    /// nothing. Once sent, the call runs to completion under its own
    /// deadline so the ledger always learns what the backend applied.
    fn write_stop(&self, side: Side, candidate: Decimal) -> StopWrite {
        let ticket = self.ticket;
        let guard = Arc::clone(&self.guard);
        let mutations = Arc::clone(&self.mutations);
        let routine = self.cancel.clone();
        let timeout = self.config.modify_timeout();
        Box::pin(async move {
            let mut lease = mutations.lease(ticket).await;
            if routine.is_cancelled() {
                return Err(ExecutionError::Cancelled {
                    operation: "modify_order",
                });
            }
            if !lease.improves(side, candidate) {
                return Ok(None);
            }
            let request = ModifyOrderRequest::stop_loss(ticket, candidate);
            guard
                .modify_order(&request, Instant::now() + timeout, &CancellationToken::new())
                .await?;
            lease.record(side, candidate);
            Ok(Some(candidate))
        })
    }

    /// Let a write that was in flight at cancellation resolve.
    async fn settle_write(&self, write: StopWrite) {
        match tokio::time::timeout(self.config.modify_timeout(), write).await {
            Ok(Ok(Some(stop))) => self.applied(stop),
            Ok(Ok(None)) => {}
            Ok(Err(error)) if error.is_cancelled() => {}
            Ok(Err(error)) => self.skip(&error),
            Err(_) => {
                tracing::warn!(id = %self.id, ticket = %self.ticket, "Stop write still pending at exit");
            }
        }
    }

    /// `Some(exit)` when the ticket is gone.
    async fn reconcile(&self) -> Option<Exit> {
        let deadline = Instant::now() + self.config.modify_timeout();
        match self.guard.get_open_tickets(deadline, &self.cancel).await {
            Ok(open) if !open.contains(&self.ticket) => {
                tracing::info!(id = %self.id, ticket = %self.ticket, "Position closed, automation complete");
                Some(Exit::completed(POSITION_CLOSED))
            }
            Ok(_) => None,
            Err(error) if error.is_cancelled() => Some(Exit::cancelled()),
            Err(error) => {
                self.skip(&error);
                None
            }
        }
    }

    fn reconcile_timer(&self) -> tokio::time::Interval {
        let period = self.config.reconcile_interval().max(Duration::from_millis(1));
        let mut timer = tokio::time::interval_at(Instant::now() + period, period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        timer
    }

    fn applied(&self, stop_loss: Decimal) {
        tracing::info!(id = %self.id, ticket = %self.ticket, kind = %self.kind, %stop_loss, "Stop-loss moved");
        self.guard.events().publish(EngineEvent::StopLossModified {
            id: self.id,
            ticket: self.ticket,
            kind: self.kind,
            stop_loss,
        });
    }

    fn skip(&self, error: &ExecutionError) {
        tracing::warn!(id = %self.id, ticket = %self.ticket, error = %error, "Automation tick skipped");
        self.guard.events().publish(EngineEvent::AutomationTickSkipped {
            id: self.id,
            ticket: self.ticket,
            error: error.to_string(),
        });
    }
}

/// The more protective of two optional stops.
fn best(side: Side, a: Option<Decimal>, b: Option<Decimal>) -> Option<Decimal> {
    match (a, b) {
        (Some(a), Some(b)) => Some(if side.is_more_protective(b, a) { b } else { a }),
        (a, b) => a.or(b),
    }
}

/// Newest tick among `first` and everything already buffered behind it.
///
/// Ticks stamped at or before `opened` predate the position and are dropped.
fn latest_tick(
    first: FeedEvent,
    feed: &mut FeedSubscription,
    opened: DateTime<Utc>,
) -> Option<Quote> {
    let mut latest = match first {
        FeedEvent::Tick(quote) => Some(quote),
        FeedEvent::Resubscribed | FeedEvent::Unavailable(_) => None,
    };
    while let Some(event) = feed.try_recv() {
        if let FeedEvent::Tick(quote) = event {
            latest = Some(quote);
        }
    }
    latest.filter(|quote| quote.time > opened)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn best_picks_most_protective() {
        assert_eq!(best(Side::Buy, Some(dec!(1.1)), Some(dec!(1.2))), Some(dec!(1.2)));
        assert_eq!(best(Side::Sell, Some(dec!(1.1)), Some(dec!(1.2))), Some(dec!(1.1)));
        assert_eq!(best(Side::Buy, None, Some(dec!(1.2))), Some(dec!(1.2)));
        assert_eq!(best(Side::Buy, None, None), None);
    }

    #[test]
    fn invalid_requests_are_rejected() {
        let ticket = Ticket::new(1);
        assert!(validate_request(&AutomationRequest::trailing(ticket, dec!(0), None, 5)).is_err());
        assert!(
            validate_request(&AutomationRequest::breakeven(ticket, dec!(0.001), dec!(0.002), 5))
                .is_err()
        );
        assert!(
            validate_request(&AutomationRequest::breakeven(ticket, dec!(0.002), dec!(0.0002), 5))
                .is_ok()
        );
    }

    fn insert_trailing(registry: &mut Registry, ticket: Ticket) -> SubscriptionId {
        let id = SubscriptionId::generate();
        registry.live.insert(
            id,
            Entry {
                record: AutomationSubscription {
                    id,
                    ticket,
                    params: AutomationParams::Trailing {
                        distance: dec!(0.0015),
                        step: None,
                        activation: None,
                    },
                    status: SubscriptionStatus::Active,
                    started_at: Utc::now(),
                },
                cancel: CancellationToken::new(),
            },
        );
        registry.active.insert((ticket, AutomationKind::Trailing), id);
        id
    }

    #[test]
    fn registry_finishes_once() {
        let mut registry = Registry::new(8);
        let ticket = Ticket::new(7);
        let id = insert_trailing(&mut registry, ticket);
        let cancel = registry.live[&id].cancel.clone();

        assert!(registry.finish(id, SubscriptionStatus::Cancelled, "stopped").is_some());
        assert!(registry.finish(id, SubscriptionStatus::Completed, POSITION_CLOSED).is_none());
        assert!(!registry.has_active(ticket));
        assert!(registry.live.is_empty());
        assert_eq!(registry.get(id).map(|r| r.status), Some(SubscriptionStatus::Cancelled));
        assert!(cancel.is_cancelled());
    }

    #[test]
    fn finished_history_is_bounded() {
        let mut registry = Registry::new(2);
        let ids: Vec<SubscriptionId> = (1..=3)
            .map(|n| {
                let id = insert_trailing(&mut registry, Ticket::new(n));
                registry.finish(id, SubscriptionStatus::Completed, POSITION_CLOSED);
                id
            })
            .collect();

        assert!(registry.live.is_empty());
        assert_eq!(registry.finished.len(), 2);
        assert!(registry.get(ids[0]).is_none());
        assert!(registry.get(ids[1]).is_some());
        assert!(registry.get(ids[2]).is_some());
    }

    #[test]
    fn zero_history_keeps_nothing() {
        let mut registry = Registry::new(0);
        let id = insert_trailing(&mut registry, Ticket::new(1));
        assert!(registry.finish(id, SubscriptionStatus::Cancelled, "stopped").is_some());
        assert!(registry.get(id).is_none());
    }
}
