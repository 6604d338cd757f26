//! Dependency Injection Container
//!
//! Builds the long-lived services from [`Config`] around one backend and
//! hands out use cases wired to them.

use std::sync::Arc;

use crate::application::ports::{Clock, TradingBackend};
use crate::application::services::{
    AutomationScheduler, FeedManager, RetryPolicy, RpcGuard, SessionGate, TicketMutationQueue,
};
use crate::application::use_cases::{
    DailyEquity, EquityCircuitBreakerUseCase, MarketOneShotUseCase, OcoStraddleUseCase,
    PanicCloseUseCase, PendingBracketUseCase, RunServices, SessionGuardedUseCase,
    SpreadGuardedUseCase,
};
use crate::config::Config;
use crate::infrastructure::broadcast::{DEFAULT_EVENT_CAPACITY, EventBus};

/// Dependency injection container.
///
/// One container per backend session. Use cases created from it share the
/// guard, feeds, scheduler and event bus.
pub struct Container<B: ?Sized> {
    events: EventBus,
    guard: Arc<RpcGuard<B>>,
    feeds: Arc<FeedManager<B>>,
    mutations: Arc<TicketMutationQueue>,
    scheduler: Arc<AutomationScheduler<B>>,
    session_gate: Arc<SessionGate>,
    daily_equity: Arc<DailyEquity>,
    clock: Arc<dyn Clock>,
    config: Config,
}

impl<B: TradingBackend + ?Sized + 'static> Container<B> {
    /// Wire every service around `backend`.
    pub fn new(backend: Arc<B>, config: Config, clock: Arc<dyn Clock>) -> Self {
        let events = EventBus::new(DEFAULT_EVENT_CAPACITY);

        let mut guard = RpcGuard::new(backend, RetryPolicy::from(&config.retry), events.clone());
        if let Some(interval) = config.retry.min_call_interval() {
            guard = guard.with_pacing(interval);
        }
        let guard = Arc::new(guard);

        let feeds = Arc::new(FeedManager::new(Arc::clone(&guard), config.feed.clone()));
        let mutations = Arc::new(TicketMutationQueue::new());
        let scheduler = Arc::new(AutomationScheduler::new(
            Arc::clone(&guard),
            Arc::clone(&feeds),
            Arc::clone(&mutations),
            config.automation.clone(),
            Arc::clone(&clock),
        ));
        let session_gate = Arc::new(SessionGate::new(
            Arc::clone(&clock),
            config.orchestrator.session_poll_interval(),
            events.clone(),
        ));

        tracing::info!(
            max_retries = config.retry.max_retries,
            pacing = ?config.retry.min_call_interval(),
            "Container initialized"
        );

        Self {
            events,
            guard,
            feeds,
            mutations,
            scheduler,
            session_gate,
            daily_equity: Arc::new(DailyEquity::new()),
            clock,
            config,
        }
    }

    /// Engine event bus.
    pub const fn events(&self) -> &EventBus {
        &self.events
    }

    /// Guarded backend access.
    pub fn guard(&self) -> Arc<RpcGuard<B>> {
        Arc::clone(&self.guard)
    }

    /// Feed manager.
    pub fn feeds(&self) -> Arc<FeedManager<B>> {
        Arc::clone(&self.feeds)
    }

    /// Stop ledger and per-ticket write queue.
    pub fn mutations(&self) -> Arc<TicketMutationQueue> {
        Arc::clone(&self.mutations)
    }

    /// Automation scheduler.
    pub fn scheduler(&self) -> Arc<AutomationScheduler<B>> {
        Arc::clone(&self.scheduler)
    }

    /// Session gate.
    pub fn session_gate(&self) -> Arc<SessionGate> {
        Arc::clone(&self.session_gate)
    }

    /// Loaded configuration.
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Services shared by every orchestrator run.
    pub fn run_services(&self) -> RunServices<B> {
        RunServices {
            guard: Arc::clone(&self.guard),
            scheduler: Arc::clone(&self.scheduler),
            clock: Arc::clone(&self.clock),
            config: self.config.orchestrator.clone(),
        }
    }

    /// Create a `MarketOneShotUseCase`.
    pub fn market_one_shot_use_case(&self) -> MarketOneShotUseCase<B> {
        MarketOneShotUseCase::new(self.run_services())
    }

    /// Create a `PendingBracketUseCase`.
    pub fn pending_bracket_use_case(&self) -> PendingBracketUseCase<B> {
        PendingBracketUseCase::new(self.run_services())
    }

    /// Create a `SpreadGuardedUseCase`.
    pub fn spread_guarded_use_case(&self) -> SpreadGuardedUseCase<B> {
        SpreadGuardedUseCase::new(self.run_services())
    }

    /// Create a `SessionGuardedUseCase`.
    pub fn session_guarded_use_case(&self) -> SessionGuardedUseCase<B> {
        SessionGuardedUseCase::new(self.run_services(), self.session_gate())
    }

    /// Create an `OcoStraddleUseCase`.
    pub fn oco_straddle_use_case(&self) -> OcoStraddleUseCase<B> {
        OcoStraddleUseCase::new(self.run_services())
    }

    /// Create an `EquityCircuitBreakerUseCase`. Every breaker shares one daily baseline.
    pub fn equity_circuit_breaker_use_case(&self) -> EquityCircuitBreakerUseCase<B> {
        EquityCircuitBreakerUseCase::new(self.run_services(), Arc::clone(&self.daily_equity))
    }

    /// Create a `PanicCloseUseCase`.
    pub fn panic_close_use_case(&self) -> PanicCloseUseCase<B> {
        PanicCloseUseCase::new(self.run_services())
    }

    /// Stop automations, then feeds.
    pub async fn shutdown(&self) {
        self.scheduler.shutdown().await;
        self.feeds.shutdown().await;
        tracing::info!("Container shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::clock::SystemClock;
    use crate::infrastructure::paper::PaperBackend;

    #[tokio::test]
    async fn wires_shared_services() {
        let container = Container::new(
            Arc::new(PaperBackend::default()),
            Config::default(),
            Arc::new(SystemClock),
        );

        let services = container.run_services();
        assert!(Arc::ptr_eq(&services.guard, &container.guard()));
        assert!(Arc::ptr_eq(&services.scheduler, &container.scheduler()));
        assert_eq!(container.events().subscriber_count(), 0);

        container.shutdown().await;
        assert_eq!(container.feeds().active_streams(), 0);
    }
}
