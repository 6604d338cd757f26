//! RPC Execution Guard
//!
//! Runs one backend operation under a deadline and a cancellation token:
//!
//! - Transient failures are retried with bounded exponential backoff.
//! - An expired session triggers one reconnect before the next retry; a
//!   successful reconnect bumps the reconnect generation so live feeds
//!   resubscribe.
//! - Validation and business rejections surface immediately.
//! - Cancellation is checked before every attempt and interrupts backoff
//!   sleeps.
//!
//! The remaining time to the deadline becomes the backend call's timeout,
//! capped by the policy's per-call timeout.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::pacer::CallPacer;
use super::retry::{ExponentialBackoff, RetryPolicy};
use crate::application::ports::{
    BackendError, FailureKind, ModifyOrderRequest, PlaceOrderRequest, TickStream, TradingBackend,
};
use crate::domain::events::EngineEvent;
use crate::domain::market::{AccountSummary, OrderSnapshot, Quote};
use crate::domain::shared::{Symbol, Ticket};
use crate::error::ExecutionError;
use crate::infrastructure::broadcast::EventBus;

/// Guarded access to the shared trading backend.
pub struct RpcGuard<B: ?Sized> {
    backend: Arc<B>,
    policy: RetryPolicy,
    pacer: Option<CallPacer>,
    events: EventBus,
    reconnects: watch::Sender<u64>,
}

impl<B: TradingBackend + ?Sized> RpcGuard<B> {
    /// Guard `backend` with `policy`, publishing retries and reconnects on `events`.
    pub fn new(backend: Arc<B>, policy: RetryPolicy, events: EventBus) -> Self {
        let (reconnects, _) = watch::channel(0);
        Self {
            backend,
            policy,
            pacer: None,
            events,
            reconnects,
        }
    }

    /// Space backend calls at least `interval` apart.
    #[must_use]
    pub fn with_pacing(mut self, interval: Duration) -> Self {
        self.pacer = Some(CallPacer::new(interval));
        self
    }

    /// The guarded backend.
    pub const fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    /// The retry policy in force.
    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Event channel the guard publishes on.
    pub const fn events(&self) -> &EventBus {
        &self.events
    }

    /// Number of successful reconnects so far.
    pub fn reconnect_generation(&self) -> u64 {
        *self.reconnects.borrow()
    }

    /// Watch the reconnect generation.
    pub fn subscribe_reconnects(&self) -> watch::Receiver<u64> {
        self.reconnects.subscribe()
    }

    /// Execute `call` until it succeeds, fails fatally, runs out of retries,
    /// passes `deadline`, or `cancel` fires.
    ///
    /// `call` receives the backend and the timeout for this attempt.
    pub async fn execute<T, F, Fut>(
        &self,
        operation: &'static str,
        deadline: Instant,
        cancel: &CancellationToken,
        mut call: F,
    ) -> Result<T, ExecutionError>
    where
        F: FnMut(Arc<B>, Duration) -> Fut,
        Fut: Future<Output = Result<T, BackendError>>,
    {
        let mut backoff = ExponentialBackoff::new(&self.policy);
        let mut attempts: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(ExecutionError::Cancelled { operation });
            }
            if Instant::now() >= deadline {
                return Err(ExecutionError::DeadlineExceeded { operation });
            }
            if let Some(pacer) = &self.pacer {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => return Err(ExecutionError::Cancelled { operation }),
                    () = pacer.acquire() => {}
                }
            }

            let timeout = self.attempt_timeout(deadline);
            if timeout.is_zero() {
                return Err(ExecutionError::DeadlineExceeded { operation });
            }
            attempts += 1;

            let result = match tokio::time::timeout(timeout, call(Arc::clone(&self.backend), timeout))
                .await
            {
                Ok(result) => result,
                Err(_) => Err(BackendError::Timeout {
                    timeout_ms: timeout.as_millis() as u64,
                }),
            };

            let error = match result {
                Ok(value) => {
                    if attempts > 1 {
                        tracing::debug!(operation, attempts, "Backend call succeeded after retries");
                    }
                    return Ok(value);
                }
                Err(error) => error,
            };

            match error.kind() {
                FailureKind::Validation => {
                    tracing::warn!(operation, error = %error, "Backend rejected request");
                    return Err(ExecutionError::RejectedRequest {
                        operation,
                        message: error.to_string(),
                    });
                }
                FailureKind::BusinessRejection => {
                    tracing::warn!(operation, error = %error, "Backend refused trade");
                    let (code, message) = match error {
                        BackendError::Rejected { code, message } => (code, message),
                        other => (0, other.to_string()),
                    };
                    return Err(ExecutionError::TradeRejected {
                        operation,
                        code,
                        message,
                    });
                }
                FailureKind::SessionExpired => {
                    self.reconnect(operation, deadline, cancel).await?;
                }
                FailureKind::Transient => {}
            }

            let Some(delay) = backoff.next_backoff() else {
                tracing::error!(operation, attempts, error = %error, "Retry budget exhausted");
                return Err(ExecutionError::BackendUnavailable {
                    operation,
                    attempts,
                    message: error.to_string(),
                });
            };
            let delay = delay.min(deadline.saturating_duration_since(Instant::now()));

            tracing::warn!(
                operation,
                attempt = attempts,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Transient backend failure, retrying"
            );
            self.events.publish(EngineEvent::RetryScheduled {
                operation,
                attempt: attempts,
                delay_ms: delay.as_millis() as u64,
                error: error.to_string(),
            });

            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(ExecutionError::Cancelled { operation }),
                () = tokio::time::sleep(delay) => {}
            }
        }
    }

    fn attempt_timeout(&self, deadline: Instant) -> Duration {
        deadline
            .saturating_duration_since(Instant::now())
            .min(self.policy.call_timeout)
    }

    /// One reconnect attempt after a session failure.
    ///
    /// A failed reconnect is logged and left to the retry loop.
    async fn reconnect(
        &self,
        operation: &'static str,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> Result<(), ExecutionError> {
        let timeout = self.attempt_timeout(deadline);
        tracing::info!(operation, "Session expired, reconnecting");

        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(ExecutionError::Cancelled { operation }),
            r = tokio::time::timeout(timeout, self.backend.reconnect(timeout)) => r,
        };

        match result {
            Ok(Ok(())) => {
                self.reconnects.send_modify(|generation| *generation += 1);
                let generation = self.reconnect_generation();
                tracing::info!(operation, generation, "Reconnected to backend");
                self.events.publish(EngineEvent::Reconnected { generation });
            }
            Ok(Err(error)) => {
                tracing::warn!(operation, error = %error, "Reconnect failed");
            }
            Err(_) => {
                tracing::warn!(operation, timeout_ms = timeout.as_millis() as u64, "Reconnect timed out");
            }
        }
        Ok(())
    }

    // =========================================================================
    // Typed operations
    // =========================================================================

    /// Guarded `get_quote`.
    pub async fn get_quote(
        &self,
        symbol: &Symbol,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> Result<Quote, ExecutionError> {
        self.execute("get_quote", deadline, cancel, |backend, timeout| async move {
            backend.get_quote(symbol, timeout).await
        })
        .await
    }

    /// Guarded `subscribe_ticks`.
    pub async fn subscribe_ticks(
        &self,
        symbols: &[Symbol],
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> Result<TickStream, ExecutionError> {
        self.execute("subscribe_ticks", deadline, cancel, |backend, timeout| async move {
            backend.subscribe_ticks(symbols, timeout).await
        })
        .await
    }

    /// Guarded `place_order`.
    pub async fn place_order(
        &self,
        request: &PlaceOrderRequest,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> Result<Ticket, ExecutionError> {
        self.execute("place_order", deadline, cancel, |backend, timeout| {
            let request = request.clone();
            async move { backend.place_order(request, timeout).await }
        })
        .await
    }

    /// Guarded `modify_order`.
    pub async fn modify_order(
        &self,
        request: &ModifyOrderRequest,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> Result<(), ExecutionError> {
        self.execute("modify_order", deadline, cancel, |backend, timeout| {
            let request = request.clone();
            async move { backend.modify_order(request, timeout).await }
        })
        .await
    }

    /// Guarded `close_order`.
    pub async fn close_order(
        &self,
        ticket: Ticket,
        volume: Option<Decimal>,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> Result<(), ExecutionError> {
        self.execute("close_order", deadline, cancel, |backend, timeout| async move {
            backend.close_order(ticket, volume, timeout).await
        })
        .await
    }

    /// Guarded `delete_order`.
    pub async fn delete_order(
        &self,
        ticket: Ticket,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> Result<(), ExecutionError> {
        self.execute("delete_order", deadline, cancel, |backend, timeout| async move {
            backend.delete_order(ticket, timeout).await
        })
        .await
    }

    /// Guarded `get_open_tickets`.
    pub async fn get_open_tickets(
        &self,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> Result<HashSet<Ticket>, ExecutionError> {
        self.execute("get_open_tickets", deadline, cancel, |backend, timeout| async move {
            backend.get_open_tickets(timeout).await
        })
        .await
    }

    /// Guarded `get_open_orders`.
    pub async fn get_open_orders(
        &self,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> Result<Vec<OrderSnapshot>, ExecutionError> {
        self.execute("get_open_orders", deadline, cancel, |backend, timeout| async move {
            backend.get_open_orders(timeout).await
        })
        .await
    }

    /// Guarded `get_order`.
    pub async fn get_order(
        &self,
        ticket: Ticket,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> Result<Option<OrderSnapshot>, ExecutionError> {
        self.execute("get_order", deadline, cancel, |backend, timeout| async move {
            backend.get_order(ticket, timeout).await
        })
        .await
    }

    /// Guarded `get_account_summary`.
    pub async fn get_account_summary(
        &self,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> Result<AccountSummary, ExecutionError> {
        self.execute("get_account_summary", deadline, cancel, |backend, timeout| async move {
            backend.get_account_summary(timeout).await
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use rust_decimal_macros::dec;

    use super::*;
    use crate::application::ports::MockTradingBackend;

    fn guard(mock: MockTradingBackend, policy: RetryPolicy) -> RpcGuard<MockTradingBackend> {
        RpcGuard::new(Arc::new(mock), policy, EventBus::default())
    }

    fn far_deadline() -> Instant {
        Instant::now() + Duration::from_secs(60)
    }

    #[tokio::test(start_paused = true)]
    async fn three_transient_failures_then_success() {
        let guard = guard(
            MockTradingBackend::new(),
            RetryPolicy::fixed(5, Duration::from_millis(100), 2.0),
        );
        let mut events = guard.events().subscribe();
        let calls = Arc::new(AtomicU32::new(0));
        let call_times = Arc::new(parking_lot::Mutex::new(Vec::new()));

        let result = guard
            .execute("lookup", far_deadline(), &CancellationToken::new(), |_, _| {
                let calls = Arc::clone(&calls);
                let call_times = Arc::clone(&call_times);
                async move {
                    call_times.lock().push(Instant::now());
                    if calls.fetch_add(1, Ordering::SeqCst) < 3 {
                        Err(BackendError::network("connection reset"))
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;

        assert_eq!(result, Ok(42));
        assert_eq!(calls.load(Ordering::SeqCst), 4);

        let times = call_times.lock().clone();
        let gaps: Vec<Duration> = times.windows(2).map(|w| w[1] - w[0]).collect();
        assert_eq!(gaps.len(), 3);
        assert!(gaps.windows(2).all(|g| g[0] < g[1]), "gaps not increasing: {gaps:?}");

        let mut delays = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let EngineEvent::RetryScheduled { delay_ms, .. } = event {
                delays.push(delay_ms);
            }
        }
        assert_eq!(delays, vec![100, 200, 400]);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_budget_is_backend_unavailable() {
        let mut mock = MockTradingBackend::new();
        mock.expect_get_account_summary()
            .times(3)
            .returning(|_| Err(BackendError::network("down")));
        let guard = guard(mock, RetryPolicy::fixed(2, Duration::from_millis(10), 2.0));

        let err = guard
            .get_account_summary(far_deadline(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ExecutionError::BackendUnavailable { attempts: 3, .. }
        ));
    }

    #[tokio::test]
    async fn validation_is_not_retried() {
        let mut mock = MockTradingBackend::new();
        mock.expect_get_quote()
            .times(1)
            .returning(|_, _| Err(BackendError::invalid("unknown symbol")));
        let guard = guard(mock, RetryPolicy::default());

        let err = guard
            .get_quote(&Symbol::new("XXXYYY"), far_deadline(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.reason(), "REJECTED_REQUEST");
    }

    #[tokio::test]
    async fn business_rejection_carries_code() {
        let mut mock = MockTradingBackend::new();
        mock.expect_close_order()
            .times(1)
            .returning(|_, _, _| Err(BackendError::rejected(132, "market is closed")));
        let guard = guard(mock, RetryPolicy::default());

        let err = guard
            .close_order(Ticket::new(9), Some(dec!(0.1)), far_deadline(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(
            err,
            ExecutionError::TradeRejected {
                operation: "close_order",
                code: 132,
                message: "market is closed".into(),
            }
        );
    }

    #[tokio::test]
    async fn delete_of_a_filled_ticket_is_refused_once() {
        let mut mock = MockTradingBackend::new();
        mock.expect_delete_order()
            .times(1)
            .returning(|ticket, _| Err(BackendError::rejected(4108, format!("invalid ticket {ticket}"))));
        mock.expect_close_order().times(0);
        let guard = guard(mock, RetryPolicy::default());

        let err = guard
            .delete_order(Ticket::new(9), far_deadline(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, ExecutionError::TradeRejected { operation: "delete_order", code: 4108, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn expired_session_reconnects_once_then_retries() {
        let mut mock = MockTradingBackend::new();
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        mock.expect_get_account_summary().times(2).returning(move |_| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(BackendError::SessionExpired {
                    message: "token expired".into(),
                })
            } else {
                Ok(AccountSummary {
                    balance: dec!(10000),
                    equity: dec!(10000),
                })
            }
        });
        mock.expect_reconnect().times(1).returning(|_| Ok(()));
        let guard = guard(mock, RetryPolicy::fixed(3, Duration::from_millis(10), 2.0));
        let mut reconnects = guard.subscribe_reconnects();

        let summary = guard
            .get_account_summary(far_deadline(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(summary.balance, dec!(10000));
        assert_eq!(guard.reconnect_generation(), 1);
        assert!(reconnects.has_changed().unwrap());
    }

    #[tokio::test]
    async fn cancelled_token_prevents_any_attempt() {
        let mut mock = MockTradingBackend::new();
        mock.expect_get_open_tickets().times(0);
        let guard = guard(mock, RetryPolicy::default());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = guard.get_open_tickets(far_deadline(), &cancel).await.unwrap_err();

        assert!(err.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_backoff() {
        let guard = guard(
            MockTradingBackend::new(),
            RetryPolicy::fixed(5, Duration::from_secs(30), 2.0),
        );
        let cancel = CancellationToken::new();
        let calls = Arc::new(AtomicU32::new(0));

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            canceller.cancel();
        });

        let started = Instant::now();
        let result: Result<(), _> = guard
            .execute("lookup", far_deadline(), &cancel, |_, _| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(BackendError::network("down")) }
            })
            .await;

        assert!(result.unwrap_err().is_cancelled());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_bounds_retries() {
        let guard = guard(
            MockTradingBackend::new(),
            RetryPolicy::fixed(100, Duration::from_millis(400), 1.0),
        );
        let deadline = Instant::now() + Duration::from_secs(1);

        let result: Result<(), _> = guard
            .execute("lookup", deadline, &CancellationToken::new(), |_, _| async {
                Err(BackendError::network("down"))
            })
            .await;

        assert_eq!(
            result.unwrap_err(),
            ExecutionError::DeadlineExceeded { operation: "lookup" }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn slow_call_times_out_as_transient() {
        let guard = guard(
            MockTradingBackend::new(),
            RetryPolicy::fixed(1, Duration::from_millis(10), 2.0)
                .with_call_timeout(Duration::from_millis(50)),
        );
        let calls = Arc::new(AtomicU32::new(0));

        let result = guard
            .execute("lookup", far_deadline(), &CancellationToken::new(), |_, _| {
                let first = calls.fetch_add(1, Ordering::SeqCst) == 0;
                async move {
                    if first {
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                    Ok::<_, BackendError>("done")
                }
            })
            .await;

        assert_eq!(result, Ok("done"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
