//! Live Feed Subscription Manager
//!
//! Multiplexes backend tick streams across consumers.
//!
//! # Design
//!
//! - One upstream stream per distinct symbol set, however many consumers
//!   subscribe to it.
//! - Consumers hold a [`FeedSubscription`]; dropping the last one for a
//!   symbol set tears the upstream stream down.
//! - Ticks are deduplicated on `(symbol, time)` over a bounded window that
//!   survives resubscribes, so replayed ticks after a reconnect are not
//!   delivered twice.
//! - The stream task resubscribes when the stream ends, fails, or the
//!   guard reports a reconnect. When subscribing fails after the guard's
//!   retries, consumers receive [`FeedEvent::Unavailable`] and the task
//!   tries again after a cooldown.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use super::rpc_guard::RpcGuard;
use crate::application::ports::{TickStream, TradingBackend};
use crate::config::FeedConfig;
use crate::domain::events::EngineEvent;
use crate::domain::market::Quote;
use crate::domain::shared::Symbol;
use crate::error::ExecutionError;

// =============================================================================
// Types
// =============================================================================

/// Key of an upstream stream: the sorted, deduplicated symbol set.
pub type FeedKey = BTreeSet<Symbol>;

/// Item delivered to feed consumers.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    /// A new tick.
    Tick(Quote),
    /// The stream was reopened after a disconnect or reconnect.
    Resubscribed,
    /// The stream could not be reopened within the retry budget.
    Unavailable(ExecutionError),
}

/// Handle on a shared feed stream.
///
/// Dropping the handle releases the consumer's reference.
#[derive(Debug)]
pub struct FeedSubscription {
    key: FeedKey,
    rx: broadcast::Receiver<FeedEvent>,
    registry: Arc<FeedRegistry>,
}

impl FeedSubscription {
    /// Symbol set of the stream.
    pub const fn symbols(&self) -> &FeedKey {
        &self.key
    }

    /// Next event, or `None` once the stream is shut down.
    ///
    /// A consumer that falls behind skips the oldest buffered events.
    pub async fn recv(&mut self) -> Option<FeedEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(symbols = ?self.key, skipped, "Feed consumer lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Next buffered event without waiting.
    ///
    /// `None` when nothing is buffered; a closed stream shows up on the
    /// next [`recv`](Self::recv).
    pub fn try_recv(&mut self) -> Option<FeedEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(_)) => {}
                Err(_) => return None,
            }
        }
    }
}

impl Drop for FeedSubscription {
    fn drop(&mut self) {
        self.registry.release(&self.key);
    }
}

// =============================================================================
// Registry
// =============================================================================

#[derive(Debug)]
struct StreamEntry {
    tx: broadcast::Sender<FeedEvent>,
    consumers: usize,
    cancel: CancellationToken,
}

/// Reference-counted table of live streams.
#[derive(Debug, Default)]
struct FeedRegistry {
    streams: Mutex<HashMap<FeedKey, StreamEntry>>,
}

impl FeedRegistry {
    /// Drop one consumer reference; the last one stops the stream.
    fn release(&self, key: &FeedKey) {
        let mut streams = self.streams.lock();
        let Some(entry) = streams.get_mut(key) else {
            return;
        };
        entry.consumers = entry.consumers.saturating_sub(1);
        if entry.consumers == 0 {
            entry.cancel.cancel();
            streams.remove(key);
            tracing::debug!(symbols = ?key, "Last feed consumer left, stream stopped");
        }
    }
}

// =============================================================================
// Manager
// =============================================================================

/// Shares backend tick streams among consumers.
pub struct FeedManager<B: ?Sized> {
    guard: Arc<RpcGuard<B>>,
    config: FeedConfig,
    registry: Arc<FeedRegistry>,
    tracker: TaskTracker,
    shutdown: CancellationToken,
}

impl<B: TradingBackend + ?Sized + 'static> FeedManager<B> {
    /// Manager opening streams through `guard`.
    pub fn new(guard: Arc<RpcGuard<B>>, config: FeedConfig) -> Self {
        Self {
            guard,
            config,
            registry: Arc::new(FeedRegistry::default()),
            tracker: TaskTracker::new(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Subscribe to ticks for `symbols`.
    ///
    /// Reuses the running stream for the same symbol set or starts one.
    pub fn subscribe(
        &self,
        symbols: impl IntoIterator<Item = Symbol>,
    ) -> Result<FeedSubscription, ExecutionError> {
        let key: FeedKey = symbols.into_iter().collect();
        if key.is_empty() {
            return Err(ExecutionError::rejected("subscribe_feed", "empty symbol set"));
        }
        if self.shutdown.is_cancelled() {
            return Err(ExecutionError::Cancelled {
                operation: "subscribe_feed",
            });
        }

        let mut streams = self.registry.streams.lock();
        if let Some(entry) = streams.get_mut(&key) {
            entry.consumers += 1;
            return Ok(FeedSubscription {
                rx: entry.tx.subscribe(),
                key,
                registry: Arc::clone(&self.registry),
            });
        }

        let (tx, rx) = broadcast::channel(self.config.channel_capacity.max(1));
        let cancel = self.shutdown.child_token();
        streams.insert(
            key.clone(),
            StreamEntry {
                tx: tx.clone(),
                consumers: 1,
                cancel: cancel.clone(),
            },
        );
        drop(streams);

        tracing::info!(symbols = ?key, "Opening feed stream");
        let task = StreamTask {
            guard: Arc::clone(&self.guard),
            symbols: key.iter().cloned().collect(),
            tx,
            cancel,
            config: self.config.clone(),
        };
        self.tracker.spawn(task.run());

        Ok(FeedSubscription {
            key,
            rx,
            registry: Arc::clone(&self.registry),
        })
    }

    /// Number of upstream streams currently open.
    pub fn active_streams(&self) -> usize {
        self.registry.streams.lock().len()
    }

    /// Consumers attached to the stream for `symbols`.
    pub fn consumer_count(&self, symbols: &FeedKey) -> usize {
        self.registry
            .streams
            .lock()
            .get(symbols)
            .map_or(0, |entry| entry.consumers)
    }

    /// Stop every stream and wait for the stream tasks to exit.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.tracker.close();
        self.tracker.wait().await;
        self.registry.streams.lock().clear();
    }
}

// =============================================================================
// Stream task
// =============================================================================

enum PumpExit {
    Cancelled,
    Reconnected,
    Disconnected,
}

struct StreamTask<B: ?Sized> {
    guard: Arc<RpcGuard<B>>,
    symbols: Vec<Symbol>,
    tx: broadcast::Sender<FeedEvent>,
    cancel: CancellationToken,
    config: FeedConfig,
}

impl<B: TradingBackend + ?Sized> StreamTask<B> {
    async fn run(self) {
        let mut reconnects = self.guard.subscribe_reconnects();
        let mut dedup = DedupWindow::new(self.config.dedup_window);
        let mut opened_before = false;

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            let deadline = Instant::now() + self.config.subscribe_timeout();
            let stream = match self
                .guard
                .subscribe_ticks(&self.symbols, deadline, &self.cancel)
                .await
            {
                Ok(stream) => stream,
                Err(error) if error.is_cancelled() => break,
                Err(error) => {
                    tracing::error!(symbols = ?self.symbols, error = %error, "Feed unavailable");
                    self.guard.events().publish(EngineEvent::FeedUnavailable {
                        symbols: self.symbols.clone(),
                        error: error.to_string(),
                    });
                    let _ = self.tx.send(FeedEvent::Unavailable(error));
                    if !self.cool_down().await {
                        break;
                    }
                    continue;
                }
            };

            reconnects.borrow_and_update();
            if opened_before {
                tracing::info!(symbols = ?self.symbols, "Feed resubscribed");
                self.guard.events().publish(EngineEvent::FeedResubscribed {
                    symbols: self.symbols.clone(),
                });
                let _ = self.tx.send(FeedEvent::Resubscribed);
            } else {
                tracing::debug!(symbols = ?self.symbols, "Feed opened");
            }
            opened_before = true;

            match self.pump(stream, &mut reconnects, &mut dedup).await {
                PumpExit::Cancelled => break,
                PumpExit::Reconnected => {}
                PumpExit::Disconnected => {
                    if !self.cool_down().await {
                        break;
                    }
                }
            }
        }

        tracing::debug!(symbols = ?self.symbols, "Feed stream task exited");
    }

    async fn pump(
        &self,
        mut stream: TickStream,
        reconnects: &mut watch::Receiver<u64>,
        dedup: &mut DedupWindow,
    ) -> PumpExit {
        let mut watch_open = true;
        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => return PumpExit::Cancelled,
                changed = reconnects.changed(), if watch_open => {
                    if changed.is_ok() {
                        tracing::info!(symbols = ?self.symbols, "Backend reconnected, reopening feed");
                        return PumpExit::Reconnected;
                    }
                    watch_open = false;
                }
                item = stream.next() => match item {
                    Some(Ok(quote)) => {
                        if dedup.admit(&quote.symbol, quote.time) {
                            let _ = self.tx.send(FeedEvent::Tick(quote));
                        }
                    }
                    Some(Err(error)) => {
                        tracing::warn!(symbols = ?self.symbols, error = %error, "Feed stream failed");
                        return PumpExit::Disconnected;
                    }
                    None => {
                        tracing::warn!(symbols = ?self.symbols, "Feed stream ended");
                        return PumpExit::Disconnected;
                    }
                },
            }
        }
    }

    /// Wait out the resubscribe cooldown; `false` when cancelled first.
    async fn cool_down(&self) -> bool {
        tokio::select! {
            () = self.cancel.cancelled() => false,
            () = tokio::time::sleep(self.config.resubscribe_cooldown()) => true,
        }
    }
}

// =============================================================================
// Deduplication
// =============================================================================

/// Bounded memory of recently delivered `(symbol, time)` pairs.
#[derive(Debug)]
struct DedupWindow {
    capacity: usize,
    order: VecDeque<(Symbol, DateTime<Utc>)>,
    seen: HashSet<(Symbol, DateTime<Utc>)>,
}

impl DedupWindow {
    fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            order: VecDeque::with_capacity(capacity),
            seen: HashSet::with_capacity(capacity),
        }
    }

    /// `true` the first time a pair is seen within the window.
    fn admit(&mut self, symbol: &Symbol, time: DateTime<Utc>) -> bool {
        let key = (symbol.clone(), time);
        if self.seen.contains(&key) {
            return false;
        }
        if self.order.len() == self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        self.order.push_back(key.clone());
        self.seen.insert(key);
        true
    }
}
