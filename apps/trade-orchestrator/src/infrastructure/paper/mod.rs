//! Paper Trading Backend
//!
//! In-process [`TradingBackend`] that keeps orders and positions in memory
//! and fills them against pushed ticks. Used for dry runs and as the
//! scriptable backend in tests.
//!
//! # Scripting
//!
//! - [`PaperBackend::fail_next`] queues failures per operation
//! - [`PaperBackend::expire_session`] fails every call until `reconnect`
//! - [`PaperBackend::set_latency`] delays an operation
//! - [`PaperBackend::disconnect_feeds`] ends every open tick stream
//!
//! Every call is appended to a log readable through [`PaperBackend::calls`],
//! and [`PaperBackend::peak_concurrency`] reports how many calls of one
//! operation were ever in flight together.

mod book;

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use futures::channel::mpsc;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::application::ports::{
    BackendError, ModifyOrderRequest, PlaceOrderRequest, TickStream, TradingBackend,
};
use crate::domain::market::{AccountSummary, OrderSnapshot, Quote};
use crate::domain::shared::{Symbol, Ticket};

use book::OrderBook;
pub use book::BookEvent;

// =============================================================================
// Call Log
// =============================================================================

/// Backend operation, used to target scripted faults and latency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendOperation {
    /// `get_quote`
    GetQuote,
    /// `subscribe_ticks`
    SubscribeTicks,
    /// `place_order`
    PlaceOrder,
    /// `modify_order`
    ModifyOrder,
    /// `close_order`
    CloseOrder,
    /// `delete_order`
    DeleteOrder,
    /// `get_open_tickets`
    GetOpenTickets,
    /// `get_open_orders`
    GetOpenOrders,
    /// `get_order`
    GetOrder,
    /// `get_account_summary`
    GetAccountSummary,
    /// `reconnect`
    Reconnect,
}

impl BackendOperation {
    /// Operation name as used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::GetQuote => "get_quote",
            Self::SubscribeTicks => "subscribe_ticks",
            Self::PlaceOrder => "place_order",
            Self::ModifyOrder => "modify_order",
            Self::CloseOrder => "close_order",
            Self::DeleteOrder => "delete_order",
            Self::GetOpenTickets => "get_open_tickets",
            Self::GetOpenOrders => "get_open_orders",
            Self::GetOrder => "get_order",
            Self::GetAccountSummary => "get_account_summary",
            Self::Reconnect => "reconnect",
        }
    }
}

impl fmt::Display for BackendOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One recorded backend call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCall {
    /// Quote lookup.
    GetQuote(Symbol),
    /// Stream opened for a symbol set.
    SubscribeTicks(Vec<Symbol>),
    /// Order placement.
    PlaceOrder(PlaceOrderRequest),
    /// Order modification.
    ModifyOrder(ModifyOrderRequest),
    /// Position close.
    CloseOrder {
        /// Target ticket.
        ticket: Ticket,
        /// Partial volume, if any.
        volume: Option<Decimal>,
    },
    /// Pending order deletion.
    DeleteOrder(Ticket),
    /// Open ticket listing.
    GetOpenTickets,
    /// Open order listing.
    GetOpenOrders,
    /// Single order lookup.
    GetOrder(Ticket),
    /// Account lookup.
    GetAccountSummary,
    /// Session re-establishment.
    Reconnect,
}

impl BackendCall {
    /// Operation this call belongs to.
    #[must_use]
    pub const fn operation(&self) -> BackendOperation {
        match self {
            Self::GetQuote(_) => BackendOperation::GetQuote,
            Self::SubscribeTicks(_) => BackendOperation::SubscribeTicks,
            Self::PlaceOrder(_) => BackendOperation::PlaceOrder,
            Self::ModifyOrder(_) => BackendOperation::ModifyOrder,
            Self::CloseOrder { .. } => BackendOperation::CloseOrder,
            Self::DeleteOrder(_) => BackendOperation::DeleteOrder,
            Self::GetOpenTickets => BackendOperation::GetOpenTickets,
            Self::GetOpenOrders => BackendOperation::GetOpenOrders,
            Self::GetOrder(_) => BackendOperation::GetOrder,
            Self::GetAccountSummary => BackendOperation::GetAccountSummary,
            Self::Reconnect => BackendOperation::Reconnect,
        }
    }
}

// =============================================================================
// Backend
// =============================================================================

struct StreamSlot {
    symbols: HashSet<Symbol>,
    tx: mpsc::UnboundedSender<Result<Quote, BackendError>>,
}

#[derive(Default)]
struct Script {
    faults: HashMap<BackendOperation, VecDeque<BackendError>>,
    latency: HashMap<BackendOperation, Duration>,
    session_expired: bool,
}

#[derive(Default)]
struct Concurrency {
    current: HashMap<BackendOperation, usize>,
    peak: HashMap<BackendOperation, usize>,
}

/// Marks one call as in flight until dropped.
struct InFlight<'a> {
    concurrency: &'a Mutex<Concurrency>,
    operation: BackendOperation,
}

impl<'a> InFlight<'a> {
    fn start(concurrency: &'a Mutex<Concurrency>, operation: BackendOperation) -> Self {
        let mut state = concurrency.lock();
        let current = state.current.entry(operation).or_default();
        *current += 1;
        let current = *current;
        let peak = state.peak.entry(operation).or_default();
        *peak = (*peak).max(current);
        Self {
            concurrency,
            operation,
        }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if let Some(current) = self.concurrency.lock().current.get_mut(&self.operation) {
            *current = current.saturating_sub(1);
        }
    }
}

/// In-memory trading backend.
pub struct PaperBackend {
    book: Mutex<OrderBook>,
    script: Mutex<Script>,
    streams: Mutex<Vec<StreamSlot>>,
    calls: Mutex<Vec<BackendCall>>,
    concurrency: Mutex<Concurrency>,
}

impl Default for PaperBackend {
    fn default() -> Self {
        Self::new(dec!(10000))
    }
}

impl PaperBackend {
    /// Backend with an account holding `balance`.
    #[must_use]
    pub fn new(balance: Decimal) -> Self {
        Self {
            book: Mutex::new(OrderBook::new(balance)),
            script: Mutex::new(Script::default()),
            streams: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
            concurrency: Mutex::new(Concurrency::default()),
        }
    }

    // -------------------------------------------------------------------------
    // Market
    // -------------------------------------------------------------------------

    /// Set the current quote without notifying streams or filling orders.
    pub fn set_quote(&self, quote: Quote) {
        self.book.lock().set_quote(quote);
    }

    /// Apply a tick: fill triggered orders, hit stops and targets, then
    /// deliver it to every stream covering its symbol.
    pub fn push_tick(&self, quote: Quote) -> Vec<BookEvent> {
        let events = self.book.lock().apply_tick(&quote);
        for event in &events {
            tracing::debug!(?event, "Paper book event");
        }

        let mut streams = self.streams.lock();
        streams.retain(|slot| {
            if !slot.symbols.contains(&quote.symbol) {
                return !slot.tx.is_closed();
            }
            slot.tx.unbounded_send(Ok(quote.clone())).is_ok()
        });
        events
    }

    /// End every open tick stream.
    pub fn disconnect_feeds(&self) {
        let mut streams = self.streams.lock();
        for slot in streams.drain(..) {
            slot.tx.close_channel();
        }
    }

    /// Deliver an error item on every open stream, then end them.
    pub fn break_feeds(&self, error: &BackendError) {
        let mut streams = self.streams.lock();
        for slot in streams.drain(..) {
            let _ = slot.tx.unbounded_send(Err(error.clone()));
            slot.tx.close_channel();
        }
    }

    /// Number of open tick streams.
    pub fn open_streams(&self) -> usize {
        let mut streams = self.streams.lock();
        streams.retain(|slot| !slot.tx.is_closed());
        streams.len()
    }

    // -------------------------------------------------------------------------
    // Orders
    // -------------------------------------------------------------------------

    /// Insert or replace an order directly.
    pub fn insert_order(&self, order: OrderSnapshot) {
        self.book.lock().insert(order);
    }

    /// Current snapshot of `ticket`.
    pub fn order(&self, ticket: Ticket) -> Option<OrderSnapshot> {
        self.book.lock().get(ticket)
    }

    /// Every open position and pending order.
    pub fn orders(&self) -> Vec<OrderSnapshot> {
        self.book.lock().open_orders()
    }

    /// Balance and equity.
    pub fn account(&self) -> AccountSummary {
        self.book.lock().account()
    }

    // -------------------------------------------------------------------------
    // Scripting
    // -------------------------------------------------------------------------

    /// Fail the next call of `operation` with `error`.
    pub fn fail_next(&self, operation: BackendOperation, error: BackendError) {
        self.fail_times(operation, 1, error);
    }

    /// Fail the next `times` calls of `operation` with `error`.
    pub fn fail_times(&self, operation: BackendOperation, times: usize, error: BackendError) {
        let mut script = self.script.lock();
        let queue = script.faults.entry(operation).or_default();
        queue.extend(std::iter::repeat_n(error, times));
    }

    /// Drop all queued failures.
    pub fn clear_faults(&self) {
        self.script.lock().faults.clear();
    }

    /// Fail every call but `reconnect` until a reconnect succeeds.
    pub fn expire_session(&self) {
        self.script.lock().session_expired = true;
    }

    /// Delay every call of `operation` by `latency`.
    pub fn set_latency(&self, operation: BackendOperation, latency: Duration) {
        self.script.lock().latency.insert(operation, latency);
    }

    // -------------------------------------------------------------------------
    // Call log
    // -------------------------------------------------------------------------

    /// Every call made so far, in order.
    pub fn calls(&self) -> Vec<BackendCall> {
        self.calls.lock().clone()
    }

    /// Number of calls of `operation`.
    pub fn call_count(&self, operation: BackendOperation) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|call| call.operation() == operation)
            .count()
    }

    /// Modify requests sent so far.
    pub fn modify_requests(&self) -> Vec<ModifyOrderRequest> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                BackendCall::ModifyOrder(request) => Some(request.clone()),
                _ => None,
            })
            .collect()
    }

    /// Tickets passed to `close_order` so far.
    pub fn close_requests(&self) -> Vec<Ticket> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                BackendCall::CloseOrder { ticket, .. } => Some(*ticket),
                _ => None,
            })
            .collect()
    }

    /// Tickets passed to `delete_order` so far.
    pub fn delete_requests(&self) -> Vec<Ticket> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                BackendCall::DeleteOrder(ticket) => Some(*ticket),
                _ => None,
            })
            .collect()
    }

    /// Most calls of `operation` that were ever in flight at once.
    pub fn peak_concurrency(&self, operation: BackendOperation) -> usize {
        self.concurrency
            .lock()
            .peak
            .get(&operation)
            .copied()
            .unwrap_or_default()
    }

    /// Forget recorded calls.
    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    /// Record `call`, wait out scripted latency, then surface any scripted
    /// failure. The call counts as in flight until the returned marker drops.
    async fn enter(&self, call: BackendCall) -> Result<InFlight<'_>, BackendError> {
        let operation = call.operation();
        self.calls.lock().push(call);
        let in_flight = InFlight::start(&self.concurrency, operation);

        let latency = self.script.lock().latency.get(&operation).copied();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let mut script = self.script.lock();
        if let Some(error) = script
            .faults
            .get_mut(&operation)
            .and_then(VecDeque::pop_front)
        {
            return Err(error);
        }
        if script.session_expired && operation != BackendOperation::Reconnect {
            return Err(BackendError::SessionExpired {
                message: "not logged in".to_string(),
            });
        }
        Ok(in_flight)
    }
}

#[async_trait]
impl TradingBackend for PaperBackend {
    async fn get_quote(&self, symbol: &Symbol, _timeout: Duration) -> Result<Quote, BackendError> {
        let _call = self.enter(BackendCall::GetQuote(symbol.clone())).await?;
        self.book
            .lock()
            .quote(symbol)
            .ok_or_else(|| BackendError::rejected(4106, format!("unknown symbol {symbol}")))
    }

    async fn subscribe_ticks(
        &self,
        symbols: &[Symbol],
        _timeout: Duration,
    ) -> Result<TickStream, BackendError> {
        let _call = self.enter(BackendCall::SubscribeTicks(symbols.to_vec())).await?;
        let (tx, rx) = mpsc::unbounded();

        // A fresh stream starts with the last known tick of each symbol.
        {
            let book = self.book.lock();
            for symbol in symbols {
                if let Some(quote) = book.quote(symbol) {
                    let _ = tx.unbounded_send(Ok(quote));
                }
            }
        }

        self.streams.lock().push(StreamSlot {
            symbols: symbols.iter().cloned().collect(),
            tx,
        });
        Ok(rx.boxed())
    }

    async fn place_order(
        &self,
        request: PlaceOrderRequest,
        _timeout: Duration,
    ) -> Result<Ticket, BackendError> {
        let _call = self.enter(BackendCall::PlaceOrder(request.clone())).await?;
        self.book.lock().place(request)
    }

    async fn modify_order(
        &self,
        request: ModifyOrderRequest,
        _timeout: Duration,
    ) -> Result<(), BackendError> {
        let _call = self.enter(BackendCall::ModifyOrder(request.clone())).await?;
        self.book.lock().modify(&request)
    }

    async fn close_order(
        &self,
        ticket: Ticket,
        volume: Option<Decimal>,
        _timeout: Duration,
    ) -> Result<(), BackendError> {
        let _call = self.enter(BackendCall::CloseOrder { ticket, volume }).await?;
        self.book.lock().close(ticket, volume)
    }

    async fn delete_order(&self, ticket: Ticket, _timeout: Duration) -> Result<(), BackendError> {
        let _call = self.enter(BackendCall::DeleteOrder(ticket)).await?;
        self.book.lock().delete(ticket)
    }

    async fn get_open_tickets(&self, _timeout: Duration) -> Result<HashSet<Ticket>, BackendError> {
        let _call = self.enter(BackendCall::GetOpenTickets).await?;
        Ok(self
            .book
            .lock()
            .open_orders()
            .into_iter()
            .map(|order| order.ticket)
            .collect())
    }

    async fn get_open_orders(&self, _timeout: Duration) -> Result<Vec<OrderSnapshot>, BackendError> {
        let _call = self.enter(BackendCall::GetOpenOrders).await?;
        Ok(self.book.lock().open_orders())
    }

    async fn get_order(
        &self,
        ticket: Ticket,
        _timeout: Duration,
    ) -> Result<Option<OrderSnapshot>, BackendError> {
        let _call = self.enter(BackendCall::GetOrder(ticket)).await?;
        Ok(self.book.lock().get(ticket))
    }

    async fn get_account_summary(&self, _timeout: Duration) -> Result<AccountSummary, BackendError> {
        let _call = self.enter(BackendCall::GetAccountSummary).await?;
        Ok(self.book.lock().account())
    }

    async fn reconnect(&self, _timeout: Duration) -> Result<(), BackendError> {
        let _call = self.enter(BackendCall::Reconnect).await?;
        self.script.lock().session_expired = false;
        tracing::info!("Paper session re-established");
        Ok(())
    }
}
