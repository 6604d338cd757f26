//! Per-ticket mutation queue and stop ledger.
//!
//! Every automation stop-loss write takes the ticket's lock, compares its
//! candidate with the ledger, sends, and records on success. The lock is a
//! fair async mutex, so writers on one ticket are served in arrival order
//! while writers on different tickets never wait on each other.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use rust_decimal::Decimal;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::domain::shared::{Side, Ticket};

/// Best stop-loss known for one ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StopLedgerEntry {
    stop_loss: Option<Decimal>,
}

impl StopLedgerEntry {
    /// Most protective stop applied or observed so far.
    pub const fn stop_loss(&self) -> Option<Decimal> {
        self.stop_loss
    }

    /// Whether `candidate` would tighten protection for a position on `side`.
    pub fn improves(&self, side: Side, candidate: Decimal) -> bool {
        self.stop_loss
            .is_none_or(|current| side.is_more_protective(candidate, current))
    }

    /// Record `stop_loss` if it is more protective than the ledger.
    pub fn record(&mut self, side: Side, stop_loss: Decimal) {
        if self.improves(side, stop_loss) {
            self.stop_loss = Some(stop_loss);
        }
    }
}

/// Exclusive access to one ticket's ledger entry.
pub type TicketLease = OwnedMutexGuard<StopLedgerEntry>;

/// Serializes stop-loss writes per ticket.
#[derive(Debug, Default)]
pub struct TicketMutationQueue {
    tickets: Mutex<HashMap<Ticket, Arc<AsyncMutex<StopLedgerEntry>>>>,
}

impl TicketMutationQueue {
    /// Empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, ticket: Ticket) -> Arc<AsyncMutex<StopLedgerEntry>> {
        Arc::clone(self.tickets.lock().entry(ticket).or_default())
    }

    /// Wait for exclusive access to `ticket`.
    pub async fn lease(&self, ticket: Ticket) -> TicketLease {
        self.slot(ticket).lock_owned().await
    }

    /// Merge a stop observed on the backend into the ledger.
    pub async fn observe(&self, ticket: Ticket, side: Side, stop_loss: Option<Decimal>) {
        if let Some(stop_loss) = stop_loss {
            self.lease(ticket).await.record(side, stop_loss);
        }
    }

    /// Current ledger value without queueing behind writers.
    pub fn snapshot(&self, ticket: Ticket) -> Option<Decimal> {
        let slot = self.tickets.lock().get(&ticket).cloned()?;
        let entry = slot.try_lock().ok()?;
        entry.stop_loss()
    }

    /// Drop the ledger entry of a closed ticket.
    pub fn forget(&self, ticket: Ticket) {
        self.tickets.lock().remove(&ticket);
    }

    /// Number of tickets with a ledger entry.
    pub fn len(&self) -> usize {
        self.tickets.lock().len()
    }

    /// Whether no ticket has a ledger entry.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
