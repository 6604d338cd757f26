//! Application services: long-lived components shared by every run.

pub mod automation_scheduler;
pub mod feed_manager;
pub mod mutation_queue;
pub mod pacer;
pub mod retry;
pub mod rpc_guard;
pub mod session_gate;

pub use automation_scheduler::AutomationScheduler;
pub use feed_manager::{FeedEvent, FeedKey, FeedManager, FeedSubscription};
pub use mutation_queue::{StopLedgerEntry, TicketLease, TicketMutationQueue};
pub use pacer::CallPacer;
pub use retry::{ExponentialBackoff, RetryPolicy};
pub use rpc_guard::RpcGuard;
pub use session_gate::{GateOutcome, SessionGate};
