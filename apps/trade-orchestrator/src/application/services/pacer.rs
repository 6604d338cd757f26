//! Client-side call pacing.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

/// Enforces a minimum spacing between backend calls.
///
/// Callers queue on an async mutex, so slots are handed out in arrival order.
#[derive(Debug)]
pub struct CallPacer {
    interval: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl CallPacer {
    /// Pacer allowing one call per `interval`.
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_slot: Mutex::new(None),
        }
    }

    /// Pacer allowing `per_second` calls per second.
    #[must_use]
    pub fn per_second(per_second: u32) -> Self {
        Self::new(Duration::from_secs(1) / per_second.max(1))
    }

    /// Wait for the next free slot.
    pub async fn acquire(&self) {
        let mut next_slot = self.next_slot.lock().await;
        let now = Instant::now();
        let slot = match *next_slot {
            Some(slot) if slot > now => {
                tokio::time::sleep_until(slot).await;
                slot
            }
            _ => now,
        };
        *next_slot = Some(slot + self.interval);
    }
}
