//! Event Bus
//!
//! Fan-out of [`EngineEvent`]s over a tokio broadcast channel. Publishing
//! never blocks and never fails: with no subscribers the event is dropped,
//! and a slow subscriber lags rather than stalling the publisher.

use tokio::sync::broadcast;

use crate::domain::events::EngineEvent;

/// Default event channel capacity.
pub const DEFAULT_EVENT_CAPACITY: usize = 4096;

/// Typed event channel shared by every component.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    /// Create a bus buffering up to `capacity` events per subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish an event to every current subscriber.
    pub fn publish(&self, event: EngineEvent) {
        // No subscribers is not an error.
        let _ = self.tx.send(event);
    }

    /// Subscribe to events published from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }

    /// Number of active subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_reaches_all_subscribers() {
        let bus = EventBus::default();
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        bus.publish(EngineEvent::Reconnected { generation: 1 });

        assert_eq!(a.recv().await.unwrap(), EngineEvent::Reconnected { generation: 1 });
        assert_eq!(b.recv().await.unwrap(), EngineEvent::Reconnected { generation: 1 });
    }

    #[test]
    fn publish_without_subscribers_is_silent() {
        let bus = EventBus::new(4);
        bus.publish(EngineEvent::Reconnected { generation: 7 });
        assert_eq!(bus.subscriber_count(), 0);
    }
}
