//! Live feed configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Feed subscription manager settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Broadcast capacity per stream.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    /// Recent (symbol, timestamp) keys remembered per stream for dedup.
    #[serde(default = "default_dedup_window")]
    pub dedup_window: usize,
    /// Deadline for one (re)subscription, retries included.
    #[serde(default = "default_subscribe_timeout_ms")]
    pub subscribe_timeout_ms: u64,
    /// Wait after a feed is reported unavailable before trying again.
    #[serde(default = "default_resubscribe_cooldown_ms")]
    pub resubscribe_cooldown_ms: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
            dedup_window: default_dedup_window(),
            subscribe_timeout_ms: default_subscribe_timeout_ms(),
            resubscribe_cooldown_ms: default_resubscribe_cooldown_ms(),
        }
    }
}

impl FeedConfig {
    /// Subscription deadline.
    #[must_use]
    pub const fn subscribe_timeout(&self) -> Duration {
        Duration::from_millis(self.subscribe_timeout_ms)
    }

    /// Cooldown after `FeedUnavailable`.
    #[must_use]
    pub const fn resubscribe_cooldown(&self) -> Duration {
        Duration::from_millis(self.resubscribe_cooldown_ms)
    }
}

const fn default_channel_capacity() -> usize {
    1024
}

const fn default_dedup_window() -> usize {
    256
}

const fn default_subscribe_timeout_ms() -> u64 {
    15_000
}

const fn default_resubscribe_cooldown_ms() -> u64 {
    1_000
}
