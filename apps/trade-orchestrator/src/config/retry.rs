//! Retry configuration for guarded backend calls.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Retry, backoff and pacing for the RPC guard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries after the first attempt before giving up.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// First backoff delay.
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    /// Backoff ceiling.
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    /// Exponential growth factor.
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    /// Randomization, 0.1 = ±10%.
    #[serde(default = "default_jitter_factor")]
    pub jitter_factor: f64,
    /// Upper bound for a single backend call.
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,
    /// Minimum spacing between backend calls; 0 disables pacing.
    #[serde(default)]
    pub min_call_interval_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter_factor: default_jitter_factor(),
            call_timeout_ms: default_call_timeout_ms(),
            min_call_interval_ms: 0,
        }
    }
}

impl RetryConfig {
    /// First backoff delay.
    #[must_use]
    pub const fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    /// Backoff ceiling.
    #[must_use]
    pub const fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }

    /// Single-call timeout.
    #[must_use]
    pub const fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    /// Pacing interval, if enabled.
    #[must_use]
    pub const fn min_call_interval(&self) -> Option<Duration> {
        if self.min_call_interval_ms == 0 {
            None
        } else {
            Some(Duration::from_millis(self.min_call_interval_ms))
        }
    }
}

const fn default_max_retries() -> u32 {
    5
}

const fn default_initial_backoff_ms() -> u64 {
    100
}

const fn default_max_backoff_ms() -> u64 {
    5_000
}

const fn default_backoff_multiplier() -> f64 {
    2.0
}

const fn default_jitter_factor() -> f64 {
    0.1
}

const fn default_call_timeout_ms() -> u64 {
    10_000
}
