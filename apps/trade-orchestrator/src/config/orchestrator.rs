//! Orchestrator configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Timing for orchestrator runs and guard polls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Fill polling period for pending orders.
    #[serde(default = "default_fill_poll_interval_ms")]
    pub fill_poll_interval_ms: u64,
    /// Default pending order lifetime.
    #[serde(default = "default_pending_timeout_s")]
    pub pending_timeout_s: u64,
    /// Session guard polling period.
    #[serde(default = "default_session_poll_interval_ms")]
    pub session_poll_interval_ms: u64,
    /// Deadline for one orchestrator step, retries included.
    #[serde(default = "default_step_timeout_ms")]
    pub step_timeout_ms: u64,
    /// Equity circuit breaker polling period.
    #[serde(default = "default_equity_poll_interval_ms")]
    pub equity_poll_interval_ms: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            fill_poll_interval_ms: default_fill_poll_interval_ms(),
            pending_timeout_s: default_pending_timeout_s(),
            session_poll_interval_ms: default_session_poll_interval_ms(),
            step_timeout_ms: default_step_timeout_ms(),
            equity_poll_interval_ms: default_equity_poll_interval_ms(),
        }
    }
}

impl OrchestratorConfig {
    /// Fill polling period.
    #[must_use]
    pub const fn fill_poll_interval(&self) -> Duration {
        Duration::from_millis(self.fill_poll_interval_ms)
    }

    /// Default pending order lifetime.
    #[must_use]
    pub const fn pending_timeout(&self) -> Duration {
        Duration::from_secs(self.pending_timeout_s)
    }

    /// Session polling period.
    #[must_use]
    pub const fn session_poll_interval(&self) -> Duration {
        Duration::from_millis(self.session_poll_interval_ms)
    }

    /// Step deadline.
    #[must_use]
    pub const fn step_timeout(&self) -> Duration {
        Duration::from_millis(self.step_timeout_ms)
    }

    /// Equity polling period.
    #[must_use]
    pub const fn equity_poll_interval(&self) -> Duration {
        Duration::from_millis(self.equity_poll_interval_ms)
    }
}

const fn default_fill_poll_interval_ms() -> u64 {
    200
}

const fn default_pending_timeout_s() -> u64 {
    900
}

const fn default_session_poll_interval_ms() -> u64 {
    1_000
}

const fn default_step_timeout_ms() -> u64 {
    15_000
}

const fn default_equity_poll_interval_ms() -> u64 {
    1_000
}
