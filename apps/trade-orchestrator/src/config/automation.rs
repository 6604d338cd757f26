//! Automation scheduler configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Background routine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationConfig {
    /// How often a routine checks that its ticket still exists.
    #[serde(default = "default_reconcile_interval_ms")]
    pub reconcile_interval_ms: u64,
    /// Deadline for one stop-loss write, retries included.
    #[serde(default = "default_modify_timeout_ms")]
    pub modify_timeout_ms: u64,
    /// Finished subscriptions kept queryable, oldest evicted first.
    #[serde(default = "default_finished_history")]
    pub finished_history: usize,
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            reconcile_interval_ms: default_reconcile_interval_ms(),
            modify_timeout_ms: default_modify_timeout_ms(),
            finished_history: default_finished_history(),
        }
    }
}

impl AutomationConfig {
    /// Reconciliation period.
    #[must_use]
    pub const fn reconcile_interval(&self) -> Duration {
        Duration::from_millis(self.reconcile_interval_ms)
    }

    /// Stop-loss write deadline.
    #[must_use]
    pub const fn modify_timeout(&self) -> Duration {
        Duration::from_millis(self.modify_timeout_ms)
    }
}

const fn default_reconcile_interval_ms() -> u64 {
    1_000
}

const fn default_modify_timeout_ms() -> u64 {
    10_000
}

const fn default_finished_history() -> usize {
    256
}
