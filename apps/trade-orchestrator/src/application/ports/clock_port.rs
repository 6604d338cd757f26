//! Wall-clock port.

use chrono::{DateTime, Utc};

/// Source of the current wall-clock time.
///
/// Session windows are wall-clock rules, so guards read time through this
/// port instead of calling `Utc::now()` directly.
pub trait Clock: Send + Sync {
    /// Current instant.
    fn now(&self) -> DateTime<Utc>;
}
