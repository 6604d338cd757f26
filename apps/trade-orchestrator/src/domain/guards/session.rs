//! Trading-session schedule.
//!
//! Windows are half-open `[start, end)` intervals of local wall-clock time
//! in the schedule's timezone. A window whose start is after its end wraps
//! past midnight (`22:00`-`06:00`); a window whose start equals its end
//! spans the whole day. The weekday filter applies to the local date of
//! the instant being evaluated.

use chrono::{DateTime, Datelike, NaiveDateTime, NaiveTime, Timelike, Utc, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{GuardDecision, GuardKind};

/// Session schedule errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// A wall-clock value was not `HH:MM`.
    #[error("invalid session time '{value}': expected HH:MM")]
    InvalidTime {
        /// Offending input.
        value: String,
    },

    /// Unknown IANA timezone name.
    #[error("unknown timezone '{name}'")]
    UnknownTimezone {
        /// Offending input.
        name: String,
    },
}

fn parse_hhmm(value: &str) -> Result<NaiveTime, SessionError> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M").map_err(|_| SessionError::InvalidTime {
        value: value.to_string(),
    })
}

/// One `[start, end)` window of local time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionWindow {
    /// Inclusive start.
    pub start: NaiveTime,
    /// Exclusive end.
    pub end: NaiveTime,
}

impl SessionWindow {
    /// Window from two times.
    #[must_use]
    pub const fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    /// Window from `"HH:MM"` strings.
    pub fn parse(start: &str, end: &str) -> Result<Self, SessionError> {
        Ok(Self::new(parse_hhmm(start)?, parse_hhmm(end)?))
    }

    /// Whether the window wraps past midnight.
    #[must_use]
    pub fn crosses_midnight(&self) -> bool {
        self.start > self.end
    }

    /// Whether local time `t` falls inside the window.
    #[must_use]
    pub fn contains(&self, t: NaiveTime) -> bool {
        if self.start == self.end {
            true
        } else if self.crosses_midnight() {
            t >= self.start || t < self.end
        } else {
            self.start <= t && t < self.end
        }
    }
}

/// Whether trading is allowed inside or outside the windows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowMode {
    /// Trade only inside a window.
    #[default]
    Inside,
    /// Trade only outside every window.
    Outside,
}

/// Blackout around the daily rollover, `[at - buffer, at + buffer]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolloverBlackout {
    /// Local rollover time.
    pub at: NaiveTime,
    /// Minutes blocked on either side.
    pub buffer_minutes: u32,
}

impl RolloverBlackout {
    /// Blackout from an `"HH:MM"` rollover time.
    pub fn parse(at: &str, buffer_minutes: u32) -> Result<Self, SessionError> {
        Ok(Self {
            at: parse_hhmm(at)?,
            buffer_minutes,
        })
    }

    /// Whether local time `t` is inside the blackout.
    #[must_use]
    pub fn contains(&self, t: NaiveTime) -> bool {
        const DAY: i64 = 24 * 60;
        let minutes = |x: NaiveTime| i64::from(x.num_seconds_from_midnight()) / 60;
        let diff = (minutes(t) - minutes(self.at)).rem_euclid(DAY);
        diff.min(DAY - diff) <= i64::from(self.buffer_minutes)
    }
}

/// Well-known FX sessions, in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionPreset {
    /// 07:00-16:30.
    London,
    /// 12:00-21:00.
    NewYork,
    /// 00:00-08:00.
    Tokyo,
    /// 22:00-06:00, overnight.
    Sydney,
    /// 07:00-21:00, London open to New York close.
    LondonNewYorkOverlap,
}

impl SessionPreset {
    /// The preset's window.
    #[must_use]
    pub fn window(self) -> SessionWindow {
        let (start, end) = match self {
            Self::London => ((7, 0), (16, 30)),
            Self::NewYork => ((12, 0), (21, 0)),
            Self::Tokyo => ((0, 0), (8, 0)),
            Self::Sydney => ((22, 0), (6, 0)),
            Self::LondonNewYorkOverlap => ((7, 0), (21, 0)),
        };
        let at = |(h, m): (u32, u32)| NaiveTime::from_hms_opt(h, m, 0).unwrap_or(NaiveTime::MIN);
        SessionWindow::new(at(start), at(end))
    }
}

/// Result of evaluating a schedule at one instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDecision {
    /// Whether execution is permitted.
    pub allowed: bool,
    /// Whether the local time is inside any window.
    pub in_window: bool,
    /// Whether the local weekday is allowed.
    pub weekday_allowed: bool,
    /// Whether the local time is inside the rollover blackout.
    pub in_rollover: bool,
    /// Local wall-clock time evaluated.
    pub local_time: NaiveDateTime,
    /// Instant evaluated.
    pub evaluated_at: DateTime<Utc>,
}

impl SessionDecision {
    /// Short reason for the decision.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        if self.allowed {
            "inside trading session"
        } else if !self.weekday_allowed {
            "weekday not allowed"
        } else if self.in_rollover {
            "rollover blackout"
        } else {
            "outside trading session"
        }
    }

    /// The decision as a published guard record.
    #[must_use]
    pub fn to_guard_decision(&self) -> GuardDecision {
        GuardDecision {
            kind: GuardKind::Session,
            threshold: None,
            observed: None,
            passed: self.allowed,
            detail: format!("{} at {}", self.reason(), self.local_time),
            evaluated_at: self.evaluated_at,
        }
    }
}

const WEEKDAYS: [Weekday; 5] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
];

/// Windows, timezone, weekdays and blackout that together gate execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSchedule {
    /// Trading windows.
    pub windows: Vec<SessionWindow>,
    /// Timezone the windows are expressed in.
    pub timezone: Tz,
    /// Allowed local weekdays.
    pub weekdays: Vec<Weekday>,
    /// Inside or outside the windows.
    #[serde(default)]
    pub mode: WindowMode,
    /// Optional rollover blackout.
    #[serde(default)]
    pub rollover: Option<RolloverBlackout>,
}

impl SessionSchedule {
    /// Empty schedule in `timezone`, Monday to Friday.
    #[must_use]
    pub fn new(timezone: Tz) -> Self {
        Self {
            windows: Vec::new(),
            timezone,
            weekdays: WEEKDAYS.to_vec(),
            mode: WindowMode::Inside,
            rollover: None,
        }
    }

    /// Schedule in a named IANA timezone.
    pub fn in_timezone(name: &str) -> Result<Self, SessionError> {
        let tz: Tz = name.parse().map_err(|_| SessionError::UnknownTimezone {
            name: name.to_string(),
        })?;
        Ok(Self::new(tz))
    }

    /// Schedule for a named session, in UTC.
    #[must_use]
    pub fn preset(preset: SessionPreset) -> Self {
        Self::new(Tz::UTC).with_window(preset.window())
    }

    /// Add a window.
    #[must_use]
    pub fn with_window(mut self, window: SessionWindow) -> Self {
        self.windows.push(window);
        self
    }

    /// Replace the allowed weekdays.
    #[must_use]
    pub fn with_weekdays(mut self, weekdays: impl IntoIterator<Item = Weekday>) -> Self {
        self.weekdays = weekdays.into_iter().collect();
        self
    }

    /// Trade only outside the windows.
    #[must_use]
    pub fn outside_windows(mut self) -> Self {
        self.mode = WindowMode::Outside;
        self
    }

    /// Block trading around the rollover.
    #[must_use]
    pub fn with_rollover(mut self, rollover: RolloverBlackout) -> Self {
        self.rollover = Some(rollover);
        self
    }

    /// Evaluate the schedule at `now`.
    #[must_use]
    pub fn evaluate(&self, now: DateTime<Utc>) -> SessionDecision {
        let local = now.with_timezone(&self.timezone);
        let time = local.time();
        let weekday_allowed = self.weekdays.contains(&local.weekday());
        let in_window = self.windows.iter().any(|w| w.contains(time));
        let in_rollover = self.rollover.is_some_and(|r| r.contains(time));
        let window_ok = match self.mode {
            WindowMode::Inside => in_window,
            WindowMode::Outside => !in_window,
        };
        SessionDecision {
            allowed: weekday_allowed && window_ok && !in_rollover,
            in_window,
            weekday_allowed,
            in_rollover,
            local_time: local.naive_local(),
            evaluated_at: now,
        }
    }
}
