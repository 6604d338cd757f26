//! Equity circuit breaker limits.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use super::{GuardDecision, GuardKind};

/// Account limits that stop trading. Every limit is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EquityLimits {
    /// Equity floor in account currency.
    #[serde(default)]
    pub min_equity: Option<Decimal>,
    /// Largest loss since the start of the day, as a percentage of that day's opening equity.
    #[serde(default)]
    pub max_daily_drawdown_percent: Option<Decimal>,
    /// Largest loss since the start of the day, in account currency.
    #[serde(default)]
    pub max_daily_loss: Option<Decimal>,
    /// Entry is refused once this many positions are open.
    #[serde(default)]
    pub max_open_positions: Option<usize>,
    /// Entry is refused when the run would risk more than this percentage of balance.
    #[serde(default)]
    pub risk_per_trade_cap_percent: Option<Decimal>,
}

impl EquityLimits {
    /// Only an equity floor.
    #[must_use]
    pub fn floor(min_equity: Decimal) -> Self {
        Self {
            min_equity: Some(min_equity),
            ..Self::default()
        }
    }
}

/// Account state one evaluation is based on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EquitySnapshot {
    /// Current equity.
    pub equity: Decimal,
    /// Equity at the first evaluation of the day.
    pub day_start_equity: Decimal,
    /// Open positions; the position cap is skipped when `None`.
    pub open_positions: Option<usize>,
    /// Risk of the upcoming trade in percent; the risk cap is skipped when `None`.
    pub trade_risk_percent: Option<Decimal>,
}

impl EquitySnapshot {
    /// Loss since the start of the day; negative when the day is up.
    #[must_use]
    pub fn daily_loss(&self) -> Decimal {
        self.day_start_equity - self.equity
    }

    /// Daily loss as a percentage of the opening equity.
    #[must_use]
    pub fn daily_drawdown_percent(&self) -> Option<Decimal> {
        (self.day_start_equity > Decimal::ZERO).then(|| self.daily_loss() / self.day_start_equity * dec!(100))
    }
}

/// Which limit was hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EquityBreach {
    /// Equity below the floor.
    MinEquity,
    /// Daily drawdown percentage reached.
    DailyDrawdown,
    /// Daily loss reached.
    DailyLoss,
    /// Position cap reached.
    MaxOpenPositions,
    /// Trade risk above the cap.
    RiskPerTrade,
}

impl EquityBreach {
    /// Stable reason code.
    #[must_use]
    pub const fn reason(self) -> &'static str {
        match self {
            Self::MinEquity => "min_equity",
            Self::DailyDrawdown => "daily_drawdown",
            Self::DailyLoss => "daily_loss",
            Self::MaxOpenPositions => "max_open_positions",
            Self::RiskPerTrade => "risk_per_trade",
        }
    }
}

/// Evaluates [`EquityLimits`] against an account snapshot.
pub struct EquityGuard;

impl EquityGuard {
    /// First limit `snapshot` breaches, in declaration order, with its threshold and observed value.
    #[must_use]
    pub fn breach(limits: &EquityLimits, snapshot: &EquitySnapshot) -> Option<(EquityBreach, Decimal, Decimal)> {
        if let Some(floor) = limits.min_equity {
            if snapshot.equity < floor {
                return Some((EquityBreach::MinEquity, floor, snapshot.equity));
            }
        }
        if let (Some(limit), Some(drawdown)) = (limits.max_daily_drawdown_percent, snapshot.daily_drawdown_percent()) {
            if drawdown >= limit.abs() {
                return Some((EquityBreach::DailyDrawdown, limit.abs(), drawdown.round_dp(2)));
            }
        }
        if let Some(limit) = limits.max_daily_loss {
            if snapshot.daily_loss() >= limit.abs() {
                return Some((EquityBreach::DailyLoss, limit.abs(), snapshot.daily_loss()));
            }
        }
        if let (Some(cap), Some(open)) = (limits.max_open_positions, snapshot.open_positions) {
            if open >= cap {
                return Some((EquityBreach::MaxOpenPositions, Decimal::from(cap), Decimal::from(open)));
            }
        }
        if let (Some(cap), Some(risk)) = (limits.risk_per_trade_cap_percent, snapshot.trade_risk_percent) {
            if risk > cap {
                return Some((EquityBreach::RiskPerTrade, cap, risk));
            }
        }
        None
    }

    /// Decision record for `snapshot`.
    #[must_use]
    pub fn evaluate(limits: &EquityLimits, snapshot: &EquitySnapshot, now: DateTime<Utc>) -> GuardDecision {
        let breach = Self::breach(limits, snapshot);
        let (threshold, observed, detail) = match breach {
            Some((breach, threshold, observed)) => (
                Some(threshold),
                Some(observed),
                format!("blocked_{}: {observed} against {threshold}", breach.reason()),
            ),
            None => (limits.min_equity, Some(snapshot.equity), format!("equity {} within limits", snapshot.equity)),
        };
        GuardDecision {
            kind: GuardKind::Equity,
            threshold,
            observed,
            passed: breach.is_none(),
            detail,
            evaluated_at: now,
        }
    }
}
