//! Automation subscription records.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::shared::{SubscriptionId, Ticket};

/// Kind of background automation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AutomationKind {
    /// Stop-loss follows price at a fixed distance.
    Trailing,
    /// Stop-loss moves to entry once, after a profit trigger.
    Breakeven,
}

impl fmt::Display for AutomationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Trailing => f.write_str("trailing"),
            Self::Breakeven => f.write_str("breakeven"),
        }
    }
}

/// Rule parameters, in price units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum AutomationParams {
    /// Trailing stop.
    Trailing {
        /// Distance between price and stop.
        distance: Decimal,
        /// Minimum improvement before a new stop is written.
        step: Option<Decimal>,
        /// Favorable move from entry before the first stop is written.
        #[serde(default)]
        activation: Option<Decimal>,
    },
    /// Move to breakeven.
    Breakeven {
        /// Favorable move from entry that arms the rule.
        trigger: Decimal,
        /// Offset beyond entry for the new stop.
        plus: Decimal,
    },
}

impl AutomationParams {
    /// The automation kind these parameters configure.
    #[must_use]
    pub const fn kind(&self) -> AutomationKind {
        match self {
            Self::Trailing { .. } => AutomationKind::Trailing,
            Self::Breakeven { .. } => AutomationKind::Breakeven,
        }
    }
}

/// Request to start an automation on a ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutomationRequest {
    /// Target position.
    pub ticket: Ticket,
    /// Rule parameters.
    pub params: AutomationParams,
    /// Price decimals used to round computed stops.
    pub digits: u32,
}

impl AutomationRequest {
    /// Trailing request.
    #[must_use]
    pub const fn trailing(ticket: Ticket, distance: Decimal, step: Option<Decimal>, digits: u32) -> Self {
        Self {
            ticket,
            params: AutomationParams::Trailing {
                distance,
                step,
                activation: None,
            },
            digits,
        }
    }

    /// Hold a trailing request back until price has moved `activation` in favor.
    ///
    /// No effect on breakeven requests.
    #[must_use]
    pub fn with_activation(mut self, activation: Decimal) -> Self {
        if let AutomationParams::Trailing { activation: slot, .. } = &mut self.params {
            *slot = Some(activation);
        }
        self
    }

    /// Breakeven request.
    #[must_use]
    pub const fn breakeven(ticket: Ticket, trigger: Decimal, plus: Decimal, digits: u32) -> Self {
        Self {
            ticket,
            params: AutomationParams::Breakeven { trigger, plus },
            digits,
        }
    }

    /// Kind of automation requested.
    #[must_use]
    pub const fn kind(&self) -> AutomationKind {
        self.params.kind()
    }
}

/// Lifecycle of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    /// Routine is running.
    Active,
    /// Stopped explicitly, superseded, or cancelled with its parent run.
    Cancelled,
    /// Finished on its own: breakeven applied or position gone.
    Completed,
}

impl SubscriptionStatus {
    /// Whether the subscription has finished.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Active)
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => f.write_str("active"),
            Self::Cancelled => f.write_str("cancelled"),
            Self::Completed => f.write_str("completed"),
        }
    }
}

/// Snapshot of one automation subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutomationSubscription {
    /// Subscription id.
    pub id: SubscriptionId,
    /// Target position.
    pub ticket: Ticket,
    /// Rule parameters.
    pub params: AutomationParams,
    /// Current status.
    pub status: SubscriptionStatus,
    /// When the routine was started.
    pub started_at: DateTime<Utc>,
}

impl AutomationSubscription {
    /// Kind of this subscription.
    #[must_use]
    pub const fn kind(&self) -> AutomationKind {
        self.params.kind()
    }
}
