//! Position automation context.
//!
//! Pure stop-loss rules for trailing and breakeven plus the subscription
//! records the scheduler keeps for each running routine.

mod breakeven;
mod subscription;
mod trailing;

pub use breakeven::BreakevenRule;
pub use subscription::{
    AutomationKind, AutomationParams, AutomationRequest, AutomationSubscription,
    SubscriptionStatus,
};
pub use trailing::TrailingRule;
