//! Value objects shared by the domain contexts.

mod identifiers;
mod side;
mod symbol;

pub use identifiers::{RunId, SubscriptionId, Ticket};
pub use side::Side;
pub use symbol::Symbol;
