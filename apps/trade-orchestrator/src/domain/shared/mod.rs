//! Shared kernel: value objects used across every bounded context.

pub mod value_objects;

pub use value_objects::{RunId, Side, SubscriptionId, Symbol, Ticket};
