//! Infrastructure Layer
//!
//! Adapters behind the application ports, plus the dependency container.

pub mod broadcast;
pub mod clock;
pub mod container;
pub mod metrics;
pub mod paper;
