//! Application Layer
//!
//! The application layer drives the domain against the trading backend.
//! It defines:
//!
//! - **Ports**: Interfaces to the trading terminal and the wall clock
//! - **Services**: Long-lived components (guard, feeds, scheduler, gate)
//! - **Use Cases**: Orchestrators for one trading action each

pub mod ports;
pub mod services;
pub mod use_cases;

pub use ports::*;
pub use use_cases::*;
