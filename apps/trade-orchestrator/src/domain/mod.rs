//! Domain Layer
//!
//! Pure types and decisions with no I/O: value objects, presets, stop
//! rules, guard evaluation and run state machines.

pub mod automation;
pub mod events;
pub mod guards;
pub mod market;
pub mod orchestration;
pub mod presets;
pub mod shared;
pub mod sizing;
