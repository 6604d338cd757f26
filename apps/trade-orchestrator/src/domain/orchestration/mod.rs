//! Orchestrator run state machines and outcomes.

mod outcome;
mod run_state;

pub use outcome::{RunOutcome, RunStatus};
pub use run_state::{RunKind, RunState, RunStateError, RunStateMachine};
