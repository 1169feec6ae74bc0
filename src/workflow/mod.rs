//! TDD workflow types and the phase state machine.
//!
//! A session moves through RED (write tests), YELLOW (implement) and
//! GREEN (run tests) until the tests pass or the iteration cap is hit.

mod state;
mod types;

pub use state::PhaseMachine;
pub use types::{
    PhaseTransition, SessionId, TddPhase, WorkflowConfig, WorkflowStatus, DEFAULT_MAX_ITERATIONS,
    DEFAULT_TEST_TIMEOUT_SECS,
};
