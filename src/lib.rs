pub mod analysis;
pub mod config;
pub mod core;
pub mod error;
pub mod log;
pub mod orchestration;
pub mod pipeline;
pub mod retry;
pub mod trace;
pub mod util;
pub mod workflow;

pub use error::{Error, Result};
pub use orchestration::{TddOrchestrator, WorkflowOutcome};
pub use pipeline::StateManager;
pub use workflow::{SessionId, TddPhase, WorkflowStatus};
