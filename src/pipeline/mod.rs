//! Persistent job pipeline state.
//!
//! Pipelines move through planning, design, test generation,
//! implementation, testing and review to completion. The store is shared
//! by concurrent jobs and guarded by one lock.

mod manager;
mod types;

pub use manager::StateManager;
pub use types::{
    Artifact, HumanFeedback, PipelineFile, PipelineId, PipelineStage, PipelineState, PipelineStatus,
    StageChange, PIPELINE_STATE_VERSION,
};
