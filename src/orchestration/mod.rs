//! Orchestration layer for test-first code generation.
//!
//! The [`TddOrchestrator`] drives a test-writing agent and a coding agent
//! through RED/YELLOW/GREEN, running the generated tests through a
//! [`TestRunner`] and persisting files through a [`FileManager`].

pub mod agent;
pub mod extraction;
pub mod orchestrator;
pub mod prompts;
pub mod testing;

pub use agent::{Agent, DiskFileManager, FileManager, MemoryFileManager, TestRunner};
pub use extraction::{extract_code_files, render_code_files, CodeFiles};
pub use orchestrator::{
    FeatureOutcome, FeatureStatus, TddOrchestrator, WorkflowOutcome, DEFAULT_IMPL_FILE, DEFAULT_TEST_FILE,
};
pub use testing::{TestResult, TestRunReport, CRASH_MESSAGE, TIMEOUT_MESSAGE};
