//! Core TDD workflow type definitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default cap on RED/YELLOW/GREEN iterations per run.
pub const DEFAULT_MAX_ITERATIONS: u32 = 5;

/// Default wall-clock limit for one test run, in seconds.
pub const DEFAULT_TEST_TIMEOUT_SECS: u64 = 30;

/// Unique identifier for one orchestration session.
///
/// Uses UUID v4 for generation and provides a short form display
/// for human-readable output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Return first 8 characters of the UUID for display.
    pub fn short(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// TDD phases.
///
/// - Red: write failing tests
/// - Yellow: implement code against the tests
/// - Green: run the tests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TddPhase {
    Red,
    Yellow,
    Green,
}

impl TddPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            TddPhase::Red => "RED",
            TddPhase::Yellow => "YELLOW",
            TddPhase::Green => "GREEN",
        }
    }
}

impl std::fmt::Display for TddPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal status of a workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    /// All tests passed.
    Completed,
    /// Iteration cap reached with failing tests.
    Incomplete,
    /// No tests were produced, or a failure was not retryable.
    Failed,
}

impl std::fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkflowStatus::Completed => write!(f, "completed"),
            WorkflowStatus::Incomplete => write!(f, "incomplete"),
            WorkflowStatus::Failed => write!(f, "failed"),
        }
    }
}

/// One recorded move between phases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseTransition {
    pub from_phase: TddPhase,
    pub to_phase: TddPhase,
    pub validation_passed: bool,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

impl PhaseTransition {
    pub fn new(from_phase: TddPhase, to_phase: TddPhase, validation_passed: bool, reason: impl Into<String>) -> Self {
        Self {
            from_phase,
            to_phase,
            validation_passed,
            reason: reason.into(),
            timestamp: Utc::now(),
        }
    }

    /// One-line description used in logs and report timelines.
    pub fn describe(&self) -> String {
        format!(
            "Transitioned from {} to {}: {}",
            self.from_phase, self.to_phase, self.reason
        )
    }
}

/// Workflow limits, loaded from the `[workflow]` config section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    /// Maximum RED/YELLOW/GREEN iterations before giving up.
    pub max_iterations: u32,
    /// Hard limit for one test run.
    pub test_timeout_secs: u64,
    /// Write `execution_report_{session}.json` at the end of a run.
    pub save_report: bool,
    /// Override for the report directory (supports `~/`).
    pub report_dir: Option<String>,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            test_timeout_secs: DEFAULT_TEST_TIMEOUT_SECS,
            save_report: true,
            report_dir: None,
        }
    }
}

impl WorkflowConfig {
    pub fn test_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.test_timeout_secs)
    }
}
