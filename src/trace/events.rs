//! Trace record types.
//!
//! Every record is plain serde data; phases and enums are stored in their
//! string form so a report always serializes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Instant;

/// Kind of a traced event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TraceEventType {
    PhaseStart,
    PhaseEnd,
    PhaseTransition,
    AgentRequest,
    AgentResponse,
    CommandExecution,
    TestExecution,
    FileOperation,
    Error,
    Info,
}

impl TraceEventType {
    /// Events that make up the report timeline.
    pub fn is_timeline(&self) -> bool {
        matches!(
            self,
            TraceEventType::PhaseStart | TraceEventType::PhaseEnd | TraceEventType::PhaseTransition
        )
    }
}

/// One entry in the append-only event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TracedEvent {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: TraceEventType,
    pub phase: Option<String>,
    pub agent: Option<String>,
    pub iteration: Option<u32>,
    #[serde(default)]
    pub data: Value,
}

/// One request/response round trip with an agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentExchange {
    pub exchange_id: String,
    pub agent_name: String,
    pub phase: Option<String>,
    pub iteration: u32,
    pub request_time: DateTime<Utc>,
    pub request_data: Value,
    pub response_time: Option<DateTime<Utc>>,
    pub response_data: Option<Value>,
    #[serde(default)]
    pub streaming_chunks: Vec<String>,
    pub duration_ms: Option<u64>,
    pub success: bool,
    pub error: Option<String>,
    #[serde(skip)]
    pub(crate) started: Option<Instant>,
}

/// A shell or sandbox command run on behalf of the workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandExecution {
    pub command: String,
    pub working_dir: Option<String>,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
    pub timestamp: DateTime<Utc>,
}

/// One test run and its counts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestExecution {
    pub phase: Option<String>,
    pub iteration: Option<u32>,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub timed_out: bool,
    pub duration_ms: u64,
    pub output: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileOperationKind {
    Create,
    Modify,
    Read,
    Delete,
}

impl std::fmt::Display for FileOperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileOperationKind::Create => write!(f, "create"),
            FileOperationKind::Modify => write!(f, "modify"),
            FileOperationKind::Read => write!(f, "read"),
            FileOperationKind::Delete => write!(f, "delete"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileOperation {
    pub operation: FileOperationKind,
    pub path: String,
    pub size_bytes: usize,
    pub timestamp: DateTime<Utc>,
}

/// Running counters for a session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metrics {
    pub total_events: u64,
    pub agent_interactions: u64,
    pub commands_executed: u64,
    pub tests_run: u64,
    pub files_created: u64,
    pub files_modified: u64,
    pub total_duration_ms: u64,
}
