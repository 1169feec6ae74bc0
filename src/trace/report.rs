//! Execution report schema and timeline rendering.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use super::events::{
    AgentExchange, CommandExecution, FileOperation, Metrics, TestExecution, TraceEventType, TracedEvent,
};
use crate::Result;

/// Per-category record counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub total_events: usize,
    pub agent_exchanges: usize,
    pub command_executions: usize,
    pub test_executions: usize,
}

/// One human-readable timeline line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub timestamp: DateTime<Utc>,
    pub event_type: TraceEventType,
    pub description: String,
}

/// Everything a tracer recorded for one session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub session_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_ms: u64,
    pub metrics: Metrics,
    pub summary: ReportSummary,
    pub agent_exchanges: Vec<AgentExchange>,
    pub command_executions: Vec<CommandExecution>,
    pub test_executions: Vec<TestExecution>,
    #[serde(default)]
    pub file_operations: Vec<FileOperation>,
    pub events: Vec<TracedEvent>,
    pub timeline: Vec<TimelineEntry>,
}

impl ExecutionReport {
    /// Read a report previously written by `save_report`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// Phase start/end/transition events, sorted by time, as one-liners.
pub fn build_timeline(events: &[TracedEvent]) -> Vec<TimelineEntry> {
    let mut timeline: Vec<TimelineEntry> = events
        .iter()
        .filter(|e| e.event_type.is_timeline())
        .map(|e| TimelineEntry {
            timestamp: e.timestamp,
            event_type: e.event_type,
            description: describe(e),
        })
        .collect();
    timeline.sort_by_key(|entry| entry.timestamp);
    timeline
}

fn describe(event: &TracedEvent) -> String {
    let field = |key: &str| event.data.get(key).and_then(|v| v.as_str()).unwrap_or("?").to_string();
    let phase = event.phase.clone().unwrap_or_else(|| field("phase"));
    let iteration = event
        .iteration
        .map(|i| format!(" (iteration {})", i))
        .unwrap_or_default();

    match event.event_type {
        TraceEventType::PhaseStart => format!("Started {} phase{}", phase, iteration),
        TraceEventType::PhaseEnd => {
            let outcome = match event.data.get("success").and_then(|v| v.as_bool()) {
                Some(true) => "succeeded",
                Some(false) => "failed",
                None => "ended",
            };
            format!("{} phase {}{}", phase, outcome, iteration)
        }
        TraceEventType::PhaseTransition => format!(
            "Transitioned from {} to {}: {}",
            field("from_phase"),
            field("to_phase"),
            field("reason")
        ),
        other => format!("{:?}", other),
    }
}
