//! Per-session execution tracer.

use chrono::Utc;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use uuid::Uuid;

use super::events::{
    AgentExchange, CommandExecution, FileOperation, FileOperationKind, Metrics, TestExecution,
    TraceEventType, TracedEvent,
};
use super::report::{build_timeline, ExecutionReport, ReportSummary};
use crate::orchestration::testing::TestRunReport;
use crate::workflow::{PhaseTransition, TddPhase};
use crate::{util, zlog, zlog_trace, zlog_warn, Result};

/// Append-only event log for one session.
///
/// A tracer is owned by exactly one orchestration run and never shared.
/// Nothing here fails except [`ExecutionTracer::save_report`].
#[derive(Debug)]
pub struct ExecutionTracer {
    session_id: String,
    start_time: chrono::DateTime<Utc>,
    started: Instant,
    events: Vec<TracedEvent>,
    in_flight: HashMap<String, AgentExchange>,
    exchanges: Vec<AgentExchange>,
    commands: Vec<CommandExecution>,
    tests: Vec<TestExecution>,
    file_operations: Vec<FileOperation>,
    metrics: Metrics,
    exchange_seq: u64,
}

impl ExecutionTracer {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            start_time: Utc::now(),
            started: Instant::now(),
            events: Vec::new(),
            in_flight: HashMap::new(),
            exchanges: Vec::new(),
            commands: Vec::new(),
            tests: Vec::new(),
            file_operations: Vec::new(),
            metrics: Metrics::default(),
            exchange_seq: 0,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn events(&self) -> &[TracedEvent] {
        &self.events
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn completed_exchanges(&self) -> &[AgentExchange] {
        &self.exchanges
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Append an event and bump `total_events`.
    pub fn trace_event(
        &mut self,
        event_type: TraceEventType,
        phase: Option<TddPhase>,
        agent: Option<&str>,
        iteration: Option<u32>,
        data: Value,
    ) -> TracedEvent {
        let event = TracedEvent {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type,
            phase: phase.map(|p| p.to_string()),
            agent: agent.map(str::to_string),
            iteration,
            data,
        };
        zlog_trace!("[trace {}] {:?} phase={:?}", self.session_id, event_type, event.phase);
        self.events.push(event.clone());
        self.metrics.total_events += 1;
        event
    }

    pub fn trace_phase_start(&mut self, phase: TddPhase, iteration: u32) -> TracedEvent {
        self.trace_event(
            TraceEventType::PhaseStart,
            Some(phase),
            None,
            Some(iteration),
            json!({ "phase": phase.as_str() }),
        )
    }

    pub fn trace_phase_end(&mut self, phase: TddPhase, iteration: u32, success: bool) -> TracedEvent {
        self.trace_event(
            TraceEventType::PhaseEnd,
            Some(phase),
            None,
            Some(iteration),
            json!({ "phase": phase.as_str(), "success": success }),
        )
    }

    pub fn trace_transition(&mut self, transition: &PhaseTransition, iteration: u32) -> TracedEvent {
        self.trace_event(
            TraceEventType::PhaseTransition,
            Some(transition.to_phase),
            None,
            Some(iteration),
            json!({
                "from_phase": transition.from_phase.as_str(),
                "to_phase": transition.to_phase.as_str(),
                "validation_passed": transition.validation_passed,
                "reason": transition.reason,
            }),
        )
    }

    /// Open an exchange and return its correlation id.
    pub fn start_agent_exchange(
        &mut self,
        agent_name: &str,
        phase: TddPhase,
        iteration: u32,
        request_data: Value,
    ) -> String {
        self.exchange_seq += 1;
        let exchange_id = format!("{}_{}_{}", agent_name, iteration, self.exchange_seq);

        self.trace_event(
            TraceEventType::AgentRequest,
            Some(phase),
            Some(agent_name),
            Some(iteration),
            json!({ "exchange_id": exchange_id, "request": request_data.clone() }),
        );
        self.in_flight.insert(
            exchange_id.clone(),
            AgentExchange {
                exchange_id: exchange_id.clone(),
                agent_name: agent_name.to_string(),
                phase: Some(phase.to_string()),
                iteration,
                request_time: Utc::now(),
                request_data,
                response_time: None,
                response_data: None,
                streaming_chunks: Vec::new(),
                duration_ms: None,
                success: false,
                error: None,
                started: Some(Instant::now()),
            },
        );
        self.metrics.agent_interactions += 1;
        exchange_id
    }

    /// Append streamed text to an open exchange. Unknown ids are ignored.
    pub fn add_streaming_chunk(&mut self, exchange_id: &str, chunk: &str) {
        match self.in_flight.get_mut(exchange_id) {
            Some(exchange) => exchange.streaming_chunks.push(chunk.to_string()),
            None => zlog_trace!("Chunk for unknown exchange {} dropped", exchange_id),
        }
    }

    /// Close an exchange. Unknown ids are a no-op.
    pub fn complete_agent_exchange(
        &mut self,
        exchange_id: &str,
        response_data: Value,
        success: bool,
        error: Option<String>,
    ) {
        let Some(mut exchange) = self.in_flight.remove(exchange_id) else {
            zlog_warn!("complete_agent_exchange: unknown exchange id {}", exchange_id);
            return;
        };

        let duration_ms = exchange
            .started
            .map(|s| s.elapsed().as_millis() as u64)
            .unwrap_or(0);
        exchange.response_time = Some(Utc::now());
        exchange.response_data = Some(response_data);
        exchange.duration_ms = Some(duration_ms);
        exchange.success = success;
        exchange.error = error.clone();

        let phase = exchange.phase.clone();
        let agent = exchange.agent_name.clone();
        let iteration = exchange.iteration;
        self.exchanges.push(exchange);

        let event = TracedEvent {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: TraceEventType::AgentResponse,
            phase,
            agent: Some(agent),
            iteration: Some(iteration),
            data: json!({
                "exchange_id": exchange_id,
                "duration_ms": duration_ms,
                "success": success,
                "error": error,
            }),
        };
        self.events.push(event);
        self.metrics.total_events += 1;
    }

    /// Record a shell command and its captured output.
    pub fn trace_command(
        &mut self,
        command: &str,
        working_dir: Option<&str>,
        exit_code: Option<i32>,
        stdout: &str,
        stderr: &str,
        duration: Duration,
    ) {
        let record = CommandExecution {
            command: command.to_string(),
            working_dir: working_dir.map(str::to_string),
            exit_code,
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
            duration_ms: duration.as_millis() as u64,
            timestamp: Utc::now(),
        };
        self.trace_event(
            TraceEventType::CommandExecution,
            None,
            None,
            None,
            json!({ "command": command, "exit_code": exit_code }),
        );
        self.commands.push(record);
        self.metrics.commands_executed += 1;
    }

    /// Record one test run. `tests_run` counts runs, not individual tests.
    pub fn trace_test_execution(&mut self, phase: Option<TddPhase>, iteration: Option<u32>, report: &TestRunReport) {
        let record = TestExecution {
            phase: phase.map(|p| p.to_string()),
            iteration,
            total: report.results.len(),
            passed: report.passed_count(),
            failed: report.failed_count(),
            timed_out: report.timed_out,
            duration_ms: report.duration_ms,
            output: report.stdout.clone(),
            timestamp: Utc::now(),
        };
        self.trace_event(
            TraceEventType::TestExecution,
            phase,
            None,
            iteration,
            json!({
                "total": record.total,
                "passed": record.passed,
                "failed": record.failed,
                "timed_out": record.timed_out,
            }),
        );
        self.tests.push(record);
        self.metrics.tests_run += 1;
    }

    /// Record a file touch; creates and modifies feed the file counters.
    pub fn trace_file_operation(&mut self, operation: FileOperationKind, path: &str, size_bytes: usize) {
        self.trace_event(
            TraceEventType::FileOperation,
            None,
            None,
            None,
            json!({ "operation": operation.to_string(), "path": path, "size_bytes": size_bytes }),
        );
        self.file_operations.push(FileOperation {
            operation,
            path: path.to_string(),
            size_bytes,
            timestamp: Utc::now(),
        });
        match operation {
            FileOperationKind::Create => self.metrics.files_created += 1,
            FileOperationKind::Modify => self.metrics.files_modified += 1,
            FileOperationKind::Read | FileOperationKind::Delete => {}
        }
    }

    /// Snapshot everything recorded so far.
    pub fn generate_report(&self) -> ExecutionReport {
        let duration_ms = self.started.elapsed().as_millis() as u64;
        let mut metrics = self.metrics.clone();
        metrics.total_duration_ms = duration_ms;

        ExecutionReport {
            session_id: self.session_id.clone(),
            start_time: self.start_time,
            end_time: Utc::now(),
            duration_ms,
            metrics,
            summary: ReportSummary {
                total_events: self.events.len(),
                agent_exchanges: self.exchanges.len(),
                command_executions: self.commands.len(),
                test_executions: self.tests.len(),
            },
            agent_exchanges: self.exchanges.clone(),
            command_executions: self.commands.clone(),
            test_executions: self.tests.clone(),
            file_operations: self.file_operations.clone(),
            events: self.events.clone(),
            timeline: build_timeline(&self.events),
        }
    }

    /// Write `execution_report_{session_id}.json` under `dir`.
    ///
    /// The report is serialized on the caller's task; the disk write runs
    /// on the blocking pool.
    pub async fn save_report(&self, dir: &Path) -> Result<PathBuf> {
        let path = dir.join(format!("execution_report_{}.json", self.session_id));
        let contents = serde_json::to_string_pretty(&self.generate_report())?;
        let write_path = path.clone();
        util::blocking(move || util::write_atomic(&write_path, &contents)).await?;
        zlog!("Saved execution report to {}", path.display());
        Ok(path)
    }
}
