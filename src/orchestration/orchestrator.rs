//! RED/YELLOW/GREEN orchestration over pluggable agents.

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::timeout;

use super::agent::{Agent, FileManager, TestRunner};
use super::extraction::{extract_code_files, CodeFiles};
use super::prompts;
use super::testing::TestRunReport;
use crate::analysis::ErrorAnalyzer;
use crate::config::Config;
use crate::core::{order_features_smart, FeatureSpec};
use crate::retry::{RetryConfig, RetryRequest, RetryStrategy};
use crate::trace::{ExecutionTracer, TraceEventType};
use crate::workflow::{PhaseMachine, PhaseTransition, SessionId, TddPhase, WorkflowConfig, WorkflowStatus};
use crate::{zlog, zlog_debug, zlog_error, zlog_warn, Result};

/// File that unmarked test output is written to.
pub const DEFAULT_TEST_FILE: &str = "test_app.py";

/// File that unmarked implementation output is written to.
pub const DEFAULT_IMPL_FILE: &str = "app.py";

const NO_TESTS_REASON: &str = "Test generation produced no code";
const NO_CODE_REASON: &str = "Implementation produced no code";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureStatus {
    Passed,
    Failed,
    /// Iteration budget ran out while the feature was still failing.
    Incomplete,
    /// Never started because the iteration budget was spent.
    Skipped,
}

/// Result of one feature in an incremental run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureOutcome {
    pub feature_id: String,
    pub title: String,
    pub status: FeatureStatus,
    /// Implementation attempts made for this feature.
    pub attempts: u32,
    pub last_error: Option<String>,
}

impl FeatureOutcome {
    fn new(feature: &FeatureSpec, status: FeatureStatus, attempts: u32, last_error: Option<String>) -> Self {
        Self {
            feature_id: feature.id.clone(),
            title: feature.title.clone(),
            status,
            attempts,
            last_error,
        }
    }
}

/// Final result of a run.
///
/// Running out of iterations is `Incomplete`, not an error; only
/// infrastructure failures (agent transport, file writes) surface as `Err`.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowOutcome {
    pub session_id: SessionId,
    pub status: WorkflowStatus,
    pub iterations: u32,
    pub transitions: Vec<PhaseTransition>,
    pub test_files: CodeFiles,
    pub implementation_files: CodeFiles,
    pub last_test_summary: Option<String>,
    pub features: Vec<FeatureOutcome>,
    pub report_path: Option<PathBuf>,
    pub summary: String,
}

impl WorkflowOutcome {
    pub fn is_success(&self) -> bool {
        self.status == WorkflowStatus::Completed
    }

    /// Tests and implementation merged into one map.
    pub fn files(&self) -> CodeFiles {
        let mut files = self.test_files.clone();
        files.extend(self.implementation_files.iter().map(|(k, v)| (k.clone(), v.clone())));
        files
    }
}

/// Mutable state of one run. Never shared between runs.
struct Session {
    id: SessionId,
    tracer: ExecutionTracer,
    machine: PhaseMachine,
    iteration: u32,
    tests: CodeFiles,
    code: CodeFiles,
    last_report: Option<TestRunReport>,
}

impl Session {
    fn new() -> Self {
        let id = SessionId::new();
        Self {
            id,
            tracer: ExecutionTracer::new(id.to_string()),
            machine: PhaseMachine::new(),
            iteration: 0,
            tests: CodeFiles::new(),
            code: CodeFiles::new(),
            last_report: None,
        }
    }

    fn transition(&mut self, to: TddPhase, validation_passed: bool, reason: impl Into<String>) -> Result<()> {
        let transition = self.machine.transition(to, validation_passed, reason)?;
        self.tracer.trace_transition(&transition, self.iteration);
        Ok(())
    }
}

/// Drives the TDD cycle for a requirement or a list of features.
pub struct TddOrchestrator {
    tester: Arc<dyn Agent>,
    coder: Arc<dyn Agent>,
    runner: Arc<dyn TestRunner>,
    files: Arc<dyn FileManager>,
    workflow: WorkflowConfig,
    retry: RetryConfig,
    report_dir: Option<PathBuf>,
    analyzer: ErrorAnalyzer,
}

impl TddOrchestrator {
    pub fn new(
        tester: Arc<dyn Agent>,
        coder: Arc<dyn Agent>,
        runner: Arc<dyn TestRunner>,
        files: Arc<dyn FileManager>,
    ) -> Self {
        Self {
            tester,
            coder,
            runner,
            files,
            workflow: WorkflowConfig::default(),
            retry: RetryConfig::default(),
            report_dir: None,
            analyzer: ErrorAnalyzer::new(),
        }
    }

    /// Apply loaded configuration, including the report directory.
    pub fn with_config(mut self, config: &Config) -> Result<Self> {
        self.workflow = config.workflow.clone();
        self.retry = config.retry.clone();
        self.report_dir = Some(config.reports_dir()?);
        Ok(self)
    }

    /// Replace the loop limits and test timeout.
    pub fn with_workflow_config(mut self, workflow: WorkflowConfig) -> Self {
        self.workflow = workflow;
        self
    }

    /// Replace the per-feature retry policy.
    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Save the execution report under `dir` when the session ends.
    pub fn with_report_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.report_dir = Some(dir.into());
        self
    }

    fn max_iterations(&self) -> u32 {
        self.workflow.max_iterations.max(1)
    }

    /// Single-requirement run: RED once, then YELLOW/GREEN until green or capped.
    pub async fn run(&self, requirement: &str) -> Result<WorkflowOutcome> {
        let mut s = Session::new();
        let max = self.max_iterations();
        zlog!("TDD session {} started (max_iterations={})", s.id.short(), max);
        s.iteration = 1;

        s.tracer.trace_phase_start(TddPhase::Red, s.iteration);
        let prompt = prompts::test_writer_prompt(requirement, None, &s.tests, &s.code);
        let output = self.call_agent(&mut s, self.tester.as_ref(), TddPhase::Red, &prompt).await?;
        let tests = extract_code_files(&output, DEFAULT_TEST_FILE);
        if tests.is_empty() {
            zlog_warn!("Session {}: {}", s.id.short(), NO_TESTS_REASON);
            s.tracer.trace_phase_end(TddPhase::Red, s.iteration, false);
            s.transition(TddPhase::Red, false, NO_TESTS_REASON)?;
            return Ok(self.finish(s, WorkflowStatus::Failed, Vec::new(), NO_TESTS_REASON.to_string()).await);
        }
        self.persist(&mut s, &tests, true).await?;
        s.tracer.trace_phase_end(TddPhase::Red, s.iteration, true);
        s.transition(TddPhase::Yellow, true, "Tests written successfully")?;

        let status = loop {
            s.tracer.trace_phase_start(TddPhase::Yellow, s.iteration);
            let prompt = match &s.last_report {
                Some(report) => prompts::fix_prompt(requirement, &s.tests, &s.code, report, &self.analyzer),
                None => prompts::implementation_prompt(requirement, None, &s.tests, &s.code),
            };
            let output = self.call_agent(&mut s, self.coder.as_ref(), TddPhase::Yellow, &prompt).await?;
            let code = extract_code_files(&output, DEFAULT_IMPL_FILE);

            if code.is_empty() {
                s.tracer.trace_phase_end(TddPhase::Yellow, s.iteration, false);
                s.transition(TddPhase::Yellow, false, NO_CODE_REASON)?;
                if s.iteration >= max {
                    break WorkflowStatus::Incomplete;
                }
                s.iteration += 1;
                continue;
            }

            self.persist(&mut s, &code, false).await?;
            s.tracer.trace_phase_end(TddPhase::Yellow, s.iteration, true);
            s.transition(TddPhase::Green, true, "Implementation generated")?;

            s.tracer.trace_phase_start(TddPhase::Green, s.iteration);
            let report = self.execute_tests(&mut s).await;
            let passed = report.all_passed();
            let summary = report.summary();
            s.tracer.trace_phase_end(TddPhase::Green, s.iteration, passed);
            s.last_report = Some(report);

            if passed {
                zlog!("Session {}: all tests passing at iteration {}", s.id.short(), s.iteration);
                break WorkflowStatus::Completed;
            }
            if s.iteration >= max {
                break WorkflowStatus::Incomplete;
            }
            s.transition(
                TddPhase::Yellow,
                false,
                format!("Tests failing ({}), fixing implementation", summary),
            )?;
            s.iteration += 1;
        };

        let summary = match status {
            WorkflowStatus::Completed => format!("All tests passing after {} iteration(s)", s.iteration),
            _ => format!(
                "Reached max iterations ({}) without passing tests: {}",
                max,
                s.last_report
                    .as_ref()
                    .map(|r| r.summary())
                    .unwrap_or_else(|| NO_CODE_REASON.to_string())
            ),
        };
        Ok(self.finish(s, status, Vec::new(), summary).await)
    }

    /// Feature-by-feature run with per-feature retries.
    ///
    /// Features are ordered once up front; code and tests accumulate so
    /// later features build on earlier ones.
    pub async fn run_incremental(
        &self,
        requirement: &str,
        features: &[FeatureSpec],
        design_text: Option<&str>,
    ) -> Result<WorkflowOutcome> {
        let mut s = Session::new();
        let max = self.max_iterations();
        let ordered = order_features_smart(features, design_text.unwrap_or(""));
        zlog!(
            "Incremental session {} started with {} feature(s), max_iterations={}",
            s.id.short(),
            ordered.len(),
            max
        );
        s.tracer.trace_event(
            TraceEventType::Info,
            None,
            None,
            None,
            json!({ "feature_order": ordered.iter().map(|f| f.id.as_str()).collect::<Vec<_>>() }),
        );

        let mut strategy = RetryStrategy::new();
        let mut outcomes: Vec<FeatureOutcome> = Vec::with_capacity(ordered.len());
        for feature in &ordered {
            if s.iteration >= max {
                zlog_debug!("Skipping feature {}: iteration budget spent", feature.id);
                outcomes.push(FeatureOutcome::new(feature, FeatureStatus::Skipped, 0, None));
                continue;
            }
            if !outcomes.is_empty() {
                if s.machine.current_phase() == TddPhase::Green {
                    s.transition(TddPhase::Red, true, format!("Starting feature: {}", feature.title))?;
                } else {
                    s.machine.restart();
                }
            }
            let outcome = self.run_feature(&mut s, requirement, feature, &mut strategy).await?;
            zlog!("Feature {} finished: {:?}", feature.id, outcome.status);
            outcomes.push(outcome);
        }

        let status = if outcomes.iter().all(|o| o.status == FeatureStatus::Passed) {
            WorkflowStatus::Completed
        } else if outcomes.iter().any(|o| o.status == FeatureStatus::Failed) {
            WorkflowStatus::Failed
        } else {
            WorkflowStatus::Incomplete
        };
        let passed = outcomes.iter().filter(|o| o.status == FeatureStatus::Passed).count();
        let summary = format!("{}/{} features passed", passed, outcomes.len());
        Ok(self.finish(s, status, outcomes, summary).await)
    }

    async fn run_feature(
        &self,
        s: &mut Session,
        requirement: &str,
        feature: &FeatureSpec,
        strategy: &mut RetryStrategy,
    ) -> Result<FeatureOutcome> {
        let max = self.max_iterations();
        s.iteration += 1;
        zlog_debug!("Feature {} ({}) started at iteration {}", feature.id, feature.title, s.iteration);

        s.tracer.trace_phase_start(TddPhase::Red, s.iteration);
        let prompt = prompts::test_writer_prompt(requirement, Some(feature), &s.tests, &s.code);
        let output = self.call_agent(s, self.tester.as_ref(), TddPhase::Red, &prompt).await?;
        let tests = extract_code_files(&output, &format!("test_{}.py", feature.id));
        if tests.is_empty() {
            s.tracer.trace_phase_end(TddPhase::Red, s.iteration, false);
            s.transition(TddPhase::Red, false, NO_TESTS_REASON)?;
            return Ok(FeatureOutcome::new(
                feature,
                FeatureStatus::Failed,
                0,
                Some(NO_TESTS_REASON.to_string()),
            ));
        }
        self.persist(s, &tests, true).await?;
        s.tracer.trace_phase_end(TddPhase::Red, s.iteration, true);
        s.transition(TddPhase::Yellow, true, "Tests written successfully")?;

        let mut attempt: u32 = 0;
        let mut retry_prompt: Option<String> = None;
        loop {
            s.tracer.trace_phase_start(TddPhase::Yellow, s.iteration);
            let prompt = retry_prompt
                .take()
                .unwrap_or_else(|| prompts::implementation_prompt(requirement, Some(feature), &s.tests, &s.code));
            let output = self.call_agent(s, self.coder.as_ref(), TddPhase::Yellow, &prompt).await?;
            let code = extract_code_files(&output, DEFAULT_IMPL_FILE);

            let (error, report) = if code.is_empty() {
                s.tracer.trace_phase_end(TddPhase::Yellow, s.iteration, false);
                s.transition(TddPhase::Yellow, false, NO_CODE_REASON)?;
                (NO_CODE_REASON.to_string(), None)
            } else {
                self.persist(s, &code, false).await?;
                s.tracer.trace_phase_end(TddPhase::Yellow, s.iteration, true);
                s.transition(TddPhase::Green, true, "Implementation generated")?;

                s.tracer.trace_phase_start(TddPhase::Green, s.iteration);
                let report = self.execute_tests(s).await;
                let passed = report.all_passed();
                s.tracer.trace_phase_end(TddPhase::Green, s.iteration, passed);

                if passed {
                    s.last_report = Some(report);
                    return Ok(FeatureOutcome::new(feature, FeatureStatus::Passed, attempt + 1, None));
                }
                if report.is_execution_failure() {
                    let summary = report.summary();
                    zlog_warn!("Feature {}: {}", feature.id, summary);
                    s.last_report = Some(report);
                    return Ok(FeatureOutcome::new(feature, FeatureStatus::Failed, attempt + 1, Some(summary)));
                }
                let error = report.error_message().unwrap_or_else(|| report.summary());
                (error, Some(report))
            };

            if !strategy.should_retry(Some(&error), attempt, &self.retry) {
                zlog!("Feature {}: retry refused after {} attempt(s)", feature.id, attempt + 1);
                if report.is_some() {
                    s.last_report = report;
                }
                return Ok(FeatureOutcome::new(feature, FeatureStatus::Failed, attempt + 1, Some(error)));
            }
            if s.iteration >= max {
                zlog!("Feature {}: iteration budget spent", feature.id);
                if report.is_some() {
                    s.last_report = report;
                }
                return Ok(FeatureOutcome::new(feature, FeatureStatus::Incomplete, attempt + 1, Some(error)));
            }

            if let Some(report) = report {
                let failures = report.failure_contexts();
                let validation_output = report.validation_output();
                if self.retry.modify_prompt_on_retry {
                    let context = if self.retry.extract_error_context {
                        strategy.extract_error_context(&validation_output, Some(failures.as_slice()))
                    } else {
                        BTreeMap::new()
                    };
                    retry_prompt = Some(strategy.create_retry_prompt(&RetryRequest {
                        original_context: requirement,
                        feature,
                        validation_output: &validation_output,
                        error_context: &context,
                        retry_count: attempt + 1,
                        accumulated_code: &s.code,
                        test_failures: Some(failures.as_slice()),
                        config: Some(&self.retry),
                    }));
                }
                s.transition(
                    TddPhase::Yellow,
                    false,
                    format!("Tests failing ({}), retrying", report.summary()),
                )?;
                s.last_report = Some(report);
            }

            attempt += 1;
            s.iteration += 1;
        }
    }

    /// Send `prompt` to `agent`, tracing the exchange and every streamed chunk.
    async fn call_agent(&self, s: &mut Session, agent: &dyn Agent, phase: TddPhase, prompt: &str) -> Result<String> {
        let exchange_id = s
            .tracer
            .start_agent_exchange(agent.name(), phase, s.iteration, json!({ "prompt": prompt }));

        match collect_response(agent, prompt, &mut s.tracer, &exchange_id).await {
            Ok(text) => {
                s.tracer.complete_agent_exchange(
                    &exchange_id,
                    json!({ "response_chars": text.len() }),
                    true,
                    None,
                );
                Ok(text)
            }
            Err(e) => {
                zlog_error!("Agent {} failed in {} phase: {}", agent.name(), phase, e);
                s.tracer
                    .complete_agent_exchange(&exchange_id, Value::Null, false, Some(e.to_string()));
                Err(e)
            }
        }
    }

    /// Run every accumulated test under the configured time limit.
    ///
    /// Timeouts and runner failures become failed reports, never errors.
    async fn execute_tests(&self, s: &mut Session) -> TestRunReport {
        let limit = self.workflow.test_timeout();
        let started = Instant::now();
        let report = match timeout(limit, self.runner.run_tests(&s.tests, &s.code)).await {
            Ok(Ok(mut report)) => {
                if report.duration_ms == 0 {
                    report.duration_ms = started.elapsed().as_millis() as u64;
                }
                report
            }
            Ok(Err(e)) => {
                zlog_warn!("Test runner failed: {}", e);
                TestRunReport::crashed(e)
            }
            Err(_) => {
                zlog_warn!("Test run timed out after {:?}", limit);
                TestRunReport::timed_out(limit)
            }
        };
        zlog_debug!("Iteration {} test run: {}", s.iteration, report.summary());
        s.tracer
            .trace_test_execution(Some(TddPhase::Green), Some(s.iteration), &report);
        report
    }

    async fn persist(&self, s: &mut Session, files: &CodeFiles, tests: bool) -> Result<()> {
        for (path, content) in files {
            let kind = self.files.write(path, content).await?;
            s.tracer.trace_file_operation(kind, path, content.len());
        }
        let target = if tests { &mut s.tests } else { &mut s.code };
        target.extend(files.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(())
    }

    async fn finish(
        &self,
        mut s: Session,
        status: WorkflowStatus,
        features: Vec<FeatureOutcome>,
        summary: String,
    ) -> WorkflowOutcome {
        s.tracer.trace_event(
            TraceEventType::Info,
            None,
            None,
            Some(s.iteration),
            json!({ "status": status.to_string(), "summary": summary }),
        );

        let report_path = match (&self.report_dir, self.workflow.save_report) {
            (Some(dir), true) => match s.tracer.save_report(dir).await {
                Ok(path) => Some(path),
                Err(e) => {
                    zlog_warn!("Could not save execution report: {}", e);
                    None
                }
            },
            _ => None,
        };

        zlog!("Session {} finished: {} ({})", s.id.short(), status, summary);
        WorkflowOutcome {
            session_id: s.id,
            status,
            iterations: s.iteration,
            transitions: s.machine.into_history(),
            test_files: s.tests,
            implementation_files: s.code,
            last_test_summary: s.last_report.as_ref().map(|r| r.summary()),
            features,
            report_path,
            summary,
        }
    }
}

async fn collect_response(
    agent: &dyn Agent,
    prompt: &str,
    tracer: &mut ExecutionTracer,
    exchange_id: &str,
) -> Result<String> {
    let mut stream = agent.stream(prompt).await?;
    let mut text = String::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        tracer.add_streaming_chunk(exchange_id, &chunk);
        text.push_str(&chunk);
    }
    Ok(text)
}
