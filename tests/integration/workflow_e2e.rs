//! End-to-end single-requirement runs.

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use tddflow::orchestration::{DiskFileManager, FileManager, MemoryFileManager, TddOrchestrator};
use tddflow::trace::ExecutionReport;
use tddflow::workflow::{TddPhase, WorkflowConfig, WorkflowStatus};
use tddflow::Error;

use crate::fixtures::{
    failing_report, orchestrator, RunnerStep, ScriptedAgent, ScriptedRunner, CODE_OUTPUT, FIXED_CODE_OUTPUT,
    TESTS_OUTPUT,
};

fn phases(outcome: &tddflow::WorkflowOutcome) -> Vec<(TddPhase, TddPhase)> {
    outcome
        .transitions
        .iter()
        .map(|t| (t.from_phase, t.to_phase))
        .collect()
}

#[tokio::test]
async fn test_green_on_first_attempt() {
    let tester = ScriptedAgent::new("tester", vec![TESTS_OUTPUT]);
    let coder = ScriptedAgent::new("coder", vec![CODE_OUTPUT]);
    let runner = ScriptedRunner::always_passing();
    let files = Arc::new(MemoryFileManager::new());

    let outcome = orchestrator(tester, coder, runner.clone(), files.clone(), 5)
        .run("Write an add function")
        .await
        .unwrap();

    assert_eq!(outcome.status, WorkflowStatus::Completed);
    assert!(outcome.is_success());
    assert_eq!(outcome.iterations, 1);
    assert_eq!(
        phases(&outcome),
        vec![(TddPhase::Red, TddPhase::Yellow), (TddPhase::Yellow, TddPhase::Green)]
    );
    assert_eq!(runner.call_count(), 1);
    assert_eq!(outcome.last_test_summary.as_deref(), Some("2 passed, 0 failed"));

    let written = files.snapshot().await;
    assert!(written.contains_key("test_app.py"));
    assert!(written["app.py"].contains("return a + b"));
    assert_eq!(outcome.files().len(), 2);
}

#[tokio::test]
async fn test_failing_tests_loop_back_to_yellow() {
    let tester = ScriptedAgent::new("tester", vec![TESTS_OUTPUT]);
    let coder = ScriptedAgent::new("coder", vec![CODE_OUTPUT, FIXED_CODE_OUTPUT]);
    let runner = ScriptedRunner::new(vec![RunnerStep::Report(failing_report(
        "test_add",
        "TypeError: unsupported operand type(s) for +: 'int' and 'str'",
    ))]);
    let files = Arc::new(MemoryFileManager::new());

    let outcome = orchestrator(tester, coder.clone(), runner, files.clone(), 5)
        .run("Write an add function")
        .await
        .unwrap();

    assert_eq!(outcome.status, WorkflowStatus::Completed);
    assert_eq!(outcome.iterations, 2);
    assert_eq!(
        phases(&outcome),
        vec![
            (TddPhase::Red, TddPhase::Yellow),
            (TddPhase::Yellow, TddPhase::Green),
            (TddPhase::Green, TddPhase::Yellow),
            (TddPhase::Yellow, TddPhase::Green),
        ]
    );
    assert!(!outcome.transitions[2].validation_passed);

    let prompts = coder.prompts();
    assert_eq!(prompts.len(), 2);
    assert!(prompts[1].contains("TEST RESULTS:"));
    assert!(prompts[1].contains("TypeError"));
    assert!(files.snapshot().await["app.py"].contains("int(a)"));
}

#[tokio::test]
async fn test_iteration_cap_is_incomplete() {
    let failure = "AssertionError: assert 4 == 5";
    let tester = ScriptedAgent::new("tester", vec![TESTS_OUTPUT]);
    let coder = ScriptedAgent::new("coder", vec![CODE_OUTPUT, CODE_OUTPUT, CODE_OUTPUT]);
    let runner = ScriptedRunner::new(vec![
        RunnerStep::Report(failing_report("test_add", failure)),
        RunnerStep::Report(failing_report("test_add", failure)),
    ]);

    let outcome = orchestrator(tester, coder.clone(), runner.clone(), Arc::new(MemoryFileManager::new()), 2)
        .run("Write an add function")
        .await
        .unwrap();

    assert_eq!(outcome.status, WorkflowStatus::Incomplete);
    assert_eq!(outcome.iterations, 2);
    assert_eq!(coder.call_count(), 2);
    assert_eq!(runner.call_count(), 2);
    assert!(outcome.summary.contains("Reached max iterations (2)"));
    assert_eq!(outcome.last_test_summary.as_deref(), Some("1 passed, 1 failed"));
}

#[tokio::test]
async fn test_no_tests_generated_fails_in_red() {
    let tester = ScriptedAgent::new("tester", vec!["   "]);
    let coder = ScriptedAgent::new("coder", vec![CODE_OUTPUT]);

    let outcome = orchestrator(
        tester,
        coder.clone(),
        ScriptedRunner::always_passing(),
        Arc::new(MemoryFileManager::new()),
        5,
    )
    .run("Write an add function")
    .await
    .unwrap();

    assert_eq!(outcome.status, WorkflowStatus::Failed);
    assert_eq!(phases(&outcome), vec![(TddPhase::Red, TddPhase::Red)]);
    assert_eq!(coder.call_count(), 0);
    assert!(outcome.test_files.is_empty());
}

#[tokio::test]
async fn test_empty_implementation_stays_in_yellow() {
    let tester = ScriptedAgent::new("tester", vec![TESTS_OUTPUT]);
    let coder = ScriptedAgent::new("coder", vec!["", CODE_OUTPUT]);
    let runner = ScriptedRunner::always_passing();

    let outcome = orchestrator(tester, coder, runner.clone(), Arc::new(MemoryFileManager::new()), 5)
        .run("Write an add function")
        .await
        .unwrap();

    assert_eq!(outcome.status, WorkflowStatus::Completed);
    assert_eq!(outcome.iterations, 2);
    assert_eq!(
        phases(&outcome),
        vec![
            (TddPhase::Red, TddPhase::Yellow),
            (TddPhase::Yellow, TddPhase::Yellow),
            (TddPhase::Yellow, TddPhase::Green),
        ]
    );
    assert_eq!(runner.call_count(), 1);
}

#[tokio::test]
async fn test_test_timeout_is_reported_not_raised() {
    let tester = ScriptedAgent::new("tester", vec![TESTS_OUTPUT]);
    let coder = ScriptedAgent::new("coder", vec![CODE_OUTPUT]);
    let runner = ScriptedRunner::new(vec![RunnerStep::Hang(Duration::from_secs(10))]);

    let outcome = TddOrchestrator::new(tester, coder, runner, Arc::new(MemoryFileManager::new()))
        .with_workflow_config(WorkflowConfig {
            max_iterations: 1,
            test_timeout_secs: 1,
            save_report: false,
            report_dir: None,
        })
        .run("Write an add function")
        .await
        .unwrap();

    assert_eq!(outcome.status, WorkflowStatus::Incomplete);
    assert_eq!(
        outcome.last_test_summary.as_deref(),
        Some("Test execution timed out after 1s")
    );
}

#[tokio::test]
async fn test_agent_failure_is_an_error() {
    let tester = ScriptedAgent::failing("tester", "connection refused");
    let coder = ScriptedAgent::new("coder", vec![CODE_OUTPUT]);

    let err = orchestrator(
        tester,
        coder,
        ScriptedRunner::always_passing(),
        Arc::new(MemoryFileManager::new()),
        5,
    )
    .run("Write an add function")
    .await
    .unwrap_err();

    assert!(matches!(err, Error::Agent { ref agent, .. } if agent == "tester"));
}

#[tokio::test]
async fn test_report_written_with_streamed_chunks() {
    let report_dir = TempDir::new().unwrap();
    let tester = ScriptedAgent::streaming("tester", vec![TESTS_OUTPUT]);
    let coder = ScriptedAgent::new("coder", vec![CODE_OUTPUT]);

    let outcome = TddOrchestrator::new(
        tester,
        coder,
        ScriptedRunner::always_passing(),
        Arc::new(MemoryFileManager::new()),
    )
    .with_report_dir(report_dir.path())
    .run("Write an add function")
    .await
    .unwrap();

    let path = outcome.report_path.clone().expect("report path");
    assert!(path.exists());
    assert!(path
        .file_name()
        .unwrap()
        .to_string_lossy()
        .starts_with("execution_report_"));

    let report = ExecutionReport::load(&path).unwrap();
    assert_eq!(report.session_id, outcome.session_id.to_string());
    assert_eq!(report.metrics.agent_interactions, 2);
    assert_eq!(report.metrics.tests_run, 1);
    assert_eq!(report.metrics.files_created, 2);
    assert_eq!(report.agent_exchanges.len(), 2);
    assert!(report.agent_exchanges.iter().all(|e| e.success));

    let tester_exchange = report
        .agent_exchanges
        .iter()
        .find(|e| e.agent_name == "tester")
        .unwrap();
    assert!(tester_exchange.streaming_chunks.len() > 1);
    assert_eq!(tester_exchange.streaming_chunks.concat(), TESTS_OUTPUT);

    assert_eq!(report.timeline[0].description, "Started RED phase (iteration 1)");
    assert!(report
        .timeline
        .iter()
        .any(|e| e.description == "Transitioned from YELLOW to GREEN: Implementation generated"));
}

#[tokio::test]
async fn test_files_written_to_disk() {
    let root = TempDir::new().unwrap();
    let files: Arc<dyn FileManager> = Arc::new(DiskFileManager::new(root.path()));
    let tester = ScriptedAgent::new("tester", vec![TESTS_OUTPUT]);
    let coder = ScriptedAgent::new("coder", vec![CODE_OUTPUT]);

    let outcome = TddOrchestrator::new(tester, coder, ScriptedRunner::always_passing(), files.clone())
        .run("Write an add function")
        .await
        .unwrap();

    assert!(outcome.is_success());
    assert_eq!(files.list().await.unwrap(), vec!["app.py", "test_app.py"]);
    let code = std::fs::read_to_string(root.path().join("app.py")).unwrap();
    assert!(code.contains("def add"));
}
