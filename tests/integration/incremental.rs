//! Feature-by-feature runs with per-feature retries.

use std::sync::Arc;

use tddflow::core::FeatureSpec;
use tddflow::orchestration::{FeatureStatus, MemoryFileManager, TddOrchestrator};
use tddflow::retry::RetryConfig;
use tddflow::workflow::{TddPhase, WorkflowStatus};

use crate::fixtures::{
    failing_report, orchestrator, RunnerStep, ScriptedAgent, ScriptedRunner, CODE_OUTPUT, DESIGN, FIXED_CODE_OUTPUT,
    TESTS_OUTPUT,
};

fn todo_features() -> Vec<FeatureSpec> {
    FeatureSpec::from_titles(&["Add tasks", "Task model"])
}

#[tokio::test]
async fn test_features_follow_design_order() {
    let tester = ScriptedAgent::new("tester", vec![TESTS_OUTPUT, TESTS_OUTPUT]);
    let coder = ScriptedAgent::new("coder", vec![CODE_OUTPUT, CODE_OUTPUT]);
    let files = Arc::new(MemoryFileManager::new());

    let outcome = orchestrator(tester.clone(), coder, ScriptedRunner::always_passing(), files.clone(), 5)
        .run_incremental("Build a todo app", &todo_features(), Some(DESIGN))
        .await
        .unwrap();

    assert_eq!(outcome.status, WorkflowStatus::Completed);
    assert_eq!(outcome.summary, "2/2 features passed");
    assert_eq!(outcome.iterations, 2);

    let ids: Vec<&str> = outcome.features.iter().map(|f| f.feature_id.as_str()).collect();
    assert_eq!(ids, vec!["feature_2", "feature_1"]);
    assert!(outcome.features.iter().all(|f| f.attempts == 1));

    let prompts = tester.prompts();
    assert!(prompts[0].contains("FEATURE: Task model"));
    assert!(prompts[1].contains("FEATURE: Add tasks"));

    let next_feature = outcome
        .transitions
        .iter()
        .find(|t| t.from_phase == TddPhase::Green && t.to_phase == TddPhase::Red)
        .expect("GREEN -> RED between features");
    assert!(next_feature.reason.contains("Add tasks"));

    let written = files.snapshot().await;
    assert!(written.contains_key("test_feature_2.py"));
    assert!(written.contains_key("test_feature_1.py"));
}

#[tokio::test]
async fn test_runtime_failure_retried_with_retry_prompt() {
    let tester = ScriptedAgent::new("tester", vec![TESTS_OUTPUT]);
    let coder = ScriptedAgent::new("coder", vec![CODE_OUTPUT, FIXED_CODE_OUTPUT]);
    let runner = ScriptedRunner::new(vec![RunnerStep::Report(failing_report(
        "test_add",
        "TypeError: unsupported operand type(s) for +: 'int' and 'str'",
    ))]);

    let outcome = orchestrator(tester, coder.clone(), runner, Arc::new(MemoryFileManager::new()), 5)
        .run_incremental("Calculator", &FeatureSpec::from_titles(&["Add numbers"]), None)
        .await
        .unwrap();

    assert_eq!(outcome.status, WorkflowStatus::Completed);
    assert_eq!(outcome.features[0].status, FeatureStatus::Passed);
    assert_eq!(outcome.features[0].attempts, 2);

    let retry = &coder.prompts()[1];
    assert!(retry.starts_with("RETRY ATTEMPT 1"));
    assert!(retry.contains("FAILING TESTS (TDD):"));
    assert!(retry.contains("test_app.py::test_add"));
    assert!(retry.contains("CRITICAL INSTRUCTIONS FOR RETRY:"));
}

#[tokio::test]
async fn test_import_error_refused_and_run_continues() {
    let tester = ScriptedAgent::new("tester", vec![TESTS_OUTPUT, TESTS_OUTPUT]);
    let coder = ScriptedAgent::new("coder", vec![CODE_OUTPUT, CODE_OUTPUT]);
    let runner = ScriptedRunner::new(vec![RunnerStep::Report(failing_report(
        "test_model",
        "ModuleNotFoundError: No module named 'tasks'",
    ))]);

    let outcome = orchestrator(tester, coder.clone(), runner, Arc::new(MemoryFileManager::new()), 5)
        .run_incremental("Build a todo app", &todo_features(), Some(DESIGN))
        .await
        .unwrap();

    assert_eq!(outcome.status, WorkflowStatus::Failed);
    assert_eq!(outcome.summary, "1/2 features passed");
    assert_eq!(outcome.features[0].status, FeatureStatus::Failed);
    assert_eq!(outcome.features[0].attempts, 1);
    assert!(outcome.features[0]
        .last_error
        .as_deref()
        .unwrap()
        .contains("No module named 'tasks'"));
    assert_eq!(outcome.features[1].status, FeatureStatus::Passed);
    assert_eq!(coder.call_count(), 2);
}

#[tokio::test]
async fn test_assertion_failures_get_one_retry() {
    let failure = "AssertionError: assert 4 == 5";
    let tester = ScriptedAgent::new("tester", vec![TESTS_OUTPUT]);
    let coder = ScriptedAgent::new("coder", vec![CODE_OUTPUT, CODE_OUTPUT, CODE_OUTPUT]);
    let runner = ScriptedRunner::new(vec![
        RunnerStep::Report(failing_report("test_add", failure)),
        RunnerStep::Report(failing_report("test_add", failure)),
        RunnerStep::Report(failing_report("test_add", failure)),
    ]);

    let outcome = orchestrator(tester, coder.clone(), runner.clone(), Arc::new(MemoryFileManager::new()), 10)
        .run_incremental("Calculator", &FeatureSpec::from_titles(&["Add numbers"]), None)
        .await
        .unwrap();

    assert_eq!(outcome.status, WorkflowStatus::Failed);
    assert_eq!(outcome.features[0].status, FeatureStatus::Failed);
    assert_eq!(outcome.features[0].attempts, 2);
    assert_eq!(runner.call_count(), 2);
    assert_eq!(coder.call_count(), 2);
}

#[tokio::test]
async fn test_missing_code_exhausts_retries_then_next_feature_restarts() {
    let tester = ScriptedAgent::new("tester", vec![TESTS_OUTPUT, TESTS_OUTPUT]);
    let coder = ScriptedAgent::new("coder", vec!["", "", "", CODE_OUTPUT]);

    let outcome = orchestrator(
        tester,
        coder,
        ScriptedRunner::always_passing(),
        Arc::new(MemoryFileManager::new()),
        10,
    )
    .run_incremental("Build a todo app", &todo_features(), Some(DESIGN))
    .await
    .unwrap();

    assert_eq!(outcome.features[0].status, FeatureStatus::Failed);
    assert_eq!(outcome.features[0].attempts, 3);
    assert_eq!(outcome.features[1].status, FeatureStatus::Passed);
    assert_eq!(outcome.iterations, 4);

    let yellow_retries = outcome
        .transitions
        .iter()
        .filter(|t| t.from_phase == TddPhase::Yellow && t.to_phase == TddPhase::Yellow)
        .count();
    assert_eq!(yellow_retries, 3);
    assert_eq!(outcome.transitions.len(), 6);
}

#[tokio::test]
async fn test_budget_spent_skips_remaining_features() {
    let tester = ScriptedAgent::new("tester", vec![TESTS_OUTPUT, TESTS_OUTPUT]);
    let coder = ScriptedAgent::new("coder", vec![CODE_OUTPUT, CODE_OUTPUT]);

    let outcome = orchestrator(
        tester.clone(),
        coder,
        ScriptedRunner::always_passing(),
        Arc::new(MemoryFileManager::new()),
        1,
    )
    .run_incremental("Build a todo app", &todo_features(), Some(DESIGN))
    .await
    .unwrap();

    assert_eq!(outcome.status, WorkflowStatus::Incomplete);
    assert_eq!(outcome.features[0].status, FeatureStatus::Passed);
    assert_eq!(outcome.features[1].status, FeatureStatus::Skipped);
    assert_eq!(outcome.features[1].attempts, 0);
    assert_eq!(tester.call_count(), 1);
}

#[tokio::test]
async fn test_runner_crash_is_terminal_for_feature() {
    let tester = ScriptedAgent::new("tester", vec![TESTS_OUTPUT]);
    let coder = ScriptedAgent::new("coder", vec![CODE_OUTPUT, CODE_OUTPUT]);
    let runner = ScriptedRunner::new(vec![RunnerStep::Fail("sandbox unavailable".to_string())]);

    let outcome = orchestrator(tester, coder.clone(), runner, Arc::new(MemoryFileManager::new()), 5)
        .run_incremental("Calculator", &FeatureSpec::from_titles(&["Add numbers"]), None)
        .await
        .unwrap();

    assert_eq!(outcome.status, WorkflowStatus::Failed);
    assert_eq!(outcome.features[0].attempts, 1);
    let error = outcome.features[0].last_error.as_deref().unwrap();
    assert!(error.starts_with("Test execution failed"));
    assert!(error.contains("sandbox unavailable"));
    assert_eq!(coder.call_count(), 1);
}

#[tokio::test]
async fn test_retry_prompt_disabled_reuses_implementation_prompt() {
    let tester = ScriptedAgent::new("tester", vec![TESTS_OUTPUT]);
    let coder = ScriptedAgent::new("coder", vec![CODE_OUTPUT, FIXED_CODE_OUTPUT]);
    let runner = ScriptedRunner::new(vec![RunnerStep::Report(failing_report(
        "test_add",
        "TypeError: unsupported operand type(s) for +: 'int' and 'str'",
    ))]);

    let outcome = TddOrchestrator::new(tester, coder.clone(), runner, Arc::new(MemoryFileManager::new()))
        .with_retry_config(RetryConfig {
            modify_prompt_on_retry: false,
            ..RetryConfig::default()
        })
        .run_incremental("Calculator", &FeatureSpec::from_titles(&["Add numbers"]), None)
        .await
        .unwrap();

    assert!(outcome.is_success());
    let prompts = coder.prompts();
    assert!(!prompts[1].contains("RETRY ATTEMPT"));
    assert!(prompts[1].contains("FEATURE: Add numbers"));
}
