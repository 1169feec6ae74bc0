//! Execution reports written to and read back from disk.

use std::time::Duration;

use serde_json::json;
use tempfile::TempDir;

use tddflow::orchestration::{TestResult, TestRunReport};
use tddflow::trace::{ExecutionReport, ExecutionTracer, FileOperationKind, TraceEventType};
use tddflow::workflow::{PhaseMachine, TddPhase};

#[tokio::test]
async fn test_saved_report_round_trips_through_disk() {
    let dir = TempDir::new().unwrap();
    let mut tracer = ExecutionTracer::new("session-42");
    let mut machine = PhaseMachine::new();

    tracer.trace_phase_start(TddPhase::Red, 1);
    let id = tracer.start_agent_exchange("tester", TddPhase::Red, 1, json!({ "prompt": "write tests" }));
    tracer.add_streaming_chunk(&id, "def test_add():");
    tracer.complete_agent_exchange(&id, json!({ "response_chars": 15 }), true, None);
    tracer.trace_file_operation(FileOperationKind::Create, "test_app.py", 15);
    tracer.trace_phase_end(TddPhase::Red, 1, true);
    let transition = machine.transition(TddPhase::Yellow, true, "Tests written").unwrap();
    tracer.trace_transition(&transition, 1);

    let report = TestRunReport::new(vec![
        TestResult::passed("test_app.py", "test_add"),
        TestResult::failed("test_app.py", "test_sub", "AssertionError: assert 1 == 2"),
    ])
    .with_output("1 passed, 1 failed in 0.02s", "");
    tracer.trace_test_execution(Some(TddPhase::Green), Some(1), &report);
    tracer.trace_command("pytest -q", None, Some(1), "", "", Duration::from_millis(12));

    let path = tracer.save_report(dir.path()).await.unwrap();
    assert_eq!(path, dir.path().join("execution_report_session-42.json"));

    let loaded = ExecutionReport::load(&path).unwrap();
    assert_eq!(loaded.session_id, "session-42");
    assert_eq!(loaded.metrics.agent_interactions, 1);
    assert_eq!(loaded.metrics.tests_run, 1);
    assert_eq!(loaded.metrics.commands_executed, 1);
    assert_eq!(loaded.metrics.files_created, 1);
    assert_eq!(loaded.summary.agent_exchanges, 1);
    assert_eq!(loaded.agent_exchanges[0].streaming_chunks, vec!["def test_add():"]);
    assert_eq!(loaded.test_executions[0].passed, 1);
    assert_eq!(loaded.test_executions[0].failed, 1);
    assert_eq!(loaded.test_executions[0].output, "1 passed, 1 failed in 0.02s");

    let descriptions: Vec<&str> = loaded.timeline.iter().map(|e| e.description.as_str()).collect();
    assert_eq!(
        descriptions,
        vec![
            "Started RED phase (iteration 1)",
            "RED phase succeeded (iteration 1)",
            "Transitioned from RED to YELLOW: Tests written",
        ]
    );
    assert!(loaded
        .events
        .iter()
        .any(|e| e.event_type == TraceEventType::AgentResponse));
}

#[test]
fn test_unknown_exchange_ids_are_ignored() {
    let mut tracer = ExecutionTracer::new("session-7");
    tracer.add_streaming_chunk("ghost_1_1", "chunk");
    tracer.complete_agent_exchange("ghost_1_1", json!({}), true, None);

    let id = tracer.start_agent_exchange("coder", TddPhase::Yellow, 2, json!({}));
    assert!(id.starts_with("coder_2_"));
    assert_eq!(tracer.in_flight_count(), 1);

    let report = tracer.generate_report();
    assert!(report.agent_exchanges.is_empty());
    assert_eq!(report.metrics.agent_interactions, 1);
}
