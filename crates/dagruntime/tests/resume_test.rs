mod common;

use common::{input, registry, value_of, CallLog};
use dagcore::{
    ExecutionEvent, InMemoryRecorder, NodeOutput, NodeSpec, NodeStatus, RunOutcome, RunRequest,
    TaskStatus, WorkflowDefinition, INPUT_NODE_TYPE,
};
use dagruntime::{FlowRuntime, RuntimeConfig, WorkflowExecutor};
use std::sync::Arc;

/// in -> A -> review (pauses) -> B, plus an independent in -> side
fn review_workflow() -> WorkflowDefinition {
    WorkflowDefinition::new("review")
        .with_node(NodeSpec::new("in", INPUT_NODE_TYPE))
        .with_node(NodeSpec::new("A", "test.add_one"))
        .with_node(NodeSpec::new("review", "test.pause"))
        .with_node(NodeSpec::new("B", "test.add_one"))
        .with_node(NodeSpec::new("side", "test.add_one"))
        .with_link("in", "x", "A", "x")
        .with_link("A", "x", "review", "x")
        .with_link("review", "x", "B", "x")
        .with_link("in", "x", "side", "x")
}

#[tokio::test]
async fn test_pause_blocks_downstream_and_records_pending() {
    let calls = CallLog::default();
    let recorder = Arc::new(InMemoryRecorder::new());
    let executor = WorkflowExecutor::new(review_workflow(), registry(&calls))
        .unwrap()
        .with_recorder(recorder.clone());

    let report = executor.run(RunRequest::new(input(1.0))).await.unwrap();

    assert_eq!(report.outcome, RunOutcome::Paused);
    assert_eq!(report.paused.get("review").map(String::as_str), Some("needs review"));
    assert_eq!(report.blocked.iter().collect::<Vec<_>>(), vec!["B"]);
    assert_eq!(report.status("B"), Some(NodeStatus::Pending));
    assert_eq!(report.status("side"), Some(NodeStatus::Completed));
    // Partial output of the paused node is kept
    assert_eq!(value_of(report.output("review"), "x"), Some(2.0));

    assert_eq!(
        recorder.get("review").await.map(|r| r.status),
        Some(TaskStatus::Paused)
    );
    assert_eq!(
        recorder.get("B").await.map(|r| r.status),
        Some(TaskStatus::Pending)
    );
}

#[tokio::test]
async fn test_resume_with_supplied_value_finishes_without_rerunning() {
    let calls = CallLog::default();
    let recorder = Arc::new(InMemoryRecorder::new());
    let executor = WorkflowExecutor::new(review_workflow(), registry(&calls))
        .unwrap()
        .with_recorder(recorder.clone());

    let paused = executor.run(RunRequest::new(input(1.0))).await.unwrap();
    let mut snapshot = paused.snapshot();
    snapshot.supply("review", NodeOutput::new().with_output("x", 100.0));

    let report = executor.resume(&snapshot, input(1.0)).await.unwrap();

    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(value_of(report.output("B"), "x"), Some(101.0));
    assert_eq!(calls.count("review"), 1);
    assert_eq!(calls.count("A"), 1);
    assert_eq!(calls.count("side"), 1);
    assert_eq!(calls.count("B"), 1);
    assert_eq!(recorder.start_count("review").await, 1);
    assert_eq!(
        recorder.get("B").await.map(|r| r.history),
        Some(vec![TaskStatus::Pending, TaskStatus::Running, TaskStatus::Completed])
    );
}

#[tokio::test]
async fn test_resume_without_supplied_value_pauses_again() {
    let calls = CallLog::default();
    let executor = WorkflowExecutor::new(review_workflow(), registry(&calls)).unwrap();

    let first = executor.run(RunRequest::new(input(1.0))).await.unwrap();
    let second = executor.resume(&first.snapshot(), input(1.0)).await.unwrap();

    assert_eq!(second.outcome, RunOutcome::Paused);
    assert_eq!(calls.count("review"), 2);
    assert_eq!(calls.count("A"), 1, "completed work is not repeated");
    assert_eq!(calls.count("B"), 0);
}

#[tokio::test]
async fn test_resuming_a_finished_run_executes_nothing() {
    let calls = CallLog::default();
    let executor = WorkflowExecutor::new(review_workflow(), registry(&calls)).unwrap();

    let paused = executor.run(RunRequest::new(input(1.0))).await.unwrap();
    let mut snapshot = paused.snapshot();
    snapshot.supply("review", NodeOutput::new().with_output("x", 5.0));
    let finished = executor.resume(&snapshot, input(1.0)).await.unwrap();
    let executed = calls.total();

    let again = executor
        .resume(&finished.snapshot(), input(1.0))
        .await
        .unwrap();

    assert_eq!(again.outcome, RunOutcome::Completed);
    assert_eq!(calls.total(), executed);
    assert!(again.outputs.is_empty());
    assert_eq!(value_of(again.output("B"), "x"), Some(6.0));
}

/// in -> bad (fails) and in -> review (pauses), both feeding join
fn failing_and_pausing_workflow() -> WorkflowDefinition {
    WorkflowDefinition::new("mixed")
        .with_node(NodeSpec::new("in", INPUT_NODE_TYPE))
        .with_node(NodeSpec::new("bad", "test.fail"))
        .with_node(NodeSpec::new("review", "test.pause"))
        .with_node(NodeSpec::new("join", "test.sum"))
        .with_link("in", "x", "bad", "x")
        .with_link("in", "x", "review", "x")
        .with_link("bad", "x", "join", "left")
        .with_link("review", "x", "join", "right")
}

#[tokio::test]
async fn test_pause_outranks_failure_but_shared_dependent_fails() {
    let calls = CallLog::default();
    let executor = WorkflowExecutor::new(failing_and_pausing_workflow(), registry(&calls)).unwrap();

    let report = executor.run(RunRequest::new(input(1.0))).await.unwrap();

    assert_eq!(report.outcome, RunOutcome::Paused);
    assert_eq!(report.status("bad"), Some(NodeStatus::Failed));
    assert_eq!(report.status("review"), Some(NodeStatus::Paused));
    assert_eq!(report.status("join"), Some(NodeStatus::Failed));
    assert!(!report.blocked.contains("join"));
    assert_eq!(calls.count("join"), 0);

    let request = report.snapshot().resume_request(input(1.0));
    assert_eq!(request.node_ids, Some(vec!["review".to_string()]));

    let mut snapshot = report.snapshot();
    snapshot.supply("review", NodeOutput::new().with_output("x", 2.0));
    executor.resume(&snapshot, input(1.0)).await.unwrap();

    assert_eq!(calls.count("bad"), 1);
    assert_eq!(calls.count("review"), 1);
    assert_eq!(calls.count("join"), 0);
}

#[tokio::test]
async fn test_runtime_runs_registered_workflow_and_publishes_events() {
    let calls = CallLog::default();
    let runtime = FlowRuntime::with_registry(registry(&calls), RuntimeConfig::default());
    let mut events = runtime.subscribe_events();

    runtime.register_workflow(review_workflow()).await.unwrap();
    let paused = runtime
        .run_workflow("review", RunRequest::new(input(1.0)))
        .await
        .unwrap();
    let mut snapshot = paused.snapshot();
    snapshot.supply("review", NodeOutput::new().with_output("x", 7.0));
    let report = runtime
        .resume_workflow("review", &snapshot, input(1.0))
        .await
        .unwrap();

    assert!(report.is_completed());
    assert_eq!(value_of(report.output("B"), "x"), Some(8.0));

    let mut finished = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let ExecutionEvent::RunFinished { outcome, .. } = event {
            finished.push(outcome);
        }
    }
    assert_eq!(finished, vec![RunOutcome::Paused, RunOutcome::Completed]);
}

#[tokio::test]
async fn test_runtime_rejects_unknown_workflow() {
    let calls = CallLog::default();
    let runtime = FlowRuntime::with_registry(registry(&calls), RuntimeConfig::default());

    let result = runtime
        .run_workflow("missing", RunRequest::new(input(1.0)))
        .await;
    assert!(result.is_err());
}
