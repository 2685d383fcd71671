mod common;

use common::{diamond, input, registry, value_of, CallLog};
use dagcore::{
    InMemoryRecorder, NodeError, NodeOutput, NodeSpec, NodeStatus, RunOutcome, RunRequest,
    TaskStatus, WorkflowDefinition, WorkflowError, INPUT_NODE_TYPE,
};
use dagruntime::WorkflowExecutor;
use std::sync::Arc;

#[tokio::test]
async fn test_diamond_runs_shared_ancestor_once() {
    let calls = CallLog::default();
    let recorder = Arc::new(InMemoryRecorder::new());
    let executor = WorkflowExecutor::new(diamond(), registry(&calls))
        .unwrap()
        .with_recorder(recorder.clone());

    let report = executor.run(RunRequest::new(input(1.0))).await.unwrap();

    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(calls.count("A"), 1, "A feeds two branches but must run once");
    assert_eq!(recorder.start_count("A").await, 1);
    // A = 2, B = C = 3
    assert_eq!(value_of(report.output("D"), "x"), Some(6.0));
    assert_eq!(calls.total(), 5);
}

#[tokio::test]
async fn test_partial_run_uses_precomputed_ancestors() {
    let calls = CallLog::default();
    let executor = WorkflowExecutor::new(diamond(), registry(&calls)).unwrap();

    let request = RunRequest::new(input(1.0))
        .with_nodes(["D"])
        .with_precomputed("A", NodeOutput::new().with_output("x", 2.0))
        .with_precomputed("B", NodeOutput::new().with_output("x", 10.0))
        .with_precomputed("C", NodeOutput::new().with_output("x", 20.0));
    let report = executor.run(request).await.unwrap();

    assert_eq!(report.outputs.keys().collect::<Vec<_>>(), vec!["D"]);
    assert_eq!(value_of(report.output("D"), "x"), Some(30.0));
    assert_eq!(calls.total(), 1, "only D should execute");
    assert_eq!(report.status("B"), Some(NodeStatus::Completed));
    assert_eq!(report.status("in"), None, "input sits behind precomputed nodes");
}

#[tokio::test]
async fn test_partial_run_pulls_in_missing_ancestors() {
    let calls = CallLog::default();
    let executor = WorkflowExecutor::new(diamond(), registry(&calls)).unwrap();

    let report = executor
        .run(RunRequest::new(input(1.0)).with_nodes(["B"]))
        .await
        .unwrap();

    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(value_of(report.output("B"), "x"), Some(3.0));
    assert_eq!(calls.count("C"), 0);
    assert_eq!(calls.count("D"), 0);
}

#[tokio::test]
async fn test_failure_blocks_descendants_but_not_siblings() {
    let calls = CallLog::default();
    let recorder = Arc::new(InMemoryRecorder::new());
    let workflow = WorkflowDefinition::new("failing")
        .with_node(NodeSpec::new("in", INPUT_NODE_TYPE))
        .with_node(NodeSpec::new("bad", "test.fail"))
        .with_node(NodeSpec::new("after", "test.add_one"))
        .with_node(NodeSpec::new("side", "test.add_one"))
        .with_link("in", "x", "bad", "x")
        .with_link("bad", "x", "after", "x")
        .with_link("in", "x", "side", "x");
    let executor = WorkflowExecutor::new(workflow, registry(&calls))
        .unwrap()
        .with_recorder(recorder.clone());

    let report = executor.run(RunRequest::new(input(1.0))).await.unwrap();

    assert_eq!(report.outcome, RunOutcome::Failed);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].node_id, "bad");
    assert_eq!(
        report.failures[0].error,
        NodeError::ExecutionFailed("boom".to_string())
    );
    assert_eq!(report.status("after"), Some(NodeStatus::Failed));
    assert_eq!(calls.count("after"), 0);
    assert_eq!(value_of(report.output("side"), "x"), Some(2.0));

    let after = recorder.get("after").await.unwrap();
    assert_eq!(after.status, TaskStatus::Failed);
    assert_eq!(after.error.as_deref(), Some("upstream node bad failed"));
}

#[tokio::test]
async fn test_unlinked_required_field_is_missing_input() {
    let calls = CallLog::default();
    let workflow = WorkflowDefinition::new("half")
        .with_node(NodeSpec::new("in", INPUT_NODE_TYPE))
        .with_node(NodeSpec::new("sum", "test.sum"))
        .with_link("in", "x", "sum", "left");
    let executor = WorkflowExecutor::new(workflow, registry(&calls)).unwrap();

    let report = executor.run(RunRequest::new(input(1.0))).await.unwrap();

    assert_eq!(report.outcome, RunOutcome::Failed);
    assert_eq!(
        report.failures[0].error,
        NodeError::MissingInput("right".to_string())
    );
    assert_eq!(calls.count("sum"), 0);
}

#[tokio::test]
async fn test_initial_inputs_fill_unlinked_fields() {
    let calls = CallLog::default();
    let workflow = WorkflowDefinition::new("half")
        .with_node(NodeSpec::new("in", INPUT_NODE_TYPE))
        .with_node(NodeSpec::new("sum", "test.sum"))
        .with_link("in", "x", "sum", "left");
    let executor = WorkflowExecutor::new(workflow, registry(&calls)).unwrap();

    let request = RunRequest::new(input(1.0))
        .with_initial_input("sum", "right", 41.0)
        // Linked fields are not overridden
        .with_initial_input("sum", "left", 100.0);
    let report = executor.run(request).await.unwrap();

    assert_eq!(value_of(report.output("sum"), "x"), Some(42.0));
}

#[tokio::test]
async fn test_untaken_branch_is_skipped() {
    let calls = CallLog::default();
    let recorder = Arc::new(InMemoryRecorder::new());
    let workflow = WorkflowDefinition::new("parity")
        .with_node(NodeSpec::new("in", INPUT_NODE_TYPE))
        .with_node(NodeSpec::new("route", "test.parity"))
        .with_node(NodeSpec::new("on_even", "test.add_one"))
        .with_node(NodeSpec::new("on_odd", "test.add_one"))
        .with_node(NodeSpec::new("after_even", "test.add_one"))
        .with_link("in", "x", "route", "x")
        .with_link("route", "even", "on_even", "x")
        .with_link("route", "odd", "on_odd", "x")
        .with_link("on_even", "x", "after_even", "x");
    let executor = WorkflowExecutor::new(workflow, registry(&calls))
        .unwrap()
        .with_recorder(recorder.clone());

    let report = executor.run(RunRequest::new(input(3.0))).await.unwrap();

    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(value_of(report.output("on_odd"), "x"), Some(4.0));
    assert_eq!(report.status("on_even"), Some(NodeStatus::Skipped));
    assert_eq!(report.status("after_even"), Some(NodeStatus::Skipped));
    assert!(report.output("on_even").is_none());
    assert_eq!(calls.count("on_even"), 0);
    assert_eq!(
        recorder.get("on_even").await.map(|r| r.status),
        Some(TaskStatus::Canceled)
    );
}

#[tokio::test]
async fn test_initial_input_fills_field_of_untaken_branch() {
    let calls = CallLog::default();
    let workflow = WorkflowDefinition::new("parity")
        .with_node(NodeSpec::new("in", INPUT_NODE_TYPE))
        .with_node(NodeSpec::new("route", "test.parity"))
        .with_node(NodeSpec::new("on_even", "test.add_one"))
        .with_link("in", "x", "route", "x")
        .with_link("route", "even", "on_even", "x");
    let executor = WorkflowExecutor::new(workflow, registry(&calls)).unwrap();

    let report = executor
        .run(RunRequest::new(input(3.0)).with_initial_input("on_even", "x", 41.0))
        .await
        .unwrap();

    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(report.status("on_even"), Some(NodeStatus::Completed));
    assert_eq!(value_of(report.output("on_even"), "x"), Some(42.0));
    assert_eq!(calls.count("on_even"), 1);
}

#[tokio::test]
async fn test_unknown_requested_node_is_an_error() {
    let calls = CallLog::default();
    let executor = WorkflowExecutor::new(diamond(), registry(&calls)).unwrap();

    let result = executor
        .run(RunRequest::new(input(1.0)).with_nodes(["ghost"]))
        .await;

    assert!(result.is_err());
    assert_eq!(calls.total(), 0);
}

#[test]
fn test_link_kind_mismatch_is_rejected() {
    let calls = CallLog::default();
    let workflow = WorkflowDefinition::new("kinds")
        .with_node(NodeSpec::new("in", INPUT_NODE_TYPE))
        .with_node(NodeSpec::new("text", "test.stringify"))
        .with_node(NodeSpec::new("inc", "test.add_one"))
        .with_link("in", "x", "text", "x")
        .with_link("text", "text", "inc", "x");

    let err = WorkflowExecutor::new(workflow, registry(&calls)).err().unwrap();
    assert!(
        matches!(err, WorkflowError::LinkIncompatible { ref target_id, .. } if target_id == "inc"),
        "unexpected error: {:?}",
        err
    );
}

#[test]
fn test_link_to_undeclared_field_is_rejected() {
    let calls = CallLog::default();
    let workflow = diamond().with_link("A", "nope", "D", "left");

    let err = WorkflowExecutor::new(workflow, registry(&calls)).err().unwrap();
    assert!(matches!(err, WorkflowError::LinkIncompatible { .. }));
}

#[test]
fn test_cycle_is_rejected() {
    let calls = CallLog::default();
    let workflow = WorkflowDefinition::new("cycle")
        .with_node(NodeSpec::new("in", INPUT_NODE_TYPE))
        .with_node(NodeSpec::new("A", "test.add_one"))
        .with_node(NodeSpec::new("B", "test.add_one"))
        .with_link("in", "x", "A", "x")
        .with_link("A", "x", "B", "x")
        .with_link("B", "x", "A", "x");

    let err = WorkflowExecutor::new(workflow, registry(&calls)).err().unwrap();
    assert!(matches!(err, WorkflowError::CyclicDependency(_)));
}

#[test]
fn test_unknown_node_type_is_rejected() {
    let calls = CallLog::default();
    let workflow = diamond().with_node(NodeSpec::new("mystery", "test.nothing"));

    let err = WorkflowExecutor::new(workflow, registry(&calls)).err().unwrap();
    assert_eq!(err, WorkflowError::UnknownNodeType("test.nothing".to_string()));
}

#[test]
fn test_missing_input_node_is_rejected() {
    let calls = CallLog::default();
    let workflow = WorkflowDefinition::new("headless").with_node(NodeSpec::new("A", "test.add_one"));

    let err = WorkflowExecutor::new(workflow, registry(&calls)).err().unwrap();
    assert!(matches!(err, WorkflowError::Invalid(_)));
}
