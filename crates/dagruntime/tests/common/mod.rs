// Shared mock nodes for executor tests

#![allow(dead_code)]

use async_trait::async_trait;
use dagcore::{
    Node, NodeContext, NodeError, NodeOutcome, NodeOutput, NodeSpec, PortDefinition, Value,
    ValueKind, WorkflowDefinition, INPUT_NODE_TYPE,
};
use dagruntime::{NodeFactory, NodeRegistry};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

type Behavior = Arc<dyn Fn(&HashMap<String, Value>) -> Result<NodeOutcome, NodeError> + Send + Sync>;

fn behavior<F>(f: F) -> Behavior
where
    F: Fn(&HashMap<String, Value>) -> Result<NodeOutcome, NodeError> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Node ids in the order their executions started
#[derive(Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub fn count(&self, node_id: &str) -> usize {
        self.0
            .lock()
            .unwrap()
            .iter()
            .filter(|id| id.as_str() == node_id)
            .count()
    }

    pub fn total(&self) -> usize {
        self.0.lock().unwrap().len()
    }
}

struct MockNode {
    node_type: String,
    inputs: Vec<PortDefinition>,
    outputs: Vec<PortDefinition>,
    behavior: Behavior,
    calls: CallLog,
}

#[async_trait]
impl Node for MockNode {
    fn node_type(&self) -> &str {
        &self.node_type
    }

    fn input_fields(&self) -> Vec<PortDefinition> {
        self.inputs.clone()
    }

    fn output_fields(&self) -> Vec<PortDefinition> {
        self.outputs.clone()
    }

    async fn execute(&self, ctx: NodeContext) -> Result<NodeOutcome, NodeError> {
        self.calls.0.lock().unwrap().push(ctx.node_id.clone());
        // Give sibling tasks a chance to interleave
        tokio::time::sleep(Duration::from_millis(5)).await;
        (self.behavior)(&ctx.inputs)
    }
}

struct MockFactory {
    node_type: String,
    inputs: Vec<PortDefinition>,
    outputs: Vec<PortDefinition>,
    behavior: Behavior,
    calls: CallLog,
}

impl NodeFactory for MockFactory {
    fn create(&self, _spec: &NodeSpec) -> Result<Box<dyn Node>, NodeError> {
        Ok(Box::new(MockNode {
            node_type: self.node_type.clone(),
            inputs: self.inputs.clone(),
            outputs: self.outputs.clone(),
            behavior: self.behavior.clone(),
            calls: self.calls.clone(),
        }))
    }

    fn node_type(&self) -> &str {
        &self.node_type
    }
}

fn number(inputs: &HashMap<String, Value>, field: &str) -> f64 {
    inputs.get(field).and_then(|v| v.as_f64()).unwrap_or_default()
}

fn x_port() -> Vec<PortDefinition> {
    vec![PortDefinition::required("x", ValueKind::Number)]
}

/// Registry with mock node types:
///
/// - `core.input`: forwards `x`
/// - `test.add_one`: `x -> x + 1`
/// - `test.sum`: `left + right -> x`
/// - `test.fail`: always fails
/// - `test.pause`: always pauses, reporting its inputs
/// - `test.parity`: routes `x` to `even` or `odd`
/// - `test.stringify`: `x -> text` (string output)
pub fn registry(calls: &CallLog) -> Arc<NodeRegistry> {
    let mut registry = NodeRegistry::new();
    let mut add = |node_type: &str,
                   inputs: Vec<PortDefinition>,
                   outputs: Vec<PortDefinition>,
                   behavior: Behavior| {
        registry.register(Arc::new(MockFactory {
            node_type: node_type.to_string(),
            inputs,
            outputs,
            behavior,
            calls: calls.clone(),
        }));
    };

    add(
        INPUT_NODE_TYPE,
        x_port(),
        x_port(),
        behavior(|inputs| Ok(NodeOutput::from_fields(inputs.clone()).into())),
    );
    add(
        "test.add_one",
        x_port(),
        x_port(),
        behavior(|inputs| Ok(NodeOutput::new().with_output("x", number(inputs, "x") + 1.0).into())),
    );
    add(
        "test.sum",
        vec![
            PortDefinition::required("left", ValueKind::Number),
            PortDefinition::required("right", ValueKind::Number),
        ],
        x_port(),
        behavior(|inputs| {
            let sum = number(inputs, "left") + number(inputs, "right");
            Ok(NodeOutput::new().with_output("x", sum).into())
        }),
    );
    add(
        "test.fail",
        x_port(),
        x_port(),
        behavior(|_| Err(NodeError::ExecutionFailed("boom".to_string()))),
    );
    add(
        "test.pause",
        x_port(),
        x_port(),
        behavior(|inputs| {
            Ok(NodeOutcome::paused(
                "needs review",
                NodeOutput::from_fields(inputs.clone()),
            ))
        }),
    );
    add(
        "test.parity",
        x_port(),
        vec![
            PortDefinition::optional("even", ValueKind::Number),
            PortDefinition::optional("odd", ValueKind::Number),
        ],
        behavior(|inputs| {
            let x = number(inputs, "x");
            let branch = if x % 2.0 == 0.0 { "even" } else { "odd" };
            Ok(NodeOutput::new().with_output(branch, x).into())
        }),
    );
    add(
        "test.stringify",
        x_port(),
        vec![PortDefinition::required("text", ValueKind::String)],
        behavior(|inputs| {
            let text = number(inputs, "x").to_string();
            Ok(NodeOutput::new().with_output("text", text).into())
        }),
    );

    Arc::new(registry)
}

pub fn input(x: f64) -> HashMap<String, Value> {
    HashMap::from([("x".to_string(), Value::Number(x))])
}

pub fn value_of(output: Option<&NodeOutput>, field: &str) -> Option<f64> {
    output.and_then(|o| o.get(field)).and_then(|v| v.as_f64())
}

/// in -> A -> {B, C} -> D (D = B + C)
pub fn diamond() -> WorkflowDefinition {
    WorkflowDefinition::new("diamond")
        .with_node(NodeSpec::new("in", INPUT_NODE_TYPE))
        .with_node(NodeSpec::new("A", "test.add_one"))
        .with_node(NodeSpec::new("B", "test.add_one"))
        .with_node(NodeSpec::new("C", "test.add_one"))
        .with_node(NodeSpec::new("D", "test.sum"))
        .with_link("in", "x", "A", "x")
        .with_link("A", "x", "B", "x")
        .with_link("A", "x", "C", "x")
        .with_link("B", "x", "D", "left")
        .with_link("C", "x", "D", "right")
}
