#![allow(dead_code)]

use async_trait::async_trait;
use dagcore::{
    InMemoryRecorder, Node, NodeContext, NodeError, NodeOutcome, NodeOutput, NodeSpec,
    PortDefinition, Value, ValueKind,
};
use dagcore::WorkflowDefinition;
use dagnodes::register_all;
use dagruntime::{NodeFactory, NodeRegistry, WorkflowExecutor};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// `test.step`: `n -> n + 1`, counting executions
pub struct StepNode {
    runs: Arc<AtomicUsize>,
}

#[async_trait]
impl Node for StepNode {
    fn node_type(&self) -> &str {
        "test.step"
    }

    fn input_fields(&self) -> Vec<PortDefinition> {
        vec![PortDefinition::required("n", ValueKind::Number)]
    }

    fn output_fields(&self) -> Vec<PortDefinition> {
        vec![PortDefinition::required("n", ValueKind::Number)]
    }

    async fn execute(&self, ctx: NodeContext) -> Result<NodeOutcome, NodeError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        let value = ctx.require_input("n")?;
        let n = value.as_f64().ok_or_else(|| NodeError::InvalidInputType {
            field: "n".to_string(),
            expected: ValueKind::Number.to_string(),
            actual: value.kind().to_string(),
        })?;
        Ok(NodeOutput::new().with_output("n", n + 1.0).into())
    }
}

struct StepNodeFactory {
    runs: Arc<AtomicUsize>,
}

impl NodeFactory for StepNodeFactory {
    fn create(&self, _spec: &NodeSpec) -> Result<Box<dyn Node>, NodeError> {
        Ok(Box::new(StepNode {
            runs: self.runs.clone(),
        }))
    }

    fn node_type(&self) -> &str {
        "test.step"
    }
}

pub struct Harness {
    pub registry: Arc<NodeRegistry>,
    pub recorder: Arc<InMemoryRecorder>,
    pub steps: Arc<AtomicUsize>,
}

impl Harness {
    pub fn new() -> Self {
        let steps = Arc::new(AtomicUsize::new(0));
        let mut registry = NodeRegistry::new();
        register_all(&mut registry);
        registry.register(Arc::new(StepNodeFactory {
            runs: steps.clone(),
        }));
        Self {
            registry: Arc::new(registry),
            recorder: Arc::new(InMemoryRecorder::new()),
            steps,
        }
    }

    pub fn executor(&self, workflow: WorkflowDefinition) -> WorkflowExecutor {
        WorkflowExecutor::new(workflow, self.registry.clone())
            .unwrap()
            .with_recorder(self.recorder.clone())
    }

    pub fn steps(&self) -> usize {
        self.steps.load(Ordering::SeqCst)
    }
}

pub fn fields(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}
