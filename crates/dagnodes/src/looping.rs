//! Iterates a nested body until a stopping condition says otherwise.
//!
//! Iterations are not run in isolation. Every iteration appends a fresh copy
//! of the body to a [`LoopArena`], whose accumulated definition is run with
//! all earlier iterations' outputs precomputed. A pause inside any iteration
//! therefore resumes exactly like a pause in a flat workflow.

use crate::conditional::{evaluate_conditions, from_config, Condition};
use crate::subworkflow::{nested_body, nested_outcome, pause_reason, NestedOutcome};
use async_trait::async_trait;
use dagcore::{
    Link, Node, NodeContext, NodeError, NodeId, NodeOutcome, NodeSpec, PortDefinition,
    RunRequest, ScopedRecorder, TaskRecorder, Value, WorkflowDefinition, INPUT_NODE_TYPE,
    OUTPUT_NODE_TYPE, RELAY_NODE_TYPE,
};
use dagruntime::{NodeFactory, NodeTypeMetadata};
use std::collections::HashMap;
use std::sync::Arc;

pub const LOOP_NODE_TYPE: &str = "core.loop";

const DEFAULT_MAX_ITERATIONS: usize = 10;

/// Decides whether another iteration runs
pub trait StoppingCondition: Send + Sync {
    /// `completed` iterations have finished; `outputs` are the end node's
    /// outputs from the last of them.
    fn should_continue(&self, completed: usize, outputs: &HashMap<String, Value>) -> bool;
}

impl<F> StoppingCondition for F
where
    F: Fn(usize, &HashMap<String, Value>) -> bool + Send + Sync,
{
    fn should_continue(&self, completed: usize, outputs: &HashMap<String, Value>) -> bool {
        self(completed, outputs)
    }
}

/// Keep going until the iteration cap
pub struct UntilMaxIterations;

impl StoppingCondition for UntilMaxIterations {
    fn should_continue(&self, _completed: usize, _outputs: &HashMap<String, Value>) -> bool {
        true
    }
}

/// Keep going while the conditions hold over the end node's outputs
pub struct ContinueWhile(pub Vec<Condition>);

impl StoppingCondition for ContinueWhile {
    fn should_continue(&self, _completed: usize, outputs: &HashMap<String, Value>) -> bool {
        evaluate_conditions(&self.0, outputs)
    }
}

/// Accumulated definition of all iterations so far.
///
/// Iteration `i` holds a copy of every body node with id `<id>_<i>`. The
/// copy of the body input node stays the workflow input in iteration 0 and
/// becomes a relay fed by the previous iteration's end node afterwards.
/// Body output nodes become relays, so the arena has no output node and
/// exactly `iterations * body.nodes.len()` nodes.
#[derive(Debug, Clone)]
pub struct LoopArena {
    body: WorkflowDefinition,
    input_id: NodeId,
    end_node: NodeId,
    feedback: Vec<String>,
    iterations: usize,
}

impl LoopArena {
    /// Arena with one iteration. `end_node` defaults to the body's output
    /// node and must be a pass-through node.
    pub fn new(body: WorkflowDefinition, end_node: Option<NodeId>) -> Result<Self, NodeError> {
        body.validate_structure()
            .map_err(|e| NodeError::Configuration(format!("invalid loop body: {}", e)))?;

        let input = body
            .input_node()
            .ok_or_else(|| NodeError::Configuration("loop body has no input node".to_string()))?;
        let end_node = match end_node {
            Some(id) => id,
            None => body
                .output_node()
                .map(|n| n.id.clone())
                .ok_or_else(|| {
                    NodeError::Configuration(
                        "loop body has no output node; set end_node".to_string(),
                    )
                })?,
        };
        let end = body.find_node(&end_node).ok_or_else(|| {
            NodeError::Configuration(format!("end node '{}' not in loop body", end_node))
        })?;
        if ![INPUT_NODE_TYPE, OUTPUT_NODE_TYPE, RELAY_NODE_TYPE].contains(&end.node_type.as_str()) {
            return Err(NodeError::Configuration(format!(
                "end node '{}' must be a pass-through node, found {}",
                end_node, end.node_type
            )));
        }

        let input_fields = PortDefinition::from_config_table(&input.config, "fields")?;
        let end_fields = PortDefinition::from_config_table(&end.config, "fields")?;
        let mut feedback = Vec::new();
        for port in &input_fields {
            if let Some(source) = end_fields.iter().find(|f| f.name == port.name) {
                if !source.kind.is_compatible_with(port.kind) {
                    return Err(NodeError::Configuration(format!(
                        "end node field '{}' is {}, loop input expects {}",
                        port.name, source.kind, port.kind
                    )));
                }
                feedback.push(port.name.clone());
            }
        }

        Ok(Self {
            input_id: input.id.clone(),
            body,
            end_node,
            feedback,
            iterations: 1,
        })
    }

    pub fn instance_id(node_id: &str, iteration: usize) -> NodeId {
        format!("{}_{}", node_id, iteration)
    }

    pub fn len(&self) -> usize {
        self.iterations
    }

    pub fn is_empty(&self) -> bool {
        self.iterations == 0
    }

    pub fn push_iteration(&mut self) {
        self.iterations += 1;
    }

    /// End node instance of `iteration`
    pub fn end_of(&self, iteration: usize) -> NodeId {
        Self::instance_id(&self.end_node, iteration)
    }

    /// Fields carried from one iteration's end node into the next
    pub fn feedback_fields(&self) -> &[String] {
        &self.feedback
    }

    pub fn definition(&self) -> WorkflowDefinition {
        let mut definition = WorkflowDefinition::new(format!("{} (loop)", self.body.name));
        for i in 0..self.iterations {
            for node in &self.body.nodes {
                let mut instance = node.clone();
                instance.id = Self::instance_id(&node.id, i);
                if node.node_type == OUTPUT_NODE_TYPE || (i > 0 && node.id == self.input_id) {
                    instance.node_type = RELAY_NODE_TYPE.to_string();
                }
                definition.add_node(instance);
            }
            for link in &self.body.links {
                definition.links.push(Link {
                    source_id: Self::instance_id(&link.source_id, i),
                    source_output_key: link.source_output_key.clone(),
                    target_id: Self::instance_id(&link.target_id, i),
                    target_input_key: link.target_input_key.clone(),
                });
            }
            if i > 0 {
                for field in &self.feedback {
                    definition.connect(
                        self.end_of(i - 1),
                        field.clone(),
                        Self::instance_id(&self.input_id, i),
                        field.clone(),
                    );
                }
            }
        }
        definition
    }

    /// The loop input, handed to every later iteration's input relay for
    /// fields the previous iteration does not feed back
    pub fn initial_inputs(
        &self,
        input: &HashMap<String, Value>,
    ) -> HashMap<NodeId, HashMap<String, Value>> {
        (1..self.iterations)
            .map(|i| (Self::instance_id(&self.input_id, i), input.clone()))
            .collect()
    }
}

pub struct LoopNode {
    arena: LoopArena,
    max_iterations: usize,
    stopping: Arc<dyn StoppingCondition>,
    inputs: Vec<PortDefinition>,
    outputs: Vec<PortDefinition>,
}

impl LoopNode {
    pub fn new(
        body: WorkflowDefinition,
        end_node: Option<NodeId>,
        max_iterations: usize,
        stopping: Arc<dyn StoppingCondition>,
    ) -> Result<Self, NodeError> {
        if max_iterations == 0 {
            return Err(NodeError::Configuration(
                "max_iterations must be at least 1".to_string(),
            ));
        }
        let arena = LoopArena::new(body, end_node)?;
        let inputs = match arena.body.find_node(&arena.input_id) {
            Some(node) => PortDefinition::from_config_table(&node.config, "fields")?,
            None => Vec::new(),
        };
        let outputs = match arena.body.find_node(&arena.end_node) {
            Some(node) => PortDefinition::from_config_table(&node.config, "fields")?,
            None => Vec::new(),
        };
        Ok(Self {
            arena,
            max_iterations,
            stopping,
            inputs,
            outputs,
        })
    }
}

#[async_trait]
impl Node for LoopNode {
    fn node_type(&self) -> &str {
        LOOP_NODE_TYPE
    }

    fn input_fields(&self) -> Vec<PortDefinition> {
        self.inputs.clone()
    }

    fn output_fields(&self) -> Vec<PortDefinition> {
        self.outputs.clone()
    }

    async fn execute(&self, ctx: NodeContext) -> Result<NodeOutcome, NodeError> {
        let mut arena = self.arena.clone();
        let mut pending = None;
        if let Some(previous) = ctx.previous {
            if let Some(snapshot) = previous.nested {
                let iteration = previous
                    .metadata
                    .custom
                    .get("iteration")
                    .and_then(|v| v.as_f64())
                    .unwrap_or(0.0) as usize;
                for _ in 0..iteration {
                    arena.push_iteration();
                }
                pending = Some(snapshot);
            }
        }

        let recorder: Arc<dyn TaskRecorder> =
            Arc::new(ScopedRecorder::new(ctx.recorder.clone(), &ctx.node_id));
        let mut known = HashMap::new();

        loop {
            let iteration = arena.len() - 1;
            let mut request = match pending.take() {
                Some(snapshot) => snapshot.resume_request(ctx.inputs.clone()),
                None => RunRequest {
                    precomputed_outputs: std::mem::take(&mut known),
                    ..RunRequest::new(ctx.inputs.clone())
                },
            };
            request.initial_inputs = arena.initial_inputs(&ctx.inputs);

            ctx.events.info(format!("Loop iteration {}", iteration + 1));
            tracing::debug!("Loop node {} running iteration {}", ctx.node_id, iteration + 1);

            let report = ctx
                .runner
                .run_workflow(&arena.definition(), request, recorder.clone())
                .await
                .map_err(|e| NodeError::ExecutionFailed(e.to_string()))?;

            let end = arena.end_of(iteration);
            match nested_outcome(&report, Some(&end))? {
                NestedOutcome::Paused(partial) => {
                    return Ok(NodeOutcome::paused(
                        pause_reason(&report),
                        partial.with_metadata("iteration", iteration as f64),
                    ));
                }
                NestedOutcome::Completed(mut output) => {
                    let completed = iteration + 1;
                    ctx.events.progress(
                        completed as f64 * 100.0 / self.max_iterations as f64,
                        Some(format!("{} of at most {} iterations", completed, self.max_iterations)),
                    );
                    if completed >= self.max_iterations
                        || !self.stopping.should_continue(completed, &output.outputs)
                    {
                        return Ok(output.with_metadata("iterations", completed as f64).into());
                    }
                    known = output.nested.take().map(|s| s.outputs).unwrap_or_default();
                }
            }
            arena.push_iteration();
        }
    }
}

pub struct LoopNodeFactory;

impl NodeFactory for LoopNodeFactory {
    fn create(&self, spec: &NodeSpec) -> Result<Box<dyn Node>, NodeError> {
        let body = nested_body(spec)?;
        let end_node = match spec.config.get("end_node") {
            Some(value) => Some(
                value
                    .as_str()
                    .ok_or_else(|| NodeError::Configuration("end_node must be a node id".to_string()))?
                    .to_string(),
            ),
            None => None,
        };
        let max_iterations = match spec.config.get("max_iterations") {
            Some(value) => value
                .as_f64()
                .filter(|n| *n >= 1.0 && n.fract() == 0.0)
                .ok_or_else(|| {
                    NodeError::Configuration("max_iterations must be a positive integer".to_string())
                })? as usize,
            None => DEFAULT_MAX_ITERATIONS,
        };
        let stopping: Arc<dyn StoppingCondition> = match spec.config.get("continue_while") {
            Some(value) => Arc::new(ContinueWhile(from_config(value, "continue_while")?)),
            None => Arc::new(UntilMaxIterations),
        };
        Ok(Box::new(LoopNode::new(body, end_node, max_iterations, stopping)?))
    }

    fn node_type(&self) -> &str {
        LOOP_NODE_TYPE
    }

    fn metadata(&self) -> NodeTypeMetadata {
        NodeTypeMetadata {
            description: "Repeats a nested workflow while a condition holds".to_string(),
            category: "core".to_string(),
        }
    }
}
