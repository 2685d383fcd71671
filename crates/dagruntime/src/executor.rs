use crate::graph::DependencyGraph;
use crate::memo::{TaskHandle, TaskMemo};
use crate::nested::NestedRunner;
use crate::registry::NodeRegistry;
use chrono::Utc;
use dagcore::{
    EventBus, ExecutionEvent, FlowError, Node, NodeContext, NodeError, NodeFailure, NodeId,
    NodeOutcome, NodeOutput, NodeStatus, PortDefinition, RunId, RunOutcome, RunReport, RunRequest,
    RunSnapshot, TaskRecorder, TaskStatus, TaskUpdate, Value, WorkflowDefinition, WorkflowError,
    WorkflowRunner, INPUT_NODE_TYPE,
};
use dagcore::recorder::NoopRecorder;
use futures::future::{join_all, BoxFuture, FutureExt};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

/// A validated workflow with instantiated nodes, ready to run any number
/// of times.
pub struct WorkflowExecutor {
    definition: Arc<WorkflowDefinition>,
    graph: Arc<DependencyGraph>,
    nodes: Arc<HashMap<NodeId, Arc<dyn Node>>>,
    registry: Arc<NodeRegistry>,
    recorder: Arc<dyn TaskRecorder>,
    event_bus: Arc<EventBus>,
}

impl WorkflowExecutor {
    /// Validate `definition` and instantiate its nodes.
    ///
    /// Checks structure, node types, acyclicity and that every link joins
    /// a declared output field to a declared input field of a compatible
    /// kind. Nothing is re-validated per run.
    pub fn new(
        definition: WorkflowDefinition,
        registry: Arc<NodeRegistry>,
    ) -> Result<Self, WorkflowError> {
        definition.validate_structure()?;
        let graph = DependencyGraph::build(&definition)?;

        let mut nodes: HashMap<NodeId, Arc<dyn Node>> = HashMap::new();
        for spec in &definition.nodes {
            let node = registry.create_node(spec)?;
            nodes.insert(spec.id.clone(), Arc::from(node));
        }

        validate_links(&definition, &nodes)?;

        tracing::debug!(
            "Validated workflow '{}' ({} nodes, {} links)",
            definition.name,
            definition.nodes.len(),
            definition.links.len()
        );

        Ok(Self {
            definition: Arc::new(definition),
            graph: Arc::new(graph),
            nodes: Arc::new(nodes),
            registry,
            recorder: Arc::new(NoopRecorder),
            event_bus: Arc::new(EventBus::default()),
        })
    }

    pub fn with_recorder(mut self, recorder: Arc<dyn TaskRecorder>) -> Self {
        self.recorder = recorder;
        self
    }

    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = event_bus;
        self
    }

    pub fn definition(&self) -> &WorkflowDefinition {
        &self.definition
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// Execute the requested nodes (and their ancestors) concurrently.
    ///
    /// Node failures and pauses are reported in the [`RunReport`]; only a
    /// request naming unknown nodes is an `Err`.
    pub async fn run(&self, request: RunRequest) -> Result<RunReport, FlowError> {
        let run_id = RunId::new_v4();
        let start_time = Instant::now();

        let requested: Vec<NodeId> = match &request.node_ids {
            Some(ids) => ids.clone(),
            None => self.graph.topological_order().to_vec(),
        };
        let active = {
            let stop_at: HashSet<&str> = request
                .precomputed_outputs
                .keys()
                .map(String::as_str)
                .collect();
            self.graph
                .closure(requested.iter().map(String::as_str), &stop_at)?
        };

        self.event_bus.emit(ExecutionEvent::RunStarted {
            run_id,
            workflow: self.definition.name.clone(),
            timestamp: Utc::now(),
        });
        tracing::info!(
            "Starting run {} of workflow '{}' ({} active nodes, {} precomputed)",
            run_id,
            self.definition.name,
            active.len(),
            request.precomputed_outputs.len()
        );

        let run = Arc::new(Run {
            run_id,
            definition: self.definition.clone(),
            graph: self.graph.clone(),
            nodes: self.nodes.clone(),
            memo: TaskMemo::new(),
            request,
            recorder: self.recorder.clone(),
            event_bus: self.event_bus.clone(),
            runner: Arc::new(NestedRunner::new(
                self.registry.clone(),
                self.event_bus.clone(),
            )),
        });

        join_all(requested.iter().map(|id| run.schedule(id))).await;

        let report = run.finish(&active).await;

        let duration_ms = start_time.elapsed().as_millis() as u64;
        self.event_bus.emit(ExecutionEvent::RunFinished {
            run_id,
            outcome: report.outcome,
            duration_ms,
            timestamp: Utc::now(),
        });
        tracing::info!(
            "Run {} finished as {:?} in {}ms ({} paused, {} blocked, {} failed)",
            run_id,
            report.outcome,
            duration_ms,
            report.paused.len(),
            report.blocked.len(),
            report.failures.len()
        );

        Ok(report)
    }

    /// Continue a paused run from its snapshot.
    ///
    /// Paused nodes given a value through [`RunSnapshot::supply`] are not
    /// executed again; the rest are re-run together with everything they
    /// blocked.
    pub async fn resume(
        &self,
        snapshot: &RunSnapshot,
        input: HashMap<String, Value>,
    ) -> Result<RunReport, FlowError> {
        tracing::info!(
            "Resuming workflow '{}' ({} paused, {} blocked)",
            self.definition.name,
            snapshot.paused.len(),
            snapshot.blocked.len()
        );
        self.run(snapshot.resume_request(input)).await
    }
}

fn validate_links(
    definition: &WorkflowDefinition,
    nodes: &HashMap<NodeId, Arc<dyn Node>>,
) -> Result<(), WorkflowError> {
    let find = |ports: Vec<PortDefinition>, name: &str| ports.into_iter().find(|p| p.name == name);

    for link in &definition.links {
        let incompatible = |reason: String| WorkflowError::LinkIncompatible {
            source_id: link.source_id.clone(),
            source_key: link.source_output_key.clone(),
            target_id: link.target_id.clone(),
            target_key: link.target_input_key.clone(),
            reason,
        };

        let source = nodes
            .get(&link.source_id)
            .ok_or_else(|| WorkflowError::NodeNotFound(link.source_id.clone()))?;
        let target = nodes
            .get(&link.target_id)
            .ok_or_else(|| WorkflowError::NodeNotFound(link.target_id.clone()))?;

        let output = find(source.output_fields(), &link.source_output_key).ok_or_else(|| {
            incompatible(format!(
                "'{}' declares no output field '{}'",
                link.source_id, link.source_output_key
            ))
        })?;
        let input = find(target.input_fields(), &link.target_input_key).ok_or_else(|| {
            incompatible(format!(
                "'{}' declares no input field '{}'",
                link.target_id, link.target_input_key
            ))
        })?;

        if !output.kind.is_compatible_with(input.kind) {
            return Err(incompatible(format!(
                "{} output cannot feed {} input",
                output.kind, input.kind
            )));
        }
    }
    Ok(())
}

/// Why a node never started
#[derive(Debug, Clone)]
enum BlockCause {
    Paused,
    Failed { origin: NodeId },
}

/// Resolved value of a node's task handle
#[derive(Debug, Clone)]
enum NodeState {
    Completed(Arc<NodeOutput>),
    Precomputed,
    Paused {
        reason: String,
        partial: Arc<NodeOutput>,
    },
    Failed(NodeError),
    Skipped,
    Blocked(BlockCause),
}

impl NodeState {
    fn panicked(message: String) -> Self {
        NodeState::Failed(NodeError::ExecutionFailed(format!("node task panicked: {}", message)))
    }
}

enum Inputs {
    Ready(HashMap<String, Value>),
    /// Every value the node needed sat behind an untaken branch
    Skip,
    Missing(String),
}

/// Per-invocation state, shared by the node tasks of one run
struct Run {
    run_id: RunId,
    definition: Arc<WorkflowDefinition>,
    graph: Arc<DependencyGraph>,
    nodes: Arc<HashMap<NodeId, Arc<dyn Node>>>,
    memo: TaskMemo<NodeState>,
    request: RunRequest,
    recorder: Arc<dyn TaskRecorder>,
    event_bus: Arc<EventBus>,
    runner: Arc<dyn WorkflowRunner>,
}

impl Run {
    fn schedule(self: &Arc<Self>, node_id: &str) -> TaskHandle<NodeState> {
        let run = Arc::clone(self);
        let id = node_id.to_string();
        self.memo
            .get_or_spawn(node_id, move || run.execute_node(id), NodeState::panicked)
    }

    fn execute_node(self: Arc<Self>, node_id: NodeId) -> BoxFuture<'static, NodeState> {
        async move {
            if self.request.precomputed_outputs.contains_key(&node_id) {
                tracing::debug!("Node {} resolved from precomputed output", node_id);
                return NodeState::Precomputed;
            }

            let deps: Vec<NodeId> = self.graph.dependencies(&node_id).into_iter().collect();
            let states = join_all(deps.iter().map(|dep| self.schedule(dep))).await;
            let upstream: HashMap<NodeId, NodeState> = deps.into_iter().zip(states).collect();

            if let Some(cause) = block_cause(&upstream) {
                return self.block(&node_id, cause).await;
            }

            match self.synthesize_inputs(&node_id, &upstream) {
                Inputs::Ready(inputs) => self.invoke(&node_id, inputs).await,
                Inputs::Skip => {
                    tracing::debug!("Node {} skipped: its inputs sit behind untaken branches", node_id);
                    self.recorder
                        .update_task(TaskUpdate::new(&node_id, TaskStatus::Canceled).finished())
                        .await;
                    NodeState::Skipped
                }
                Inputs::Missing(field) => {
                    let error = NodeError::MissingInput(field);
                    tracing::error!("Node {} failed: {}", node_id, error);
                    self.recorder
                        .update_task(
                            TaskUpdate::new(&node_id, TaskStatus::Failed)
                                .with_error(error.to_string())
                                .finished(),
                        )
                        .await;
                    NodeState::Failed(error)
                }
            }
        }
        .boxed()
    }

    async fn block(&self, node_id: &str, cause: BlockCause) -> NodeState {
        match &cause {
            BlockCause::Failed { origin } => {
                tracing::warn!("Node {} not run: upstream node {} failed", node_id, origin);
                self.recorder
                    .update_task(
                        TaskUpdate::new(node_id, TaskStatus::Failed)
                            .with_error(format!("upstream node {} failed", origin))
                            .finished(),
                    )
                    .await;
            }
            // Pending is recorded once the blocked set is known.
            BlockCause::Paused => {
                tracing::debug!("Node {} waits behind a paused node", node_id);
            }
        }
        NodeState::Blocked(cause)
    }

    /// Bind link values, then fill the gaps from initial inputs.
    fn synthesize_inputs(&self, node_id: &str, upstream: &HashMap<NodeId, NodeState>) -> Inputs {
        let mut inputs: HashMap<String, Value> = HashMap::new();
        let mut linked_fields = HashSet::new();

        for link in self.definition.incoming_links(node_id) {
            linked_fields.insert(link.target_input_key.as_str());
            let value = self
                .output_of(&link.source_id, upstream)
                .and_then(|output| output.outputs.get(&link.source_output_key).cloned());
            if let Some(value) = value {
                inputs.insert(link.target_input_key.clone(), value);
            }
        }

        let is_input_node = self
            .definition
            .find_node(node_id)
            .is_some_and(|spec| spec.node_type == INPUT_NODE_TYPE);
        if is_input_node {
            for (field, value) in &self.request.input {
                inputs.entry(field.clone()).or_insert_with(|| value.clone());
            }
        }
        if let Some(initial) = self.request.initial_inputs.get(node_id) {
            for (field, value) in initial {
                inputs.entry(field.clone()).or_insert_with(|| value.clone());
            }
        }

        let declared = match self.nodes.get(node_id) {
            Some(node) => node.input_fields(),
            None => Vec::new(),
        };
        for port in declared.iter().filter(|p| p.required) {
            if inputs.contains_key(&port.name) {
                continue;
            }
            // Unset because an upstream branch was not taken
            if linked_fields.contains(port.name.as_str()) {
                return Inputs::Skip;
            }
            return Inputs::Missing(port.name.clone());
        }

        Inputs::Ready(inputs)
    }

    fn output_of<'a>(
        &'a self,
        node_id: &str,
        upstream: &'a HashMap<NodeId, NodeState>,
    ) -> Option<&'a NodeOutput> {
        match upstream.get(node_id)? {
            NodeState::Completed(output) => Some(output.as_ref()),
            NodeState::Precomputed => self.request.precomputed_outputs.get(node_id),
            _ => None,
        }
    }

    async fn invoke(&self, node_id: &str, inputs: HashMap<String, Value>) -> NodeState {
        let Some(node) = self.nodes.get(node_id).cloned() else {
            return NodeState::Failed(NodeError::ExecutionFailed(format!(
                "no instance for node {}",
                node_id
            )));
        };
        let config = self
            .definition
            .find_node(node_id)
            .map(|spec| spec.config.clone())
            .unwrap_or_default();

        self.recorder.create_task(node_id, &inputs).await;
        self.recorder
            .update_task(TaskUpdate::new(node_id, TaskStatus::Running))
            .await;
        tracing::info!("Starting node {} ({})", node_id, node.node_type());

        let ctx = NodeContext {
            node_id: node_id.to_string(),
            run_id: self.run_id,
            inputs,
            config,
            previous: self.request.previous_outputs.get(node_id).cloned(),
            recorder: self.recorder.clone(),
            runner: self.runner.clone(),
            events: self.event_bus.create_emitter(self.run_id, node_id.to_string()),
        };

        let start = Instant::now();
        let result = node.execute(ctx).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(NodeOutcome::Completed(mut output)) => {
                output.metadata.execution_time_ms = duration_ms;
                tracing::info!("Node {} completed in {}ms", node_id, duration_ms);
                self.recorder
                    .update_task(
                        TaskUpdate::new(node_id, TaskStatus::Completed)
                            .with_outputs(output.outputs.clone())
                            .finished(),
                    )
                    .await;
                NodeState::Completed(Arc::new(output))
            }
            Ok(NodeOutcome::Paused { reason, mut partial }) => {
                partial.metadata.execution_time_ms = duration_ms;
                tracing::warn!("Node {} paused: {}", node_id, reason);
                self.recorder
                    .update_task(
                        TaskUpdate::new(node_id, TaskStatus::Paused)
                            .with_outputs(partial.outputs.clone()),
                    )
                    .await;
                NodeState::Paused {
                    reason,
                    partial: Arc::new(partial),
                }
            }
            Err(error) => {
                tracing::error!("Node {} failed after {}ms: {}", node_id, duration_ms, error);
                self.recorder
                    .update_task(
                        TaskUpdate::new(node_id, TaskStatus::Failed)
                            .with_error(error.to_string())
                            .finished(),
                    )
                    .await;
                NodeState::Failed(error)
            }
        }
    }

    /// Collect every node's final state into a report and mark the nodes
    /// behind paused ones as pending.
    async fn finish(&self, active: &BTreeSet<NodeId>) -> RunReport {
        let scheduled = self.memo.scheduled();
        let states = join_all(scheduled.iter().map(|(_, handle)| handle.clone())).await;

        let mut outputs = HashMap::new();
        let mut statuses = HashMap::new();
        let mut paused = BTreeMap::new();
        let mut failures = Vec::new();
        let mut waiting = HashSet::new();

        for ((node_id, _), state) in scheduled.into_iter().zip(states) {
            let status = match state {
                NodeState::Completed(output) => {
                    outputs.insert(node_id.clone(), output.as_ref().clone());
                    NodeStatus::Completed
                }
                NodeState::Precomputed => NodeStatus::Completed,
                NodeState::Paused { reason, partial } => {
                    outputs.insert(node_id.clone(), partial.as_ref().clone());
                    paused.insert(node_id.clone(), reason);
                    NodeStatus::Paused
                }
                NodeState::Failed(error) => {
                    failures.push(NodeFailure {
                        node_id: node_id.clone(),
                        error,
                    });
                    NodeStatus::Failed
                }
                NodeState::Skipped => NodeStatus::Skipped,
                NodeState::Blocked(BlockCause::Failed { .. }) => NodeStatus::Failed,
                NodeState::Blocked(BlockCause::Paused) => {
                    waiting.insert(node_id.clone());
                    NodeStatus::Pending
                }
            };
            statuses.insert(node_id, status);
        }
        failures.sort_by(|a, b| a.node_id.cmp(&b.node_id));

        let blocked: BTreeSet<NodeId> = self
            .graph
            .downstream(paused.keys().map(String::as_str))
            .into_iter()
            .filter(|id| active.contains(id) && waiting.contains(id))
            .collect();
        for node_id in &blocked {
            self.recorder
                .update_task(TaskUpdate::new(node_id, TaskStatus::Pending))
                .await;
        }

        let outcome = if !paused.is_empty() {
            RunOutcome::Paused
        } else if statuses.values().any(|s| *s == NodeStatus::Failed) {
            RunOutcome::Failed
        } else {
            RunOutcome::Completed
        };

        RunReport {
            run_id: self.run_id,
            outcome,
            outputs,
            statuses,
            paused,
            blocked,
            failures,
            precomputed: self.request.precomputed_outputs.clone(),
        }
    }
}

/// Failure upstream wins over a pause upstream.
fn block_cause(upstream: &HashMap<NodeId, NodeState>) -> Option<BlockCause> {
    let mut paused = false;
    for (dep, state) in upstream {
        match state {
            NodeState::Failed(_) => {
                return Some(BlockCause::Failed {
                    origin: dep.clone(),
                })
            }
            NodeState::Blocked(BlockCause::Failed { origin }) => {
                return Some(BlockCause::Failed {
                    origin: origin.clone(),
                })
            }
            NodeState::Paused { .. } | NodeState::Blocked(BlockCause::Paused) => paused = true,
            _ => {}
        }
    }
    paused.then_some(BlockCause::Paused)
}
