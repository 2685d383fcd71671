//! Run requests, reports and resumable snapshots.

use crate::recorder::TaskRecorder;
use crate::{FlowError, NodeError, NodeId, NodeOutput, Value, WorkflowDefinition, WorkflowError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use uuid::Uuid;

pub type RunId = Uuid;

/// Everything a single call to `run` needs besides the definition
#[derive(Debug, Clone, Default)]
pub struct RunRequest {
    /// Values for the input node's fields
    pub input: HashMap<String, Value>,

    /// Extra per-node inputs, used for fields no link supplies
    pub initial_inputs: HashMap<NodeId, HashMap<String, Value>>,

    /// Nodes to run. Ancestors are added automatically. `None` runs all.
    pub node_ids: Option<Vec<NodeId>>,

    /// Outputs that stand in for executing the node
    pub precomputed_outputs: HashMap<NodeId, NodeOutput>,

    /// Outputs handed to a re-executed node as `NodeContext::previous`
    pub previous_outputs: HashMap<NodeId, NodeOutput>,
}

impl RunRequest {
    pub fn new(input: HashMap<String, Value>) -> Self {
        Self {
            input,
            ..Self::default()
        }
    }

    pub fn with_nodes<I, S>(mut self, node_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<NodeId>,
    {
        self.node_ids = Some(node_ids.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_precomputed(mut self, node_id: impl Into<NodeId>, output: NodeOutput) -> Self {
        self.precomputed_outputs.insert(node_id.into(), output);
        self
    }

    pub fn with_initial_input(
        mut self,
        node_id: impl Into<NodeId>,
        field: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        self.initial_inputs
            .entry(node_id.into())
            .or_default()
            .insert(field.into(), value.into());
        self
    }
}

/// Run-level result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunOutcome {
    Completed,
    Paused,
    Failed,
}

/// Final state of one node after a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeStatus {
    /// Executed, or supplied through precomputed outputs
    Completed,
    Paused,
    /// Failed itself, or never started because an ancestor failed
    Failed,
    /// A required field was left unset by an untaken branch
    Skipped,
    /// Waiting behind a paused ancestor; resumable
    Pending,
}

/// A node-local failure, wrapped with the node id it happened on
#[derive(Debug, Clone, PartialEq)]
pub struct NodeFailure {
    pub node_id: NodeId,
    pub error: NodeError,
}

/// What a run produced
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: RunId,
    pub outcome: RunOutcome,

    /// Nodes that produced output in this run, including partial outputs
    /// of paused nodes. Precomputed and skipped nodes are absent.
    pub outputs: HashMap<NodeId, NodeOutput>,

    pub statuses: HashMap<NodeId, NodeStatus>,

    /// Paused node id -> pause reason
    pub paused: BTreeMap<NodeId, String>,

    /// Nodes downstream of a paused node
    pub blocked: BTreeSet<NodeId>,

    pub failures: Vec<NodeFailure>,

    /// Outputs supplied by the request, carried so snapshots are complete
    pub precomputed: HashMap<NodeId, NodeOutput>,
}

impl RunReport {
    /// Output of `node_id`, whether produced now or supplied up front
    pub fn output(&self, node_id: &str) -> Option<&NodeOutput> {
        self.outputs
            .get(node_id)
            .or_else(|| self.precomputed.get(node_id))
    }

    pub fn status(&self, node_id: &str) -> Option<NodeStatus> {
        self.statuses.get(node_id).copied()
    }

    pub fn is_completed(&self) -> bool {
        self.outcome == RunOutcome::Completed
    }

    pub fn is_paused(&self) -> bool {
        self.outcome == RunOutcome::Paused
    }

    /// Everything known after this run, in the shape `resume` consumes
    pub fn snapshot(&self) -> RunSnapshot {
        let mut outputs = self.precomputed.clone();
        outputs.extend(self.outputs.iter().map(|(k, v)| (k.clone(), v.clone())));
        RunSnapshot {
            outputs,
            paused: self.paused.keys().cloned().collect(),
            blocked: self.blocked.clone(),
        }
    }
}

/// Serializable state of a finished (possibly paused) run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSnapshot {
    pub outputs: HashMap<NodeId, NodeOutput>,
    #[serde(default)]
    pub paused: BTreeSet<NodeId>,
    #[serde(default)]
    pub blocked: BTreeSet<NodeId>,
}

impl RunSnapshot {
    pub fn is_paused(&self) -> bool {
        !self.paused.is_empty()
    }

    /// Record an externally supplied value for a paused node. The node is
    /// treated as resolved on resume and is not executed again.
    pub fn supply(&mut self, node_id: impl Into<NodeId>, output: NodeOutput) {
        let node_id = node_id.into();
        self.paused.remove(&node_id);
        self.outputs.insert(node_id, output);
    }

    /// Like [`supply`](Self::supply), for a node inside nested runs.
    /// `path` lists the enclosing subworkflow/loop node ids, outermost first,
    /// and ends with the target node id.
    pub fn supply_nested(&mut self, path: &[&str], output: NodeOutput) -> Result<(), WorkflowError> {
        match path {
            [] => Err(WorkflowError::Invalid("empty node path".to_string())),
            [node_id] => {
                self.supply(*node_id, output);
                Ok(())
            }
            [parent, rest @ ..] => {
                let nested = self
                    .outputs
                    .get_mut(*parent)
                    .and_then(|o| o.nested.as_mut())
                    .ok_or_else(|| WorkflowError::NodeNotFound(parent.to_string()))?;
                nested.supply_nested(rest, output)
            }
        }
    }

    /// Build the request that continues this run.
    ///
    /// Requested nodes are the blocked and still-paused ones; every other
    /// known output is precomputed. Still-paused nodes get their stored
    /// output back as `previous` so nested nodes can resume inside.
    pub fn resume_request(&self, input: HashMap<String, Value>) -> RunRequest {
        let mut precomputed_outputs = HashMap::new();
        let mut previous_outputs = HashMap::new();
        for (node_id, output) in &self.outputs {
            if self.paused.contains(node_id) {
                if output.nested.is_some() {
                    previous_outputs.insert(node_id.clone(), output.clone());
                }
            } else {
                precomputed_outputs.insert(node_id.clone(), output.clone());
            }
        }

        // Failed and skipped nodes are never targeted again.
        let node_ids = self.paused.iter().chain(self.blocked.iter()).cloned().collect();

        RunRequest {
            input,
            initial_inputs: HashMap::new(),
            node_ids: Some(node_ids),
            precomputed_outputs,
            previous_outputs,
        }
    }
}

/// Seam through which subworkflow and loop nodes run nested definitions
#[async_trait]
pub trait WorkflowRunner: Send + Sync {
    async fn run_workflow(
        &self,
        definition: &WorkflowDefinition,
        request: RunRequest,
        recorder: Arc<dyn TaskRecorder>,
    ) -> Result<RunReport, FlowError>;
}

/// Runner for contexts that cannot execute nested workflows
pub struct DetachedRunner;

#[async_trait]
impl WorkflowRunner for DetachedRunner {
    async fn run_workflow(
        &self,
        definition: &WorkflowDefinition,
        _request: RunRequest,
        _recorder: Arc<dyn TaskRecorder>,
    ) -> Result<RunReport, FlowError> {
        Err(FlowError::Execution(format!(
            "no workflow runner available for nested workflow '{}'",
            definition.name
        )))
    }
}
