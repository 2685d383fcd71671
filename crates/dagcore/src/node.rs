use crate::events::EventEmitter;
use crate::recorder::{NoopRecorder, TaskRecorder};
use crate::run::{DetachedRunner, RunSnapshot, WorkflowRunner};
use crate::{NodeError, NodeId, Value, ValueKind};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Core trait that all executable nodes implement
#[async_trait]
pub trait Node: Send + Sync {
    /// Unique type identifier (e.g., "core.input", "logic.conditional")
    fn node_type(&self) -> &str;

    /// Declared input fields. Links may only target these names.
    fn input_fields(&self) -> Vec<PortDefinition>;

    /// Declared output fields. A run may populate any subset of them.
    fn output_fields(&self) -> Vec<PortDefinition>;

    /// Execute the node with given context
    ///
    /// `Err` is a node-local failure; pausing is an ordinary
    /// [`NodeOutcome::Paused`] return.
    async fn execute(&self, ctx: NodeContext) -> Result<NodeOutcome, NodeError>;
}

/// A declared input or output field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortDefinition {
    pub name: String,
    pub kind: ValueKind,
    pub required: bool,
    #[serde(default)]
    pub description: String,
}

impl PortDefinition {
    pub fn required(name: impl Into<String>, kind: ValueKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: true,
            description: String::new(),
        }
    }

    pub fn optional(name: impl Into<String>, kind: ValueKind) -> Self {
        Self {
            required: false,
            ..Self::required(name, kind)
        }
    }

    /// Parse a `name -> kind` table from node config.
    ///
    /// Entries are either a kind name (`"number"`) or an object
    /// `{ "kind": "number", "required": false, "description": "..." }`.
    /// A missing table yields no fields. Ports are sorted by name.
    pub fn from_config_table(
        config: &HashMap<String, Value>,
        key: &str,
    ) -> Result<Vec<PortDefinition>, NodeError> {
        let Some(table) = config.get(key) else {
            return Ok(Vec::new());
        };
        let table = table.as_object().ok_or_else(|| {
            NodeError::Configuration(format!("'{}' must be an object of field kinds", key))
        })?;

        let mut ports = Vec::with_capacity(table.len());
        for (name, entry) in table {
            let port = match entry {
                Value::String(kind) => {
                    PortDefinition::required(name.clone(), parse_kind(name, kind)?)
                }
                Value::Object(spec) => {
                    let kind = match spec.get("kind").and_then(|k| k.as_str()) {
                        Some(kind) => parse_kind(name, kind)?,
                        None => ValueKind::Any,
                    };
                    let required = spec.get("required").and_then(|r| r.as_bool()).unwrap_or(true);
                    let description = spec
                        .get("description")
                        .and_then(|d| d.as_str())
                        .unwrap_or_default()
                        .to_string();
                    PortDefinition {
                        name: name.clone(),
                        kind,
                        required,
                        description,
                    }
                }
                _ => {
                    return Err(NodeError::Configuration(format!(
                        "field '{}' must be a kind name or an object",
                        name
                    )))
                }
            };
            ports.push(port);
        }
        ports.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(ports)
    }
}

fn parse_kind(field: &str, kind: &str) -> Result<ValueKind, NodeError> {
    kind.parse()
        .map_err(|e| NodeError::Configuration(format!("field '{}': {}", field, e)))
}

/// Execution context passed to each node
#[derive(Clone)]
pub struct NodeContext {
    pub node_id: NodeId,

    /// Run this invocation belongs to
    pub run_id: Uuid,

    /// Input values synthesized from links and initial inputs
    pub inputs: HashMap<String, Value>,

    /// Static configuration for this node
    pub config: HashMap<String, Value>,

    /// Output stored for this node by an earlier run, handed back when a
    /// nested node is resumed so it can continue instead of restarting.
    pub previous: Option<NodeOutput>,

    /// Recorder of the enclosing run, reused by nested runs
    pub recorder: Arc<dyn TaskRecorder>,

    /// Entry point for nested workflow execution
    pub runner: Arc<dyn WorkflowRunner>,

    /// Event emitter for real-time updates
    pub events: EventEmitter,
}

impl NodeContext {
    /// Standalone context with no recorder and no nested runner, for
    /// driving a node directly.
    pub fn new(node_id: impl Into<NodeId>, inputs: HashMap<String, Value>) -> Self {
        let node_id = node_id.into();
        let run_id = Uuid::new_v4();
        Self {
            events: EventEmitter::detached(run_id, node_id.clone()),
            node_id,
            run_id,
            inputs,
            config: HashMap::new(),
            previous: None,
            recorder: Arc::new(NoopRecorder),
            runner: Arc::new(DetachedRunner),
        }
    }

    pub fn with_runner(mut self, runner: Arc<dyn WorkflowRunner>) -> Self {
        self.runner = runner;
        self
    }

    /// Get required input or return error
    pub fn require_input(&self, name: &str) -> Result<&Value, NodeError> {
        self.inputs
            .get(name)
            .ok_or_else(|| NodeError::MissingInput(name.to_string()))
    }
}

/// Successful result of [`Node::execute`]
#[derive(Debug, Clone, PartialEq)]
pub enum NodeOutcome {
    Completed(NodeOutput),
    /// Execution cannot proceed without external input. `partial` is what
    /// the node can report right away and may be empty.
    Paused { reason: String, partial: NodeOutput },
}

impl NodeOutcome {
    pub fn paused(reason: impl Into<String>, partial: NodeOutput) -> Self {
        NodeOutcome::Paused {
            reason: reason.into(),
            partial,
        }
    }
}

impl From<NodeOutput> for NodeOutcome {
    fn from(output: NodeOutput) -> Self {
        NodeOutcome::Completed(output)
    }
}

/// Output from node execution
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeOutput {
    /// Populated output fields. Fields a node did not populate are absent.
    pub outputs: HashMap<String, Value>,

    /// Execution metadata
    #[serde(default)]
    pub metadata: NodeMetadata,

    /// Inner run state of a subworkflow or loop node
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nested: Option<RunSnapshot>,
}

impl NodeOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_fields(outputs: HashMap<String, Value>) -> Self {
        Self {
            outputs,
            ..Self::default()
        }
    }

    pub fn with_output(mut self, port: impl Into<String>, value: impl Into<Value>) -> Self {
        self.outputs.insert(port.into(), value.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.custom.insert(key.into(), value.into());
        self
    }

    pub fn with_nested(mut self, nested: RunSnapshot) -> Self {
        self.nested = Some(nested);
        self
    }

    pub fn get(&self, port: &str) -> Option<&Value> {
        self.outputs.get(port)
    }
}

/// Metadata about node execution
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeMetadata {
    #[serde(default)]
    pub execution_time_ms: u64,
    #[serde(default)]
    pub custom: HashMap<String, Value>,
}
