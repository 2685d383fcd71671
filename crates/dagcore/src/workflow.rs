use crate::{Value, WorkflowError};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Node ids are stable, user-chosen strings unique within one definition.
pub type NodeId = String;

/// Node type of the single entry node every workflow carries
pub const INPUT_NODE_TYPE: &str = "core.input";
/// Node type of the optional exit node
pub const OUTPUT_NODE_TYPE: &str = "core.output";
/// Pass-through node used when stitching loop iterations together
pub const RELAY_NODE_TYPE: &str = "core.relay";

/// Complete workflow definition
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub nodes: Vec<NodeSpec>,
    #[serde(default)]
    pub links: Vec<Link>,
}

impl WorkflowDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            nodes: Vec::new(),
            links: Vec::new(),
        }
    }

    pub fn add_node(&mut self, node: NodeSpec) -> NodeId {
        let id = node.id.clone();
        self.nodes.push(node);
        id
    }

    /// Builder-style variant of [`add_node`](Self::add_node)
    pub fn with_node(mut self, node: NodeSpec) -> Self {
        self.nodes.push(node);
        self
    }

    pub fn connect(
        &mut self,
        source_id: impl Into<NodeId>,
        source_output_key: impl Into<String>,
        target_id: impl Into<NodeId>,
        target_input_key: impl Into<String>,
    ) {
        self.links.push(Link {
            source_id: source_id.into(),
            source_output_key: source_output_key.into(),
            target_id: target_id.into(),
            target_input_key: target_input_key.into(),
        });
    }

    /// Builder-style variant of [`connect`](Self::connect)
    pub fn with_link(
        mut self,
        source_id: impl Into<NodeId>,
        source_output_key: impl Into<String>,
        target_id: impl Into<NodeId>,
        target_input_key: impl Into<String>,
    ) -> Self {
        self.connect(source_id, source_output_key, target_id, target_input_key);
        self
    }

    pub fn find_node(&self, id: &str) -> Option<&NodeSpec> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn input_node(&self) -> Option<&NodeSpec> {
        self.nodes.iter().find(|n| n.node_type == INPUT_NODE_TYPE)
    }

    pub fn output_node(&self) -> Option<&NodeSpec> {
        self.nodes.iter().find(|n| n.node_type == OUTPUT_NODE_TYPE)
    }

    /// Links whose target is `node_id`, in declaration order
    pub fn incoming_links<'a>(&'a self, node_id: &'a str) -> impl Iterator<Item = &'a Link> + 'a {
        self.links.iter().filter(move |l| l.target_id == node_id)
    }

    /// Check the id-level invariants: unique ids, exactly one input node,
    /// at most one output node, and link endpoints that exist.
    ///
    /// Field names and kinds are checked later, once node instances exist.
    pub fn validate_structure(&self) -> Result<(), WorkflowError> {
        let mut seen = HashSet::new();
        for node in &self.nodes {
            if !seen.insert(node.id.as_str()) {
                return Err(WorkflowError::DuplicateNode(node.id.clone()));
            }
        }

        let inputs = self
            .nodes
            .iter()
            .filter(|n| n.node_type == INPUT_NODE_TYPE)
            .count();
        if inputs != 1 {
            return Err(WorkflowError::Invalid(format!(
                "workflow '{}' must have exactly one {} node, found {}",
                self.name, INPUT_NODE_TYPE, inputs
            )));
        }

        let outputs = self
            .nodes
            .iter()
            .filter(|n| n.node_type == OUTPUT_NODE_TYPE)
            .count();
        if outputs > 1 {
            return Err(WorkflowError::Invalid(format!(
                "workflow '{}' has {} {} nodes, at most one is allowed",
                self.name, outputs, OUTPUT_NODE_TYPE
            )));
        }

        for link in &self.links {
            if !seen.contains(link.source_id.as_str()) {
                return Err(WorkflowError::NodeNotFound(link.source_id.clone()));
            }
            if !seen.contains(link.target_id.as_str()) {
                return Err(WorkflowError::NodeNotFound(link.target_id.clone()));
            }
        }

        Ok(())
    }
}

/// Node specification in a workflow
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeSpec {
    pub id: NodeId,
    pub node_type: String,
    #[serde(default)]
    pub config: HashMap<String, Value>,
    /// Nested body for subworkflow and loop nodes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subworkflow: Option<Box<WorkflowDefinition>>,
}

impl NodeSpec {
    pub fn new(id: impl Into<NodeId>, node_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            node_type: node_type.into(),
            config: HashMap::new(),
            subworkflow: None,
        }
    }

    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    /// Declare the `fields` table (`name -> kind`) read by pass-through nodes
    pub fn with_fields<'a>(mut self, fields: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let table: HashMap<String, Value> = fields
            .into_iter()
            .map(|(name, kind)| (name.to_string(), Value::from(kind)))
            .collect();
        self.config.insert("fields".to_string(), Value::Object(table));
        self
    }

    pub fn with_subworkflow(mut self, body: WorkflowDefinition) -> Self {
        self.subworkflow = Some(Box::new(body));
        self
    }
}

/// Data dependency: the target's `target_input_key` field is bound to the
/// source's `source_output_key` field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Link {
    pub source_id: NodeId,
    pub source_output_key: String,
    pub target_id: NodeId,
    pub target_input_key: String,
}
