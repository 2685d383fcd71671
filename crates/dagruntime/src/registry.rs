use dagcore::{Node, NodeError, NodeSpec, WorkflowError};
use std::collections::HashMap;
use std::sync::Arc;

/// Factory trait for creating node instances
pub trait NodeFactory: Send + Sync {
    /// Create a new instance of the node for the given spec
    fn create(&self, spec: &NodeSpec) -> Result<Box<dyn Node>, NodeError>;

    /// Get node type identifier
    fn node_type(&self) -> &str;

    /// Optional: Get node type metadata (description, category)
    fn metadata(&self) -> NodeTypeMetadata {
        NodeTypeMetadata::default()
    }
}

/// Metadata about a node type
#[derive(Debug, Clone)]
pub struct NodeTypeMetadata {
    pub description: String,
    pub category: String,
}

impl Default for NodeTypeMetadata {
    fn default() -> Self {
        Self {
            description: String::new(),
            category: "general".to_string(),
        }
    }
}

/// Registry of available node types
///
/// Populated explicitly at startup; each node module contributes its
/// factories through a registration call.
pub struct NodeRegistry {
    factories: HashMap<String, Arc<dyn NodeFactory>>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a node factory
    pub fn register(&mut self, factory: Arc<dyn NodeFactory>) {
        let node_type = factory.node_type().to_string();
        tracing::debug!("Registering node type: {}", node_type);
        self.factories.insert(node_type, factory);
    }

    /// Create a node instance for a spec
    pub fn create_node(&self, spec: &NodeSpec) -> Result<Box<dyn Node>, WorkflowError> {
        let factory = self
            .factories
            .get(&spec.node_type)
            .ok_or_else(|| WorkflowError::UnknownNodeType(spec.node_type.clone()))?;

        factory.create(spec).map_err(|e| {
            WorkflowError::Invalid(format!("Failed to create node '{}': {}", spec.id, e))
        })
    }

    pub fn contains(&self, node_type: &str) -> bool {
        self.factories.contains_key(node_type)
    }

    /// Get all registered node types, sorted
    pub fn list_node_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.factories.keys().cloned().collect();
        types.sort();
        types
    }

    /// Get metadata for a node type
    pub fn get_metadata(&self, node_type: &str) -> Option<NodeTypeMetadata> {
        self.factories.get(node_type).map(|f| f.metadata())
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}
