use async_trait::async_trait;
use dagcore::{
    Node, NodeContext, NodeError, NodeOutcome, NodeOutput, NodeSpec, PortDefinition,
    INPUT_NODE_TYPE, OUTPUT_NODE_TYPE, RELAY_NODE_TYPE,
};
use dagruntime::{NodeFactory, NodeTypeMetadata};

/// Forwards its inputs unchanged. Backs the workflow entry (`core.input`),
/// exit (`core.output`) and loop stitching (`core.relay`) nodes.
///
/// Declared fields come from the `fields` config table and are the same on
/// both sides.
pub struct PassthroughNode {
    node_type: &'static str,
    fields: Vec<PortDefinition>,
}

impl PassthroughNode {
    pub fn new(node_type: &'static str, fields: Vec<PortDefinition>) -> Self {
        Self { node_type, fields }
    }
}

#[async_trait]
impl Node for PassthroughNode {
    fn node_type(&self) -> &str {
        self.node_type
    }

    fn input_fields(&self) -> Vec<PortDefinition> {
        self.fields.clone()
    }

    fn output_fields(&self) -> Vec<PortDefinition> {
        self.fields.clone()
    }

    async fn execute(&self, ctx: NodeContext) -> Result<NodeOutcome, NodeError> {
        Ok(NodeOutput::from_fields(ctx.inputs).into())
    }
}

pub struct PassthroughNodeFactory {
    node_type: &'static str,
    description: &'static str,
}

impl PassthroughNodeFactory {
    pub fn input() -> Self {
        Self {
            node_type: INPUT_NODE_TYPE,
            description: "Workflow entry point; receives the run input",
        }
    }

    pub fn output() -> Self {
        Self {
            node_type: OUTPUT_NODE_TYPE,
            description: "Workflow exit point; its output is the workflow result",
        }
    }

    pub fn relay() -> Self {
        Self {
            node_type: RELAY_NODE_TYPE,
            description: "Forwards values between workflow slices",
        }
    }
}

impl NodeFactory for PassthroughNodeFactory {
    fn create(&self, spec: &NodeSpec) -> Result<Box<dyn Node>, NodeError> {
        let fields = PortDefinition::from_config_table(&spec.config, "fields")?;
        Ok(Box::new(PassthroughNode::new(self.node_type, fields)))
    }

    fn node_type(&self) -> &str {
        self.node_type
    }

    fn metadata(&self) -> NodeTypeMetadata {
        NodeTypeMetadata {
            description: self.description.to_string(),
            category: "core".to_string(),
        }
    }
}
