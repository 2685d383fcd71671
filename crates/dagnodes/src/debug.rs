use async_trait::async_trait;
use dagcore::{
    Node, NodeContext, NodeError, NodeOutcome, NodeOutput, NodeSpec, PortDefinition, ValueKind,
};
use dagruntime::{NodeFactory, NodeTypeMetadata};

pub const DEBUG_NODE_TYPE: &str = "debug.log";

/// Logs its inputs and forwards `message`
pub struct DebugNode {
    fields: Vec<PortDefinition>,
}

impl DebugNode {
    pub fn new(fields: Vec<PortDefinition>) -> Self {
        Self { fields }
    }
}

#[async_trait]
impl Node for DebugNode {
    fn node_type(&self) -> &str {
        DEBUG_NODE_TYPE
    }

    fn input_fields(&self) -> Vec<PortDefinition> {
        let mut fields = vec![PortDefinition::optional("message", ValueKind::Any)];
        fields.extend(self.fields.iter().filter(|f| f.name != "message").cloned());
        fields
    }

    fn output_fields(&self) -> Vec<PortDefinition> {
        vec![PortDefinition::required("message", ValueKind::String)]
    }

    async fn execute(&self, ctx: NodeContext) -> Result<NodeOutcome, NodeError> {
        let message = ctx
            .inputs
            .get("message")
            .map(|v| v.to_display_string())
            .unwrap_or_else(|| "(no message)".to_string());

        ctx.events.info(format!("DEBUG: {}", message));
        tracing::info!(node = %ctx.node_id, "{}", message);

        let mut keys: Vec<_> = ctx.inputs.keys().collect();
        keys.sort();
        for key in keys {
            ctx.events.info(format!("  {}: {:?}", key, ctx.inputs[key]));
        }

        Ok(NodeOutput::new().with_output("message", message).into())
    }
}

pub struct DebugNodeFactory;

impl NodeFactory for DebugNodeFactory {
    fn create(&self, spec: &NodeSpec) -> Result<Box<dyn Node>, NodeError> {
        let fields = PortDefinition::from_config_table(&spec.config, "fields")?;
        Ok(Box::new(DebugNode::new(fields)))
    }

    fn node_type(&self) -> &str {
        DEBUG_NODE_TYPE
    }

    fn metadata(&self) -> NodeTypeMetadata {
        NodeTypeMetadata {
            description: "Logs input values for debugging".to_string(),
            category: "debug".to_string(),
        }
    }
}
