use async_trait::async_trait;
use dagcore::{Node, NodeContext, NodeError, NodeOutcome, NodeOutput, NodeSpec, PortDefinition};
use dagruntime::{NodeFactory, NodeTypeMetadata};

pub const HUMAN_NODE_TYPE: &str = "human.intervention";

/// Always pauses, waiting for a person to supply its output.
///
/// The pause reason is the configured `message`. Its inputs are reported as
/// the partial output so a reviewer can see what they are approving. Once a
/// value is supplied through the run snapshot the node counts as done and is
/// never executed again.
pub struct HumanInterventionNode {
    message: String,
    inputs: Vec<PortDefinition>,
    outputs: Vec<PortDefinition>,
}

impl HumanInterventionNode {
    pub fn new(
        message: impl Into<String>,
        inputs: Vec<PortDefinition>,
        outputs: Vec<PortDefinition>,
    ) -> Self {
        Self {
            message: message.into(),
            inputs,
            outputs,
        }
    }
}

#[async_trait]
impl Node for HumanInterventionNode {
    fn node_type(&self) -> &str {
        HUMAN_NODE_TYPE
    }

    fn input_fields(&self) -> Vec<PortDefinition> {
        self.inputs.clone()
    }

    fn output_fields(&self) -> Vec<PortDefinition> {
        self.outputs.clone()
    }

    async fn execute(&self, ctx: NodeContext) -> Result<NodeOutcome, NodeError> {
        ctx.events.info(format!("Waiting for human input: {}", self.message));
        let partial = NodeOutput::from_fields(ctx.inputs).with_metadata("message", self.message.clone());
        Ok(NodeOutcome::paused(self.message.clone(), partial))
    }
}

pub struct HumanInterventionNodeFactory;

impl NodeFactory for HumanInterventionNodeFactory {
    fn create(&self, spec: &NodeSpec) -> Result<Box<dyn Node>, NodeError> {
        let message = spec
            .config
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("Human input required")
            .to_string();
        let inputs = PortDefinition::from_config_table(&spec.config, "fields")?;
        let outputs = if spec.config.contains_key("output_fields") {
            PortDefinition::from_config_table(&spec.config, "output_fields")?
        } else {
            inputs.clone()
        };
        Ok(Box::new(HumanInterventionNode::new(message, inputs, outputs)))
    }

    fn node_type(&self) -> &str {
        HUMAN_NODE_TYPE
    }

    fn metadata(&self) -> NodeTypeMetadata {
        NodeTypeMetadata {
            description: "Pauses the run until a person supplies its output".to_string(),
            category: "human".to_string(),
        }
    }
}
