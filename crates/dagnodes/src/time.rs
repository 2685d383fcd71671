use async_trait::async_trait;
use dagcore::{Node, NodeContext, NodeError, NodeOutcome, NodeOutput, NodeSpec, PortDefinition};
use dagruntime::{NodeFactory, NodeTypeMetadata};
use std::time::Instant;
use tokio::time::{sleep, Duration};

pub const DELAY_NODE_TYPE: &str = "time.delay";

/// Waits `delay_ms` then forwards its inputs
pub struct DelayNode {
    delay: Duration,
    fields: Vec<PortDefinition>,
}

impl DelayNode {
    pub fn new(delay: Duration, fields: Vec<PortDefinition>) -> Self {
        Self { delay, fields }
    }
}

#[async_trait]
impl Node for DelayNode {
    fn node_type(&self) -> &str {
        DELAY_NODE_TYPE
    }

    fn input_fields(&self) -> Vec<PortDefinition> {
        self.fields.clone()
    }

    fn output_fields(&self) -> Vec<PortDefinition> {
        self.fields.clone()
    }

    async fn execute(&self, ctx: NodeContext) -> Result<NodeOutcome, NodeError> {
        ctx.events
            .info(format!("Delaying for {}ms", self.delay.as_millis()));

        let started = Instant::now();
        sleep(self.delay).await;

        let mut output = NodeOutput::from_fields(ctx.inputs);
        output.metadata.execution_time_ms = started.elapsed().as_millis() as u64;
        Ok(output.into())
    }
}

pub struct DelayNodeFactory;

impl NodeFactory for DelayNodeFactory {
    fn create(&self, spec: &NodeSpec) -> Result<Box<dyn Node>, NodeError> {
        // Default to 1 second if not specified
        let delay_ms = match spec.config.get("delay_ms") {
            Some(value) => value.as_f64().filter(|ms| *ms >= 0.0).ok_or_else(|| {
                NodeError::Configuration("delay_ms must be a non-negative number".to_string())
            })?,
            None => 1000.0,
        };
        let fields = PortDefinition::from_config_table(&spec.config, "fields")?;
        Ok(Box::new(DelayNode::new(
            Duration::from_millis(delay_ms as u64),
            fields,
        )))
    }

    fn node_type(&self) -> &str {
        DELAY_NODE_TYPE
    }

    fn metadata(&self) -> NodeTypeMetadata {
        NodeTypeMetadata {
            description: "Delay execution for specified milliseconds".to_string(),
            category: "time".to_string(),
        }
    }
}
