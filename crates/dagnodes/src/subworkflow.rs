//! Runs an embedded workflow definition as a single node.

use async_trait::async_trait;
use dagcore::{
    Node, NodeContext, NodeError, NodeOutcome, NodeOutput, NodeSpec, PortDefinition,
    RunOutcome, RunReport, RunRequest, ScopedRecorder, Value, WorkflowDefinition,
};
use dagruntime::{NodeFactory, NodeTypeMetadata};
use std::collections::HashMap;
use std::sync::Arc;

pub const SUBWORKFLOW_NODE_TYPE: &str = "core.subworkflow";

/// Executes `body` with the node's inputs as the nested run input.
///
/// `input_map` renames outer input fields to the nested input node's fields
/// (`outer -> inner`); unmapped fields keep their name. The node's outputs
/// are the nested output node's outputs. Inner tasks are recorded on the
/// enclosing recorder under `<node id>/<inner id>`.
pub struct SubworkflowNode {
    body: WorkflowDefinition,
    input_map: HashMap<String, String>,
    inputs: Vec<PortDefinition>,
    outputs: Vec<PortDefinition>,
}

impl SubworkflowNode {
    pub fn new(body: WorkflowDefinition, input_map: HashMap<String, String>) -> Result<Self, NodeError> {
        body.validate_structure()
            .map_err(|e| NodeError::Configuration(format!("invalid subworkflow: {}", e)))?;

        let inner_inputs = match body.input_node() {
            Some(node) => PortDefinition::from_config_table(&node.config, "fields")?,
            None => Vec::new(),
        };
        let inputs = inner_inputs
            .into_iter()
            .map(|mut port| {
                if let Some((outer, _)) = input_map.iter().find(|(_, inner)| **inner == port.name) {
                    port.name = outer.clone();
                }
                port
            })
            .collect();
        let outputs = match body.output_node() {
            Some(node) => PortDefinition::from_config_table(&node.config, "fields")?,
            None => Vec::new(),
        };

        Ok(Self {
            body,
            input_map,
            inputs,
            outputs,
        })
    }

    fn nested_input(&self, inputs: HashMap<String, Value>) -> HashMap<String, Value> {
        inputs
            .into_iter()
            .map(|(field, value)| {
                let field = self.input_map.get(&field).cloned().unwrap_or(field);
                (field, value)
            })
            .collect()
    }
}

#[async_trait]
impl Node for SubworkflowNode {
    fn node_type(&self) -> &str {
        SUBWORKFLOW_NODE_TYPE
    }

    fn input_fields(&self) -> Vec<PortDefinition> {
        self.inputs.clone()
    }

    fn output_fields(&self) -> Vec<PortDefinition> {
        self.outputs.clone()
    }

    async fn execute(&self, ctx: NodeContext) -> Result<NodeOutcome, NodeError> {
        let input = self.nested_input(ctx.inputs);
        let request = match ctx.previous.and_then(|p| p.nested) {
            Some(snapshot) => {
                ctx.events.info("Resuming nested workflow");
                snapshot.resume_request(input)
            }
            None => RunRequest::new(input),
        };

        let recorder = Arc::new(ScopedRecorder::new(ctx.recorder.clone(), &ctx.node_id));
        let report = ctx
            .runner
            .run_workflow(&self.body, request, recorder)
            .await
            .map_err(|e| NodeError::ExecutionFailed(e.to_string()))?;

        let output_id = self.body.output_node().map(|n| n.id.clone());
        nested_outcome(&report, output_id.as_deref()).map(|outcome| match outcome {
            NestedOutcome::Paused(partial) => {
                NodeOutcome::paused(pause_reason(&report), partial)
            }
            NestedOutcome::Completed(output) => NodeOutcome::Completed(output),
        })
    }
}

pub(crate) enum NestedOutcome {
    Completed(NodeOutput),
    Paused(NodeOutput),
}

/// Fold a nested run report into what the enclosing node reports.
///
/// Both variants carry the nested snapshot so the enclosing node can be
/// resumed or re-run without repeating finished inner work.
pub(crate) fn nested_outcome(
    report: &RunReport,
    result_node: Option<&str>,
) -> Result<NestedOutcome, NodeError> {
    match report.outcome {
        RunOutcome::Paused => Ok(NestedOutcome::Paused(
            NodeOutput::new().with_nested(report.snapshot()),
        )),
        RunOutcome::Failed => {
            let detail = report
                .failures
                .first()
                .map(|f| format!("nested node {} failed: {}", f.node_id, f.error))
                .unwrap_or_else(|| "nested workflow failed".to_string());
            Err(NodeError::ExecutionFailed(detail))
        }
        RunOutcome::Completed => {
            let outputs = result_node
                .and_then(|id| report.output(id))
                .map(|o| o.outputs.clone())
                .unwrap_or_default();
            Ok(NestedOutcome::Completed(
                NodeOutput::from_fields(outputs).with_nested(report.snapshot()),
            ))
        }
    }
}

pub(crate) fn pause_reason(report: &RunReport) -> String {
    let ids: Vec<&str> = report.paused.keys().map(String::as_str).collect();
    format!("nested workflow paused at {}", ids.join(", "))
}

pub(crate) fn nested_body(spec: &NodeSpec) -> Result<WorkflowDefinition, NodeError> {
    spec.subworkflow
        .as_deref()
        .cloned()
        .ok_or_else(|| {
            NodeError::Configuration(format!("node '{}' requires a nested workflow", spec.id))
        })
}

pub struct SubworkflowNodeFactory;

impl NodeFactory for SubworkflowNodeFactory {
    fn create(&self, spec: &NodeSpec) -> Result<Box<dyn Node>, NodeError> {
        let body = nested_body(spec)?;
        let mut input_map = HashMap::new();
        if let Some(table) = spec.config.get("input_map") {
            let table = table.as_object().ok_or_else(|| {
                NodeError::Configuration("input_map must map outer fields to inner fields".to_string())
            })?;
            for (outer, inner) in table {
                let inner = inner.as_str().ok_or_else(|| {
                    NodeError::Configuration(format!("input_map entry '{}' must be a string", outer))
                })?;
                input_map.insert(outer.clone(), inner.to_string());
            }
        }
        Ok(Box::new(SubworkflowNode::new(body, input_map)?))
    }

    fn node_type(&self) -> &str {
        SUBWORKFLOW_NODE_TYPE
    }

    fn metadata(&self) -> NodeTypeMetadata {
        NodeTypeMetadata {
            description: "Runs a nested workflow as one node".to_string(),
            category: "core".to_string(),
        }
    }
}
