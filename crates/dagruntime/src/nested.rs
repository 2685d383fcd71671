use crate::executor::WorkflowExecutor;
use crate::registry::NodeRegistry;
use async_trait::async_trait;
use dagcore::{EventBus, FlowError, RunReport, RunRequest, TaskRecorder, WorkflowDefinition, WorkflowRunner};
use std::sync::Arc;

/// Runs nested definitions for subworkflow and loop nodes with a fresh
/// executor over the same registry and event bus.
pub struct NestedRunner {
    registry: Arc<NodeRegistry>,
    event_bus: Arc<EventBus>,
}

impl NestedRunner {
    pub fn new(registry: Arc<NodeRegistry>, event_bus: Arc<EventBus>) -> Self {
        Self {
            registry,
            event_bus,
        }
    }
}

#[async_trait]
impl WorkflowRunner for NestedRunner {
    async fn run_workflow(
        &self,
        definition: &WorkflowDefinition,
        request: RunRequest,
        recorder: Arc<dyn TaskRecorder>,
    ) -> Result<RunReport, FlowError> {
        tracing::debug!("Running nested workflow '{}'", definition.name);
        let executor = WorkflowExecutor::new(definition.clone(), self.registry.clone())?
            .with_recorder(recorder)
            .with_event_bus(self.event_bus.clone());
        executor.run(request).await
    }
}
