use crate::{registry::NodeRegistry, WorkflowExecutor};
use dagcore::{
    EventBus, EventBusRecorder, ExecutionEvent, FlowError, NoopRecorder, RunReport, RunRequest,
    RunSnapshot, TaskRecorder, Value, WorkflowDefinition, WorkflowError,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Main runtime: owns the registry, the event bus and validated workflows
pub struct FlowRuntime {
    registry: Arc<NodeRegistry>,
    event_bus: Arc<EventBus>,
    recorder: Arc<dyn TaskRecorder>,
    workflows: Arc<RwLock<HashMap<String, Arc<WorkflowExecutor>>>>,
}

impl FlowRuntime {
    /// Create a new runtime with a pre-configured registry
    pub fn with_registry(registry: Arc<NodeRegistry>, config: RuntimeConfig) -> Self {
        let event_bus = Arc::new(EventBus::new(config.event_buffer_size));
        let recorder: Arc<dyn TaskRecorder> = Arc::new(NoopRecorder);

        Self {
            registry,
            event_bus,
            recorder,
            workflows: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Also forward task lifecycle calls to `recorder` (task events are
    /// always published on the event bus)
    pub fn with_recorder(mut self, recorder: Arc<dyn TaskRecorder>) -> Self {
        self.recorder = recorder;
        self
    }

    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    /// Validate a definition and build its executor
    pub fn executor(&self, workflow: WorkflowDefinition) -> Result<WorkflowExecutor, WorkflowError> {
        let recorder = EventBusRecorder::new(self.event_bus.clone()).forwarding_to(self.recorder.clone());
        Ok(WorkflowExecutor::new(workflow, self.registry.clone())?
            .with_recorder(Arc::new(recorder))
            .with_event_bus(self.event_bus.clone()))
    }

    /// Validate and register a workflow under its name
    pub async fn register_workflow(&self, workflow: WorkflowDefinition) -> Result<(), WorkflowError> {
        let name = workflow.name.clone();
        let executor = self.executor(workflow)?;
        tracing::info!("Registered workflow '{}'", name);
        self.workflows.write().await.insert(name, Arc::new(executor));
        Ok(())
    }

    async fn registered(&self, name: &str) -> Result<Arc<WorkflowExecutor>, FlowError> {
        self.workflows
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| FlowError::Workflow(WorkflowError::NotFound(name.to_string())))
    }

    /// Run a registered workflow by name
    pub async fn run_workflow(&self, name: &str, request: RunRequest) -> Result<RunReport, FlowError> {
        let executor = self.registered(name).await?;
        executor.run(request).await
    }

    /// Resume a registered workflow from a snapshot
    pub async fn resume_workflow(
        &self,
        name: &str,
        snapshot: &RunSnapshot,
        input: HashMap<String, Value>,
    ) -> Result<RunReport, FlowError> {
        let executor = self.registered(name).await?;
        executor.resume(snapshot, input).await
    }

    /// Execute a workflow directly (without registration)
    pub async fn execute(
        &self,
        workflow: WorkflowDefinition,
        request: RunRequest,
    ) -> Result<RunReport, FlowError> {
        self.executor(workflow)?.run(request).await
    }

    /// Subscribe to execution events
    pub fn subscribe_events(&self) -> tokio::sync::broadcast::Receiver<ExecutionEvent> {
        self.event_bus.subscribe()
    }

    /// Get the event bus for direct access
    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }
}

/// Configuration for the runtime
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub event_buffer_size: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            event_buffer_size: 1000,
        }
    }
}
