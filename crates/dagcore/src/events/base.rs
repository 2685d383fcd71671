use crate::recorder::{TaskRecorder, TaskStatus, TaskUpdate};
use crate::run::{RunId, RunOutcome};
use crate::{NodeId, Value};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Events emitted during workflow execution
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ExecutionEvent {
    RunStarted {
        run_id: RunId,
        workflow: String,
        timestamp: DateTime<Utc>,
    },
    RunFinished {
        run_id: RunId,
        outcome: RunOutcome,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
    TaskCreated {
        node_id: NodeId,
        inputs: HashMap<String, Value>,
        timestamp: DateTime<Utc>,
    },
    TaskUpdated {
        node_id: NodeId,
        status: TaskStatus,
        error: Option<String>,
        timestamp: DateTime<Utc>,
    },
    NodeEvent {
        run_id: RunId,
        node_id: NodeId,
        event: NodeEvent,
        timestamp: DateTime<Utc>,
    },
}

/// Events specific to node execution
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type")]
pub enum NodeEvent {
    Info { message: String },
    Warning { message: String },
    Progress { percent: f64, message: Option<String> },
}

/// Event emitter for nodes to send real-time updates
#[derive(Clone)]
pub struct EventEmitter {
    run_id: RunId,
    node_id: NodeId,
    sender: broadcast::Sender<ExecutionEvent>,
}

impl EventEmitter {
    pub fn new(run_id: RunId, node_id: NodeId, sender: broadcast::Sender<ExecutionEvent>) -> Self {
        Self {
            run_id,
            node_id,
            sender,
        }
    }

    /// Emitter with no subscribers; every event is dropped
    pub fn detached(run_id: RunId, node_id: NodeId) -> Self {
        let (sender, _) = broadcast::channel(1);
        Self::new(run_id, node_id, sender)
    }

    /// Emit a node-specific event
    pub fn emit(&self, event: NodeEvent) {
        let _ = self.sender.send(ExecutionEvent::NodeEvent {
            run_id: self.run_id,
            node_id: self.node_id.clone(),
            event,
            timestamp: Utc::now(),
        });
    }

    pub fn info(&self, message: impl Into<String>) {
        self.emit(NodeEvent::Info {
            message: message.into(),
        });
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.emit(NodeEvent::Warning {
            message: message.into(),
        });
    }

    pub fn progress(&self, percent: f64, message: Option<String>) {
        self.emit(NodeEvent::Progress { percent, message });
    }
}

/// Broadcast bus for execution events
pub struct EventBus {
    sender: broadcast::Sender<ExecutionEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: ExecutionEvent) {
        let _ = self.sender.send(event);
    }

    pub fn create_emitter(&self, run_id: RunId, node_id: NodeId) -> EventEmitter {
        EventEmitter::new(run_id, node_id, self.sender.clone())
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1000)
    }
}

/// Publishes task lifecycle calls onto an [`EventBus`], optionally
/// forwarding them to another recorder as well.
pub struct EventBusRecorder {
    bus: Arc<EventBus>,
    inner: Option<Arc<dyn TaskRecorder>>,
}

impl EventBusRecorder {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self { bus, inner: None }
    }

    pub fn forwarding_to(mut self, inner: Arc<dyn TaskRecorder>) -> Self {
        self.inner = Some(inner);
        self
    }
}

#[async_trait]
impl TaskRecorder for EventBusRecorder {
    async fn create_task(&self, node_id: &str, inputs: &HashMap<String, Value>) {
        self.bus.emit(ExecutionEvent::TaskCreated {
            node_id: node_id.to_string(),
            inputs: inputs.clone(),
            timestamp: Utc::now(),
        });
        if let Some(inner) = &self.inner {
            inner.create_task(node_id, inputs).await;
        }
    }

    async fn update_task(&self, update: TaskUpdate) {
        self.bus.emit(ExecutionEvent::TaskUpdated {
            node_id: update.node_id.clone(),
            status: update.status,
            error: update.error.clone(),
            timestamp: update.end_time.unwrap_or_else(Utc::now),
        });
        if let Some(inner) = &self.inner {
            inner.update_task(update).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::InMemoryRecorder;

    #[tokio::test]
    async fn recorder_publishes_and_forwards() {
        let bus = Arc::new(EventBus::new(16));
        let mut events = bus.subscribe();
        let memory = Arc::new(InMemoryRecorder::new());
        let recorder = EventBusRecorder::new(bus.clone()).forwarding_to(memory.clone());

        recorder
            .update_task(TaskUpdate::new("a", TaskStatus::Paused))
            .await;

        match events.recv().await.unwrap() {
            ExecutionEvent::TaskUpdated { node_id, status, .. } => {
                assert_eq!(node_id, "a");
                assert_eq!(status, TaskStatus::Paused);
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert_eq!(memory.get("a").await.unwrap().status, TaskStatus::Paused);
    }
}
