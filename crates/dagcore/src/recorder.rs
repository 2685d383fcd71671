//! Task lifecycle recording.
//!
//! The engine reports every node's lifecycle to a [`TaskRecorder`] and never
//! reads it back. Persistence lives behind this trait.

use crate::{NodeId, Value};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Paused,
    Canceled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskUpdate {
    pub node_id: NodeId,
    pub status: TaskStatus,
    pub outputs: Option<HashMap<String, Value>>,
    pub error: Option<String>,
    pub end_time: Option<DateTime<Utc>>,
}

impl TaskUpdate {
    pub fn new(node_id: impl Into<NodeId>, status: TaskStatus) -> Self {
        Self {
            node_id: node_id.into(),
            status,
            outputs: None,
            error: None,
            end_time: None,
        }
    }

    pub fn with_outputs(mut self, outputs: HashMap<String, Value>) -> Self {
        self.outputs = Some(outputs);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn finished(mut self) -> Self {
        self.end_time = Some(Utc::now());
        self
    }
}

/// Sink for per-node lifecycle events.
///
/// Called concurrently from every node task of a run; implementations
/// serialize their own writes.
#[async_trait]
pub trait TaskRecorder: Send + Sync {
    async fn create_task(&self, node_id: &str, inputs: &HashMap<String, Value>);

    async fn update_task(&self, update: TaskUpdate);
}

/// Recorder that drops everything
pub struct NoopRecorder;

#[async_trait]
impl TaskRecorder for NoopRecorder {
    async fn create_task(&self, _node_id: &str, _inputs: &HashMap<String, Value>) {}

    async fn update_task(&self, _update: TaskUpdate) {}
}

/// One task as seen by [`InMemoryRecorder`]
#[derive(Debug, Clone, PartialEq)]
pub struct TaskRecord {
    pub node_id: NodeId,
    pub inputs: HashMap<String, Value>,
    pub status: TaskStatus,
    /// Every status the task went through, in order
    pub history: Vec<TaskStatus>,
    pub outputs: Option<HashMap<String, Value>>,
    pub error: Option<String>,
    pub end_time: Option<DateTime<Utc>>,
}

impl TaskRecord {
    fn new(node_id: &str) -> Self {
        Self {
            node_id: node_id.to_string(),
            inputs: HashMap::new(),
            status: TaskStatus::Pending,
            history: Vec::new(),
            outputs: None,
            error: None,
            end_time: None,
        }
    }
}

/// Recorder that keeps task records in memory, keyed by node id
#[derive(Default)]
pub struct InMemoryRecorder {
    tasks: Mutex<HashMap<NodeId, TaskRecord>>,
}

impl InMemoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, node_id: &str) -> Option<TaskRecord> {
        self.tasks.lock().await.get(node_id).cloned()
    }

    pub async fn records(&self) -> Vec<TaskRecord> {
        let mut records: Vec<_> = self.tasks.lock().await.values().cloned().collect();
        records.sort_by(|a, b| a.node_id.cmp(&b.node_id));
        records
    }

    /// How many times `node_id` entered `Running`
    pub async fn start_count(&self, node_id: &str) -> usize {
        self.tasks
            .lock()
            .await
            .get(node_id)
            .map(|r| r.history.iter().filter(|s| **s == TaskStatus::Running).count())
            .unwrap_or(0)
    }
}

#[async_trait]
impl TaskRecorder for InMemoryRecorder {
    async fn create_task(&self, node_id: &str, inputs: &HashMap<String, Value>) {
        let mut tasks = self.tasks.lock().await;
        let record = tasks
            .entry(node_id.to_string())
            .or_insert_with(|| TaskRecord::new(node_id));
        record.inputs = inputs.clone();
    }

    async fn update_task(&self, update: TaskUpdate) {
        let mut tasks = self.tasks.lock().await;
        let record = tasks
            .entry(update.node_id.clone())
            .or_insert_with(|| TaskRecord::new(&update.node_id));
        record.status = update.status;
        record.history.push(update.status);
        if update.outputs.is_some() {
            record.outputs = update.outputs;
        }
        if update.error.is_some() {
            record.error = update.error;
        }
        if update.end_time.is_some() {
            record.end_time = update.end_time;
        }
    }
}

/// Forwards to a parent recorder with node ids prefixed by the enclosing
/// node id (`parent/child`), so nested runs keep their lineage.
pub struct ScopedRecorder {
    parent: Arc<dyn TaskRecorder>,
    prefix: String,
}

impl ScopedRecorder {
    pub fn new(parent: Arc<dyn TaskRecorder>, scope: &str) -> Self {
        Self {
            parent,
            prefix: format!("{}/", scope),
        }
    }

    fn scoped(&self, node_id: &str) -> String {
        format!("{}{}", self.prefix, node_id)
    }
}

#[async_trait]
impl TaskRecorder for ScopedRecorder {
    async fn create_task(&self, node_id: &str, inputs: &HashMap<String, Value>) {
        self.parent.create_task(&self.scoped(node_id), inputs).await;
    }

    async fn update_task(&self, mut update: TaskUpdate) {
        update.node_id = self.scoped(&update.node_id);
        self.parent.update_task(update).await;
    }
}
