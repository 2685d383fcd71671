//! Core abstractions for the dag engine
//!
//! This crate provides the fundamental types and traits that all other
//! components depend on: the value model, workflow definitions, the node
//! contract, run requests/reports and the task recorder seam.

mod error;
pub mod events;
mod node;
pub mod recorder;
pub mod run;
mod value;
mod workflow;

pub use error::{FlowError, NodeError, WorkflowError};
pub use events::{EventBus, EventBusRecorder, EventEmitter, ExecutionEvent, NodeEvent};
pub use node::{Node, NodeContext, NodeMetadata, NodeOutcome, NodeOutput, PortDefinition};
pub use recorder::{InMemoryRecorder, NoopRecorder, ScopedRecorder, TaskRecorder, TaskStatus, TaskUpdate};
pub use run::{
    DetachedRunner, NodeFailure, NodeStatus, RunId, RunOutcome, RunReport, RunRequest, RunSnapshot,
    WorkflowRunner,
};
pub use value::{Value, ValueKind};
pub use workflow::{
    Link, NodeId, NodeSpec, WorkflowDefinition, INPUT_NODE_TYPE, OUTPUT_NODE_TYPE, RELAY_NODE_TYPE,
};

/// Result type for flow operations
pub type Result<T> = std::result::Result<T, FlowError>;
