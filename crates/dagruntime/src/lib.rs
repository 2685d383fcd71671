//! Workflow execution runtime
//!
//! This crate provides the execution engine that runs workflows: dependency
//! graphs, per-run task memoization, the concurrent executor with its
//! pause/resume protocol, the node registry and nested-workflow runner.

mod executor;
mod graph;
mod memo;
mod nested;
mod registry;
mod runtime;

pub use executor::WorkflowExecutor;
pub use graph::DependencyGraph;
pub use memo::{TaskHandle, TaskMemo};
pub use nested::NestedRunner;
pub use registry::{NodeFactory, NodeRegistry, NodeTypeMetadata};
pub use runtime::{FlowRuntime, RuntimeConfig};
