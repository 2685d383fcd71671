//! Standard node library
//!
//! Collection of built-in nodes: workflow entry/exit, branching, human
//! intervention, nested workflows and loops.

mod conditional;
mod debug;
mod human;
mod looping;
mod passthrough;
mod subworkflow;
mod time;

pub use conditional::{
    evaluate_conditions, Branch, Condition, ConditionalNode, LogicalOperator, Operator,
    CONDITIONAL_NODE_TYPE,
};
pub use debug::{DebugNode, DEBUG_NODE_TYPE};
pub use human::{HumanInterventionNode, HUMAN_NODE_TYPE};
pub use looping::{
    ContinueWhile, LoopArena, LoopNode, StoppingCondition, UntilMaxIterations, LOOP_NODE_TYPE,
};
pub use passthrough::PassthroughNode;
pub use subworkflow::{SubworkflowNode, SUBWORKFLOW_NODE_TYPE};
pub use time::{DelayNode, DELAY_NODE_TYPE};
use dagruntime::NodeRegistry;

use std::sync::Arc;

/// Register all standard nodes with a registry
pub fn register_all(registry: &mut NodeRegistry) {
    registry.register(Arc::new(passthrough::PassthroughNodeFactory::input()));
    registry.register(Arc::new(passthrough::PassthroughNodeFactory::output()));
    registry.register(Arc::new(passthrough::PassthroughNodeFactory::relay()));
    registry.register(Arc::new(conditional::ConditionalNodeFactory));
    registry.register(Arc::new(human::HumanInterventionNodeFactory));
    registry.register(Arc::new(subworkflow::SubworkflowNodeFactory));
    registry.register(Arc::new(looping::LoopNodeFactory));
    registry.register(Arc::new(debug::DebugNodeFactory));
    registry.register(Arc::new(time::DelayNodeFactory));
}

/// Registry holding every standard node
pub fn standard_registry() -> NodeRegistry {
    let mut registry = NodeRegistry::new();
    register_all(&mut registry);
    registry
}
