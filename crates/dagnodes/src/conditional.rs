//! Branching node.
//!
//! A conditional node declares N named output branches and populates exactly
//! one of them per execution. Branch 1 is the default; branches 2..N are
//! tried in declaration order and the first whose conditions hold wins.
//! Untaken branches are absent from the output, so links leaving them
//! contribute nothing downstream.

use async_trait::async_trait;
use dagcore::{
    Node, NodeContext, NodeError, NodeOutcome, NodeOutput, NodeSpec, PortDefinition, Value,
    ValueKind,
};
use dagruntime::{NodeFactory, NodeTypeMetadata};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const CONDITIONAL_NODE_TYPE: &str = "logic.conditional";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Contains,
    Equals,
    NumberEquals,
    GreaterThan,
    LessThan,
    StartsWith,
    NotStartsWith,
    IsEmpty,
    IsNotEmpty,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogicalOperator {
    #[default]
    And,
    Or,
}

/// Compares one named variable against a literal.
///
/// `logical_operator` joins this condition to the result of the ones
/// before it; it is ignored on the first condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub variable: String,
    pub operator: Operator,
    #[serde(default = "null_value")]
    pub value: Value,
    #[serde(default)]
    pub logical_operator: LogicalOperator,
}

fn null_value() -> Value {
    Value::Null
}

impl Condition {
    pub fn new(variable: impl Into<String>, operator: Operator, value: impl Into<Value>) -> Self {
        Self {
            variable: variable.into(),
            operator,
            value: value.into(),
            logical_operator: LogicalOperator::And,
        }
    }

    pub fn or(mut self) -> Self {
        self.logical_operator = LogicalOperator::Or;
        self
    }

    pub fn evaluate(&self, variables: &HashMap<String, Value>) -> bool {
        let actual = variables.get(&self.variable);
        match self.operator {
            Operator::IsEmpty => actual.map_or(true, Value::is_empty),
            Operator::IsNotEmpty => actual.is_some_and(|v| !v.is_empty()),
            _ => match actual {
                Some(actual) => compare(self.operator, actual, &self.value),
                None => false,
            },
        }
    }
}

fn compare(operator: Operator, actual: &Value, expected: &Value) -> bool {
    match operator {
        Operator::Contains => match actual {
            Value::Array(items) => items.contains(expected),
            Value::Object(map) => expected.as_str().is_some_and(|key| map.contains_key(key)),
            other => other
                .to_display_string()
                .contains(&expected.to_display_string()),
        },
        Operator::Equals => {
            actual == expected || actual.to_display_string() == expected.to_display_string()
        }
        Operator::NumberEquals => numeric(actual, expected, |a, b| a == b),
        Operator::GreaterThan => numeric(actual, expected, |a, b| a > b),
        Operator::LessThan => numeric(actual, expected, |a, b| a < b),
        Operator::StartsWith => actual
            .to_display_string()
            .starts_with(&expected.to_display_string()),
        Operator::NotStartsWith => !actual
            .to_display_string()
            .starts_with(&expected.to_display_string()),
        Operator::IsEmpty => actual.is_empty(),
        Operator::IsNotEmpty => !actual.is_empty(),
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => Some(*n),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

fn numeric(actual: &Value, expected: &Value, op: impl Fn(f64, f64) -> bool) -> bool {
    match (as_number(actual), as_number(expected)) {
        (Some(a), Some(b)) => op(a, b),
        _ => false,
    }
}

/// Fold conditions left to right with each one's logical operator.
/// An empty list never matches.
pub fn evaluate_conditions(conditions: &[Condition], variables: &HashMap<String, Value>) -> bool {
    let mut iter = conditions.iter();
    let Some(first) = iter.next() else {
        return false;
    };
    iter.fold(first.evaluate(variables), |acc, condition| {
        match condition.logical_operator {
            LogicalOperator::And => acc && condition.evaluate(variables),
            LogicalOperator::Or => acc || condition.evaluate(variables),
        }
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Branch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

pub struct ConditionalNode {
    fields: Vec<PortDefinition>,
    branches: Vec<(String, Vec<Condition>)>,
}

impl ConditionalNode {
    pub fn new(fields: Vec<PortDefinition>, branches: Vec<Branch>) -> Result<Self, NodeError> {
        if branches.is_empty() {
            return Err(NodeError::Configuration(
                "conditional node needs at least one branch".to_string(),
            ));
        }
        let branches = branches
            .into_iter()
            .enumerate()
            .map(|(i, b)| {
                let name = b.name.unwrap_or_else(|| format!("branch_{}", i + 1));
                (name, b.conditions)
            })
            .collect();
        Ok(Self { fields, branches })
    }

    /// Index of the branch taken for `variables`
    pub fn select_branch(&self, variables: &HashMap<String, Value>) -> usize {
        self.branches
            .iter()
            .enumerate()
            .skip(1)
            .find(|(_, (_, conditions))| evaluate_conditions(conditions, variables))
            .map(|(i, _)| i)
            .unwrap_or(0)
    }

    pub fn branch_names(&self) -> impl Iterator<Item = &str> {
        self.branches.iter().map(|(name, _)| name.as_str())
    }
}

#[async_trait]
impl Node for ConditionalNode {
    fn node_type(&self) -> &str {
        CONDITIONAL_NODE_TYPE
    }

    fn input_fields(&self) -> Vec<PortDefinition> {
        self.fields.clone()
    }

    fn output_fields(&self) -> Vec<PortDefinition> {
        self.branch_names()
            .map(|name| PortDefinition::optional(name, ValueKind::Object))
            .collect()
    }

    async fn execute(&self, ctx: NodeContext) -> Result<NodeOutcome, NodeError> {
        let mut missing: Vec<&str> = self
            .branches
            .iter()
            .flat_map(|(_, conditions)| conditions)
            .map(|c| c.variable.as_str())
            .filter(|variable| !ctx.inputs.contains_key(*variable))
            .collect();
        missing.sort_unstable();
        missing.dedup();
        if !missing.is_empty() {
            ctx.events
                .warn(format!("Conditions reference unset variables: {}", missing.join(", ")));
        }

        let taken = self.select_branch(&ctx.inputs);
        let name = self.branches[taken].0.clone();
        ctx.events.info(format!("Routing to {}", name));
        tracing::debug!("Conditional node {} took {}", ctx.node_id, name);

        Ok(NodeOutput::new()
            .with_output(name, Value::Object(ctx.inputs))
            .into())
    }
}

/// Deserialize a config entry (our [`Value`]) into a typed structure
pub(crate) fn from_config<T: serde::de::DeserializeOwned>(
    value: &Value,
    key: &str,
) -> Result<T, NodeError> {
    serde_json::to_value(value)
        .and_then(serde_json::from_value)
        .map_err(|e| NodeError::Configuration(format!("invalid '{}': {}", key, e)))
}

pub struct ConditionalNodeFactory;

impl NodeFactory for ConditionalNodeFactory {
    fn create(&self, spec: &NodeSpec) -> Result<Box<dyn Node>, NodeError> {
        let fields = PortDefinition::from_config_table(&spec.config, "fields")?;
        let branches: Vec<Branch> = match spec.config.get("branches") {
            Some(value) => from_config(value, "branches")?,
            None => vec![Branch {
                name: None,
                conditions: Vec::new(),
            }],
        };
        Ok(Box::new(ConditionalNode::new(fields, branches)?))
    }

    fn node_type(&self) -> &str {
        CONDITIONAL_NODE_TYPE
    }

    fn metadata(&self) -> NodeTypeMetadata {
        NodeTypeMetadata {
            description: "Routes its inputs to the first matching branch".to_string(),
            category: "logic".to_string(),
        }
    }
}
