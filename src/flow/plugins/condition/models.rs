use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Logical operator
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq, strum::AsRefStr, strum::EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LogicalOperator {
    #[default]
    And,
    Or,
}

/// Comparison operator
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq, strum::AsRefStr, strum::EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ComparisonOperator {
    // for string or array
    Contains,
    NotContains,
    StartWith,
    EndWith,
    #[default]
    Is,
    IsNot,
    Empty,
    NotEmpty,
    In,
    NotIn,
    // for number
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
    Null,
    NotNull,
}

/// One comparison `left <operator> right`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comparison {
    #[serde(default)]
    pub left: Option<Value>,
    #[serde(default)]
    pub operator: ComparisonOperator,
    #[serde(default)]
    pub right: Option<Value>,
}

/// Bound inputs of a condition node.
///
/// The top-level comparison is combined with `conditions` through
/// `logical_operator`; an empty `left` with extra conditions is ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionConfig {
    #[serde(flatten)]
    pub comparison: Comparison,
    #[serde(default)]
    pub logical_operator: LogicalOperator,
    #[serde(default)]
    pub conditions: Vec<Comparison>,
}
