use async_trait::async_trait;
use serde_json::{Map, Value, json};

use crate::{
    Result,
    flow::plugins::{InputType, NodeInput, NodeOutput, NodePlugin},
    runtime::ExecutionContext,
};

use super::models::*;

pub const CONDITION_NODE_TYPE: &str = "condition";

/// Output naming the selected branch, matched against edge `sourceHandle`s.
pub const BRANCH_KEY: &str = "branch";
pub const BRANCH_TRUE: &str = "true";
pub const BRANCH_FALSE: &str = "false";
const RESULT_KEY: &str = "result";

/// Compares values and selects the `true` or `false` branch.
pub struct ConditionPlugin;

impl ConditionPlugin {
    fn evaluate(config: &ConditionConfig) -> bool {
        let mut comparisons: Vec<&Comparison> = Vec::new();
        if config.conditions.is_empty() || config.comparison.left.is_some() {
            comparisons.push(&config.comparison);
        }
        comparisons.extend(config.conditions.iter());

        match config.logical_operator {
            LogicalOperator::And => comparisons.iter().all(|c| Self::evaluate_comparison(c)),
            LogicalOperator::Or => comparisons.iter().any(|c| Self::evaluate_comparison(c)),
        }
    }

    /// Evaluate a single comparison
    fn evaluate_comparison(comparison: &Comparison) -> bool {
        let actual = &comparison.left;
        match comparison.operator {
            ComparisonOperator::Null => matches!(actual, None | Some(Value::Null)),
            ComparisonOperator::NotNull => !matches!(actual, None | Some(Value::Null)),
            ComparisonOperator::Empty => is_empty(actual),
            ComparisonOperator::NotEmpty => !is_empty(actual),
            operator => {
                let (Some(actual), Some(expected)) = (actual, &comparison.right) else {
                    return false;
                };
                Self::evaluate_with_value(actual, operator, expected)
            }
        }
    }

    /// Evaluate comparison operators that require a value
    fn evaluate_with_value(
        actual: &Value,
        operator: ComparisonOperator,
        expected: &Value,
    ) -> bool {
        match operator {
            ComparisonOperator::Contains => eval_contains(actual, expected),
            ComparisonOperator::NotContains => !eval_contains(actual, expected),
            ComparisonOperator::StartWith => text(actual).starts_with(&text(expected)),
            ComparisonOperator::EndWith => text(actual).ends_with(&text(expected)),
            ComparisonOperator::Is => text(actual) == text(expected),
            ComparisonOperator::IsNot => text(actual) != text(expected),
            ComparisonOperator::In => eval_in(actual, expected),
            ComparisonOperator::NotIn => !eval_in(actual, expected),
            ComparisonOperator::Eq => eval_cmp(actual, expected, |a, b| a == b),
            ComparisonOperator::Ne => !eval_cmp(actual, expected, |a, b| a == b),
            ComparisonOperator::Gt => eval_cmp(actual, expected, |a, b| a > b),
            ComparisonOperator::Lt => eval_cmp(actual, expected, |a, b| a < b),
            ComparisonOperator::Ge => eval_cmp(actual, expected, |a, b| a >= b),
            ComparisonOperator::Le => eval_cmp(actual, expected, |a, b| a <= b),
            ComparisonOperator::Null | ComparisonOperator::NotNull | ComparisonOperator::Empty | ComparisonOperator::NotEmpty => false,
        }
    }
}

fn is_empty(value: &Option<Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.is_empty(),
        Some(Value::Array(arr)) => arr.is_empty(),
        Some(Value::Object(obj)) => obj.is_empty(),
        _ => false,
    }
}

/// Strings as-is, everything else as JSON text.
fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn eval_contains(
    actual: &Value,
    expected: &Value,
) -> bool {
    match actual {
        Value::String(s) => s.contains(&text(expected)),
        Value::Array(arr) => arr.iter().any(|v| v == expected || text(v) == text(expected)),
        _ => false,
    }
}

fn eval_in(
    actual: &Value,
    expected: &Value,
) -> bool {
    match expected {
        Value::Array(list) => list.iter().any(|v| v == actual || text(v) == text(actual)),
        Value::String(s) => s.contains(&text(actual)),
        _ => false,
    }
}

fn eval_cmp<F>(
    actual: &Value,
    expected: &Value,
    cmp: F,
) -> bool
where
    F: Fn(f64, f64) -> bool,
{
    match (number(actual), number(expected)) {
        (Some(a), Some(e)) => cmp(a, e),
        _ => false,
    }
}

#[async_trait]
impl NodePlugin for ConditionPlugin {
    fn node_type(&self) -> &str {
        CONDITION_NODE_TYPE
    }

    fn inputs(&self) -> Vec<NodeInput> {
        let operators = [
            ("contains", "contains"),
            ("does not contain", "not_contains"),
            ("starts with", "start_with"),
            ("ends with", "end_with"),
            ("is", "is"),
            ("is not", "is_not"),
            ("is empty", "empty"),
            ("is not empty", "not_empty"),
            ("in", "in"),
            ("not in", "not_in"),
            ("=", "eq"),
            ("!=", "ne"),
            (">", "gt"),
            ("<", "lt"),
            (">=", "ge"),
            ("<=", "le"),
            ("is null", "null"),
            ("is not null", "not_null"),
        ];
        vec![
            NodeInput::new("left", InputType::Text).label("Value").required(),
            NodeInput::new("operator", InputType::Select).label("Operator").options(&operators).default_value(json!("is")),
            NodeInput::new("right", InputType::Text).label("Compare To"),
            NodeInput::new("logical_operator", InputType::Select).label("Combine With").options(&[("and", "and"), ("or", "or")]).default_value(json!("and")),
            NodeInput::new("conditions", InputType::Json).label("More Conditions"),
        ]
    }

    fn outputs(&self) -> Vec<NodeOutput> {
        vec![NodeOutput::new(RESULT_KEY, "Result"), NodeOutput::new(BRANCH_KEY, "Branch")]
    }

    async fn execute(
        &self,
        inputs: Map<String, Value>,
        _ctx: &ExecutionContext,
    ) -> Result<Map<String, Value>> {
        let config = serde_json::from_value::<ConditionConfig>(Value::Object(inputs))?;
        let result = Self::evaluate(&config);

        let mut outputs = Map::new();
        outputs.insert(RESULT_KEY.to_string(), result.into());
        let branch = if result { BRANCH_TRUE } else { BRANCH_FALSE };
        outputs.insert(BRANCH_KEY.to_string(), branch.into());
        Ok(outputs)
    }
}
