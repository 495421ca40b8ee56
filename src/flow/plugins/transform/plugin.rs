use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::{
    FlowlineError, Result,
    config::SandboxConfig,
    flow::plugins::{InputType, NodeInput, NodeOutput, NodePlugin},
    runtime::ExecutionContext,
};

use super::sandbox::ScriptSandbox;

pub const TRANSFORM_NODE_TYPE: &str = "transform";

const EXPRESSION_KEY: &str = "expression";
const DATA_KEY: &str = "data";
const RESULT_KEY: &str = "result";

/// Evaluates a JavaScript expression over the run variables.
pub struct TransformPlugin {
    sandbox: ScriptSandbox,
}

impl TransformPlugin {
    pub fn new(config: SandboxConfig) -> Self {
        Self {
            sandbox: ScriptSandbox::new(config),
        }
    }
}

#[async_trait]
impl NodePlugin for TransformPlugin {
    fn node_type(&self) -> &str {
        TRANSFORM_NODE_TYPE
    }

    fn inputs(&self) -> Vec<NodeInput> {
        vec![
            NodeInput::new(EXPRESSION_KEY, InputType::Code).label("Expression").required(),
            NodeInput::new(DATA_KEY, InputType::Json).label("Data"),
        ]
    }

    fn outputs(&self) -> Vec<NodeOutput> {
        vec![NodeOutput::new(RESULT_KEY, "Result")]
    }

    async fn execute(
        &self,
        inputs: Map<String, Value>,
        ctx: &ExecutionContext,
    ) -> Result<Map<String, Value>> {
        let code = inputs.get(EXPRESSION_KEY).and_then(Value::as_str).filter(|c| !c.trim().is_empty()).ok_or_else(|| FlowlineError::Plugin("expression is required".to_string()))?.to_string();
        let data = inputs.get(DATA_KEY).cloned().unwrap_or(Value::Null);
        let vars = ctx.variables().to_scope();

        let sandbox = self.sandbox.clone();
        let result = tokio::task::spawn_blocking(move || sandbox.evaluate(&code, &data, &vars)).await.map_err(|e| FlowlineError::Runtime(e.to_string()))??;

        let mut outputs = Map::new();
        outputs.insert(RESULT_KEY.to_string(), result);
        Ok(outputs)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn test_transform_over_loop_item() {
        let ctx = ExecutionContext::new("f", "r", &HashMap::new(), Value::Null);
        ctx.set_var("item", json!({"value": 3}));
        let inputs = json!({"expression": "item.value * 2"}).as_object().unwrap().clone();
        let outputs = TransformPlugin::new(SandboxConfig::default()).execute(inputs, &ctx).await.unwrap();
        assert_eq!(outputs["result"], json!(6));
    }

    #[tokio::test]
    async fn test_transform_requires_expression() {
        let ctx = ExecutionContext::new("f", "r", &HashMap::new(), Value::Null);
        let err = TransformPlugin::new(SandboxConfig::default()).execute(Map::new(), &ctx).await.unwrap_err();
        assert!(matches!(err, FlowlineError::Plugin(_)));
    }
}
