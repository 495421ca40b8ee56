use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value, json};

use crate::{
    FlowlineError, Result,
    flow::plugins::{InputType, NodeInput, NodeOutput, NodePlugin, validate_inputs, with_defaults},
    runtime::ExecutionContext,
};

use super::invoker::FunctionInvoker;

const ACTION_KEY: &str = "action";

/// One operation a remote function node can perform.
#[derive(Debug, Clone)]
pub struct RemoteOperation {
    pub value: String,
    pub label: String,
    /// inputs shown once this operation is selected
    pub inputs: Vec<NodeInput>,
}

impl RemoteOperation {
    pub fn new(
        value: &str,
        label: &str,
        inputs: Vec<NodeInput>,
    ) -> Self {
        Self {
            value: value.to_string(),
            label: label.to_string(),
            inputs,
        }
    }
}

/// Vendor integration node executed through a [`FunctionInvoker`].
///
/// The `action` select picks an operation; the operation's fields come back
/// as dynamic inputs.
pub struct RemoteFunctionPlugin {
    node_type: String,
    function_name: String,
    operations: Vec<RemoteOperation>,
    invoker: Arc<dyn FunctionInvoker>,
}

impl RemoteFunctionPlugin {
    pub fn new(
        node_type: &str,
        function_name: &str,
        operations: Vec<RemoteOperation>,
        invoker: Arc<dyn FunctionInvoker>,
    ) -> Self {
        Self {
            node_type: node_type.to_string(),
            function_name: function_name.to_string(),
            operations,
            invoker,
        }
    }

    fn operation(
        &self,
        action: &str,
    ) -> Option<&RemoteOperation> {
        self.operations.iter().find(|op| op.value == action)
    }
}

#[async_trait]
impl NodePlugin for RemoteFunctionPlugin {
    fn node_type(&self) -> &str {
        &self.node_type
    }

    fn inputs(&self) -> Vec<NodeInput> {
        let options: Vec<(&str, &str)> = self.operations.iter().map(|op| (op.label.as_str(), op.value.as_str())).collect();
        vec![NodeInput::new(ACTION_KEY, InputType::Select).label("Action").options(&options).required()]
    }

    fn outputs(&self) -> Vec<NodeOutput> {
        vec![NodeOutput::new("success", "Success"), NodeOutput::new("data", "Data"), NodeOutput::new("error", "Error")]
    }

    fn dynamic_inputs(
        &self,
        current: &Map<String, Value>,
    ) -> Vec<NodeInput> {
        current.get(ACTION_KEY).and_then(Value::as_str).and_then(|action| self.operation(action)).map(|op| op.inputs.clone()).unwrap_or_default()
    }

    async fn execute(
        &self,
        inputs: Map<String, Value>,
        ctx: &ExecutionContext,
    ) -> Result<Map<String, Value>> {
        let action = inputs.get(ACTION_KEY).and_then(Value::as_str).ok_or_else(|| FlowlineError::Plugin("action is required".to_string()))?.to_string();
        let operation = self.operation(&action).ok_or_else(|| FlowlineError::Plugin(format!("unknown action '{}' for {}", action, self.node_type)))?;

        let mut declared = self.inputs();
        declared.extend(operation.inputs.iter().cloned());
        let mut params = with_defaults(&declared, inputs);
        validate_inputs(&declared, &params)?;
        params.remove(ACTION_KEY);

        tracing::debug!(run_id = %ctx.run_id(), node_id = %ctx.node_id(), function = %self.function_name, action = %action, "invoke remote function");
        let response = self
            .invoker
            .invoke(
                &self.function_name,
                json!({
                    "action": action,
                    "params": params,
                }),
            )
            .await?;

        let mut outputs = Map::new();
        outputs.insert("success".to_string(), response.error.is_none().into());
        outputs.insert("data".to_string(), response.data);
        outputs.insert("error".to_string(), response.error.map(Value::String).unwrap_or(Value::Null));
        Ok(outputs)
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, sync::Mutex};

    use super::*;
    use crate::flow::plugins::InvokeResponse;

    #[derive(Default)]
    struct RecordingInvoker {
        calls: Mutex<Vec<(String, Value)>>,
    }

    #[async_trait]
    impl FunctionInvoker for RecordingInvoker {
        async fn invoke(
            &self,
            function_name: &str,
            body: Value,
        ) -> Result<InvokeResponse> {
            self.calls.lock().unwrap().push((function_name.to_string(), body.clone()));
            if body["params"]["channel"] == json!("#fail") {
                return Ok(InvokeResponse {
                    data: Value::Null,
                    error: Some("channel_not_found".to_string()),
                });
            }
            Ok(InvokeResponse {
                data: json!({"ts": "1"}),
                error: None,
            })
        }
    }

    fn plugin(invoker: Arc<RecordingInvoker>) -> RemoteFunctionPlugin {
        RemoteFunctionPlugin::new(
            "slack",
            "slack-proxy",
            vec![
                RemoteOperation::new(
                    "send_message",
                    "Send Message",
                    vec![NodeInput::new("channel", InputType::Text).required(), NodeInput::new("text", InputType::Textarea).required()],
                ),
                RemoteOperation::new("list_channels", "List Channels", vec![]),
            ],
            invoker,
        )
    }

    #[test]
    fn test_dynamic_inputs_follow_action() {
        let plugin = plugin(Arc::new(RecordingInvoker::default()));
        assert!(plugin.dynamic_inputs(&Map::new()).is_empty());
        let current = json!({"action": "send_message"});
        let names: Vec<String> = plugin.dynamic_inputs(current.as_object().unwrap()).into_iter().map(|i| i.name).collect();
        assert_eq!(names, vec!["channel", "text"]);
    }

    #[tokio::test]
    async fn test_execute_invokes_function() {
        let invoker = Arc::new(RecordingInvoker::default());
        let plugin = plugin(invoker.clone());
        let ctx = ExecutionContext::new("f", "r", &HashMap::new(), Value::Null);

        let inputs = json!({"action": "send_message", "channel": "#general", "text": "hi"}).as_object().unwrap().clone();
        let outputs = plugin.execute(inputs, &ctx).await.unwrap();
        assert_eq!(outputs["success"], json!(true));
        assert_eq!(outputs["data"], json!({"ts": "1"}));

        let calls = invoker.calls.lock().unwrap();
        assert_eq!(calls[0].0, "slack-proxy");
        assert_eq!(calls[0].1, json!({"action": "send_message", "params": {"channel": "#general", "text": "hi"}}));
    }

    #[tokio::test]
    async fn test_execute_reports_remote_error() {
        let plugin = plugin(Arc::new(RecordingInvoker::default()));
        let ctx = ExecutionContext::new("f", "r", &HashMap::new(), Value::Null);
        let inputs = json!({"action": "send_message", "channel": "#fail", "text": "hi"}).as_object().unwrap().clone();
        let outputs = plugin.execute(inputs, &ctx).await.unwrap();
        assert_eq!(outputs["success"], json!(false));
        assert_eq!(outputs["error"], json!("channel_not_found"));
    }

    #[tokio::test]
    async fn test_execute_validates_operation_inputs() {
        let plugin = plugin(Arc::new(RecordingInvoker::default()));
        let ctx = ExecutionContext::new("f", "r", &HashMap::new(), Value::Null);

        let missing = json!({"action": "send_message", "channel": "#general"}).as_object().unwrap().clone();
        assert!(plugin.execute(missing, &ctx).await.is_err());

        let unknown = json!({"action": "delete_workspace"}).as_object().unwrap().clone();
        assert!(plugin.execute(unknown, &ctx).await.is_err());
    }
}
