use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::{
    Result,
    flow::plugins::{NodeInput, NodeOutput, NodePlugin},
    runtime::ExecutionContext,
};

pub const TRIGGER_NODE_TYPE: &str = "trigger";
const PAYLOAD_KEY: &str = "payload";

/// Manual trigger: exposes the run input as `payload` next to its own inputs.
///
/// It declares no outputs, so every bound input is written as well.
pub struct TriggerPlugin;

#[async_trait]
impl NodePlugin for TriggerPlugin {
    fn node_type(&self) -> &str {
        TRIGGER_NODE_TYPE
    }

    fn inputs(&self) -> Vec<NodeInput> {
        Vec::new()
    }

    fn outputs(&self) -> Vec<NodeOutput> {
        Vec::new()
    }

    async fn execute(
        &self,
        inputs: Map<String, Value>,
        ctx: &ExecutionContext,
    ) -> Result<Map<String, Value>> {
        let mut outputs = inputs;
        outputs.insert(PAYLOAD_KEY.to_string(), ctx.input().clone());
        Ok(outputs)
    }
}
