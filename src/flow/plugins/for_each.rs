use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::{
    FlowlineError, Result,
    flow::plugins::{InputType, NodeInput, NodeOutput, NodePlugin},
    runtime::ExecutionContext,
};

pub const FOR_EACH_NODE_TYPE: &str = "for-each-loop";

/// Editor metadata of loop nodes.
///
/// Loop nodes are always run by the loop executor, so reaching `execute`
/// means a caller bypassed the engine.
pub struct ForEachPlugin;

#[async_trait]
impl NodePlugin for ForEachPlugin {
    fn node_type(&self) -> &str {
        FOR_EACH_NODE_TYPE
    }

    fn inputs(&self) -> Vec<NodeInput> {
        vec![NodeInput::new("items", InputType::Json).label("Items")]
    }

    fn outputs(&self) -> Vec<NodeOutput> {
        vec![
            NodeOutput::new("results", "Results"),
            NodeOutput::new("totalProcessed", "Total Processed"),
            NodeOutput::new("currentItem", "Current Item"),
            NodeOutput::new("currentIndex", "Current Index"),
            NodeOutput::new("loop_iteration", "Iteration"),
        ]
    }

    async fn execute(
        &self,
        _inputs: Map<String, Value>,
        _ctx: &ExecutionContext,
    ) -> Result<Map<String, Value>> {
        Err(FlowlineError::Loop("for-each-loop nodes are executed by the loop executor".to_string()))
    }
}
