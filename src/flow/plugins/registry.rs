use std::{collections::HashMap, sync::Arc};

use serde_json::{Map, Value};

use crate::{
    FlowlineError, Result,
    config::SandboxConfig,
    flow::plugins::{ConditionPlugin, ForEachPlugin, HttpRequestPlugin, NodeInput, NodePlugin, TransformPlugin, TriggerPlugin, input_schema},
};

/// Closed catalog of plugins keyed by node type.
#[derive(Default, Clone)]
pub struct PluginRegistry {
    plugins: HashMap<String, Arc<dyn NodePlugin>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the builtin plugins.
    pub fn with_builtins(sandbox: &SandboxConfig) -> Result<Self> {
        let mut registry = Self::new();
        registry.register(Arc::new(TriggerPlugin))?;
        registry.register(Arc::new(HttpRequestPlugin::new()))?;
        registry.register(Arc::new(TransformPlugin::new(sandbox.clone())))?;
        registry.register(Arc::new(ConditionPlugin))?;
        registry.register(Arc::new(ForEachPlugin))?;
        Ok(registry)
    }

    /// Add `plugin`; its node type must not be registered yet.
    pub fn register(
        &mut self,
        plugin: Arc<dyn NodePlugin>,
    ) -> Result<()> {
        let node_type = plugin.node_type().to_string();
        if self.plugins.contains_key(&node_type) {
            return Err(FlowlineError::Plugin(format!("plugin for node type '{}' is already registered", node_type)));
        }
        tracing::debug!(node_type = %node_type, "register plugin");
        self.plugins.insert(node_type, plugin);
        Ok(())
    }

    pub fn get_plugin(
        &self,
        node_type: &str,
    ) -> Option<Arc<dyn NodePlugin>> {
        self.plugins.get(node_type).cloned()
    }

    pub fn contains(
        &self,
        node_type: &str,
    ) -> bool {
        self.plugins.contains_key(node_type)
    }

    /// Registered node types, sorted.
    pub fn node_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.plugins.keys().cloned().collect();
        types.sort();
        types
    }

    /// Static plus dynamic inputs of `node_type` for the given current values.
    pub fn all_inputs(
        &self,
        node_type: &str,
        current: &Map<String, Value>,
    ) -> Result<Vec<NodeInput>> {
        let plugin = self.get_plugin(node_type).ok_or_else(|| FlowlineError::PluginNotFound(node_type.to_string()))?;
        let mut inputs = plugin.inputs();
        inputs.extend(plugin.dynamic_inputs(current));
        Ok(inputs)
    }

    /// JSON schema of the inputs of `node_type`, as the editor shows them.
    pub fn input_schema(
        &self,
        node_type: &str,
        current: &Map<String, Value>,
    ) -> Result<Value> {
        let inputs = self.all_inputs(node_type, current)?;
        Ok(input_schema(&inputs, current))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_builtins() {
        let registry = PluginRegistry::with_builtins(&SandboxConfig::default()).unwrap();
        assert_eq!(registry.node_types(), vec!["condition", "for-each-loop", "http_request", "transform", "trigger"]);
        assert!(registry.get_plugin("http_request").is_some());
        assert!(registry.get_plugin("slack").is_none());
    }

    #[test]
    fn test_duplicate_registration() {
        let mut registry = PluginRegistry::new();
        registry.register(Arc::new(TriggerPlugin)).unwrap();
        let err = registry.register(Arc::new(TriggerPlugin)).unwrap_err();
        assert!(matches!(err, FlowlineError::Plugin(_)));
    }

    #[test]
    fn test_input_schema() {
        let registry = PluginRegistry::with_builtins(&SandboxConfig::default()).unwrap();
        let schema = registry.input_schema("http_request", &Map::new()).unwrap();
        assert_eq!(schema["required"], json!(["url"]));

        let err = registry.input_schema("slack", &Map::new()).unwrap_err();
        assert_eq!(err, FlowlineError::PluginNotFound("slack".to_string()));
    }
}
