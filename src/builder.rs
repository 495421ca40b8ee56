use std::sync::Arc;

use crate::{
    Config, Engine, Result,
    flow::plugins::{FunctionInvoker, NodePlugin, PluginRegistry, RemoteFunctionPlugin, RemoteOperation},
};

pub struct EngineBuilder {
    config: Config,
    builtins: bool,
    plugins: Vec<Arc<dyn NodePlugin>>,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self {
            config: Config::default(),
            builtins: true,
            plugins: Vec::new(),
        }
    }
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(
        mut self,
        config: Config,
    ) -> Self {
        self.config = config;
        self
    }

    /// Register the builtin plugins (on by default).
    pub fn builtins(
        mut self,
        enabled: bool,
    ) -> Self {
        self.builtins = enabled;
        self
    }

    pub fn plugin(
        mut self,
        plugin: Arc<dyn NodePlugin>,
    ) -> Self {
        self.plugins.push(plugin);
        self
    }

    /// Register a node type backed by a remote function.
    pub fn remote_function(
        self,
        node_type: &str,
        function_name: &str,
        operations: Vec<RemoteOperation>,
        invoker: Arc<dyn FunctionInvoker>,
    ) -> Self {
        self.plugin(Arc::new(RemoteFunctionPlugin::new(node_type, function_name, operations, invoker)))
    }

    pub fn build(self) -> Result<Engine> {
        let mut registry = if self.builtins {
            PluginRegistry::with_builtins(&self.config.sandbox)?
        } else {
            PluginRegistry::new()
        };
        for plugin in self.plugins {
            registry.register(plugin)?;
        }

        Ok(Engine::new(self.config, registry))
    }
}
