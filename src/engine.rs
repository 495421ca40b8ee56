//! Flow engine - the main entry point for Flowline.
//!
//! The engine owns the plugin registry and the run event bus, and turns a
//! [`FlowModel`] into a finished [`FlowRun`]:
//! - Merging the flow env with per-run overrides
//! - Building the execution context and its dispatcher
//! - Broadcasting flow and node events to subscribers

use std::{collections::HashMap, sync::Arc};

use serde_json::{Map, Value};
use tokio::sync::broadcast;

use crate::{
    Config, Result,
    common::BroadcastQueue,
    dispatcher::Dispatcher,
    events::Message,
    flow::{FlowEditor, plugins::PluginRegistry},
    model::FlowModel,
    runtime::{ExecutionContext, FlowRun, Session},
    utils,
};

/// Per-run parameters.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// run input, reachable as `{{input.*}}` and by bare name
    pub input: Value,
    /// env values layered over the flow's own env
    pub env: HashMap<String, String>,
    /// session whose cancel flag the run observes
    pub session: Option<Arc<Session>>,
}

impl RunOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn input(
        mut self,
        input: Value,
    ) -> Self {
        self.input = input;
        self
    }

    pub fn env(
        mut self,
        name: &str,
        value: &str,
    ) -> Self {
        self.env.insert(name.to_string(), value.to_string());
        self
    }

    pub fn session(
        mut self,
        session: Arc<Session>,
    ) -> Self {
        self.session = Some(session);
        self
    }
}

/// The flow engine.
///
/// # Example
///
/// ```rust,ignore
/// let engine = EngineBuilder::new().build()?;
/// let flow = FlowModel::from_json(json_str)?;
/// let run = engine.run(&flow, RunOptions::new()).await;
/// assert!(run.is_completed());
/// ```
pub struct Engine {
    /// Plugins by node type.
    plugins: Arc<PluginRegistry>,
    config: Config,
    /// Event bus shared by every run of this engine.
    events: Arc<BroadcastQueue<Message>>,
}

impl Engine {
    pub fn new(
        config: Config,
        plugins: PluginRegistry,
    ) -> Self {
        let events = BroadcastQueue::new(config.engine.event_queue_size.max(1));
        Self {
            plugins: Arc::new(plugins),
            config,
            events,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn plugins(&self) -> Arc<PluginRegistry> {
        self.plugins.clone()
    }

    /// Receive the events of every run started after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<Message> {
        self.events.subscribe()
    }

    /// Editor schema of a node type's inputs.
    pub fn input_schema(
        &self,
        node_type: &str,
        current: &Map<String, Value>,
    ) -> Result<Value> {
        self.plugins.input_schema(node_type, current)
    }

    /// Execute `flow` to completion.
    ///
    /// Errors never escape: a failing run comes back with
    /// [`RunStatus::Failed`](crate::RunStatus::Failed) and its message.
    pub async fn run(
        &self,
        flow: &FlowModel,
        options: RunOptions,
    ) -> FlowRun {
        let mut env = flow.env.clone();
        env.extend(options.env);

        let run_id = utils::longid();
        let dispatcher = Arc::new(Dispatcher::new(flow.nodes.clone(), flow.edges.clone(), self.plugins.clone(), &self.config.engine, self.events.clone()));
        let mut ctx = ExecutionContext::new(&flow.id, &run_id, &env, options.input).with_runner(dispatcher.clone()).with_events(self.events.clone());
        if let Some(session) = options.session {
            ctx = ctx.with_session(session);
        }

        dispatcher.run(&ctx).await
    }

    /// Run the current state of an editor under the editor's session.
    pub async fn run_editor(
        &self,
        editor: &FlowEditor,
        options: RunOptions,
    ) -> FlowRun {
        let options = RunOptions {
            session: options.session.or_else(|| Some(editor.session())),
            ..options
        };
        self.run(&editor.to_model(), options).await
    }
}
