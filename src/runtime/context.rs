use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::{
    FlowlineError, Result, ShareLock,
    common::{BroadcastQueue, Variables},
    events::{GraphEvent, Message, NodeEvent},
    flow::TemplateScope,
    model::{Edge, Node, NodeId},
    runtime::{NodeRecord, Session},
};

/// Callbacks a loop node uses to drive its body.
///
/// Implemented by the run dispatcher; plugins reach it through
/// [`ExecutionContext::child_nodes`] and [`ExecutionContext::execute_node`].
#[async_trait]
pub trait NodeRunner: Send + Sync {
    /// Children of `parent` in execution order.
    fn child_nodes(
        &self,
        parent: &str,
    ) -> Vec<Node>;

    /// Edges ending at `nid`, used to gate siblings inside a loop body.
    fn inbound_edges(
        &self,
        nid: &str,
    ) -> Vec<Edge>;

    /// Bind, execute and record one node against `ctx`'s variables.
    async fn execute_node(
        &self,
        node: &Node,
        ctx: &ExecutionContext,
    ) -> NodeRecord;
}

/// Per-run state handed to every plugin invocation.
///
/// Clones share the same variables; use [`ExecutionContext::fork`] for an
/// isolated copy.
#[derive(Clone)]
pub struct ExecutionContext {
    node_id: NodeId,
    flow_id: String,
    run_id: String,
    env: Arc<Value>,
    input: Arc<Value>,
    variables: ShareLock<Variables>,
    session: Arc<Session>,
    runner: Option<Arc<dyn NodeRunner>>,
    events: Option<Arc<BroadcastQueue<Message>>>,
}

impl ExecutionContext {
    pub fn new(
        flow_id: &str,
        run_id: &str,
        env: &HashMap<String, String>,
        input: Value,
    ) -> Self {
        let env = env.iter().map(|(k, v)| (k.clone(), Value::String(v.clone()))).collect::<Map<_, _>>();
        Self {
            node_id: NodeId::new(),
            flow_id: flow_id.to_string(),
            run_id: run_id.to_string(),
            env: Arc::new(Value::Object(env)),
            input: Arc::new(input),
            variables: ShareLock::new(Variables::new().into()),
            session: Arc::new(Session::new()),
            runner: None,
            events: None,
        }
    }

    pub fn with_session(
        mut self,
        session: Arc<Session>,
    ) -> Self {
        self.session = session;
        self
    }

    pub fn with_runner(
        mut self,
        runner: Arc<dyn NodeRunner>,
    ) -> Self {
        self.runner = Some(runner);
        self
    }

    pub fn with_events(
        mut self,
        events: Arc<BroadcastQueue<Message>>,
    ) -> Self {
        self.events = Some(events);
        self
    }

    /// The same run, seen from node `nid`.
    pub fn for_node(
        &self,
        nid: &str,
    ) -> Self {
        let mut ctx = self.clone();
        ctx.node_id = nid.to_string();
        ctx
    }

    /// A copy whose variables are deep-cloned, so writes stay local.
    pub fn fork(&self) -> Self {
        let snapshot = self.variables();
        let mut ctx = self.clone();
        ctx.variables = ShareLock::new(snapshot.into());
        ctx
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn flow_id(&self) -> &str {
        &self.flow_id
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn session(&self) -> Arc<Session> {
        self.session.clone()
    }

    pub fn input(&self) -> &Value {
        &self.input
    }

    pub fn env(&self) -> &Value {
        &self.env
    }

    pub fn env_var(
        &self,
        name: &str,
    ) -> Option<&str> {
        self.env.get(name).and_then(Value::as_str)
    }

    /// Snapshot of the run variables.
    pub fn variables(&self) -> Variables {
        self.variables.read().map(|vars| vars.clone()).unwrap_or_default()
    }

    pub fn lookup(
        &self,
        path: &str,
    ) -> Option<Value> {
        self.variables.read().ok().and_then(|vars| vars.lookup(path))
    }

    pub fn set_var(
        &self,
        key: &str,
        value: Value,
    ) {
        if let Ok(mut vars) = self.variables.write() {
            vars.set(key, value);
        }
    }

    /// Write `"<nid>.<field>"`.
    pub fn set_output(
        &self,
        nid: &str,
        field: &str,
        value: Value,
    ) {
        if let Ok(mut vars) = self.variables.write() {
            vars.set_output(nid, field, value);
        }
    }

    pub fn outputs_of(
        &self,
        nid: &str,
    ) -> Map<String, Value> {
        self.variables.read().map(|vars| vars.outputs_of(nid)).unwrap_or_default()
    }

    /// Lookup scope over the current variables, the run input and env.
    pub fn scope(&self) -> TemplateScope {
        let context = self.variables.read().map(|vars| vars.to_scope()).unwrap_or_else(|_| Value::Object(Map::new()));
        TemplateScope::new(&context, Some(&self.input), Some(&self.env))
    }

    /// Resolve every template inside `inputs` against [`Self::scope`].
    pub fn bind(
        &self,
        inputs: &Map<String, Value>,
    ) -> Map<String, Value> {
        let scope = self.scope();
        inputs.iter().map(|(k, v)| (k.clone(), scope.resolve_structure(v))).collect()
    }

    pub fn child_nodes(
        &self,
        parent: &str,
    ) -> Vec<Node> {
        self.runner.as_ref().map(|runner| runner.child_nodes(parent)).unwrap_or_default()
    }

    pub fn inbound_edges(
        &self,
        nid: &str,
    ) -> Vec<Edge> {
        self.runner.as_ref().map(|runner| runner.inbound_edges(nid)).unwrap_or_default()
    }

    pub async fn execute_node(
        &self,
        node: &Node,
    ) -> Result<NodeRecord> {
        let runner = self.runner.as_ref().ok_or_else(|| FlowlineError::Runtime(format!("no runner available to execute node '{}'", node.id)))?;
        Ok(runner.execute_node(node, self).await)
    }

    /// Publish a node event for `nid` on the run's event bus.
    pub fn emit(
        &self,
        nid: &str,
        event: NodeEvent,
    ) {
        if let Some(events) = &self.events {
            events.send(Message {
                run_id: self.run_id.clone(),
                nid: nid.to_string(),
                event: GraphEvent::Node(event),
            });
        }
    }
}
