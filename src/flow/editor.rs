//! Editing session over one flow.

use std::{collections::HashMap, sync::Arc, time::Duration};

use serde_json::{Map, Value};

use crate::{
    Config, FlowlineError, Result, ShareLock,
    config::LayoutConfig,
    flow::{
        AliasRegistry, FlowGraph,
        layout::{LayoutDirection, layout},
    },
    history::{HistoryRecorder, HistoryStore, SaveOutcome},
    model::{Edge, FlowModel, LoopConfiguration, Node, NodeId, Position},
    runtime::Session,
    store::FlowStore,
    utils,
};

/// Couples a [`FlowGraph`] with its undo/redo history.
///
/// Every mutation is captured, either immediately or through an attached
/// [`HistoryRecorder`]. Inputs are accepted in alias form
/// (`{{Fetch_Users.data}}`) and stored in id form.
pub struct FlowEditor {
    flow_id: String,
    name: String,
    env: HashMap<String, String>,
    graph: FlowGraph,
    history: ShareLock<HistoryStore>,
    recorder: Option<HistoryRecorder>,
    session: Arc<Session>,
    layout: LayoutConfig,
    bulk_build: bool,
    /// an edit is waiting on the recorder's debounce
    pending: bool,
}

impl FlowEditor {
    pub fn new(
        flow_id: &str,
        config: &Config,
    ) -> Self {
        let model = FlowModel {
            id: flow_id.to_string(),
            ..Default::default()
        };
        Self::from_model(model, config)
    }

    /// Open an existing flow; its current state becomes the first history entry.
    pub fn from_model(
        model: FlowModel,
        config: &Config,
    ) -> Self {
        let mut editor = Self {
            flow_id: model.id.clone(),
            name: model.name.clone(),
            env: model.env.clone(),
            graph: FlowGraph::from_snapshot(model.snapshot()),
            history: Arc::new(HistoryStore::from_config(&config.history).into()),
            recorder: None,
            session: Arc::new(Session::new()),
            layout: config.layout.clone(),
            bulk_build: false,
            pending: false,
        };
        editor.capture_now();
        editor
    }

    /// Debounce captures through a recorder. Must be called within a tokio runtime.
    pub fn with_recorder(
        mut self,
        debounce: Duration,
    ) -> Self {
        self.recorder = Some(HistoryRecorder::start(self.history.clone(), debounce));
        self
    }

    pub fn with_session(
        mut self,
        session: Arc<Session>,
    ) -> Self {
        self.session = session;
        self
    }

    pub fn flow_id(&self) -> &str {
        &self.flow_id
    }

    pub fn graph(&self) -> &FlowGraph {
        &self.graph
    }

    pub fn aliases(&self) -> &AliasRegistry {
        self.graph.aliases()
    }

    pub fn session(&self) -> Arc<Session> {
        self.session.clone()
    }

    pub fn history(&self) -> ShareLock<HistoryStore> {
        self.history.clone()
    }

    pub fn set_env(
        &mut self,
        name: &str,
        value: &str,
    ) {
        self.env.insert(name.to_string(), value.to_string());
    }

    /// The flow as a document, ready to run or export.
    pub fn to_model(&self) -> FlowModel {
        let snapshot = self.graph.snapshot();
        FlowModel {
            id: self.flow_id.clone(),
            name: self.name.clone(),
            desc: String::new(),
            env: self.env.clone(),
            nodes: snapshot.nodes,
            edges: snapshot.edges,
        }
    }

    /// Add `node`, translating alias references in its inputs.
    pub fn add_node(
        &mut self,
        mut node: Node,
    ) -> Result<NodeId> {
        node.data.inputs = self.to_execution_inputs(node.data.inputs);
        let nid = node.id.clone();
        self.graph.add_node(node)?;
        self.capture();
        Ok(nid)
    }

    /// Add a node of `node_type` with a generated id.
    pub fn create_node(
        &mut self,
        node_type: &str,
        label: &str,
        position: Position,
    ) -> Result<NodeId> {
        let mut node = Node::new(utils::node_id(node_type), node_type, label);
        node.position = position;
        self.add_node(node)
    }

    pub fn update_node_inputs(
        &mut self,
        nid: &str,
        inputs: Map<String, Value>,
    ) -> Result<()> {
        let inputs = self.to_execution_inputs(inputs);
        self.graph.update_node_inputs(nid, inputs)?;
        self.capture();
        Ok(())
    }

    /// Inputs of `nid` with references rendered as aliases.
    pub fn display_inputs(
        &self,
        nid: &str,
    ) -> Result<Map<String, Value>> {
        let node = self.graph.node(nid).ok_or_else(|| FlowlineError::Node(format!("node '{}' does not exist", nid)))?;
        let aliases = self.graph.aliases();
        Ok(node.data.inputs.iter().map(|(k, v)| (k.clone(), aliases.to_display_value(v))).collect())
    }

    pub fn rename_node(
        &mut self,
        nid: &str,
        label: &str,
    ) -> Result<()> {
        self.graph.rename_node(nid, label)?;
        self.capture();
        Ok(())
    }

    pub fn set_node_disabled(
        &mut self,
        nid: &str,
        disabled: bool,
    ) -> Result<()> {
        self.graph.set_node_disabled(nid, disabled)?;
        self.capture();
        Ok(())
    }

    pub fn set_loop_config(
        &mut self,
        nid: &str,
        config: LoopConfiguration,
    ) -> Result<()> {
        self.graph.set_loop_config(nid, config)?;
        self.capture();
        Ok(())
    }

    pub fn move_node(
        &mut self,
        nid: &str,
        position: Position,
    ) -> Result<()> {
        self.graph.move_node(nid, position)?;
        self.capture();
        Ok(())
    }

    pub fn remove_node(
        &mut self,
        nid: &str,
    ) -> Result<Vec<Node>> {
        let removed = self.graph.remove_node(nid)?;
        self.capture();
        Ok(removed)
    }

    pub fn add_edge(
        &mut self,
        edge: Edge,
    ) -> Result<()> {
        self.graph.add_edge(edge)?;
        self.capture();
        Ok(())
    }

    pub fn connect(
        &mut self,
        source: &str,
        target: &str,
    ) -> Result<String> {
        let eid = self.graph.connect(source, target)?;
        self.capture();
        Ok(eid)
    }

    pub fn remove_edge(
        &mut self,
        eid: &str,
    ) -> Result<Edge> {
        let edge = self.graph.remove_edge(eid)?;
        self.capture();
        Ok(edge)
    }

    pub fn apply_layout(
        &mut self,
        direction: LayoutDirection,
    ) {
        let placed = layout(self.graph.nodes(), self.graph.edges(), direction, &self.layout);
        self.graph.apply_positions(&placed);
        self.capture();
    }

    /// Suppress per-edit captures until [`Self::end_bulk_build`].
    pub fn begin_bulk_build(&mut self) {
        self.bulk_build = true;
    }

    /// Record the whole bulk build as one history entry.
    pub fn end_bulk_build(&mut self) -> SaveOutcome {
        self.bulk_build = false;
        self.cancel_pending();
        self.pending = false;
        self.capture_now()
    }

    pub fn is_bulk_building(&self) -> bool {
        self.bulk_build
    }

    /// Restore the previous entry. Returns `false` at the oldest entry.
    pub fn undo(&mut self) -> Result<bool> {
        self.commit_pending();
        let state = self.history.write().map_err(|e| FlowlineError::History(e.to_string()))?.undo();
        Ok(self.restore(state))
    }

    /// Restore the next entry. Returns `false` at the newest entry.
    pub fn redo(&mut self) -> Result<bool> {
        self.commit_pending();
        let state = self.history.write().map_err(|e| FlowlineError::History(e.to_string()))?.redo();
        Ok(self.restore(state))
    }

    pub fn can_undo(&self) -> bool {
        self.history.read().map(|h| h.can_undo()).unwrap_or(false)
    }

    pub fn can_redo(&self) -> bool {
        self.history.read().map(|h| h.can_redo()).unwrap_or(false)
    }

    /// Push any debounced capture through now.
    pub fn flush_history(&self) -> Result<()> {
        match &self.recorder {
            Some(recorder) => recorder.flush(),
            None => Ok(()),
        }
    }

    pub fn save(
        &self,
        store: &dyn FlowStore,
    ) -> Result<()> {
        store.save(&self.flow_id, &self.graph.snapshot())
    }

    /// Open `flow_id` from `store` with a fresh history.
    pub fn load(
        store: &dyn FlowStore,
        flow_id: &str,
        config: &Config,
    ) -> Result<Self> {
        let snapshot = store.load(flow_id)?;
        let model = FlowModel {
            id: flow_id.to_string(),
            nodes: snapshot.nodes,
            edges: snapshot.edges,
            ..Default::default()
        };
        Ok(Self::from_model(model, config))
    }

    fn restore(
        &mut self,
        state: Option<crate::history::HistoryState>,
    ) -> bool {
        match state {
            Some(state) => {
                self.graph.replace(state.snapshot());
                tracing::debug!(flow_id = %self.flow_id, "history restored");
                true
            }
            None => false,
        }
    }

    fn to_execution_inputs(
        &self,
        inputs: Map<String, Value>,
    ) -> Map<String, Value> {
        let aliases = self.graph.aliases();
        inputs.into_iter().map(|(k, v)| (k, aliases.to_execution_value(&v))).collect()
    }

    fn cancel_pending(&self) {
        if let Some(recorder) = &self.recorder
            && let Err(err) = recorder.cancel()
        {
            tracing::warn!(error = %err, "failed to cancel pending history capture");
        }
    }

    /// Capture a debounced edit before the cursor moves.
    fn commit_pending(&mut self) {
        if !self.pending {
            return;
        }
        self.cancel_pending();
        self.pending = false;
        if let Ok(mut history) = self.history.write() {
            // the edit came after any earlier restore settled
            history.finish_restore();
        }
        let outcome = self.capture_now();
        tracing::debug!(flow_id = %self.flow_id, outcome = outcome.as_ref(), "pending edit committed");
    }

    fn capture(&mut self) {
        if self.bulk_build {
            return;
        }
        match &self.recorder {
            Some(recorder) => match recorder.record(self.graph.snapshot(), None) {
                Ok(()) => self.pending = true,
                Err(err) => tracing::warn!(error = %err, "failed to schedule history capture"),
            },
            None => {
                self.capture_now();
            }
        }
    }

    fn capture_now(&mut self) -> SaveOutcome {
        match self.history.write() {
            Ok(mut history) => history.save_state(self.graph.nodes(), self.graph.edges(), None),
            Err(err) => {
                tracing::warn!(error = %err, "history store lock poisoned");
                SaveOutcome::Failed
            }
        }
    }
}
