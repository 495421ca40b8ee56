//! Run driver for a single flow.
//!
//! The dispatcher is responsible for:
//! - Ordering the top-level nodes topologically
//! - Deciding whether a node is reachable through live inbound edges
//! - Binding inputs, invoking plugins and threading outputs into the run variables
//! - Handing loop nodes to the loop executor

use std::{
    collections::{BTreeSet, HashMap},
    sync::Arc,
};

use async_trait::async_trait;
use petgraph::{
    Direction,
    graph::{DiGraph, NodeIndex},
    visit::EdgeRef,
};
use serde_json::{Map, Value};

use crate::{
    FlowlineError,
    common::BroadcastQueue,
    config::EngineConfig,
    dispatcher::loops::LoopExecutor,
    events::{FlowEvent, FlowFailedEvent, FlowStartEvent, GraphEvent, Message, NodeEvent},
    flow::plugins::{BRANCH_KEY, FOR_EACH_NODE_TYPE, PluginRegistry},
    model::{Edge, ErrorBehavior, JoinMode, Node, NodeId},
    runtime::{ExecutionContext, FlowRun, NodeRecord, NodeRunner, RunStatus},
    utils,
};

const ERROR_KEY: &str = "error";

/// Executes one snapshot of a flow.
pub struct Dispatcher {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    plugins: Arc<PluginRegistry>,
    loops: LoopExecutor,
    events: Arc<BroadcastQueue<Message>>,
}

impl Dispatcher {
    pub fn new(
        nodes: Vec<Node>,
        edges: Vec<Edge>,
        plugins: Arc<PluginRegistry>,
        config: &EngineConfig,
        events: Arc<BroadcastQueue<Message>>,
    ) -> Self {
        Self {
            nodes,
            edges,
            plugins,
            loops: LoopExecutor::new(config.default_max_iterations),
            events,
        }
    }

    /// Walk the top-level graph to completion. Never returns an error:
    /// failures end up in the returned [`FlowRun`].
    pub async fn run(
        &self,
        ctx: &ExecutionContext,
    ) -> FlowRun {
        let start_time = utils::time::time_millis();
        let mut run = FlowRun {
            run_id: ctx.run_id().to_string(),
            flow_id: ctx.flow_id().to_string(),
            status: RunStatus::Running,
            variables: Default::default(),
            records: Vec::new(),
            error: None,
            start_time,
            end_time: start_time,
        };
        tracing::info!(run_id = %run.run_id, flow_id = %run.flow_id, nodes = self.nodes.len(), "flow run started");

        let top: Vec<&Node> = self.nodes.iter().filter(|n| self.top_level_ancestor(&n.id) == n.id).collect();
        let order = match self.top_level_order(&top) {
            Ok(order) => order,
            Err(err) => return self.finish(ctx, run, Some(err.to_string())),
        };
        self.publish(ctx, "", GraphEvent::Flow(FlowEvent::Start(FlowStartEvent {
            node_ids: order.iter().map(|n| n.id.clone()).collect(),
        })));

        let mut records: HashMap<NodeId, NodeRecord> = HashMap::new();
        let mut failure = None;
        for node in order {
            let inbound: Vec<&Edge> = self.edges.iter().filter(|e| self.top_level_ancestor(&e.target) == node.id && self.top_level_ancestor(&e.source) != node.id).collect();
            let record = if is_eligible(&inbound, &records, |source| self.top_level_ancestor(source)) {
                self.execute_node(node, ctx).await
            } else {
                tracing::debug!(run_id = %ctx.run_id(), node_id = %node.id, "node skipped");
                ctx.emit(&node.id, NodeEvent::Skipped);
                NodeRecord::skipped(&node.id)
            };

            let stop = record.is_failed() && node.data.error_behavior == ErrorBehavior::Stop;
            if stop {
                failure = Some(format!("node '{}' failed: {}", node.id, record.error.clone().unwrap_or_default()));
            }
            run.records.push(record.clone());
            records.insert(node.id.clone(), record);
            if stop {
                break;
            }
        }

        self.finish(ctx, run, failure)
    }

    fn finish(
        &self,
        ctx: &ExecutionContext,
        mut run: FlowRun,
        failure: Option<String>,
    ) -> FlowRun {
        run.variables = ctx.variables();
        run.end_time = utils::time::time_millis();
        match failure {
            Some(error) => {
                tracing::warn!(run_id = %run.run_id, flow_id = %run.flow_id, error = %error, "flow run failed");
                run.status = RunStatus::Failed;
                run.error = Some(error.clone());
                self.publish(ctx, "", GraphEvent::Flow(FlowEvent::Failed(FlowFailedEvent {
                    error,
                })));
            }
            None => {
                tracing::info!(run_id = %run.run_id, flow_id = %run.flow_id, "flow run completed");
                run.status = RunStatus::Completed;
                self.publish(ctx, "", GraphEvent::Flow(FlowEvent::Completed));
            }
        }
        run
    }

    fn publish(
        &self,
        ctx: &ExecutionContext,
        nid: &str,
        event: GraphEvent,
    ) {
        self.events.send(Message {
            run_id: ctx.run_id().to_string(),
            nid: nid.to_string(),
            event,
        });
    }

    /// Follow `parent_id` up to the node that lives at the top level.
    fn top_level_ancestor(
        &self,
        nid: &str,
    ) -> NodeId {
        let mut current = nid.to_string();
        let mut hops = 0;
        while let Some(parent) = self.nodes.iter().find(|n| n.id == current).and_then(|n| n.parent_id.clone()) {
            if !self.nodes.iter().any(|n| n.id == parent) || hops > self.nodes.len() {
                break;
            }
            current = parent;
            hops += 1;
        }
        current
    }

    /// Topological order of `scope`, ready nodes taken in node order.
    fn top_level_order<'a>(
        &self,
        scope: &[&'a Node],
    ) -> crate::Result<Vec<&'a Node>> {
        let attributed: Vec<(NodeId, NodeId)> = self.edges.iter().map(|e| (self.top_level_ancestor(&e.source), self.top_level_ancestor(&e.target))).collect();
        topological_order(scope, &attributed)
    }

    fn write_outputs(
        ctx: &ExecutionContext,
        nid: &str,
        outputs: &Map<String, Value>,
    ) {
        for (field, value) in outputs {
            ctx.set_output(nid, field, value.clone());
        }
    }

    async fn invoke_plugin(
        &self,
        node: &Node,
        inputs: Map<String, Value>,
        ctx: &ExecutionContext,
    ) -> std::result::Result<Map<String, Value>, (Map<String, Value>, String)> {
        if node.node_type == FOR_EACH_NODE_TYPE {
            return self.loops.run(node, &inputs, ctx).await;
        }

        let plugin = self.plugins.get_plugin(&node.node_type).ok_or_else(|| (Map::new(), FlowlineError::PluginNotFound(node.node_type.clone()).to_string()))?;
        let result = plugin.execute(inputs, ctx).await.map_err(|err| (Map::new(), err.to_string()))?;

        let declared = plugin.outputs();
        if declared.is_empty() {
            return Ok(result);
        }
        Ok(result.into_iter().filter(|(k, _)| declared.iter().any(|o| &o.name == k)).collect())
    }
}

#[async_trait]
impl NodeRunner for Dispatcher {
    fn child_nodes(
        &self,
        parent: &str,
    ) -> Vec<Node> {
        let children: Vec<&Node> = self.nodes.iter().filter(|n| n.parent_id.as_deref() == Some(parent)).collect();
        let pairs: Vec<(NodeId, NodeId)> = self.edges.iter().map(|e| (e.source.clone(), e.target.clone())).collect();
        // a cyclic body still runs, in node order
        topological_order(&children, &pairs).unwrap_or(children).into_iter().cloned().collect()
    }

    fn inbound_edges(
        &self,
        nid: &str,
    ) -> Vec<Edge> {
        self.edges.iter().filter(|e| e.target == nid).cloned().collect()
    }

    async fn execute_node(
        &self,
        node: &Node,
        ctx: &ExecutionContext,
    ) -> NodeRecord {
        let ctx = ctx.for_node(&node.id);
        let inputs = ctx.bind(&node.data.inputs);

        if node.data.disabled {
            tracing::debug!(run_id = %ctx.run_id(), node_id = %node.id, "node disabled");
            ctx.emit(&node.id, NodeEvent::Disabled);
            return NodeRecord::disabled(&node.id);
        }

        let start_time = utils::time::time_millis();
        ctx.emit(&node.id, NodeEvent::Running(start_time));
        tracing::debug!(run_id = %ctx.run_id(), node_id = %node.id, node_type = %node.node_type, "node running");

        match self.invoke_plugin(node, inputs, &ctx).await {
            Ok(outputs) => {
                Self::write_outputs(&ctx, &node.id, &outputs);
                ctx.emit(&node.id, NodeEvent::Succeeded(utils::time::time_millis()));
                NodeRecord::succeeded(&node.id, outputs).started_at(start_time)
            }
            Err((mut outputs, error)) => {
                tracing::warn!(run_id = %ctx.run_id(), node_id = %node.id, error = %error, "node failed");
                outputs.insert(ERROR_KEY.to_string(), Value::String(error.clone()));
                Self::write_outputs(&ctx, &node.id, &outputs);
                ctx.emit(&node.id, NodeEvent::Failed(error.clone()));
                NodeRecord::failed(&node.id, outputs, error).started_at(start_time)
            }
        }
    }
}

/// Kahn's algorithm over `scope`; edges with an endpoint outside the scope
/// or from a node to itself are ignored. Among ready nodes the one earliest
/// in `scope` goes first.
pub(crate) fn topological_order<'a>(
    scope: &[&'a Node],
    edges: &[(NodeId, NodeId)],
) -> crate::Result<Vec<&'a Node>> {
    let mut graph = DiGraph::<usize, ()>::new();
    let indices: Vec<NodeIndex> = (0..scope.len()).map(|i| graph.add_node(i)).collect();
    let by_id: HashMap<&str, NodeIndex> = scope.iter().zip(indices.iter()).map(|(n, idx)| (n.id.as_str(), *idx)).collect();
    for (source, target) in edges {
        if let (Some(&s), Some(&t)) = (by_id.get(source.as_str()), by_id.get(target.as_str()))
            && s != t
        {
            graph.add_edge(s, t, ());
        }
    }

    let mut in_degree: Vec<usize> = indices.iter().map(|&idx| graph.edges_directed(idx, Direction::Incoming).count()).collect();
    let mut ready: BTreeSet<usize> = (0..scope.len()).filter(|&i| in_degree[i] == 0).collect();
    let mut order = Vec::with_capacity(scope.len());
    while let Some(i) = ready.pop_first() {
        order.push(scope[i]);
        for edge in graph.edges_directed(indices[i], Direction::Outgoing) {
            let target = graph[edge.target()];
            in_degree[target] -= 1;
            if in_degree[target] == 0 {
                ready.insert(target);
            }
        }
    }

    if order.len() < scope.len() {
        let stuck: Vec<&str> = (0..scope.len()).filter(|&i| in_degree[i] > 0).map(|i| scope[i].id.as_str()).collect();
        return Err(FlowlineError::Graph(format!("flow contains a cycle through {}", stuck.join(", "))));
    }
    Ok(order)
}

/// Whether a node with these inbound edges may run.
///
/// An edge is live when its source passed (succeeded or disabled) and, if
/// the edge names a `sourceHandle` and the source produced a `branch`, the
/// two match. `record_of` maps an edge source to the node whose record
/// stands for it.
pub(crate) fn is_eligible<F>(
    inbound: &[&Edge],
    records: &HashMap<NodeId, NodeRecord>,
    record_of: F,
) -> bool
where
    F: Fn(&str) -> NodeId,
{
    if inbound.is_empty() {
        return true;
    }

    let live = |edge: &Edge| {
        let Some(record) = records.get(&record_of(&edge.source)) else {
            return false;
        };
        if !record.status.passes_through() {
            return false;
        }
        match (&edge.source_handle, record.outputs.get(BRANCH_KEY)) {
            (Some(handle), Some(branch)) => branch.as_str().map(|b| b == handle).unwrap_or_else(|| branch.to_string() == *handle),
            _ => true,
        }
    };

    if inbound.iter().any(|e| e.join_mode() == JoinMode::All) {
        inbound.iter().all(|e| live(e))
    } else {
        inbound.iter().any(|e| live(e))
    }
}
