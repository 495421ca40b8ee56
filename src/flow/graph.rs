//! In-memory node and edge collections of the flow being edited.

use serde_json::{Map, Value};

use crate::{
    FlowlineError, Result,
    flow::AliasRegistry,
    model::{Edge, FlowSnapshot, LoopConfiguration, Node, Position},
    utils,
};

/// Owner of a flow's nodes and edges.
///
/// Every change to the node set rebuilds the alias registry, so aliases are
/// always derived from the current labels.
#[derive(Debug, Clone, Default)]
pub struct FlowGraph {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    aliases: AliasRegistry,
}

impl FlowGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: FlowSnapshot) -> Self {
        let mut graph = Self::new();
        graph.replace(snapshot);
        graph
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn aliases(&self) -> &AliasRegistry {
        &self.aliases
    }

    pub fn node(
        &self,
        nid: &str,
    ) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == nid)
    }

    pub fn edge(
        &self,
        eid: &str,
    ) -> Option<&Edge> {
        self.edges.iter().find(|e| e.id == eid)
    }

    pub fn snapshot(&self) -> FlowSnapshot {
        FlowSnapshot {
            nodes: self.nodes.clone(),
            edges: self.edges.clone(),
        }
    }

    /// Swap in a whole new node/edge set, e.g. a restored history entry.
    pub fn replace(
        &mut self,
        snapshot: FlowSnapshot,
    ) {
        self.nodes = snapshot.nodes;
        self.edges = snapshot.edges;
        self.aliases.rebuild_from_nodes(&self.nodes);
    }

    pub fn add_node(
        &mut self,
        node: Node,
    ) -> Result<()> {
        if self.node(&node.id).is_some() {
            return Err(FlowlineError::Node(format!("node '{}' already exists", node.id)));
        }
        if let Some(parent) = &node.parent_id
            && self.node(parent).is_none()
        {
            return Err(FlowlineError::Node(format!("parent node '{}' of '{}' does not exist", parent, node.id)));
        }
        tracing::trace!(node_id = %node.id, node_type = %node.node_type, "add node");
        self.nodes.push(node);
        self.aliases.rebuild_from_nodes(&self.nodes);
        Ok(())
    }

    /// Merge `inputs` into the node's inputs; a `null` value removes the key.
    pub fn update_node_inputs(
        &mut self,
        nid: &str,
        inputs: Map<String, Value>,
    ) -> Result<()> {
        let node = self.node_mut(nid)?;
        for (key, value) in inputs {
            if value.is_null() {
                node.data.inputs.remove(&key);
            } else {
                node.data.inputs.insert(key, value);
            }
        }
        Ok(())
    }

    pub fn rename_node(
        &mut self,
        nid: &str,
        label: &str,
    ) -> Result<()> {
        self.node_mut(nid)?.data.label = label.to_string();
        self.aliases.rebuild_from_nodes(&self.nodes);
        Ok(())
    }

    pub fn set_node_disabled(
        &mut self,
        nid: &str,
        disabled: bool,
    ) -> Result<()> {
        self.node_mut(nid)?.data.disabled = disabled;
        Ok(())
    }

    pub fn set_loop_config(
        &mut self,
        nid: &str,
        config: LoopConfiguration,
    ) -> Result<()> {
        self.node_mut(nid)?.data.loop_config = Some(config);
        Ok(())
    }

    pub fn move_node(
        &mut self,
        nid: &str,
        position: Position,
    ) -> Result<()> {
        self.node_mut(nid)?.position = position;
        Ok(())
    }

    /// Remove a node with its loop-body children and every attached edge.
    ///
    /// Returns the removed nodes, the requested one first.
    pub fn remove_node(
        &mut self,
        nid: &str,
    ) -> Result<Vec<Node>> {
        if self.node(nid).is_none() {
            return Err(FlowlineError::Node(format!("node '{}' does not exist", nid)));
        }

        let mut doomed = vec![nid.to_string()];
        let mut i = 0;
        while i < doomed.len() {
            let parent = doomed[i].clone();
            doomed.extend(self.nodes.iter().filter(|n| n.parent_id.as_deref() == Some(parent.as_str())).map(|n| n.id.clone()));
            i += 1;
        }

        let mut removed = Vec::new();
        for id in &doomed {
            if let Some(pos) = self.nodes.iter().position(|n| &n.id == id) {
                removed.push(self.nodes.remove(pos));
            }
        }
        self.edges.retain(|e| !doomed.contains(&e.source) && !doomed.contains(&e.target));
        self.aliases.rebuild_from_nodes(&self.nodes);
        tracing::trace!(node_id = %nid, removed = removed.len(), "remove node");
        Ok(removed)
    }

    pub fn add_edge(
        &mut self,
        edge: Edge,
    ) -> Result<()> {
        if self.edge(&edge.id).is_some() {
            return Err(FlowlineError::Edge(format!("edge '{}' already exists", edge.id)));
        }
        for end in [&edge.source, &edge.target] {
            if self.node(end).is_none() {
                return Err(FlowlineError::Edge(format!("edge '{}' references missing node '{}'", edge.id, end)));
            }
        }
        if edge.source == edge.target {
            return Err(FlowlineError::Edge(format!("edge '{}' connects node '{}' to itself", edge.id, edge.source)));
        }
        tracing::trace!(edge_id = %edge.id, source = %edge.source, target = %edge.target, "add edge");
        self.edges.push(edge);
        Ok(())
    }

    /// Add an edge `source -> target` with a generated id.
    pub fn connect(
        &mut self,
        source: &str,
        target: &str,
    ) -> Result<String> {
        let id = utils::edge_id(source, target);
        self.add_edge(Edge::new(&id, source, target))?;
        Ok(id)
    }

    pub fn remove_edge(
        &mut self,
        eid: &str,
    ) -> Result<Edge> {
        let pos = self.edges.iter().position(|e| e.id == eid).ok_or_else(|| FlowlineError::Edge(format!("edge '{}' does not exist", eid)))?;
        Ok(self.edges.remove(pos))
    }

    /// Apply the positions (and handle sides) of `laid_out` to matching nodes.
    pub fn apply_positions(
        &mut self,
        laid_out: &[Node],
    ) {
        for placed in laid_out {
            if let Some(node) = self.nodes.iter_mut().find(|n| n.id == placed.id) {
                node.position = placed.position;
                node.source_position = placed.source_position;
                node.target_position = placed.target_position;
            }
        }
    }

    fn node_mut(
        &mut self,
        nid: &str,
    ) -> Result<&mut Node> {
        self.nodes.iter_mut().find(|n| n.id == nid).ok_or_else(|| FlowlineError::Node(format!("node '{}' does not exist", nid)))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn graph() -> FlowGraph {
        let mut graph = FlowGraph::new();
        graph.add_node(Node::new("trigger-1", "trigger", "Start")).unwrap();
        graph.add_node(Node::new("loop-1", "for-each-loop", "Loop")).unwrap();
        graph.add_node(Node::new("transform-1", "transform", "Double").with_parent("loop-1")).unwrap();
        graph.connect("trigger-1", "loop-1").unwrap();
        graph.connect("loop-1", "transform-1").unwrap();
        graph
    }

    #[test]
    fn test_add_node_rebuilds_aliases() {
        let graph = graph();
        assert_eq!(graph.aliases().display_alias("transform-1"), "Double");
        assert_eq!(graph.nodes().len(), 3);
    }

    #[test]
    fn test_add_node_rejects_duplicates_and_orphans() {
        let mut graph = graph();
        assert!(graph.add_node(Node::new("trigger-1", "trigger", "Again")).is_err());
        assert!(graph.add_node(Node::new("x-1", "transform", "x").with_parent("missing-1")).is_err());
    }

    #[test]
    fn test_add_edge_validates_endpoints() {
        let mut graph = graph();
        assert!(matches!(graph.connect("trigger-1", "missing-1"), Err(FlowlineError::Edge(_))));
        assert!(graph.connect("trigger-1", "trigger-1").is_err());
        assert!(graph.connect("trigger-1", "loop-1").is_err());
    }

    #[test]
    fn test_rename_updates_alias() {
        let mut graph = graph();
        graph.rename_node("transform-1", "Triple it").unwrap();
        assert_eq!(graph.aliases().display_alias("transform-1"), "Triple_it");
        assert!(graph.rename_node("nope", "x").is_err());
    }

    #[test]
    fn test_update_inputs_merges() {
        let mut graph = graph();
        graph.update_node_inputs("transform-1", json!({"expression": "1", "data": 2}).as_object().unwrap().clone()).unwrap();
        graph.update_node_inputs("transform-1", json!({"data": null}).as_object().unwrap().clone()).unwrap();
        let inputs = &graph.node("transform-1").unwrap().data.inputs;
        assert_eq!(inputs.get("expression"), Some(&json!("1")));
        assert!(!inputs.contains_key("data"));
    }

    #[test]
    fn test_remove_node_cascades() {
        let mut graph = graph();
        let removed = graph.remove_node("loop-1").unwrap();
        assert_eq!(removed.iter().map(|n| n.id.as_str()).collect::<Vec<_>>(), vec!["loop-1", "transform-1"]);
        assert_eq!(graph.nodes().len(), 1);
        assert!(graph.edges().is_empty());
        assert_eq!(graph.aliases().len(), 1);
    }

    #[test]
    fn test_remove_edge() {
        let mut graph = graph();
        let edge = graph.remove_edge("e-trigger-1-loop-1").unwrap();
        assert_eq!(edge.target, "loop-1");
        assert!(graph.remove_edge("e-trigger-1-loop-1").is_err());
    }

    #[test]
    fn test_replace_from_snapshot() {
        let graph = graph();
        let restored = FlowGraph::from_snapshot(graph.snapshot());
        assert_eq!(restored.snapshot(), graph.snapshot());
        assert_eq!(restored.aliases().display_alias("loop-1"), "Loop");
    }
}
