//! Ranked auto-layout of a flow.

use std::collections::HashMap;

use petgraph::{
    Direction,
    graph::{DiGraph, NodeIndex},
    visit::{DfsEvent, EdgeRef, depth_first_search},
};
use serde::{Deserialize, Serialize};

use crate::{
    config::LayoutConfig,
    model::{Edge, HandleSide, Node, Position},
};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq, strum::AsRefStr, strum::EnumString)]
pub enum LayoutDirection {
    /// top to bottom
    #[default]
    TB,
    /// bottom to top
    BT,
    /// left to right
    LR,
    /// right to left
    RL,
}

impl LayoutDirection {
    fn is_horizontal(&self) -> bool {
        matches!(self, LayoutDirection::LR | LayoutDirection::RL)
    }

    fn is_reversed(&self) -> bool {
        matches!(self, LayoutDirection::BT | LayoutDirection::RL)
    }

    /// (target side, source side)
    fn handle_sides(&self) -> (HandleSide, HandleSide) {
        match self {
            LayoutDirection::TB => (HandleSide::Top, HandleSide::Bottom),
            LayoutDirection::BT => (HandleSide::Bottom, HandleSide::Top),
            LayoutDirection::LR => (HandleSide::Left, HandleSide::Right),
            LayoutDirection::RL => (HandleSide::Right, HandleSide::Left),
        }
    }
}

/// Place `nodes` in ranks along `direction`.
///
/// Ranks come from the longest path from a source, ignoring the back edges
/// of cycles; one barycenter sweep orders each rank. The result keeps the
/// input order and only changes positions and handle sides.
pub fn layout(
    nodes: &[Node],
    edges: &[Edge],
    direction: LayoutDirection,
    config: &LayoutConfig,
) -> Vec<Node> {
    let mut graph = DiGraph::<usize, ()>::new();
    let indices: Vec<NodeIndex> = (0..nodes.len()).map(|i| graph.add_node(i)).collect();
    let by_id: HashMap<&str, NodeIndex> = nodes.iter().zip(indices.iter()).map(|(n, idx)| (n.id.as_str(), *idx)).collect();
    for edge in edges {
        if let (Some(&s), Some(&t)) = (by_id.get(edge.source.as_str()), by_id.get(edge.target.as_str()))
            && s != t
        {
            graph.add_edge(s, t, ());
        }
    }

    let mut back_edges = Vec::new();
    depth_first_search(&graph, indices.iter().copied(), |event| {
        if let DfsEvent::BackEdge(u, v) = event {
            back_edges.push((u, v));
        }
    });
    graph.retain_edges(|g, e| g.edge_endpoints(e).is_some_and(|pair| !back_edges.contains(&pair)));

    let ranks = longest_path_ranks(&graph, &indices);
    let layers = order_layers(&graph, &indices, &ranks);

    let size = |i: usize| {
        let node = &nodes[i];
        let width = node.width.unwrap_or(config.node_width);
        let height = node.height.unwrap_or(config.node_height);
        if direction.is_horizontal() { (height, width) } else { (width, height) }
    };

    // main axis runs along the ranks, cross axis within a rank
    let mut placed: Vec<(f64, f64)> = vec![(0.0, 0.0); nodes.len()];
    let mut main = 0.0;
    for layer in &layers {
        let thickness = layer.iter().map(|&i| size(i).1).fold(0.0, f64::max);
        let span: f64 = layer.iter().map(|&i| size(i).0).sum::<f64>() + config.node_sep * (layer.len().saturating_sub(1)) as f64;
        let mut cross = -span / 2.0;
        for &i in layer {
            let (cross_size, main_size) = size(i);
            placed[i] = (cross, main + (thickness - main_size) / 2.0);
            cross += cross_size + config.node_sep;
        }
        main += thickness + config.rank_sep;
    }
    let total_main = (main - config.rank_sep).max(0.0);

    let (target_side, source_side) = direction.handle_sides();
    nodes
        .iter()
        .enumerate()
        .map(|(i, node)| {
            let (cross, mut along) = placed[i];
            if direction.is_reversed() {
                along = total_main - along - size(i).1;
            }
            let mut node = node.clone();
            node.position = if direction.is_horizontal() { Position::new(along, cross) } else { Position::new(cross, along) };
            node.target_position = Some(target_side);
            node.source_position = Some(source_side);
            node
        })
        .collect()
}

/// Rank of every node: 0 for sources, else one more than its highest predecessor.
fn longest_path_ranks(
    graph: &DiGraph<usize, ()>,
    indices: &[NodeIndex],
) -> Vec<usize> {
    let mut ranks = vec![0usize; indices.len()];
    // back edges are gone, so the graph is acyclic
    let order = petgraph::algo::toposort(graph, None).unwrap_or_else(|_| indices.to_vec());
    for idx in order {
        let rank = ranks[graph[idx]];
        for edge in graph.edges_directed(idx, Direction::Outgoing) {
            let target = graph[edge.target()];
            ranks[target] = ranks[target].max(rank + 1);
        }
    }
    ranks
}

/// Group nodes by rank and order each rank by the barycenter of its predecessors.
fn order_layers(
    graph: &DiGraph<usize, ()>,
    indices: &[NodeIndex],
    ranks: &[usize],
) -> Vec<Vec<usize>> {
    let depth = ranks.iter().copied().max().map(|r| r + 1).unwrap_or(0);
    let mut layers: Vec<Vec<usize>> = vec![Vec::new(); depth];
    for (i, rank) in ranks.iter().enumerate() {
        layers[*rank].push(i);
    }

    let mut slot = vec![0.0f64; ranks.len()];
    for layer in &layers {
        for (pos, &i) in layer.iter().enumerate() {
            slot[i] = pos as f64;
        }
    }

    for r in 1..layers.len() {
        let mut keyed: Vec<(f64, usize)> = layers[r]
            .iter()
            .map(|&i| {
                let preds: Vec<f64> = graph.neighbors_directed(indices[i], Direction::Incoming).map(|p| slot[graph[p]]).collect();
                let key = if preds.is_empty() { slot[i] } else { preds.iter().sum::<f64>() / preds.len() as f64 };
                (key, i)
            })
            .collect();
        keyed.sort_by(|a, b| a.0.total_cmp(&b.0));
        layers[r] = keyed.into_iter().map(|(_, i)| i).collect();
        for (pos, &i) in layers[r].iter().enumerate() {
            slot[i] = pos as f64;
        }
    }
    layers
}
