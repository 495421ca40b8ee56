use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::{
    Result,
    config::HistoryConfig,
    model::{Edge, FlowSnapshot, Node, NodeId},
    utils,
};

/// One captured graph state.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct HistoryState {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selection: Option<Vec<NodeId>>,
}

impl HistoryState {
    pub fn snapshot(&self) -> FlowSnapshot {
        FlowSnapshot {
            nodes: self.nodes.clone(),
            edges: self.edges.clone(),
        }
    }
}

/// What [`HistoryStore::save_state`] did with a capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::AsRefStr)]
pub enum SaveOutcome {
    Captured,
    /// structurally equal to the current entry
    Duplicate,
    /// an undo/redo is settling
    Suppressed,
    /// the state could not be serialized
    Failed,
}

/// Linear undo/redo stack of graph snapshots.
#[derive(Debug)]
pub struct HistoryStore {
    entries: Vec<HistoryState>,
    signatures: Vec<String>,
    cursor: usize,
    max_size: usize,
    settle: Duration,
    restore_until: Option<Instant>,
}

impl HistoryStore {
    pub fn new(
        max_size: usize,
        settle: Duration,
    ) -> Self {
        Self {
            entries: Vec::new(),
            signatures: Vec::new(),
            cursor: 0,
            max_size: max_size.max(1),
            settle,
            restore_until: None,
        }
    }

    pub fn from_config(config: &HistoryConfig) -> Self {
        Self::new(config.max_size, Duration::from_millis(config.settle_ms))
    }

    /// Capture a deep copy of `nodes` and `edges` as the newest entry.
    ///
    /// Entries after the cursor are discarded; the oldest entry is evicted
    /// once the stack is full.
    pub fn save_state(
        &mut self,
        nodes: &[Node],
        edges: &[Edge],
        selection: Option<Vec<NodeId>>,
    ) -> SaveOutcome {
        if self.is_restoring() {
            tracing::trace!("history capture suppressed while restoring");
            return SaveOutcome::Suppressed;
        }

        let signature = match signature(nodes, edges) {
            Ok(signature) => signature,
            Err(err) => {
                tracing::warn!(error = %err, "skip history capture");
                return SaveOutcome::Failed;
            }
        };
        if self.signatures.get(self.cursor) == Some(&signature) && !self.entries.is_empty() {
            return SaveOutcome::Duplicate;
        }

        if !self.entries.is_empty() {
            self.entries.truncate(self.cursor + 1);
            self.signatures.truncate(self.cursor + 1);
        }
        self.entries.push(HistoryState {
            nodes: nodes.to_vec(),
            edges: edges.to_vec(),
            timestamp: utils::time::time_millis(),
            selection,
        });
        self.signatures.push(signature);
        if self.entries.len() > self.max_size {
            self.entries.remove(0);
            self.signatures.remove(0);
        }
        self.cursor = self.entries.len() - 1;
        tracing::trace!(cursor = self.cursor, len = self.entries.len(), "history captured");
        SaveOutcome::Captured
    }

    /// Step back; `None` at the oldest entry.
    pub fn undo(&mut self) -> Option<HistoryState> {
        if !self.can_undo() {
            return None;
        }
        self.cursor -= 1;
        self.begin_restore();
        self.entries.get(self.cursor).cloned()
    }

    /// Step forward; `None` at the newest entry.
    pub fn redo(&mut self) -> Option<HistoryState> {
        if !self.can_redo() {
            return None;
        }
        self.cursor += 1;
        self.begin_restore();
        self.entries.get(self.cursor).cloned()
    }

    pub fn can_undo(&self) -> bool {
        !self.entries.is_empty() && self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor + 1 < self.entries.len()
    }

    pub fn clear_history(&mut self) {
        self.entries.clear();
        self.signatures.clear();
        self.cursor = 0;
        self.restore_until = None;
    }

    /// Whether captures are currently suppressed by an undo/redo.
    pub fn is_restoring(&self) -> bool {
        self.restore_until.is_some_and(|until| Instant::now() < until)
    }

    /// End the settle window early.
    pub fn finish_restore(&mut self) {
        self.restore_until = None;
    }

    pub fn current(&self) -> Option<&HistoryState> {
        self.entries.get(self.cursor)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    fn begin_restore(&mut self) {
        self.restore_until = Some(Instant::now() + self.settle);
    }
}

/// Deterministic structural signature: sorted node ids with their type,
/// parent and data, then sorted edge endpoints. Positions are not part of it.
pub fn signature(
    nodes: &[Node],
    edges: &[Edge],
) -> Result<String> {
    let mut node_parts = Vec::with_capacity(nodes.len());
    for node in nodes {
        node_parts.push(format!("{}|{}|{}|{}", node.id, node.node_type, node.parent_id.as_deref().unwrap_or(""), serde_json::to_string(&node.data)?));
    }
    node_parts.sort();

    let mut edge_parts: Vec<String> = edges.iter().map(|e| format!("{}->{}:{}", e.source, e.target, e.source_handle.as_deref().unwrap_or(""))).collect();
    edge_parts.sort();

    Ok(format!("{}\n{}", node_parts.join("\n"), edge_parts.join("\n")))
}
