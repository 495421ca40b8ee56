//! Edges connect node outputs to downstream nodes.

use serde::{Deserialize, Serialize};

use crate::model::NodeId;

/// Unique identifier for an edge within a flow.
pub type EdgeId = String;

/// How a node with several inbound edges reacts to dead inbound edges.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq, strum::AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JoinMode {
    /// Run when at least one inbound edge is live.
    #[default]
    Any,
    /// Run only when every inbound edge is live.
    All,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct JoinConfig {
    #[serde(default)]
    pub mode: JoinMode,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EdgeData {
    #[serde(default)]
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_config: Option<JoinConfig>,
}

/// Directed connection between two nodes.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    /// Unique edge identifier.
    pub id: EdgeId,
    /// ID of the source node.
    pub source: NodeId,
    /// ID of the target node.
    pub target: NodeId,
    /// Output port of the source, e.g. `true`/`false` on condition nodes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_handle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<EdgeData>,
}

impl Edge {
    pub fn new(
        id: impl Into<EdgeId>,
        source: impl Into<NodeId>,
        target: impl Into<NodeId>,
    ) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            target: target.into(),
            source_handle: None,
            data: None,
        }
    }

    pub fn with_handle(
        mut self,
        handle: impl Into<String>,
    ) -> Self {
        self.source_handle = Some(handle.into());
        self
    }

    pub fn with_join(
        mut self,
        mode: JoinMode,
    ) -> Self {
        let data = self.data.get_or_insert_with(EdgeData::default);
        data.join_config = Some(JoinConfig {
            mode,
        });
        self
    }

    /// Join mode declared on this edge, `Any` when unset.
    pub fn join_mode(&self) -> JoinMode {
        self.data.as_ref().and_then(|d| d.join_config.as_ref()).map(|j| j.mode).unwrap_or_default()
    }
}
