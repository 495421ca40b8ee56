//! Result records of a flow run.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    common::Variables,
    flow::AliasRegistry,
    model::NodeId,
};

/// Run state machine: `Idle -> Running -> Completed | Failed`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq, strum::AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RunStatus {
    #[default]
    Idle,
    Running,
    Completed,
    Failed,
}

/// Terminal state of one node within a run.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, strum::AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum NodeStatus {
    Succeeded,
    Failed,
    /// not reached: every inbound edge was dead, or the run was cancelled
    Skipped,
    /// passed through without executing
    Disabled,
}

impl NodeStatus {
    /// Whether downstream edges leaving a node in this state can fire.
    pub fn passes_through(&self) -> bool {
        matches!(self, NodeStatus::Succeeded | NodeStatus::Disabled)
    }
}

/// Outcome of executing a single node.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct NodeRecord {
    pub node_id: NodeId,
    pub status: NodeStatus,
    /// outputs written to the run variables
    pub outputs: Map<String, Value>,
    pub error: Option<String>,
    pub start_time: i64,
    pub end_time: i64,
}

impl NodeRecord {
    pub fn succeeded(
        node_id: &str,
        outputs: Map<String, Value>,
    ) -> Self {
        Self::new(node_id, NodeStatus::Succeeded, outputs, None)
    }

    pub fn failed(
        node_id: &str,
        outputs: Map<String, Value>,
        error: String,
    ) -> Self {
        Self::new(node_id, NodeStatus::Failed, outputs, Some(error))
    }

    pub fn skipped(node_id: &str) -> Self {
        Self::new(node_id, NodeStatus::Skipped, Map::new(), None)
    }

    pub fn disabled(node_id: &str) -> Self {
        Self::new(node_id, NodeStatus::Disabled, Map::new(), None)
    }

    fn new(
        node_id: &str,
        status: NodeStatus,
        outputs: Map<String, Value>,
        error: Option<String>,
    ) -> Self {
        let now = crate::utils::time::time_millis();
        Self {
            node_id: node_id.to_string(),
            status,
            outputs,
            error,
            start_time: now,
            end_time: now,
        }
    }

    /// Stamp the record with the time its node started.
    pub fn started_at(
        mut self,
        start_time: i64,
    ) -> Self {
        self.start_time = start_time;
        self
    }

    pub fn is_failed(&self) -> bool {
        self.status == NodeStatus::Failed
    }
}

/// Everything a caller learns about a finished run.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct FlowRun {
    pub run_id: String,
    pub flow_id: String,
    pub status: RunStatus,
    /// final run variables, keyed by `"<nodeId>.<field>"`
    pub variables: Variables,
    /// node records in execution order
    pub records: Vec<NodeRecord>,
    /// message of the failure that ended the run
    pub error: Option<String>,
    pub start_time: i64,
    pub end_time: i64,
}

impl FlowRun {
    pub fn is_completed(&self) -> bool {
        self.status == RunStatus::Completed
    }

    pub fn record(
        &self,
        nid: &str,
    ) -> Option<&NodeRecord> {
        self.records.iter().find(|r| r.node_id == nid)
    }

    pub fn status_of(
        &self,
        nid: &str,
    ) -> Option<NodeStatus> {
        self.record(nid).map(|r| r.status)
    }

    /// Output `field` of node `nid`.
    pub fn output(
        &self,
        nid: &str,
        field: &str,
    ) -> Option<&Value> {
        self.variables.get(&format!("{}.{}", nid, field))
    }

    /// The run variables keyed by alias path, as shown to users.
    pub fn display_variables(
        &self,
        aliases: &AliasRegistry,
    ) -> std::collections::BTreeMap<String, Value> {
        aliases.display_variables(&self.variables)
    }
}
