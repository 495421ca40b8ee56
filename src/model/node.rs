use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::model::LoopConfiguration;

/// node id
pub type NodeId = String;

/// What happens to the run when a node's plugin fails.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq, strum::AsRefStr, strum::EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ErrorBehavior {
    /// Fail the whole run; nothing downstream executes.
    #[default]
    Stop,
    /// Record the error on the node and keep traversing.
    Continue,
}

/// Side of a node a connection handle is anchored to.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, strum::AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum HandleSide {
    Top,
    Bottom,
    Left,
    Right,
}

/// Canvas position of a node's top-left corner.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(
        x: f64,
        y: f64,
    ) -> Self {
        Self {
            x,
            y,
        }
    }
}

/// Editable payload of a node.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NodeData {
    /// user-facing label, source of the node's alias
    #[serde(default)]
    pub label: String,
    /// raw (possibly templated) input values
    #[serde(default)]
    pub inputs: Map<String, Value>,
    /// disabled nodes are passed through without executing
    #[serde(default)]
    pub disabled: bool,
    /// for-each configuration, only meaningful on loop nodes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loop_config: Option<LoopConfiguration>,
    #[serde(default)]
    pub error_behavior: ErrorBehavior,
}

/// A typed unit of work in a flow.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    /// immutable node id
    pub id: NodeId,
    /// plugin type
    #[serde(rename = "type")]
    pub node_type: String,
    pub data: NodeData,
    #[serde(default)]
    pub position: Position,
    /// enclosing loop node for loop-body children
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<NodeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_position: Option<HandleSide>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_position: Option<HandleSide>,
}

impl Node {
    pub fn new(
        id: impl Into<NodeId>,
        node_type: impl Into<String>,
        label: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            node_type: node_type.into(),
            data: NodeData {
                label: label.into(),
                ..Default::default()
            },
            position: Position::default(),
            parent_id: None,
            width: None,
            height: None,
            source_position: None,
            target_position: None,
        }
    }

    /// Replace the inputs with the fields of a JSON object; other values are ignored.
    pub fn with_inputs(
        mut self,
        inputs: Value,
    ) -> Self {
        if let Value::Object(map) = inputs {
            self.data.inputs = map;
        }
        self
    }

    pub fn with_parent(
        mut self,
        parent_id: impl Into<NodeId>,
    ) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn with_loop_config(
        mut self,
        config: LoopConfiguration,
    ) -> Self {
        self.data.loop_config = Some(config);
        self
    }

    pub fn with_error_behavior(
        mut self,
        behavior: ErrorBehavior,
    ) -> Self {
        self.data.error_behavior = behavior;
        self
    }

    pub fn with_disabled(
        mut self,
        disabled: bool,
    ) -> Self {
        self.data.disabled = disabled;
        self
    }

    pub fn with_size(
        mut self,
        width: f64,
        height: f64,
    ) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }
}
