//! Event types for flow runs.
//!
//! Events are published on the engine's broadcast bus while a run executes,
//! so editors can animate node states without polling.

mod flow;
mod node;

pub use flow::*;
pub use node::*;

use crate::model::NodeId;

/// Top-level event type of a run.
#[derive(Debug, Clone, PartialEq)]
pub enum GraphEvent {
    /// Run-level events (start, completed, failed).
    Flow(FlowEvent),
    /// Node-level events (running, succeeded, failed, ...).
    Node(NodeEvent),
}

/// Event message with its run and node.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Run that generated this event.
    pub run_id: String,
    /// Node that generated this event (empty for run events).
    pub nid: NodeId,
    pub event: GraphEvent,
}

impl GraphEvent {
    pub fn is_complete(&self) -> bool {
        matches!(self, GraphEvent::Flow(FlowEvent::Completed))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, GraphEvent::Flow(FlowEvent::Failed(_)))
    }

    /// Whether this event ends the run.
    pub fn is_terminal(&self) -> bool {
        self.is_complete() || self.is_error()
    }
}
