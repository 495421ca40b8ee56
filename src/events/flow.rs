use crate::model::NodeId;

#[derive(Debug, Clone, PartialEq)]
pub enum FlowEvent {
    Start(FlowStartEvent),
    Completed,
    Failed(FlowFailedEvent),
}

impl FlowEvent {
    pub fn str(&self) -> &str {
        match self {
            FlowEvent::Start(_) => "Running",
            FlowEvent::Completed => "Completed",
            FlowEvent::Failed(_) => "Failed",
        }
    }
}

/// Event emitted when a run starts
#[derive(Debug, Clone, PartialEq)]
pub struct FlowStartEvent {
    /// top-level node ids in execution order
    pub node_ids: Vec<NodeId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FlowFailedEvent {
    pub error: String,
}
