#[derive(Debug, Clone, PartialEq)]
pub enum NodeEvent {
    Running(i64),
    Succeeded(i64),
    Failed(String),
    Skipped,
    Disabled,
    /// a loop node started iteration `index` (0-based)
    LoopIteration(usize),
}

impl NodeEvent {
    pub fn str(&self) -> &str {
        match self {
            NodeEvent::Running(_) => "Running",
            NodeEvent::Succeeded(_) => "Succeeded",
            NodeEvent::Failed(_) => "Failed",
            NodeEvent::Skipped => "Skipped",
            NodeEvent::Disabled => "Disabled",
            NodeEvent::LoopIteration(_) => "LoopIteration",
        }
    }
}
