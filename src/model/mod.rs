mod edge;
mod flow;
mod loop_config;
mod node;

pub use edge::{Edge, EdgeData, EdgeId, JoinConfig, JoinMode};
pub use flow::{FlowModel, FlowSnapshot};
pub use loop_config::{Flag, LoopConfiguration, LoopType};
pub use node::{ErrorBehavior, HandleSide, Node, NodeData, NodeId, Position};
