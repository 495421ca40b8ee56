mod context;
mod run;
mod session;

pub use context::{ExecutionContext, NodeRunner};
pub use run::{FlowRun, NodeRecord, NodeStatus, RunStatus};
pub use session::Session;
