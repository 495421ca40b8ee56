mod queue;
mod shutdown;
mod vars;

pub use queue::{BroadcastQueue, Queue};
pub use shutdown::Shutdown;
pub use vars::Variables;

pub(crate) use vars::walk;
