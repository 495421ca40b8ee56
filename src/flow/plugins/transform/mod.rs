mod plugin;
mod sandbox;

pub use plugin::{TRANSFORM_NODE_TYPE, TransformPlugin};
pub use sandbox::ScriptSandbox;
