mod models;
mod plugin;

pub use models::*;
pub use plugin::{BRANCH_FALSE, BRANCH_KEY, BRANCH_TRUE, CONDITION_NODE_TYPE, ConditionPlugin};
