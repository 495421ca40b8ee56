mod models;
mod plugin;

pub use models::*;
pub use plugin::{HTTP_REQUEST_NODE_TYPE, HttpRequestPlugin};
