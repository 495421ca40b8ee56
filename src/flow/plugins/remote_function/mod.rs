mod invoker;
mod plugin;

pub use invoker::{FunctionInvoker, HttpFunctionInvoker, InvokeResponse};
pub use plugin::{RemoteFunctionPlugin, RemoteOperation};
