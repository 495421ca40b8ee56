//! # Flowline
//!
//! Flowline is an embeddable flow automation engine written in Rust.
//! A flow is a graph of typed nodes; each node is executed by a plugin whose
//! inputs are bound from the outputs of upstream nodes through `{{ }}` templates.
//!
//! ## Core Features
//!
//! - **Template Binding**: `{{ nodeId.field }}`, `{{ env.NAME }}`, `{{ input.* }}` resolved against run variables
//! - **Human-Readable Aliases**: users write `{{Fetch_Users.data}}`, flows store node ids
//! - **For-Each Loops**: sync or batched async iteration over arrays with per-loop error policy
//! - **Sandboxed Transforms**: JavaScript expressions evaluated in QuickJS with memory and time limits
//! - **Editor Support**: flow graph mutations, undo/redo history with debounced capture, auto-layout
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use flowline::{EngineBuilder, FlowModel, RunOptions};
//!
//! let engine = EngineBuilder::new().build()?;
//! let flow = FlowModel::from_json(json_str)?;
//! let run = engine.run(&flow, RunOptions::new().env("BASE", "http://api")).await;
//! println!("{:?}", run.output("for-each-loop-1", "results"));
//! ```

mod builder;
mod common;
pub mod config;
mod dispatcher;
mod engine;
mod error;
pub mod events;
pub mod flow;
pub mod history;
mod model;
pub mod runtime;
pub mod store;
mod utils;

use std::sync::{Arc, RwLock};

pub use builder::EngineBuilder;
pub use common::{BroadcastQueue, Variables};
pub use config::Config;
pub use engine::{Engine, RunOptions};
pub use error::FlowlineError;
pub use flow::{
    AliasRegistry, FlowEditor, FlowGraph, LayoutDirection, TemplateScope,
    plugins::{FunctionInvoker, HttpFunctionInvoker, InvokeResponse, NodeInput, NodeOutput, NodePlugin, PluginRegistry, RemoteOperation},
};
pub use history::{HistoryRecorder, HistoryStore, SaveOutcome};
pub use model::*;
pub use runtime::{ExecutionContext, FlowRun, NodeRecord, NodeStatus, RunStatus, Session};
pub use store::{FlowStore, MemFlowStore};

/// Result type alias for Flowline operations.
pub type Result<T> = std::result::Result<T, FlowlineError>;

/// Thread-safe shared lock wrapper using Arc<RwLock<T>>.
pub(crate) type ShareLock<T> = Arc<RwLock<T>>;
