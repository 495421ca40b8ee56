//! Error types for Flowline.
//!
//! All errors in Flowline are represented by the `FlowlineError` enum,
//! which provides specific variants for different error categories.

use std::{io::ErrorKind, string::FromUtf8Error};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unified error type for all Flowline operations.
///
/// Each variant represents a specific category of error that can occur
/// while editing a flow graph, binding templates, or running a flow.
#[derive(Deserialize, Serialize, Error, Debug, Clone, PartialEq)]
pub enum FlowlineError {
    /// Configuration parsing or validation errors.
    #[error("{0}")]
    Config(String),

    /// Data conversion errors (JSON, TOML, etc.).
    #[error("{0}")]
    Convert(String),

    /// Template parsing errors.
    #[error("{0}")]
    Template(String),

    /// Plugin registration or execution errors.
    #[error("{0}")]
    Plugin(String),

    /// No plugin registered for a node type.
    #[error("plugin not found for node type '{0}'")]
    PluginNotFound(String),

    /// Script execution errors (sandboxed JavaScript).
    #[error("{0}")]
    Script(String),

    /// Structured exception with error code.
    #[error("ecode: {ecode}, message: {message}")]
    Exception {
        ecode: String,
        message: String,
    },

    /// Runtime execution errors.
    #[error("{0}")]
    Runtime(String),

    /// Flow graph structure errors (cycles, dangling references).
    #[error("{0}")]
    Graph(String),

    /// Node definition or lookup errors.
    #[error("{0}")]
    Node(String),

    /// Edge definition errors.
    #[error("{0}")]
    Edge(String),

    /// Loop resolution or iteration errors.
    #[error("{0}")]
    Loop(String),

    /// History capture errors.
    #[error("{0}")]
    History(String),

    /// Persistence errors.
    #[error("{0}")]
    Store(String),

    /// I/O operation errors.
    #[error("{0}")]
    IoError(String),

    /// Message queue errors.
    #[error("{0}")]
    Queue(String),
}

impl From<FlowlineError> for String {
    fn from(val: FlowlineError) -> Self {
        val.to_string()
    }
}

impl From<std::io::Error> for FlowlineError {
    fn from(error: std::io::Error) -> Self {
        FlowlineError::IoError(error.to_string())
    }
}

impl From<FlowlineError> for std::io::Error {
    fn from(val: FlowlineError) -> Self {
        #[allow(clippy::io_other_error)]
        std::io::Error::new(ErrorKind::Other, val.to_string())
    }
}

impl From<FromUtf8Error> for FlowlineError {
    fn from(_: FromUtf8Error) -> Self {
        FlowlineError::Runtime("Error with utf-8 string convert".to_string())
    }
}

impl From<serde_json::Error> for FlowlineError {
    fn from(error: serde_json::Error) -> Self {
        FlowlineError::Convert(error.to_string())
    }
}

impl From<toml::de::Error> for FlowlineError {
    fn from(error: toml::de::Error) -> Self {
        FlowlineError::Config(error.to_string())
    }
}

impl From<jsonschema::ValidationError<'_>> for FlowlineError {
    fn from(error: jsonschema::ValidationError<'_>) -> Self {
        FlowlineError::Plugin(error.to_string())
    }
}
