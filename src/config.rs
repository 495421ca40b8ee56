use std::{fs, path::Path};

use serde::Deserialize;

use crate::{FlowlineError, Result};

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// execution engine config
    pub engine: EngineConfig,
    /// undo/redo history config
    pub history: HistoryConfig,
    /// auto-layout config
    pub layout: LayoutConfig,
    /// transform sandbox limits
    pub sandbox: SandboxConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// iteration cap of a loop node without `maxIterations`
    pub default_max_iterations: usize,
    /// capacity of the run event bus
    pub event_queue_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_max_iterations: 500,
            event_queue_size: 2048,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct HistoryConfig {
    /// maximum number of snapshots kept, oldest evicted first
    pub max_size: usize,
    /// quiet period before a burst of edits is captured, in milliseconds
    pub debounce_ms: u64,
    /// window after undo/redo during which captures are suppressed, in milliseconds
    pub settle_ms: u64,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_size: 50,
            debounce_ms: 500,
            settle_ms: 100,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct LayoutConfig {
    /// gap between nodes of the same rank
    pub node_sep: f64,
    /// gap between ranks
    pub rank_sep: f64,
    /// footprint of nodes without a measured width
    pub node_width: f64,
    /// footprint of nodes without a measured height
    pub node_height: f64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            node_sep: 50.0,
            rank_sep: 80.0,
            node_width: 172.0,
            node_height: 36.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct SandboxConfig {
    /// heap limit of one script runtime
    pub memory_limit_bytes: usize,
    /// stack limit of one script runtime
    pub max_stack_bytes: usize,
    /// wall-clock budget of one evaluation
    pub timeout_ms: u64,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            memory_limit_bytes: 32 * 1024 * 1024,
            max_stack_bytes: 512 * 1024,
            timeout_ms: 2000,
        }
    }
}

impl Config {
    pub fn create<T: AsRef<Path>>(path: T) -> Result<Self> {
        let data = fs::read_to_string(path.as_ref()).map_err(|e| FlowlineError::Config(format!("failed to load config file {:?}: {}", path.as_ref(), e)))?;

        Self::load_from_str(data.as_str())
    }

    pub fn load_from_str(toml_str: &str) -> Result<Self> {
        let config = toml::from_str::<Config>(toml_str)?;
        if config.history.max_size == 0 {
            return Err(FlowlineError::Config("history.max_size must be at least 1".to_string()));
        }
        Ok(config)
    }
}
