//! Persistence boundary for flow graphs.
//!
//! The engine never depends on a storage format; editors save and load
//! through a [`FlowStore`]. `MemFlowStore` keeps documents in memory.

mod mem;

use serde::{Deserialize, Serialize};

use crate::{Result, model::FlowSnapshot};

pub use mem::MemFlowStore;

/// A stored flow document.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct FlowRecord {
    pub id: String,
    /// serialized [`FlowSnapshot`]
    pub data: String,
    pub create_time: i64,
    pub update_time: i64,
}

/// Storage of flow snapshots keyed by flow id.
pub trait FlowStore: Send + Sync {
    /// Create or overwrite the snapshot of `flow_id`.
    fn save(
        &self,
        flow_id: &str,
        snapshot: &FlowSnapshot,
    ) -> Result<()>;

    /// Load the snapshot of `flow_id`; unknown ids are a `Store` error.
    fn load(
        &self,
        flow_id: &str,
    ) -> Result<FlowSnapshot>;

    fn exists(
        &self,
        flow_id: &str,
    ) -> Result<bool>;

    /// Returns whether a record was deleted.
    fn delete(
        &self,
        flow_id: &str,
    ) -> Result<bool>;

    /// Stored flow ids, sorted.
    fn list(&self) -> Result<Vec<String>>;
}
