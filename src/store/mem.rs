use std::{collections::HashMap, sync::RwLock};

use crate::{
    FlowlineError, Result,
    model::FlowSnapshot,
    store::{FlowRecord, FlowStore},
    utils,
};

/// In-memory [`FlowStore`].
#[derive(Debug, Default)]
pub struct MemFlowStore {
    records: RwLock<HashMap<String, FlowRecord>>,
}

impl MemFlowStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The raw stored record of `flow_id`.
    pub fn record(
        &self,
        flow_id: &str,
    ) -> Result<Option<FlowRecord>> {
        let records = self.records.read().map_err(map_lock_err)?;
        Ok(records.get(flow_id).cloned())
    }
}

fn map_lock_err<E: std::fmt::Display>(err: E) -> FlowlineError {
    FlowlineError::Store(err.to_string())
}

impl FlowStore for MemFlowStore {
    fn save(
        &self,
        flow_id: &str,
        snapshot: &FlowSnapshot,
    ) -> Result<()> {
        let data = serde_json::to_string(snapshot)?;
        let now = utils::time::time_millis();
        let mut records = self.records.write().map_err(map_lock_err)?;
        records
            .entry(flow_id.to_string())
            .and_modify(|r| {
                r.data = data.clone();
                r.update_time = now;
            })
            .or_insert_with(|| FlowRecord {
                id: flow_id.to_string(),
                data: data.clone(),
                create_time: now,
                update_time: now,
            });
        tracing::trace!(flow_id = %flow_id, "flow saved");
        Ok(())
    }

    fn load(
        &self,
        flow_id: &str,
    ) -> Result<FlowSnapshot> {
        let record = self.record(flow_id)?.ok_or_else(|| FlowlineError::Store(format!("flow '{}' not found", flow_id)))?;
        Ok(serde_json::from_str(&record.data)?)
    }

    fn exists(
        &self,
        flow_id: &str,
    ) -> Result<bool> {
        Ok(self.records.read().map_err(map_lock_err)?.contains_key(flow_id))
    }

    fn delete(
        &self,
        flow_id: &str,
    ) -> Result<bool> {
        Ok(self.records.write().map_err(map_lock_err)?.remove(flow_id).is_some())
    }

    fn list(&self) -> Result<Vec<String>> {
        let mut ids: Vec<String> = self.records.read().map_err(map_lock_err)?.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Edge, Node};

    fn snapshot() -> FlowSnapshot {
        FlowSnapshot {
            nodes: vec![Node::new("a-1", "trigger", "Start"), Node::new("b-1", "transform", "B")],
            edges: vec![Edge::new("e-a-1-b-1", "a-1", "b-1")],
        }
    }

    #[test]
    fn test_save_and_load() {
        let store = MemFlowStore::new();
        store.save("flow-1", &snapshot()).unwrap();
        assert!(store.exists("flow-1").unwrap());
        assert_eq!(store.load("flow-1").unwrap(), snapshot());
        assert_eq!(store.list().unwrap(), vec!["flow-1"]);
    }

    #[test]
    fn test_save_overwrites_keeping_create_time() {
        let store = MemFlowStore::new();
        store.save("flow-1", &snapshot()).unwrap();
        let created = store.record("flow-1").unwrap().unwrap().create_time;
        store.save("flow-1", &FlowSnapshot::default()).unwrap();
        let record = store.record("flow-1").unwrap().unwrap();
        assert_eq!(record.create_time, created);
        assert!(store.load("flow-1").unwrap().nodes.is_empty());
    }

    #[test]
    fn test_missing_and_delete() {
        let store = MemFlowStore::new();
        assert!(matches!(store.load("nope"), Err(FlowlineError::Store(_))));
        store.save("flow-1", &snapshot()).unwrap();
        assert!(store.delete("flow-1").unwrap());
        assert!(!store.delete("flow-1").unwrap());
    }
}
