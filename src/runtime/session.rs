//! Editor/run session state that used to live in process-wide flags.

use std::{
    collections::HashMap,
    sync::{
        RwLock,
        atomic::{AtomicBool, Ordering},
    },
};

use serde_json::Value;

/// Session-scoped flags shared by an editor and the runs it starts.
///
/// A session is carried explicitly in every [`ExecutionContext`](crate::ExecutionContext);
/// nothing about it is global.
#[derive(Debug, Default)]
pub struct Session {
    cancelled: AtomicBool,
    attrs: RwLock<HashMap<String, Value>>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; loops stop at their next iteration boundary.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Clear a previous cancellation so the session can start another run.
    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }

    pub fn set_attr(
        &self,
        key: &str,
        value: Value,
    ) {
        if let Ok(mut attrs) = self.attrs.write() {
            attrs.insert(key.to_string(), value);
        }
    }

    pub fn attr(
        &self,
        key: &str,
    ) -> Option<Value> {
        self.attrs.read().ok().and_then(|attrs| attrs.get(key).cloned())
    }

    pub fn remove_attr(
        &self,
        key: &str,
    ) -> Option<Value> {
        self.attrs.write().ok().and_then(|mut attrs| attrs.remove(key))
    }
}
