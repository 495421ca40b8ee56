//! Variable store threaded through a single flow run.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Flat variable map of one run.
///
/// Node outputs live under `"<nodeId>.<field>"`; loop-scoped values may also
/// be bound under bare names such as `item`. Keys are ordered so that every
/// rendering of the map is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Variables {
    inner: BTreeMap<String, Value>,
}

impl Variables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(
        &mut self,
        key: impl Into<String>,
        value: impl Into<Value>,
    ) {
        self.inner.insert(key.into(), value.into());
    }

    /// Write `value` under `"<nid>.<field>"`.
    pub fn set_output(
        &mut self,
        nid: &str,
        field: &str,
        value: impl Into<Value>,
    ) {
        self.inner.insert(format!("{}.{}", nid, field), value.into());
    }

    pub fn get(
        &self,
        key: &str,
    ) -> Option<&Value> {
        self.inner.get(key)
    }

    pub fn remove(
        &mut self,
        key: &str,
    ) -> Option<Value> {
        self.inner.remove(key)
    }

    pub fn contains_key(
        &self,
        key: &str,
    ) -> bool {
        self.inner.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.inner.iter()
    }

    /// All outputs written by `nid`, keyed by field name.
    pub fn outputs_of(
        &self,
        nid: &str,
    ) -> Map<String, Value> {
        let prefix = format!("{}.", nid);
        self.inner
            .range(prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(&prefix))
            .map(|(k, v)| (k[prefix.len()..].to_string(), v.clone()))
            .collect()
    }

    /// Look up a dotted path.
    ///
    /// An exact key wins; otherwise the longest key that is a prefix of the
    /// path is taken and the remaining segments are walked into its value.
    pub fn lookup(
        &self,
        path: &str,
    ) -> Option<Value> {
        if let Some(v) = self.inner.get(path) {
            return Some(v.clone());
        }

        let split_points: Vec<usize> = path.match_indices('.').map(|(i, _)| i).collect();
        for &i in split_points.iter().rev() {
            if let Some(v) = self.inner.get(&path[..i]) {
                return walk(v, path[i + 1..].split('.')).cloned();
            }
        }
        None
    }

    /// Nest the flat keys into a scope object: `"n1.items"` becomes `{"n1": {"items": ..}}`.
    pub fn to_scope(&self) -> Value {
        let mut scope = Map::new();
        for (key, value) in self.inner.iter() {
            match key.split_once('.') {
                Some((nid, field)) => {
                    let entry = scope.entry(nid.to_string()).or_insert_with(|| Value::Object(Map::new()));
                    if !entry.is_object() {
                        *entry = Value::Object(Map::new());
                    }
                    if let Value::Object(fields) = entry {
                        fields.insert(field.to_string(), value.clone());
                    }
                }
                None => {
                    scope.entry(key.clone()).or_insert_with(|| value.clone());
                }
            }
        }
        Value::Object(scope)
    }
}

impl From<Variables> for Value {
    fn from(vars: Variables) -> Self {
        Value::Object(vars.inner.into_iter().collect())
    }
}

impl FromIterator<(String, Value)> for Variables {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            inner: iter.into_iter().collect(),
        }
    }
}

/// Walk `segments` into `value`. Objects are indexed by key, arrays by position.
pub(crate) fn walk<'a, 'p>(
    value: &'a Value,
    segments: impl IntoIterator<Item = &'p str>,
) -> Option<&'a Value> {
    let mut current = value;
    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(arr) => arr.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}
