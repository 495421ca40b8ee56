//! Human-readable aliases for node ids.
//!
//! Users write `{{Fetch_Users.data}}` while the engine stores and executes
//! `{{http_request-k3j9x0a2.data}}`. The registry is derived from node labels
//! and rebuilt whenever the node set changes; it is never the source of truth.

use std::collections::{BTreeMap, HashMap};

use serde_json::Value;

use crate::{
    common::Variables,
    flow::template::{self, CONTEXT_NAMESPACE, ENV_NAMESPACE, INPUT_NAMESPACE},
    model::{Node, NodeId},
};

/// Path segment under which loop-scoped values of a loop node live.
pub const LOOP_SEGMENT: &str = "_loop";

#[derive(Debug, Clone, Default)]
pub struct AliasRegistry {
    id_to_alias: HashMap<NodeId, String>,
    alias_to_id: HashMap<String, NodeId>,
}

impl AliasRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_nodes(nodes: &[Node]) -> Self {
        let mut registry = Self::new();
        registry.rebuild_from_nodes(nodes);
        registry
    }

    /// Recompute both maps from scratch.
    ///
    /// Nodes are processed in order; a node whose alias is already taken gets
    /// the first free `_2`, `_3`, ... suffix.
    pub fn rebuild_from_nodes(
        &mut self,
        nodes: &[Node],
    ) {
        self.id_to_alias.clear();
        self.alias_to_id.clear();

        for node in nodes {
            let mut base = sanitize(&node.data.label);
            if base.is_empty() {
                base = sanitize(&node.node_type);
            }
            if base.is_empty() {
                base = "node".to_string();
            }

            let mut alias = base.clone();
            let mut suffix = 2;
            while self.alias_to_id.contains_key(&alias) {
                alias = format!("{}_{}", base, suffix);
                suffix += 1;
            }

            self.alias_to_id.insert(alias.clone(), node.id.clone());
            self.id_to_alias.insert(node.id.clone(), alias);
        }
    }

    pub fn len(&self) -> usize {
        self.id_to_alias.len()
    }

    pub fn is_empty(&self) -> bool {
        self.id_to_alias.is_empty()
    }

    /// Alias of `nid`, or `nid` itself when the node is unknown.
    pub fn display_alias<'a>(
        &'a self,
        nid: &'a str,
    ) -> &'a str {
        self.id_to_alias.get(nid).map(String::as_str).unwrap_or(nid)
    }

    pub fn node_id(
        &self,
        alias: &str,
    ) -> Option<&str> {
        self.alias_to_id.get(alias).map(String::as_str)
    }

    /// Whether `segment` is a raw node id rather than an alias or a namespace.
    ///
    /// Known ids always qualify. Unknown segments qualify when they have the
    /// generated `<type>-<suffix>` shape; aliases never contain `-`.
    pub fn is_node_id_format(
        &self,
        segment: &str,
    ) -> bool {
        if matches!(segment, ENV_NAMESPACE | INPUT_NAMESPACE | CONTEXT_NAMESPACE) {
            return false;
        }
        if self.id_to_alias.contains_key(segment) {
            return true;
        }
        if self.alias_to_id.contains_key(segment) {
            return false;
        }
        segment.contains('-')
            && segment.chars().next().is_some_and(|c| c.is_ascii_alphabetic())
            && segment.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    }

    /// `http_request-1.data.items` becomes `Fetch_Users.data.items`.
    ///
    /// Only the first segment is translated, so `<id>._loop.currentItem`
    /// keeps its loop-internal tail. `env.*` and single-segment paths are
    /// returned unchanged.
    pub fn node_id_to_alias_path(
        &self,
        path: &str,
    ) -> String {
        let Some((head, rest)) = split_translatable(path) else {
            return path.to_string();
        };
        match self.id_to_alias.get(head) {
            Some(alias) => format!("{}.{}", alias, rest),
            None => path.to_string(),
        }
    }

    /// Inverse of [`Self::node_id_to_alias_path`].
    pub fn alias_to_node_id_path(
        &self,
        path: &str,
    ) -> String {
        let Some((head, rest)) = split_translatable(path) else {
            return path.to_string();
        };
        match self.alias_to_id.get(head) {
            Some(nid) => format!("{}.{}", nid, rest),
            None => path.to_string(),
        }
    }

    /// Rewrite every reference of a stored template into its display form.
    pub fn to_display_template(
        &self,
        template: &str,
    ) -> String {
        template::rewrite_paths(template, |path| self.node_id_to_alias_path(path))
    }

    /// Rewrite every reference of a user-written template into its stored form.
    pub fn to_execution_template(
        &self,
        template: &str,
    ) -> String {
        template::rewrite_paths(template, |path| self.alias_to_node_id_path(path))
    }

    /// [`Self::to_display_template`] over every string leaf.
    pub fn to_display_value(
        &self,
        value: &Value,
    ) -> Value {
        map_strings(value, &|s: &str| self.to_display_template(s))
    }

    /// [`Self::to_execution_template`] over every string leaf.
    pub fn to_execution_value(
        &self,
        value: &Value,
    ) -> Value {
        map_strings(value, &|s: &str| self.to_execution_template(s))
    }

    /// Run variables keyed by alias path instead of node id.
    pub fn display_variables(
        &self,
        vars: &Variables,
    ) -> BTreeMap<String, Value> {
        vars.iter().map(|(k, v)| (self.node_id_to_alias_path(k), v.clone())).collect()
    }
}

/// Split off the first segment of a path that is eligible for translation.
fn split_translatable(path: &str) -> Option<(&str, &str)> {
    let (head, rest) = path.split_once('.')?;
    if head == ENV_NAMESPACE {
        return None;
    }
    Some((head, rest))
}

/// Label to alias: whitespace and `-` become `_`, other punctuation is dropped.
fn sanitize(label: &str) -> String {
    let joined = label.split_whitespace().collect::<Vec<_>>().join("_");
    let cleaned: String = joined.chars().map(|c| if c == '-' { '_' } else { c }).filter(|c| c.is_ascii_alphanumeric() || *c == '_').collect();
    if cleaned.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        format!("node_{}", cleaned)
    } else {
        cleaned
    }
}

fn map_strings(
    value: &Value,
    f: &dyn Fn(&str) -> String,
) -> Value {
    match value {
        Value::String(s) => Value::String(f(s)),
        Value::Array(arr) => Value::Array(arr.iter().map(|v| map_strings(v, f)).collect()),
        Value::Object(obj) => Value::Object(obj.iter().map(|(k, v)| (k.clone(), map_strings(v, f))).collect()),
        _ => value.clone(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn nodes() -> Vec<Node> {
        vec![
            Node::new("trigger-a1", "trigger", "Start"),
            Node::new("http_request-b2", "http_request", "Fetch Users"),
            Node::new("http_request-c3", "http_request", "Fetch Users"),
            Node::new("for-each-loop-d4", "for-each-loop", ""),
            Node::new("transform-e5", "transform", "2x value!"),
        ]
    }

    #[test]
    fn test_rebuild_dedups_labels() {
        let registry = AliasRegistry::from_nodes(&nodes());
        assert_eq!(registry.len(), 5);
        assert_eq!(registry.display_alias("trigger-a1"), "Start");
        assert_eq!(registry.display_alias("http_request-b2"), "Fetch_Users");
        assert_eq!(registry.display_alias("http_request-c3"), "Fetch_Users_2");
        assert_eq!(registry.display_alias("for-each-loop-d4"), "for_each_loop");
        assert_eq!(registry.display_alias("transform-e5"), "node_2x_value");
        assert_eq!(registry.display_alias("unknown-z9"), "unknown-z9");
        assert_eq!(registry.node_id("Fetch_Users_2"), Some("http_request-c3"));
    }

    #[test]
    fn test_rebuild_is_idempotent() {
        let mut registry = AliasRegistry::from_nodes(&nodes());
        registry.rebuild_from_nodes(&nodes());
        assert_eq!(registry.len(), 5);
        assert_eq!(registry.display_alias("http_request-c3"), "Fetch_Users_2");

        registry.rebuild_from_nodes(&nodes()[..1]);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.display_alias("http_request-b2"), "http_request-b2");
    }

    #[test]
    fn test_suffix_skips_taken_alias() {
        let registry = AliasRegistry::from_nodes(&[Node::new("a-1", "t", "A_2"), Node::new("a-2", "t", "A"), Node::new("a-3", "t", "A")]);
        assert_eq!(registry.display_alias("a-3"), "A_3");
    }

    #[test]
    fn test_path_translation() {
        let registry = AliasRegistry::from_nodes(&nodes());
        assert_eq!(registry.node_id_to_alias_path("http_request-b2.data.items"), "Fetch_Users.data.items");
        assert_eq!(registry.alias_to_node_id_path("Fetch_Users.data.items"), "http_request-b2.data.items");
        assert_eq!(registry.node_id_to_alias_path("for-each-loop-d4._loop.currentItem"), "for_each_loop._loop.currentItem");
        assert_eq!(registry.node_id_to_alias_path("env.BASE"), "env.BASE");
        assert_eq!(registry.alias_to_node_id_path("env.BASE"), "env.BASE");
        assert_eq!(registry.node_id_to_alias_path("trigger-a1"), "trigger-a1");
        assert_eq!(registry.node_id_to_alias_path("item.value"), "item.value");
    }

    #[test]
    fn test_round_trip_for_known_ids() {
        let list = nodes();
        let registry = AliasRegistry::from_nodes(&list);
        for node in &list {
            for tail in ["x", "data.items.0", "_loop.currentIndex"] {
                let path = format!("{}.{}", node.id, tail);
                assert_eq!(registry.alias_to_node_id_path(&registry.node_id_to_alias_path(&path)), path);
            }
        }
    }

    #[test]
    fn test_round_trip_when_alias_shadows_id() {
        let list = vec![Node::new("start", "trigger", "x"), Node::new("b-1", "transform", "start")];
        let registry = AliasRegistry::from_nodes(&list);
        for path in ["start.f", "b-1.f"] {
            assert_eq!(registry.alias_to_node_id_path(&registry.node_id_to_alias_path(path)), path);
        }
    }

    #[test]
    fn test_is_node_id_format() {
        let registry = AliasRegistry::from_nodes(&nodes());
        assert!(registry.is_node_id_format("http_request-b2"));
        assert!(registry.is_node_id_format("webhook-zz99"));
        assert!(!registry.is_node_id_format("Fetch_Users"));
        assert!(!registry.is_node_id_format("env"));
        assert!(!registry.is_node_id_format("item"));
        assert!(!registry.is_node_id_format("-leading"));
    }

    #[test]
    fn test_template_translation() {
        let registry = AliasRegistry::from_nodes(&nodes());
        let stored = "GET {{env.BASE}}/u/{{ http_request-b2.data.id }}?i={{item}}";
        let display = registry.to_display_template(stored);
        assert_eq!(display, "GET {{env.BASE}}/u/{{ Fetch_Users.data.id }}?i={{item}}");
        assert_eq!(registry.to_execution_template(&display), stored);

        let value = json!({"url": "{{Fetch_Users.url}}", "list": ["{{Start.payload}}", 1]});
        assert_eq!(registry.to_execution_value(&value), json!({"url": "{{http_request-b2.url}}", "list": ["{{trigger-a1.payload}}", 1]}));
    }

    #[test]
    fn test_display_variables() {
        let registry = AliasRegistry::from_nodes(&nodes());
        let mut vars = Variables::new();
        vars.set_output("http_request-b2", "status_code", 200);
        vars.set("item", 1);
        let display = registry.display_variables(&vars);
        assert_eq!(display["Fetch_Users.status_code"], json!(200));
        assert_eq!(display["item"], json!(1));
    }
}
