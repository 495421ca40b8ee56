use serde::{Deserialize, Serialize};

use crate::model::{ErrorBehavior, NodeId};

/// Default bound-name of the current item inside a loop body.
pub const DEFAULT_LOOP_VARIABLE: &str = "item";
/// Default bound-name of the current index inside a loop body.
pub const DEFAULT_INDEX_VARIABLE: &str = "index";

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq, strum::AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LoopType {
    /// One iteration after another against the shared variables.
    #[default]
    Sync,
    /// Iterations of a batch run concurrently on forked variables.
    Async,
}

/// Boolean flag that editors may store either as a JSON bool or as a string.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum Flag {
    Bool(bool),
    Text(String),
}

impl Flag {
    pub fn is_set(&self) -> bool {
        match self {
            Flag::Bool(b) => *b,
            Flag::Text(s) => !s.trim().eq_ignore_ascii_case("false"),
        }
    }
}

/// Settings of a for-each node.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LoopConfiguration {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_node_id: Option<NodeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_field: Option<String>,
    #[serde(default)]
    pub loop_type: LoopType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_iterations: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loop_variable_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_variable_name: Option<String>,
    /// variable path whose array drives the loop; its length overrides `max_iterations`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linked_variable_id: Option<String>,
    #[serde(default)]
    pub error_handling: ErrorBehavior,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loop_counter_start: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trim_whitespace: Option<Flag>,
}

fn default_enabled() -> bool {
    true
}

impl Default for LoopConfiguration {
    fn default() -> Self {
        Self {
            enabled: true,
            source_node_id: None,
            source_field: None,
            loop_type: LoopType::Sync,
            batch_size: None,
            delay_ms: None,
            max_iterations: None,
            loop_variable_name: None,
            index_variable_name: None,
            linked_variable_id: None,
            error_handling: ErrorBehavior::Stop,
            loop_counter_start: None,
            trim_whitespace: None,
        }
    }
}

impl LoopConfiguration {
    /// Loop over `<source_node_id>.<source_field>`.
    pub fn over(
        source_node_id: impl Into<NodeId>,
        source_field: impl Into<String>,
    ) -> Self {
        Self {
            source_node_id: Some(source_node_id.into()),
            source_field: Some(source_field.into()),
            ..Default::default()
        }
    }

    pub fn loop_variable(&self) -> &str {
        self.loop_variable_name.as_deref().filter(|s| !s.is_empty()).unwrap_or(DEFAULT_LOOP_VARIABLE)
    }

    pub fn index_variable(&self) -> &str {
        self.index_variable_name.as_deref().filter(|s| !s.is_empty()).unwrap_or(DEFAULT_INDEX_VARIABLE)
    }

    pub fn counter_start(&self) -> i64 {
        self.loop_counter_start.unwrap_or(1)
    }

    pub fn trims_whitespace(&self) -> bool {
        self.trim_whitespace.as_ref().map(Flag::is_set).unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_deserialize_editor_config() {
        let config: LoopConfiguration = serde_json::from_value(json!({
            "enabled": true,
            "sourceNodeId": "http_request-1",
            "sourceField": "items",
            "loopType": "async",
            "batchSize": 2,
            "delayMs": 100,
            "errorHandling": "continue",
            "trimWhitespace": "false"
        }))
        .unwrap();

        assert_eq!(config.loop_type, LoopType::Async);
        assert_eq!(config.batch_size, Some(2));
        assert_eq!(config.error_handling, ErrorBehavior::Continue);
        assert!(!config.trims_whitespace());
        assert_eq!(config.loop_variable(), "item");
        assert_eq!(config.index_variable(), "index");
        assert_eq!(config.counter_start(), 1);
    }

    #[test]
    fn test_flag_forms() {
        assert!(Flag::Bool(true).is_set());
        assert!(!Flag::Bool(false).is_set());
        assert!(!Flag::Text("false".to_string()).is_set());
        assert!(Flag::Text("true".to_string()).is_set());
        assert!(Flag::Text("".to_string()).is_set());
    }

    #[test]
    fn test_enabled_defaults_true() {
        let config: LoopConfiguration = serde_json::from_value(json!({})).unwrap();
        assert!(config.enabled);
        assert!(config.trims_whitespace());
    }
}
