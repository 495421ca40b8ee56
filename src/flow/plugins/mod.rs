//! Node plugin contract and the builtin plugins.

pub mod condition;
pub mod for_each;
pub mod http_request;
pub mod remote_function;
pub mod transform;
pub mod trigger;

mod registry;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{Result, runtime::ExecutionContext};

pub use condition::{BRANCH_KEY, ConditionPlugin};
pub use for_each::{FOR_EACH_NODE_TYPE, ForEachPlugin};
pub use http_request::HttpRequestPlugin;
pub use registry::PluginRegistry;
pub use remote_function::{FunctionInvoker, HttpFunctionInvoker, InvokeResponse, RemoteFunctionPlugin, RemoteOperation};
pub use transform::TransformPlugin;
pub use trigger::TriggerPlugin;

/// Editor widget of an input field.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq, strum::AsRefStr, strum::EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum InputType {
    #[default]
    Text,
    Select,
    Number,
    Code,
    Textarea,
    Boolean,
    Json,
}

/// One choice of a select input.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SelectOption {
    pub label: String,
    pub value: String,
}

/// Show an input only while `field` holds one of `values`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ShowWhen {
    pub field: String,
    pub values: Vec<Value>,
}

/// Static description of one input field of a plugin.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NodeInput {
    pub name: String,
    pub label: String,
    #[serde(rename = "type")]
    pub input_type: InputType,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<SelectOption>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_when: Option<ShowWhen>,
}

impl NodeInput {
    pub fn new(
        name: &str,
        input_type: InputType,
    ) -> Self {
        Self {
            name: name.to_string(),
            label: name.to_string(),
            input_type,
            required: false,
            default: None,
            options: Vec::new(),
            show_when: None,
        }
    }

    pub fn label(
        mut self,
        label: &str,
    ) -> Self {
        self.label = label.to_string();
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn default_value(
        mut self,
        value: Value,
    ) -> Self {
        self.default = Some(value);
        self
    }

    /// Select options given as `(label, value)` pairs.
    pub fn options(
        mut self,
        options: &[(&str, &str)],
    ) -> Self {
        self.options = options
            .iter()
            .map(|(label, value)| SelectOption {
                label: label.to_string(),
                value: value.to_string(),
            })
            .collect();
        self
    }

    pub fn show_when(
        mut self,
        field: &str,
        values: Vec<Value>,
    ) -> Self {
        self.show_when = Some(ShowWhen {
            field: field.to_string(),
            values,
        });
        self
    }

    /// Whether the input is visible given the current input values.
    pub fn is_visible(
        &self,
        current: &Map<String, Value>,
    ) -> bool {
        match &self.show_when {
            None => true,
            Some(cond) => current.get(&cond.field).is_some_and(|v| cond.values.contains(v)),
        }
    }
}

/// Static description of one output field of a plugin.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct NodeOutput {
    pub name: String,
    pub label: String,
}

impl NodeOutput {
    pub fn new(
        name: &str,
        label: &str,
    ) -> Self {
        Self {
            name: name.to_string(),
            label: label.to_string(),
        }
    }
}

#[async_trait]
pub trait NodePlugin: Send + Sync {
    /// Returns the node type this plugin handles, unique within a registry.
    fn node_type(&self) -> &str;

    /// Returns the static input fields of the node.
    fn inputs(&self) -> Vec<NodeInput>;

    /// Returns the output fields the node writes.
    ///
    /// A plugin that declares none has every key of its result written.
    fn outputs(&self) -> Vec<NodeOutput>;

    /// Returns additional input fields derived from already-chosen values.
    fn dynamic_inputs(
        &self,
        _current: &Map<String, Value>,
    ) -> Vec<NodeInput> {
        Vec::new()
    }

    /// Executes the node with its bound inputs.
    ///
    /// # Arguments
    ///
    /// * `inputs` - The node's inputs after template binding.
    /// * `ctx` - The [`ExecutionContext`] of the run, positioned at this node.
    ///
    /// # Returns
    ///
    /// Returns the result object, or an error that fails the node.
    async fn execute(
        &self,
        inputs: Map<String, Value>,
        ctx: &ExecutionContext,
    ) -> Result<Map<String, Value>>;
}

/// JSON schema of a set of inputs, as shown for the given current values.
///
/// Hidden inputs are left out of `required`.
pub fn input_schema(
    inputs: &[NodeInput],
    current: &Map<String, Value>,
) -> Value {
    let mut properties = Map::new();
    let mut required = Vec::new();
    for input in inputs {
        let mut property = match input.input_type {
            InputType::Number => serde_json::json!({ "type": "number" }),
            InputType::Boolean => serde_json::json!({ "type": "boolean" }),
            InputType::Json => serde_json::json!({}),
            InputType::Select if !input.options.is_empty() => {
                let values: Vec<&str> = input.options.iter().map(|o| o.value.as_str()).collect();
                serde_json::json!({ "type": "string", "enum": values })
            }
            _ => serde_json::json!({ "type": "string" }),
        };
        if let (Value::Object(prop), Some(default)) = (&mut property, &input.default) {
            prop.insert("default".to_string(), default.clone());
        }
        if input.required && input.is_visible(current) {
            required.push(Value::String(input.name.clone()));
        }
        properties.insert(input.name.clone(), property);
    }

    serde_json::json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

/// Validate bound input values against the schema of `inputs`.
pub fn validate_inputs(
    inputs: &[NodeInput],
    values: &Map<String, Value>,
) -> Result<()> {
    let schema = input_schema(inputs, values);
    let instance = Value::Object(values.clone());
    jsonschema::validate(&schema, &instance)?;
    Ok(())
}

/// Fill absent inputs with their declared defaults.
pub fn with_defaults(
    inputs: &[NodeInput],
    mut values: Map<String, Value>,
) -> Map<String, Value> {
    for input in inputs {
        if let Some(default) = &input.default {
            values.entry(input.name.clone()).or_insert_with(|| default.clone());
        }
    }
    values
}
