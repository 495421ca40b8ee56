//! For-each execution of loop nodes.

use std::{collections::HashMap, time::Duration};

use futures::future::join_all;
use serde_json::{Map, Value, json};

use crate::{
    FlowlineError,
    dispatcher::dispatcher::is_eligible,
    events::NodeEvent,
    flow::LOOP_SEGMENT,
    model::{Edge, ErrorBehavior, LoopConfiguration, LoopType, Node, NodeId},
    runtime::{ExecutionContext, NodeRecord, NodeStatus},
};

const DEFAULT_SOURCE_FIELD: &str = "items";
const ITEMS_INPUT: &str = "items";
const RESULT_OUTPUT: &str = "result";

/// Outputs on success, or the partial outputs and the error message on failure.
pub(crate) type LoopOutcome = std::result::Result<Map<String, Value>, (Map<String, Value>, String)>;

pub(crate) struct LoopExecutor {
    default_max_iterations: usize,
}

/// One resolved iterable.
struct Iterable {
    items: Vec<Value>,
    /// set when the iterable comes from `linkedVariableId`
    linked: bool,
}

impl LoopExecutor {
    pub fn new(default_max_iterations: usize) -> Self {
        Self {
            default_max_iterations,
        }
    }

    /// Run the body of `node` once per item of its iterable.
    pub async fn run(
        &self,
        node: &Node,
        inputs: &Map<String, Value>,
        ctx: &ExecutionContext,
    ) -> LoopOutcome {
        let config = node.data.loop_config.clone().unwrap_or_default();
        if !config.enabled {
            tracing::debug!(run_id = %ctx.run_id(), node_id = %node.id, "loop disabled, no iterations");
            return Ok(summary(Vec::new(), 0));
        }

        let iterable = resolve_iterable(&config, inputs, ctx).map_err(|err| (Map::new(), err.to_string()))?;
        let count = if iterable.linked {
            iterable.items.len()
        } else {
            iterable.items.len().min(config.max_iterations.unwrap_or(self.default_max_iterations))
        };
        let items: Vec<Value> = iterable.items.into_iter().take(count).map(|item| normalize_item(item, config.trims_whitespace())).collect();
        let children = ctx.child_nodes(&node.id);
        tracing::info!(run_id = %ctx.run_id(), node_id = %node.id, iterations = count, body = children.len(), loop_type = config.loop_type.as_ref(), "loop started");

        match config.loop_type {
            LoopType::Sync => self.run_sync(node, &config, &children, items, ctx).await,
            LoopType::Async => self.run_async(node, &config, &children, items, ctx).await,
        }
    }

    async fn run_sync(
        &self,
        node: &Node,
        config: &LoopConfiguration,
        children: &[Node],
        items: Vec<Value>,
        ctx: &ExecutionContext,
    ) -> LoopOutcome {
        let mut results = Vec::with_capacity(items.len());
        for (index, item) in items.into_iter().enumerate() {
            if index > 0 {
                delay(config).await;
            }
            if ctx.session().is_cancelled() {
                return Err(stopped(results, index, "loop cancelled".to_string()));
            }

            match run_iteration(node, config, children, index, item, ctx).await {
                Ok(result) => results.push(result),
                Err(error) => {
                    tracing::warn!(run_id = %ctx.run_id(), node_id = %node.id, index, error = %error, "loop iteration failed");
                    if config.error_handling == ErrorBehavior::Stop {
                        return Err(stopped(results, index + 1, error));
                    }
                    results.push(iteration_error(&error, index));
                }
            }
        }

        let total = results.len();
        Ok(summary(results, total))
    }

    async fn run_async(
        &self,
        node: &Node,
        config: &LoopConfiguration,
        children: &[Node],
        items: Vec<Value>,
        ctx: &ExecutionContext,
    ) -> LoopOutcome {
        // without a batch size iterations are dispatched one at a time
        let batch_size = config.batch_size.filter(|size| *size > 0).unwrap_or(1);
        let mut results = Vec::with_capacity(items.len());
        let indexed: Vec<(usize, Value)> = items.into_iter().enumerate().collect();

        for (batch_no, batch) in indexed.chunks(batch_size).enumerate() {
            if batch_no > 0 {
                delay(config).await;
            }
            if ctx.session().is_cancelled() {
                return Err(stopped(results, batch[0].0, "loop cancelled".to_string()));
            }

            let runs = batch.iter().map(|(index, item)| {
                let forked = ctx.fork();
                async move { run_iteration(node, config, children, *index, item.clone(), &forked).await }
            });
            let outcomes = join_all(runs).await;
            // every iteration of the batch has run by now
            let dispatched = batch.last().map(|(index, _)| index + 1).unwrap_or(results.len());

            for ((index, _), outcome) in batch.iter().zip(outcomes) {
                match outcome {
                    Ok(result) => results.push(result),
                    Err(error) => {
                        tracing::warn!(run_id = %ctx.run_id(), node_id = %node.id, index, error = %error, "loop iteration failed");
                        if config.error_handling == ErrorBehavior::Stop {
                            return Err(stopped(results, dispatched, error));
                        }
                        results.push(iteration_error(&error, *index));
                    }
                }
            }
        }

        let total = results.len();
        Ok(summary(results, total))
    }
}

/// Bind the loop values of one iteration and run the body against `ctx`.
async fn run_iteration(
    node: &Node,
    config: &LoopConfiguration,
    children: &[Node],
    index: usize,
    item: Value,
    ctx: &ExecutionContext,
) -> std::result::Result<Value, String> {
    ctx.emit(&node.id, NodeEvent::LoopIteration(index));
    let iteration = json!(index as i64 + config.counter_start());
    ctx.set_output(&node.id, "currentItem", item.clone());
    ctx.set_output(&node.id, "currentIndex", json!(index));
    ctx.set_output(&node.id, "loop_iteration", iteration.clone());
    ctx.set_output(
        &node.id,
        LOOP_SEGMENT,
        json!({
            "currentItem": item,
            "currentIndex": index,
            "loop_iteration": iteration,
        }),
    );
    ctx.set_var(config.loop_variable(), item.clone());
    ctx.set_var(config.index_variable(), json!(index));

    let mut records: HashMap<NodeId, NodeRecord> = HashMap::new();
    let mut last: Option<Map<String, Value>> = None;
    for child in children {
        let inbound: Vec<Edge> = ctx.inbound_edges(&child.id).into_iter().filter(|e| children.iter().any(|c| c.id == e.source)).collect();
        let inbound: Vec<&Edge> = inbound.iter().collect();
        let record = if is_eligible(&inbound, &records, |source| source.to_string()) {
            ctx.execute_node(child).await.map_err(|err| err.to_string())?
        } else {
            ctx.emit(&child.id, NodeEvent::Skipped);
            NodeRecord::skipped(&child.id)
        };

        if record.is_failed() && child.data.error_behavior == ErrorBehavior::Stop {
            return Err(format!("node '{}' failed: {}", child.id, record.error.clone().unwrap_or_default()));
        }
        if record.status == NodeStatus::Succeeded {
            last = Some(record.outputs.clone());
        }
        records.insert(child.id.clone(), record);
    }

    Ok(match last {
        Some(mut outputs) => outputs.remove(RESULT_OUTPUT).unwrap_or(Value::Object(outputs)),
        None => item,
    })
}

fn resolve_iterable(
    config: &LoopConfiguration,
    inputs: &Map<String, Value>,
    ctx: &ExecutionContext,
) -> crate::Result<Iterable> {
    if let Some(linked) = config.linked_variable_id.as_deref().map(strip_braces).filter(|p| !p.is_empty()) {
        let value = ctx.lookup(linked).ok_or_else(|| FlowlineError::Loop(format!("linked variable '{}' not found", linked)))?;
        return Ok(Iterable {
            items: as_array(value, linked)?,
            linked: true,
        });
    }

    if let Some(source) = config.source_node_id.as_deref().filter(|s| !s.is_empty()) {
        let field = config.source_field.as_deref().filter(|s| !s.is_empty()).unwrap_or(DEFAULT_SOURCE_FIELD);
        let path = format!("{}.{}", source, field);
        let value = ctx.lookup(&path).ok_or_else(|| FlowlineError::Loop(format!("loop source '{}' not found", path)))?;
        return Ok(Iterable {
            items: as_array(value, &path)?,
            linked: false,
        });
    }

    match inputs.get(ITEMS_INPUT) {
        Some(value) => Ok(Iterable {
            items: as_array(value.clone(), ITEMS_INPUT)?,
            linked: false,
        }),
        None => Err(FlowlineError::Loop("loop has no source: set sourceNodeId, linkedVariableId or items".to_string())),
    }
}

/// Arrays pass through; strings holding a JSON array are parsed.
fn as_array(
    value: Value,
    path: &str,
) -> crate::Result<Vec<Value>> {
    match value {
        Value::Array(items) => Ok(items),
        Value::String(text) => match serde_json::from_str::<Value>(text.trim()) {
            Ok(Value::Array(items)) => Ok(items),
            _ => Err(FlowlineError::Loop(format!("'{}' is a string that does not hold a JSON array", path))),
        },
        other => Err(FlowlineError::Loop(format!("'{}' is not an array (got {})", path, kind(&other)))),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// `{{ a.b }}` and `a.b` both name the path `a.b`.
fn strip_braces(path: &str) -> &str {
    let trimmed = path.trim();
    trimmed.strip_prefix("{{").and_then(|p| p.strip_suffix("}}")).map(str::trim).unwrap_or(trimmed)
}

fn normalize_item(
    item: Value,
    trim: bool,
) -> Value {
    match item {
        Value::String(s) if trim => Value::String(s.trim().to_string()),
        other => other,
    }
}

async fn delay(config: &LoopConfiguration) {
    if let Some(ms) = config.delay_ms.filter(|ms| *ms > 0) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }
}

fn iteration_error(
    error: &str,
    index: usize,
) -> Value {
    json!({
        "error": error,
        "index": index,
    })
}

fn summary(
    results: Vec<Value>,
    total: usize,
) -> Map<String, Value> {
    let mut outputs = Map::new();
    outputs.insert("results".to_string(), Value::Array(results));
    outputs.insert("totalProcessed".to_string(), json!(total));
    outputs
}

fn stopped(
    results: Vec<Value>,
    total: usize,
    error: String,
) -> (Map<String, Value>, String) {
    let mut outputs = summary(results, total);
    outputs.insert("error".to_string(), Value::String(error.clone()));
    (outputs, error)
}
