use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use flowline::{
    AliasRegistry, Edge, Engine, EngineBuilder, ErrorBehavior, ExecutionContext, FlowModel, FlowlineError, JoinMode, LoopConfiguration, LoopType, Node, NodeInput, NodeOutput,
    NodePlugin, NodeStatus, Result, RunOptions, RunStatus,
    events::{FlowEvent, GraphEvent, NodeEvent},
};
use serde_json::{Map, Value, json};

/// Stands in for an HTTP call: echoes the bound url and returns two items.
struct Fetch;

#[async_trait]
impl NodePlugin for Fetch {
    fn node_type(&self) -> &str {
        "fetch"
    }

    fn inputs(&self) -> Vec<NodeInput> {
        Vec::new()
    }

    fn outputs(&self) -> Vec<NodeOutput> {
        Vec::new()
    }

    async fn execute(
        &self,
        inputs: Map<String, Value>,
        _ctx: &ExecutionContext,
    ) -> Result<Map<String, Value>> {
        let mut outputs = Map::new();
        outputs.insert("url".to_string(), inputs.get("url").cloned().unwrap_or(Value::Null));
        outputs.insert("items".to_string(), json!([{"value": 1}, {"value": 2}]));
        outputs.insert("success".to_string(), json!(true));
        Ok(outputs)
    }
}

/// Rejects the value 2, returns anything else as `result`.
#[derive(Default)]
struct Flaky {
    executions: Arc<AtomicUsize>,
}

#[async_trait]
impl NodePlugin for Flaky {
    fn node_type(&self) -> &str {
        "flaky"
    }

    fn inputs(&self) -> Vec<NodeInput> {
        Vec::new()
    }

    fn outputs(&self) -> Vec<NodeOutput> {
        vec![NodeOutput::new("result", "Result")]
    }

    async fn execute(
        &self,
        inputs: Map<String, Value>,
        _ctx: &ExecutionContext,
    ) -> Result<Map<String, Value>> {
        self.executions.fetch_add(1, Ordering::SeqCst);
        let value = inputs.get("value").cloned().unwrap_or(Value::Null);
        if value == json!(2) {
            return Err(FlowlineError::Plugin("value 2 rejected".to_string()));
        }
        let mut outputs = Map::new();
        outputs.insert("result".to_string(), value);
        outputs.insert("ignored".to_string(), json!("not a declared output"));
        Ok(outputs)
    }
}

fn engine() -> Engine {
    counting_engine().0
}

/// Engine plus the number of times the flaky plugin has executed.
fn counting_engine() -> (Engine, Arc<AtomicUsize>) {
    let flaky = Flaky::default();
    let executions = flaky.executions.clone();
    (EngineBuilder::new().plugin(Arc::new(Fetch)).plugin(Arc::new(flaky)).build().unwrap(), executions)
}

fn flow(
    nodes: Vec<Node>,
    edges: Vec<Edge>,
) -> FlowModel {
    FlowModel {
        id: "flow-1".to_string(),
        name: "test".to_string(),
        nodes,
        edges,
        ..Default::default()
    }
}

fn edge(
    source: &str,
    target: &str,
) -> Edge {
    Edge::new(format!("e-{}-{}", source, target), source, target)
}

fn fetch_loop_flow(loop_config: LoopConfiguration) -> FlowModel {
    flow(
        vec![
            Node::new("trigger-1", "trigger", "Start"),
            Node::new("fetch-1", "fetch", "Fetch").with_inputs(json!({"url": "{{env.BASE}}/x"})),
            Node::new("for-each-loop-1", "for-each-loop", "Loop").with_loop_config(loop_config),
            Node::new("transform-1", "transform", "Double").with_parent("for-each-loop-1").with_inputs(json!({"expression": "item.value * 2"})),
        ],
        vec![edge("trigger-1", "fetch-1"), edge("fetch-1", "for-each-loop-1")],
    )
}

#[tokio::test]
async fn test_fetch_loop_transform() {
    let engine = engine();
    let mut events = engine.subscribe();
    let flow = fetch_loop_flow(LoopConfiguration::over("fetch-1", "items"));

    let run = engine.run(&flow, RunOptions::new().env("BASE", "http://api")).await;
    assert_eq!(run.status, RunStatus::Completed, "{:?}", run.error);
    assert_eq!(run.output("fetch-1", "url"), Some(&json!("http://api/x")));
    assert_eq!(run.output("for-each-loop-1", "results"), Some(&json!([2, 4])));
    assert_eq!(run.output("for-each-loop-1", "totalProcessed"), Some(&json!(2)));
    assert_eq!(run.output("for-each-loop-1", "currentIndex"), Some(&json!(1)));
    assert_eq!(run.output("for-each-loop-1", "loop_iteration"), Some(&json!(2)));
    assert_eq!(run.output("transform-1", "result"), Some(&json!(4)));

    let top: Vec<&str> = run.records.iter().map(|r| r.node_id.as_str()).collect();
    assert_eq!(top, vec!["trigger-1", "fetch-1", "for-each-loop-1"]);

    let mut iterations = Vec::new();
    let mut first = None;
    let mut last = None;
    while let Ok(msg) = events.try_recv() {
        if first.is_none() {
            first = Some(msg.event.clone());
        }
        if let GraphEvent::Node(NodeEvent::LoopIteration(index)) = msg.event {
            iterations.push(index);
        }
        last = Some(msg.event);
    }
    assert_eq!(iterations, vec![0, 1]);
    match first {
        Some(GraphEvent::Flow(FlowEvent::Start(start))) => assert_eq!(start.node_ids, vec!["trigger-1", "fetch-1", "for-each-loop-1"]),
        other => panic!("unexpected first event {:?}", other),
    }
    assert!(last.is_some_and(|e| e.is_complete()));
}

#[tokio::test]
async fn test_async_loop_collects_in_order() {
    let config = LoopConfiguration {
        loop_type: LoopType::Async,
        batch_size: Some(1),
        ..LoopConfiguration::over("fetch-1", "items")
    };
    let run = engine().run(&fetch_loop_flow(config), RunOptions::new().env("BASE", "http://api")).await;
    assert!(run.is_completed(), "{:?}", run.error);
    assert_eq!(run.output("for-each-loop-1", "results"), Some(&json!([2, 4])));
}

fn flaky_loop_flow(handling: ErrorBehavior) -> FlowModel {
    flaky_loop_over(
        json!([1, 2, 3]),
        LoopConfiguration {
            error_handling: handling,
            ..Default::default()
        },
    )
}

fn flaky_loop_over(
    items: Value,
    loop_config: LoopConfiguration,
) -> FlowModel {
    flow(
        vec![
            Node::new("for-each-loop-1", "for-each-loop", "Loop").with_inputs(json!({"items": items})).with_loop_config(loop_config),
            Node::new("flaky-1", "flaky", "Flaky").with_parent("for-each-loop-1").with_inputs(json!({"value": "{{item}}"})),
            Node::new("fetch-1", "fetch", "After"),
        ],
        vec![edge("for-each-loop-1", "fetch-1")],
    )
}

#[tokio::test]
async fn test_loop_continue_records_iteration_errors() {
    let run = engine().run(&flaky_loop_flow(ErrorBehavior::Continue), RunOptions::new()).await;
    assert!(run.is_completed(), "{:?}", run.error);

    let results = run.output("for-each-loop-1", "results").cloned().unwrap();
    assert_eq!(results[0], json!(1));
    assert_eq!(results[1]["index"], json!(1));
    assert!(results[1]["error"].as_str().unwrap().contains("value 2 rejected"));
    assert_eq!(results[2], json!(3));
    assert_eq!(run.output("for-each-loop-1", "totalProcessed"), Some(&json!(3)));
    assert_eq!(run.status_of("fetch-1"), Some(NodeStatus::Succeeded));
    // undeclared outputs are dropped
    assert_eq!(run.output("flaky-1", "ignored"), None);
}

#[tokio::test]
async fn test_loop_stop_fails_the_run() {
    let run = engine().run(&flaky_loop_flow(ErrorBehavior::Stop), RunOptions::new()).await;
    assert_eq!(run.status, RunStatus::Failed);
    assert!(run.error.as_deref().unwrap().starts_with("node 'for-each-loop-1' failed"));
    assert_eq!(run.output("for-each-loop-1", "results"), Some(&json!([1])));
    assert_eq!(run.output("for-each-loop-1", "totalProcessed"), Some(&json!(2)));
    assert!(run.output("for-each-loop-1", "error").is_some());
    assert_eq!(run.status_of("for-each-loop-1"), Some(NodeStatus::Failed));
    assert!(run.record("fetch-1").is_none());
}

#[tokio::test]
async fn test_async_loop_stop_halts_remaining_items() {
    let (engine, executions) = counting_engine();
    let config = LoopConfiguration {
        loop_type: LoopType::Async,
        ..Default::default()
    };
    let run = engine.run(&flaky_loop_over(json!([1, 2, 3, 4, 5]), config), RunOptions::new()).await;

    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(executions.load(Ordering::SeqCst), 2);
    assert_eq!(run.output("for-each-loop-1", "results"), Some(&json!([1])));
    assert_eq!(run.output("for-each-loop-1", "totalProcessed"), Some(&json!(2)));
    assert_eq!(run.status_of("fetch-1"), None);
}

#[tokio::test]
async fn test_async_loop_stop_counts_dispatched_batch() {
    let (engine, executions) = counting_engine();
    let config = LoopConfiguration {
        loop_type: LoopType::Async,
        batch_size: Some(2),
        ..Default::default()
    };
    let run = engine.run(&flaky_loop_over(json!([1, 2, 3, 4, 5]), config), RunOptions::new()).await;

    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(executions.load(Ordering::SeqCst), 2);
    assert_eq!(run.output("for-each-loop-1", "totalProcessed"), Some(&json!(2)));
}

#[tokio::test]
async fn test_linked_variable_overrides_max_iterations() {
    let rows: Vec<Value> = (0..3).map(|i| json!({"id": i})).collect();
    let config = LoopConfiguration {
        linked_variable_id: Some("{{trigger-1.payload.rows}}".to_string()),
        max_iterations: Some(1),
        ..Default::default()
    };
    let flow = flow(
        vec![Node::new("trigger-1", "trigger", "Start"), Node::new("for-each-loop-1", "for-each-loop", "Loop").with_loop_config(config)],
        vec![edge("trigger-1", "for-each-loop-1")],
    );

    let run = engine().run(&flow, RunOptions::new().input(json!({"rows": rows.clone()}))).await;
    assert!(run.is_completed(), "{:?}", run.error);
    assert_eq!(run.output("for-each-loop-1", "totalProcessed"), Some(&json!(3)));
    assert_eq!(run.output("for-each-loop-1", "results"), Some(&Value::Array(rows)));
}

#[tokio::test]
async fn test_missing_loop_source_fails_loop_node() {
    let flow = flow(vec![Node::new("for-each-loop-1", "for-each-loop", "Loop").with_loop_config(LoopConfiguration::over("ghost-1", "items"))], Vec::new());
    let run = engine().run(&flow, RunOptions::new()).await;
    assert_eq!(run.status, RunStatus::Failed);
    assert!(run.output("for-each-loop-1", "error").is_some());
}

#[tokio::test]
async fn test_condition_branches_and_joins() {
    let flow = flow(
        vec![
            Node::new("condition-1", "condition", "Big").with_inputs(json!({"left": "{{input.n}}", "operator": "gt", "right": 5})),
            Node::new("yes-1", "fetch", "Yes"),
            Node::new("no-1", "fetch", "No"),
            Node::new("any-1", "fetch", "Either"),
            Node::new("all-1", "fetch", "Both"),
        ],
        vec![
            edge("condition-1", "yes-1").with_handle("true"),
            edge("condition-1", "no-1").with_handle("false"),
            edge("yes-1", "any-1"),
            edge("no-1", "any-1"),
            edge("yes-1", "all-1").with_join(JoinMode::All),
            edge("no-1", "all-1").with_join(JoinMode::All),
        ],
    );

    let run = engine().run(&flow, RunOptions::new().input(json!({"n": 9}))).await;
    assert!(run.is_completed(), "{:?}", run.error);
    assert_eq!(run.output("condition-1", "branch"), Some(&json!("true")));
    assert_eq!(run.status_of("yes-1"), Some(NodeStatus::Succeeded));
    assert_eq!(run.status_of("no-1"), Some(NodeStatus::Skipped));
    assert_eq!(run.status_of("any-1"), Some(NodeStatus::Succeeded));
    assert_eq!(run.status_of("all-1"), Some(NodeStatus::Skipped));

    let run = engine().run(&flow, RunOptions::new().input(json!({"n": 1}))).await;
    assert_eq!(run.status_of("yes-1"), Some(NodeStatus::Skipped));
    assert_eq!(run.status_of("no-1"), Some(NodeStatus::Succeeded));
}

#[tokio::test]
async fn test_disabled_node_passes_through() {
    let flow = flow(
        vec![Node::new("fetch-1", "fetch", "A").with_disabled(true), Node::new("fetch-2", "fetch", "B")],
        vec![edge("fetch-1", "fetch-2")],
    );
    let run = engine().run(&flow, RunOptions::new()).await;
    assert!(run.is_completed());
    assert_eq!(run.status_of("fetch-1"), Some(NodeStatus::Disabled));
    assert_eq!(run.output("fetch-1", "items"), None);
    assert_eq!(run.status_of("fetch-2"), Some(NodeStatus::Succeeded));
}

#[tokio::test]
async fn test_missing_plugin() {
    let nodes = vec![Node::new("mystery-1", "mystery", "Mystery").with_error_behavior(ErrorBehavior::Continue), Node::new("fetch-1", "fetch", "After")];
    let run = engine().run(&flow(nodes, vec![edge("mystery-1", "fetch-1")]), RunOptions::new()).await;
    assert!(run.is_completed());
    assert_eq!(run.status_of("mystery-1"), Some(NodeStatus::Failed));
    assert!(run.output("mystery-1", "error").and_then(Value::as_str).unwrap().contains("plugin not found"));
    assert_eq!(run.status_of("fetch-1"), Some(NodeStatus::Skipped));

    let run = engine().run(&flow(vec![Node::new("mystery-1", "mystery", "Mystery")], Vec::new()), RunOptions::new()).await;
    assert_eq!(run.status, RunStatus::Failed);
}

#[tokio::test]
async fn test_cycle_fails_before_execution() {
    let engine = engine();
    let mut events = engine.subscribe();
    let flow = flow(vec![Node::new("a-1", "fetch", "A"), Node::new("b-1", "fetch", "B")], vec![edge("a-1", "b-1"), edge("b-1", "a-1")]);

    let run = engine.run(&flow, RunOptions::new()).await;
    assert_eq!(run.status, RunStatus::Failed);
    assert!(run.error.as_deref().unwrap().contains("cycle"));
    assert!(run.records.is_empty());
    assert!(events.try_recv().is_ok_and(|msg| msg.event.is_error()));
}

#[tokio::test]
async fn test_display_variables_use_aliases() {
    let flow = fetch_loop_flow(LoopConfiguration::over("fetch-1", "items"));
    let run = engine().run(&flow, RunOptions::new().env("BASE", "http://api")).await;
    let display = run.display_variables(&AliasRegistry::from_nodes(&flow.nodes));
    assert_eq!(display["Fetch.url"], json!("http://api/x"));
    assert_eq!(display["Loop.totalProcessed"], json!(2));
}
