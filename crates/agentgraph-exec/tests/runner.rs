use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use agentgraph_core::testing::ScriptedBackend;
use agentgraph_core::{logic_fn, DepFn, FieldMap, FieldSpec, NodeInstance, NodeType, Param, Route, StepContext};
use agentgraph_exec::{
    DependencyCache, GraphBuilder, GraphDefinition, GraphRunner, RunOptions, StepObserver,
};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

fn args(pairs: &[(&str, Value)]) -> FieldMap {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

fn doubler(calls: &Arc<AtomicUsize>) -> DepFn {
    let calls = Arc::clone(calls);
    DepFn::new("double_x", [Param::node("Start")], move |args| {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok(json!(args.node(0)?.field::<i64>("x")? * 2))
    })
}

/// Start(x) -> Middle(y = 2x) -> End
fn linear_graph(f: &DepFn) -> Arc<GraphDefinition> {
    Arc::new(
        GraphBuilder::new("Start")
            .node(
                NodeType::builder("Start")
                    .field(FieldSpec::plain("x"))
                    .routes_to(["Middle"])
                    .build()
                    .unwrap(),
            )
            .node(
                NodeType::builder("Middle")
                    .field(FieldSpec::new("y").depends_on(f))
                    .routes_to(["End"])
                    .build()
                    .unwrap(),
            )
            .node(NodeType::builder("End").build().unwrap())
            .build()
            .unwrap(),
    )
}

fn runner(graph: &Arc<GraphDefinition>, backend: &Arc<ScriptedBackend>) -> GraphRunner {
    GraphRunner::new(Arc::clone(graph), backend.clone())
}

#[tokio::test]
async fn linear_graph_computes_dependency_from_trace() {
    let calls = Arc::new(AtomicUsize::new(0));
    let graph = linear_graph(&doubler(&calls));
    let backend = Arc::new(ScriptedBackend::new());

    let start = graph.start_instance(args(&[("x", json!(5))])).unwrap();
    let outcome = runner(&graph, &backend)
        .run(start, DependencyCache::new())
        .await
        .unwrap();

    assert_eq!(outcome.trace.type_names(), vec!["Start", "Middle", "End"]);
    assert_eq!(outcome.trace.nodes()[0].get("x"), Some(&json!(5)));
    assert_eq!(outcome.trace.nodes()[1].get("y"), Some(&json!(10)));
    assert!(outcome.trace.nodes()[2].fields().is_empty());
    assert_eq!(outcome.steps, 3);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // Single candidates never reach choose_type.
    assert_eq!(backend.choose_calls(), 0);
    assert_eq!(backend.fill_calls(), 2);
}

#[tokio::test]
async fn fill_context_includes_resolved_target_fields() {
    let calls = Arc::new(AtomicUsize::new(0));
    let graph = linear_graph(&doubler(&calls));
    let backend = Arc::new(ScriptedBackend::new());

    let start = graph.start_instance(args(&[("x", json!(5))])).unwrap();
    runner(&graph, &backend)
        .run(start, DependencyCache::new())
        .await
        .unwrap();

    let first_fill = backend
        .calls()
        .into_iter()
        .find_map(|c| match c {
            agentgraph_core::testing::RecordedCall::Fill { target, context } => {
                Some((target, context))
            }
            _ => None,
        })
        .unwrap();
    assert_eq!(first_fill.0, "Middle");
    assert_eq!(first_fill.1, args(&[("x", json!(5)), ("y", json!(10))]));
}

#[tokio::test]
async fn injected_dependency_is_not_invoked() {
    let calls = Arc::new(AtomicUsize::new(0));
    let f = doubler(&calls);
    let graph = linear_graph(&f);
    let backend = Arc::new(ScriptedBackend::new());

    let mut cache = DependencyCache::new();
    cache.inject(&f, json!(99));
    let start = graph.start_instance(args(&[("x", json!(5))])).unwrap();
    let outcome = runner(&graph, &backend).run(start, cache).await.unwrap();

    assert_eq!(outcome.trace.nodes()[1].get("y"), Some(&json!(99)));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn start_arguments_cannot_override_dependencies() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let f = DepFn::new("f", [], move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(json!(10))
    });
    let graph = Arc::new(
        GraphBuilder::new("Start")
            .node(
                NodeType::builder("Start")
                    .field(FieldSpec::plain("x"))
                    .field(FieldSpec::new("y").depends_on(&f))
                    .build()
                    .unwrap(),
            )
            .build()
            .unwrap(),
    );

    let err = graph
        .start_instance(args(&[("x", json!(5)), ("y", json!(999))]))
        .unwrap_err();
    assert!(matches!(
        err,
        agentgraph_core::InstanceError::ComputedField { ref field, .. } if field == "y"
    ));

    let start = graph.start_instance(args(&[("x", json!(5))])).unwrap();
    let backend = Arc::new(ScriptedBackend::new());
    let outcome = runner(&graph, &backend)
        .run(start, DependencyCache::new())
        .await
        .unwrap();
    assert_eq!(outcome.trace.nodes()[0].get("y"), Some(&json!(10)));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

/// Start(x) --logic--> Middle(y = 2x)
fn handoff_graph(f: &DepFn, logic: impl agentgraph_core::NodeLogic + 'static) -> Arc<GraphDefinition> {
    Arc::new(
        GraphBuilder::new("Start")
            .node(
                NodeType::builder("Start")
                    .field(FieldSpec::plain("x"))
                    .routes_to(["Middle"])
                    .logic(logic)
                    .build()
                    .unwrap(),
            )
            .node(
                NodeType::builder("Middle")
                    .field(FieldSpec::new("y").depends_on(f))
                    .build()
                    .unwrap(),
            )
            .build()
            .unwrap(),
    )
}

#[tokio::test]
async fn logic_cannot_set_dependency_fields() {
    let calls = Arc::new(AtomicUsize::new(0));
    let f = doubler(&calls);
    let graph = handoff_graph(
        &f,
        logic_fn(|ctx: StepContext| async move {
            ctx.next("Middle", [("y".to_string(), json!(999))].into_iter().collect())
        }),
    );
    let backend = Arc::new(ScriptedBackend::new());

    let start = graph.start_instance(args(&[("x", json!(5))])).unwrap();
    let failure = runner(&graph, &backend)
        .run(start, DependencyCache::new())
        .await
        .unwrap_err();

    assert_eq!(failure.error.code(), "LOGIC_ERROR");
    assert!(failure.error.to_string().contains("cannot be set directly"));
    assert_eq!(failure.trace.type_names(), vec!["Start"]);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn revised_dependency_values_are_recomputed() {
    let calls = Arc::new(AtomicUsize::new(0));
    let f = doubler(&calls);
    let graph = handoff_graph(
        &f,
        logic_fn(|ctx: StepContext| async move {
            let next = ctx.instantiate("Middle", FieldMap::new())?;
            Ok(Some(next.revised([("y".to_string(), json!(999))].into_iter().collect())))
        }),
    );
    let backend = Arc::new(ScriptedBackend::new());

    let start = graph.start_instance(args(&[("x", json!(5))])).unwrap();
    let outcome = runner(&graph, &backend)
        .run(start, DependencyCache::new())
        .await
        .unwrap();

    assert_eq!(outcome.trace.nodes()[1].get("y"), Some(&json!(10)));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn shared_dependency_runs_once_per_run() {
    let calls = Arc::new(AtomicUsize::new(0));
    let f = doubler(&calls);
    let graph = Arc::new(
        GraphBuilder::new("Start")
            .node(
                NodeType::builder("Start")
                    .field(FieldSpec::plain("x"))
                    .routes_to(["Middle"])
                    .build()
                    .unwrap(),
            )
            .node(
                NodeType::builder("Middle")
                    .field(FieldSpec::new("y").depends_on(&f))
                    .routes_to(["End"])
                    .build()
                    .unwrap(),
            )
            .node(
                NodeType::builder("End")
                    .field(FieldSpec::new("z").depends_on(&f))
                    .field(FieldSpec::new("origin").recall("Start"))
                    .build()
                    .unwrap(),
            )
            .build()
            .unwrap(),
    );
    let backend = Arc::new(ScriptedBackend::new());

    for _ in 0..2 {
        let start = graph.start_instance(args(&[("x", json!(4))])).unwrap();
        let outcome = runner(&graph, &backend)
            .run(start, DependencyCache::new())
            .await
            .unwrap();
        let end = outcome.trace.last().unwrap();
        assert_eq!(end.get("z"), Some(&json!(8)));
        assert_eq!(end.get("origin"), Some(&json!({ "x": 4 })));
    }
    // One invocation per run, each run with its own cache.
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

fn branching_graph() -> Arc<GraphDefinition> {
    Arc::new(
        GraphBuilder::new("Start")
            .node(
                NodeType::builder("Start")
                    .field(FieldSpec::plain("topic"))
                    .routes_to(["Approve", "Reject"])
                    .build()
                    .unwrap(),
            )
            .node(
                NodeType::builder("Approve")
                    .description("Approve the topic")
                    .field(FieldSpec::plain("reason"))
                    .build()
                    .unwrap(),
            )
            .node(
                NodeType::builder("Reject")
                    .field(FieldSpec::plain("reason").default_value(json!("unspecified")))
                    .field(FieldSpec::new("topic").recall_or("Start", json!(null)))
                    .build()
                    .unwrap(),
            )
            .build()
            .unwrap(),
    )
}

#[tokio::test]
async fn backend_chooses_among_several_candidates() {
    let graph = branching_graph();
    let backend = Arc::new(
        ScriptedBackend::new()
            .choose(Route::node("Reject"))
            .fill("Reject", args(&[("topic", json!("ignored"))])),
    );

    let start = graph.start_instance(args(&[("topic", json!("rust"))])).unwrap();
    let outcome = runner(&graph, &backend)
        .run(start, DependencyCache::new())
        .await
        .unwrap();

    assert_eq!(outcome.trace.type_names(), vec!["Start", "Reject"]);
    let reject = outcome.trace.last().unwrap();
    assert_eq!(reject.get("reason"), Some(&json!("unspecified")));
    // Backend values for computed fields are discarded.
    assert_eq!(reject.get("topic"), Some(&json!({ "topic": "rust" })));
    assert_eq!(backend.choose_calls(), 1);
}

#[tokio::test]
async fn choice_outside_candidates_fails() {
    let graph = branching_graph();
    let backend = Arc::new(ScriptedBackend::new().choose(Route::Terminal));

    let start = graph.start_instance(args(&[("topic", json!("rust"))])).unwrap();
    let failure = runner(&graph, &backend)
        .run(start, DependencyCache::new())
        .await
        .unwrap_err();

    assert_eq!(failure.error.code(), "INVALID_ROUTING_CHOICE");
    assert!(failure.trace.is_empty());
    assert_eq!(backend.fill_calls(), 0);
}

#[tokio::test]
async fn missing_plain_field_from_backend_fails() {
    let graph = branching_graph();
    let backend = Arc::new(ScriptedBackend::new().choose(Route::node("Approve")));

    let start = graph.start_instance(args(&[("topic", json!("rust"))])).unwrap();
    let failure = runner(&graph, &backend)
        .run(start, DependencyCache::new())
        .await
        .unwrap_err();

    assert_eq!(failure.error.code(), "MISSING_FIELD");
    assert!(failure.trace.is_empty());
}

#[tokio::test]
async fn endless_routing_hits_iteration_cap() {
    let graph = Arc::new(
        GraphBuilder::new("Loop")
            .node(
                NodeType::builder("Loop")
                    .routes_to(["Loop"])
                    .or_terminal()
                    .build()
                    .unwrap(),
            )
            .build()
            .unwrap(),
    );
    let backend = Arc::new(ScriptedBackend::new().always_choose(Route::node("Loop")));

    let start = graph.start_instance(FieldMap::new()).unwrap();
    let failure = runner(&graph, &backend)
        .with_options(RunOptions {
            max_iterations: 4,
            ..RunOptions::default()
        })
        .run(start, DependencyCache::new())
        .await
        .unwrap_err();

    assert_eq!(failure.error.code(), "MAX_ITERATIONS_EXCEEDED");
    assert_eq!(failure.trace.len(), 4);
}

fn failing_logic(calls: &Arc<AtomicUsize>, next: &'static str) -> impl agentgraph_core::NodeLogic {
    let calls = Arc::clone(calls);
    logic_fn(move |ctx: StepContext| {
        let calls = Arc::clone(&calls);
        async move {
            if calls.fetch_add(1, Ordering::SeqCst) >= 1 {
                anyhow::bail!("model refused");
            }
            ctx.next(next, FieldMap::new())
        }
    })
}

#[tokio::test]
async fn logic_failure_keeps_completed_nodes() {
    let calls = Arc::new(AtomicUsize::new(0));
    let graph = Arc::new(
        GraphBuilder::new("Start")
            .node(
                NodeType::builder("Start")
                    .routes_to(["Middle"])
                    .logic(failing_logic(&calls, "Middle"))
                    .build()
                    .unwrap(),
            )
            .node(
                NodeType::builder("Middle")
                    .routes_to(["End"])
                    .logic(failing_logic(&calls, "End"))
                    .build()
                    .unwrap(),
            )
            .node(NodeType::builder("End").build().unwrap())
            .build()
            .unwrap(),
    );
    let backend = Arc::new(ScriptedBackend::new());

    let start = graph.start_instance(FieldMap::new()).unwrap();
    let failure = runner(&graph, &backend)
        .run(start, DependencyCache::new())
        .await
        .unwrap_err();

    assert_eq!(failure.error.code(), "LOGIC_ERROR");
    assert!(failure.error.to_string().contains("model refused"));
    assert_eq!(failure.trace.type_names(), vec!["Start"]);
}

#[tokio::test]
async fn logic_must_stay_within_its_contract() {
    let graph = Arc::new(
        GraphBuilder::new("Start")
            .node(
                NodeType::builder("Start")
                    .routes_to(["Middle"])
                    .logic(logic_fn(|ctx: StepContext| async move {
                        ctx.next("End", FieldMap::new())
                    }))
                    .build()
                    .unwrap(),
            )
            .node(NodeType::builder("Middle").routes_to(["End"]).build().unwrap())
            .node(NodeType::builder("End").build().unwrap())
            .build()
            .unwrap(),
    );
    let backend = Arc::new(ScriptedBackend::new());

    let start = graph.start_instance(FieldMap::new()).unwrap();
    let failure = runner(&graph, &backend)
        .run(start, DependencyCache::new())
        .await
        .unwrap_err();
    assert_eq!(failure.error.code(), "UNDECLARED_SUCCESSOR");
}

#[tokio::test]
async fn logic_may_end_the_run_when_terminal_is_declared() {
    let graph = Arc::new(
        GraphBuilder::new("Start")
            .node(
                NodeType::builder("Start")
                    .field(FieldSpec::plain("done"))
                    .routes_to(["Start"])
                    .or_terminal()
                    .logic(logic_fn(|ctx: StepContext| async move {
                        if ctx.field::<bool>("done")? {
                            Ok(None)
                        } else {
                            ctx.next("Start", [("done".to_string(), json!(true))].into_iter().collect())
                        }
                    }))
                    .build()
                    .unwrap(),
            )
            .build()
            .unwrap(),
    );
    let backend = Arc::new(ScriptedBackend::new());

    let start = graph.start_instance(args(&[("done", json!(false))])).unwrap();
    let outcome = runner(&graph, &backend)
        .run(start, DependencyCache::new())
        .await
        .unwrap();
    assert_eq!(outcome.trace.len(), 2);
    assert_eq!(backend.calls(), vec![]);
}

#[tokio::test]
async fn cancellation_is_observed_between_steps() {
    let token = CancellationToken::new();
    let trigger = token.clone();
    let graph = Arc::new(
        GraphBuilder::new("Start")
            .node(
                NodeType::builder("Start")
                    .routes_to(["End"])
                    .logic(logic_fn(move |ctx: StepContext| {
                        let trigger = trigger.clone();
                        async move {
                            trigger.cancel();
                            ctx.next("End", FieldMap::new())
                        }
                    }))
                    .build()
                    .unwrap(),
            )
            .node(NodeType::builder("End").build().unwrap())
            .build()
            .unwrap(),
    );
    let backend = Arc::new(ScriptedBackend::new());

    let start = graph.start_instance(FieldMap::new()).unwrap();
    let failure = runner(&graph, &backend)
        .with_options(RunOptions {
            cancel: token,
            ..RunOptions::default()
        })
        .run(start, DependencyCache::new())
        .await
        .unwrap_err();

    assert!(failure.error.is_cancelled());
    assert_eq!(failure.trace.type_names(), vec!["Start"]);
}

#[derive(Default)]
struct Recorder(Mutex<Vec<(String, usize)>>);

impl StepObserver for Recorder {
    fn node_completed(&self, node: &NodeInstance, position: usize) {
        self.0
            .lock()
            .unwrap()
            .push((node.type_name().to_string(), position));
    }
}

#[tokio::test]
async fn observer_sees_each_committed_node() {
    let calls = Arc::new(AtomicUsize::new(0));
    let graph = linear_graph(&doubler(&calls));
    let backend = Arc::new(ScriptedBackend::new());
    let recorder = Arc::new(Recorder::default());

    let start = graph.start_instance(args(&[("x", json!(1))])).unwrap();
    runner(&graph, &backend)
        .with_observer(recorder.clone())
        .run(start, DependencyCache::new())
        .await
        .unwrap();

    let seen = recorder.0.lock().unwrap().clone();
    assert_eq!(
        seen,
        vec![
            ("Start".to_string(), 0),
            ("Middle".to_string(), 1),
            ("End".to_string(), 2)
        ]
    );
}
