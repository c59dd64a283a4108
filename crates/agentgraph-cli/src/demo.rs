//! Bundled demo graph: `Start(x) -> Middle(y = 2x) -> End(summary)`.

use std::sync::Arc;

use agentgraph_core::testing::ScriptedBackend;
use agentgraph_core::{ConfigError, DepFn, FieldMap, FieldSpec, NodeType, Param};
use agentgraph_exec::{GraphBuilder, GraphDefinition, ValidationReport};
use serde_json::json;
use thiserror::Error;

/// Reasons the bundled graph could not be built.
#[derive(Debug, Error)]
pub enum DemoError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Invalid(#[from] ValidationReport),
}

pub fn graph() -> Result<GraphDefinition, DemoError> {
    let double = DepFn::new("double_x", [Param::node("Start")], |args| {
        Ok(json!(args.node(0)?.field::<i64>("x")? * 2))
    });

    let start = NodeType::builder("Start")
        .description("Entry point carrying the caller's input")
        .field(FieldSpec::plain("x").describe("Input value"))
        .routes_to(["Middle"])
        .build()?;
    let middle = NodeType::builder("Middle")
        .field(FieldSpec::new("y").depends_on(&double))
        .routes_to(["End"])
        .build()?;
    let end = NodeType::builder("End")
        .description("Summarize the computation")
        .field(FieldSpec::plain("summary").default_value(json!("")))
        .field(FieldSpec::new("input").recall("Start"))
        .build()?;

    Ok(GraphBuilder::new("Start")
        .nodes([start, middle, end])
        .build()?)
}

pub fn backend(latency_ms: u64) -> Arc<ScriptedBackend> {
    let summary: FieldMap = [("summary".to_string(), json!("doubled the input"))]
        .into_iter()
        .collect();
    Arc::new(
        ScriptedBackend::new()
            .fill_always("End", summary)
            .with_latency(std::time::Duration::from_millis(latency_ms)),
    )
}

pub fn start_args(x: i64) -> FieldMap {
    [("x".to_string(), json!(x))].into_iter().collect()
}
