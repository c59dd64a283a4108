//! Backend call timing.
//!
//! [`TimedBackend`] wraps any [`ModelBackend`] and reports a [`NodeTiming`] for
//! every call to a [`TimingSink`], whether the call succeeds or not. A fill is
//! attributed to the type being filled; a routing call to the node doing the
//! routing, as reported by [`TimingSink::routing_node`].

use std::sync::Arc;
use std::time::Instant;

use agentgraph_core::{format_routes, FieldMap, ModelBackend, NodeType, Route};
use async_trait::async_trait;

use crate::run::{now_millis, BackendCall, NodeTiming};

pub trait TimingSink: Send + Sync {
    fn record(&self, timing: NodeTiming);

    /// Type name of the node currently choosing its successor.
    ///
    /// Sinks that do not track steps return `None`, and routing calls are
    /// then labelled with the candidate list.
    fn routing_node(&self) -> Option<String> {
        None
    }
}

pub struct TimedBackend {
    inner: Arc<dyn ModelBackend>,
    sink: Arc<dyn TimingSink>,
}

impl TimedBackend {
    pub fn new(inner: Arc<dyn ModelBackend>, sink: Arc<dyn TimingSink>) -> Self {
        TimedBackend { inner, sink }
    }
}

struct Stopwatch {
    started_at: u64,
    started: Instant,
}

impl Stopwatch {
    fn start() -> Self {
        Stopwatch {
            started_at: now_millis(),
            started: Instant::now(),
        }
    }

    fn stop(self, node_type: String, call: BackendCall) -> NodeTiming {
        let duration_ms = self.started.elapsed().as_millis() as u64;
        NodeTiming {
            node_type,
            call,
            started_at: self.started_at,
            ended_at: self.started_at + duration_ms,
            duration_ms,
        }
    }
}

#[async_trait]
impl ModelBackend for TimedBackend {
    async fn choose_type(&self, candidates: &[Route], context: &FieldMap) -> anyhow::Result<Route> {
        let watch = Stopwatch::start();
        let result = self.inner.choose_type(candidates, context).await;
        let node_type = self
            .sink
            .routing_node()
            .unwrap_or_else(|| format_routes(candidates));
        self.sink.record(watch.stop(node_type, BackendCall::ChooseType));
        result
    }

    async fn fill(
        &self,
        target: &NodeType,
        context: &FieldMap,
        instruction: &str,
    ) -> anyhow::Result<FieldMap> {
        let watch = Stopwatch::start();
        let result = self.inner.fill(target, context, instruction).await;
        self.sink
            .record(watch.stop(target.name().to_string(), BackendCall::Fill));
        result
    }
}
