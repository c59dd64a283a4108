//! Custom step logic.
//!
//! A node type with logic decides its own successor. The logic receives a
//! [`StepContext`] owning everything it may need: the current instance with
//! resolved fields, a snapshot of the trace, the run's backend and the graph's
//! type table for building the next instance.

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::backend::ModelBackend;
use crate::error::InstanceError;
use crate::field::FieldMap;
use crate::node::NodeInstance;
use crate::type_table::TypeTable;

/// Custom logic for one node type.
///
/// Returns the next instance, or `None` to end the run.
#[async_trait]
pub trait NodeLogic: Send + Sync {
    async fn step(&self, ctx: StepContext) -> anyhow::Result<Option<NodeInstance>>;
}

/// Inputs available to custom logic for one step.
#[derive(Clone)]
pub struct StepContext {
    node: NodeInstance,
    trace: Vec<NodeInstance>,
    backend: Arc<dyn ModelBackend>,
    types: Arc<TypeTable>,
}

impl StepContext {
    pub fn new(
        node: NodeInstance,
        trace: Vec<NodeInstance>,
        backend: Arc<dyn ModelBackend>,
        types: Arc<TypeTable>,
    ) -> Self {
        StepContext {
            node,
            trace,
            backend,
            types,
        }
    }

    /// The current instance, with dependency and recall fields resolved.
    pub fn node(&self) -> &NodeInstance {
        &self.node
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.node.get(field)
    }

    pub fn field<T: DeserializeOwned>(&self, name: &str) -> anyhow::Result<T> {
        self.node.field(name)
    }

    /// Nodes completed before this one, oldest first.
    pub fn trace(&self) -> &[NodeInstance] {
        &self.trace
    }

    pub fn backend(&self) -> &Arc<dyn ModelBackend> {
        &self.backend
    }

    pub fn types(&self) -> &TypeTable {
        &self.types
    }

    pub fn instantiate(&self, name: &str, fields: FieldMap) -> Result<NodeInstance, InstanceError> {
        self.types.instantiate(name, fields)
    }

    /// Shorthand for returning `Ok(Some(instance))` from logic.
    pub fn next(&self, name: &str, fields: FieldMap) -> anyhow::Result<Option<NodeInstance>> {
        Ok(Some(self.instantiate(name, fields)?))
    }
}

/// Adapter turning an async closure into [`NodeLogic`].
pub struct LogicFn<F, Fut> {
    f: F,
    _future: PhantomData<fn() -> Fut>,
}

/// Wraps `f` as node logic.
///
/// ```ignore
/// NodeType::builder("Start")
///     .routes_to(["End"])
///     .logic(logic_fn(|ctx| async move { ctx.next("End", FieldMap::new()) }))
/// ```
pub fn logic_fn<F, Fut>(f: F) -> LogicFn<F, Fut>
where
    F: Fn(StepContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Option<NodeInstance>>> + Send + 'static,
{
    LogicFn {
        f,
        _future: PhantomData,
    }
}

#[async_trait]
impl<F, Fut> NodeLogic for LogicFn<F, Fut>
where
    F: Fn(StepContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Option<NodeInstance>>> + Send + 'static,
{
    async fn step(&self, ctx: StepContext) -> anyhow::Result<Option<NodeInstance>> {
        (self.f)(ctx).await
    }
}
