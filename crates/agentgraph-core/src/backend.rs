//! Model backend protocol.
//!
//! The executor only ever talks to a language model through [`ModelBackend`].
//! Concrete providers, prompt construction and schema generation live outside
//! this workspace; tests use [`crate::testing::ScriptedBackend`].

use async_trait::async_trait;

use crate::field::FieldMap;
use crate::node::{NodeType, Route};

/// Backend used for auto-routing and for filling plain fields.
///
/// Both calls are suspension points. Timeouts, if any, are the backend's
/// responsibility.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// Picks the next route. Must return one of `candidates`.
    async fn choose_type(&self, candidates: &[Route], context: &FieldMap) -> anyhow::Result<Route>;

    /// Produces values for the plain fields of `target`.
    ///
    /// `context` holds the current node's fields plus any fields of `target`
    /// already resolved from dependencies and recall.
    async fn fill(
        &self,
        target: &NodeType,
        context: &FieldMap,
        instruction: &str,
    ) -> anyhow::Result<FieldMap>;
}
