//! Per-run dependency cache.

use std::collections::HashMap;

use agentgraph_core::{DepFn, DepId};
use serde_json::Value;

/// Resolved dependency values for one run, keyed by function identity.
///
/// A cache belongs to exactly one run. Values put in with [`inject`] before the
/// run starts are treated as already resolved, so their functions never run.
///
/// [`inject`]: DependencyCache::inject
#[derive(Debug, Clone, Default)]
pub struct DependencyCache {
    values: HashMap<DepId, Value>,
}

impl DependencyCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-seeds the value of `function`.
    pub fn inject(&mut self, function: &DepFn, value: Value) -> &mut Self {
        self.values.insert(function.id(), value);
        self
    }

    pub fn get(&self, id: DepId) -> Option<&Value> {
        self.values.get(&id)
    }

    pub fn value_of(&self, function: &DepFn) -> Option<&Value> {
        self.get(function.id())
    }

    pub fn contains(&self, id: DepId) -> bool {
        self.values.contains_key(&id)
    }

    pub(crate) fn insert(&mut self, id: DepId, value: Value) {
        self.values.insert(id, value);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
