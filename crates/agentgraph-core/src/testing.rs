//! Deterministic backend for tests and demos.
//!
//! [`ScriptedBackend`] replays queued routing choices and field values and
//! records every call it receives, so tests can assert on exactly what the
//! executor asked the model for.
//!
//! ```ignore
//! let backend = ScriptedBackend::new()
//!     .choose(Route::node("Review"))
//!     .fill("Review", [("verdict".to_string(), json!("ok"))].into_iter().collect())
//!     .with_latency(Duration::from_millis(5));
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use crate::backend::ModelBackend;
use crate::field::FieldMap;
use crate::node::{format_routes, NodeType, Route};

/// One call observed by a [`ScriptedBackend`].
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCall {
    ChooseType { candidates: Vec<Route> },
    Fill { target: String, context: FieldMap },
}

/// Backend that answers from a script instead of a model.
#[derive(Default)]
pub struct ScriptedBackend {
    choices: Mutex<VecDeque<Route>>,
    fallback_choice: Option<Route>,
    fills: Mutex<HashMap<String, VecDeque<FieldMap>>>,
    default_fills: HashMap<String, FieldMap>,
    latency: Option<Duration>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a routing answer; answers are consumed in order.
    pub fn choose(self, route: Route) -> Self {
        lock(&self.choices).push_back(route);
        self
    }

    /// Answer used once the queue of choices is empty.
    pub fn always_choose(mut self, route: Route) -> Self {
        self.fallback_choice = Some(route);
        self
    }

    /// Queues field values for the next fill of `target`.
    pub fn fill(self, target: &str, values: FieldMap) -> Self {
        lock(&self.fills)
            .entry(target.to_string())
            .or_default()
            .push_back(values);
        self
    }

    /// Values used for `target` when no queued fill remains.
    pub fn fill_always(mut self, target: &str, values: FieldMap) -> Self {
        self.default_fills.insert(target.to_string(), values);
        self
    }

    /// Sleeps before answering each call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        lock(&self.calls).clone()
    }

    pub fn choose_calls(&self) -> usize {
        lock(&self.calls)
            .iter()
            .filter(|c| matches!(c, RecordedCall::ChooseType { .. }))
            .count()
    }

    pub fn fill_calls(&self) -> usize {
        lock(&self.calls)
            .iter()
            .filter(|c| matches!(c, RecordedCall::Fill { .. }))
            .count()
    }

    async fn pause(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl ModelBackend for ScriptedBackend {
    async fn choose_type(&self, candidates: &[Route], _context: &FieldMap) -> anyhow::Result<Route> {
        self.pause().await;
        lock(&self.calls).push(RecordedCall::ChooseType {
            candidates: candidates.to_vec(),
        });

        let queued = lock(&self.choices).pop_front();
        queued
            .or_else(|| self.fallback_choice.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("no scripted choice for {}", format_routes(candidates))
            })
    }

    async fn fill(
        &self,
        target: &NodeType,
        context: &FieldMap,
        _instruction: &str,
    ) -> anyhow::Result<FieldMap> {
        self.pause().await;
        lock(&self.calls).push(RecordedCall::Fill {
            target: target.name().to_string(),
            context: context.clone(),
        });

        let queued = lock(&self.fills)
            .get_mut(target.name())
            .and_then(VecDeque::pop_front);
        Ok(queued
            .or_else(|| self.default_fills.get(target.name()).cloned())
            .unwrap_or_default())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn replays_choices_then_fallback() {
        let backend = ScriptedBackend::new()
            .choose(Route::node("A"))
            .always_choose(Route::Terminal);
        let candidates = [Route::node("A"), Route::Terminal];

        let first = backend.choose_type(&candidates, &FieldMap::new()).await.unwrap();
        let second = backend.choose_type(&candidates, &FieldMap::new()).await.unwrap();
        assert_eq!(first, Route::node("A"));
        assert_eq!(second, Route::Terminal);
        assert_eq!(backend.choose_calls(), 2);
    }

    #[tokio::test]
    async fn unscripted_choice_is_an_error() {
        let backend = ScriptedBackend::new();
        let err = backend
            .choose_type(&[Route::node("A"), Route::node("B")], &FieldMap::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("A | B"));
    }

    #[tokio::test]
    async fn fills_queue_before_default() {
        let target = NodeType::builder("End").build().unwrap();
        let queued: FieldMap = [("v".to_string(), json!(1))].into_iter().collect();
        let default: FieldMap = [("v".to_string(), json!(0))].into_iter().collect();
        let backend = ScriptedBackend::new()
            .fill("End", queued.clone())
            .fill_always("End", default.clone());

        let a = ModelBackend::fill(&backend, &target, &FieldMap::new(), "go").await.unwrap();
        let b = ModelBackend::fill(&backend, &target, &FieldMap::new(), "go").await.unwrap();
        assert_eq!(a, queued);
        assert_eq!(b, default);
        assert_eq!(backend.fill_calls(), 2);
    }
}
