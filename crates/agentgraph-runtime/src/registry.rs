//! Concurrent run registry.
//!
//! Every submitted run executes in its own tokio task with its own trace and
//! dependency cache. The registry is the only state shared between runs: an
//! atomic id counter, a `DashMap` of active runs and a mutex-guarded archive.
//!
//! A run moves from the active set to the archive exactly once, when its task
//! finishes. The archive holds at most `archive_capacity` runs and evicts the
//! oldest first; active runs are never evicted.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use agentgraph_core::{FieldMap, ModelBackend, NodeInstance};
use agentgraph_exec::{
    DependencyCache, GraphDefinition, GraphRunner, RunFailure, RunOptions, RunOutcome, StepObserver,
};
use dashmap::DashMap;
use tokio::sync::watch;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;

use crate::config::RuntimeConfig;
use crate::error::RegistryError;
use crate::run::{now_millis, GraphRun, NodeTiming, RunErrorInfo, RunId, RunState};
use crate::timing::{TimedBackend, TimingSink};

/// Live record of one run, written by the run's own task.
struct RunSlot {
    record: Mutex<GraphRun>,
}

impl RunSlot {
    fn lock(&self) -> MutexGuard<'_, GraphRun> {
        self.record.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn snapshot(&self) -> GraphRun {
        self.lock().clone()
    }
}

impl StepObserver for RunSlot {
    fn node_started(&self, node: &NodeInstance) {
        self.lock().current = Some(node.type_name().to_string());
    }

    fn node_completed(&self, node: &NodeInstance, _position: usize) {
        self.lock().trace.push(node.clone());
    }
}

impl TimingSink for RunSlot {
    fn record(&self, timing: NodeTiming) {
        self.lock().timings.push(timing);
    }

    fn routing_node(&self) -> Option<String> {
        self.lock().current.clone()
    }
}

struct ActiveRun {
    slot: Arc<RunSlot>,
    cancel: CancellationToken,
    done: watch::Receiver<Option<GraphRun>>,
}

struct RegistryInner {
    config: RuntimeConfig,
    next_id: AtomicU64,
    active: DashMap<RunId, ActiveRun>,
    archive: Mutex<VecDeque<GraphRun>>,
}

/// Submits, tracks and archives graph runs.
///
/// Cloning yields another handle to the same registry.
#[derive(Clone)]
pub struct RunRegistry {
    inner: Arc<RegistryInner>,
}

impl RunRegistry {
    pub fn new(config: RuntimeConfig) -> Self {
        RunRegistry {
            inner: Arc::new(RegistryInner {
                config,
                next_id: AtomicU64::new(1),
                active: DashMap::new(),
                archive: Mutex::new(VecDeque::with_capacity(config.archive_capacity)),
            }),
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    /// Starts a run and returns its id without waiting for it.
    ///
    /// The arguments are checked against the start type first; a mismatch is
    /// returned here and no run is created.
    pub fn submit(
        &self,
        graph: Arc<GraphDefinition>,
        args: FieldMap,
        backend: Arc<dyn ModelBackend>,
    ) -> Result<RunId, RegistryError> {
        self.submit_with_cache(graph, args, backend, DependencyCache::new())
    }

    /// Like [`submit`](Self::submit), with dependency values injected up front.
    pub fn submit_with_cache(
        &self,
        graph: Arc<GraphDefinition>,
        args: FieldMap,
        backend: Arc<dyn ModelBackend>,
        cache: DependencyCache,
    ) -> Result<RunId, RegistryError> {
        self.spawn_run(graph, args, backend, cache)
            .map(|handle| handle.id())
    }

    /// Like [`submit`](Self::submit), but returns a handle that resolves to
    /// the final record even if the run has already left the archive.
    pub fn submit_watched(
        &self,
        graph: Arc<GraphDefinition>,
        args: FieldMap,
        backend: Arc<dyn ModelBackend>,
    ) -> Result<RunHandle, RegistryError> {
        self.spawn_run(graph, args, backend, DependencyCache::new())
    }

    fn spawn_run(
        &self,
        graph: Arc<GraphDefinition>,
        args: FieldMap,
        backend: Arc<dyn ModelBackend>,
        cache: DependencyCache,
    ) -> Result<RunHandle, RegistryError> {
        let start = graph.start_instance(args.clone())?;
        let id = RunId(self.inner.next_id.fetch_add(1, Ordering::SeqCst));

        let slot = Arc::new(RunSlot {
            record: Mutex::new(GraphRun::new(id, Arc::clone(&graph), args)),
        });
        let cancel = CancellationToken::new();
        let (done_tx, done_rx) = watch::channel(None);
        self.inner.active.insert(
            id,
            ActiveRun {
                slot: Arc::clone(&slot),
                cancel: cancel.clone(),
                done: done_rx.clone(),
            },
        );
        tracing::info!(run = %id, start = graph.start(), "run submitted");

        let runner = GraphRunner::new(
            graph,
            Arc::new(TimedBackend::new(backend, slot.clone())),
        )
        .with_options(RunOptions {
            max_iterations: self.inner.config.max_iterations,
            cancel,
        })
        .with_observer(slot.clone());

        let registry = self.clone();
        tokio::spawn(async move {
            // Run in a nested task so a panicking callback still finishes the run.
            let result = tokio::spawn(async move { runner.run(start, cache).await }).await;
            let finished = registry.finish(id, &slot, result);
            done_tx.send_replace(Some(finished));
        });

        Ok(RunHandle { id, done: done_rx })
    }

    fn finish(
        &self,
        id: RunId,
        slot: &RunSlot,
        result: Result<Result<RunOutcome, RunFailure>, JoinError>,
    ) -> GraphRun {
        let finished = {
            let mut record = slot.lock();
            match result {
                Ok(Ok(outcome)) => {
                    record.state = RunState::Done;
                    record.trace = outcome.trace.into_vec();
                    tracing::info!(run = %id, steps = outcome.steps, "run finished");
                }
                Ok(Err(failure)) => {
                    record.trace = failure.trace.into_vec();
                    if failure.error.is_cancelled() {
                        record.state = RunState::Cancelled;
                        tracing::info!(run = %id, completed = record.trace.len(), "run cancelled");
                    } else {
                        record.state = RunState::Failed;
                        record.error = Some(RunErrorInfo::from(&failure.error));
                        tracing::warn!(run = %id, error = %failure.error, "run failed");
                    }
                }
                Err(join_error) => {
                    record.state = RunState::Failed;
                    record.error = Some(RunErrorInfo {
                        code: "PANICKED".to_string(),
                        message: join_error.to_string(),
                    });
                    tracing::warn!(run = %id, error = %join_error, "run task panicked");
                }
            }
            record.current = None;
            record.finished_at = Some(now_millis());
            record.clone()
        };

        {
            let mut archive = self.archive();
            archive.push_back(finished.clone());
            while archive.len() > self.inner.config.archive_capacity {
                if let Some(evicted) = archive.pop_front() {
                    tracing::debug!(run = %evicted.id, "run evicted from history");
                }
            }
        }
        self.inner.active.remove(&id);
        finished
    }

    fn archive(&self) -> MutexGuard<'_, VecDeque<GraphRun>> {
        self.inner
            .archive
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Current view of a run, active or archived.
    pub fn get(&self, id: RunId) -> Option<GraphRun> {
        if let Some(active) = self.inner.active.get(&id) {
            return Some(active.slot.snapshot());
        }
        self.archive().iter().find(|run| run.id == id).cloned()
    }

    /// Runs still executing, by ascending id.
    pub fn active(&self) -> Vec<GraphRun> {
        let mut runs: Vec<GraphRun> = self
            .inner
            .active
            .iter()
            .map(|entry| entry.value().slot.snapshot())
            .collect();
        runs.sort_by_key(|run| run.id);
        runs
    }

    /// Archived runs, oldest first.
    pub fn history(&self) -> Vec<GraphRun> {
        self.archive().iter().cloned().collect()
    }

    /// Requests cancellation of an active run.
    ///
    /// The run stops at its next step boundary. Returns `false` if the run is
    /// not active.
    pub fn cancel(&self, id: RunId) -> bool {
        match self.inner.active.get(&id) {
            Some(active) => {
                active.cancel.cancel();
                tracing::info!(run = %id, "cancellation requested");
                true
            }
            None => false,
        }
    }

    /// Waits for a run to finish and returns its final record.
    ///
    /// Returns `None` for ids that are neither active nor archived.
    pub async fn wait(&self, id: RunId) -> Option<GraphRun> {
        let done = self.inner.active.get(&id).map(|active| active.done.clone());
        if let Some(done) = done {
            return RunHandle { id, done }.wait().await;
        }
        self.archive().iter().find(|run| run.id == id).cloned()
    }
}

/// Completion handle for one submitted run.
pub struct RunHandle {
    id: RunId,
    done: watch::Receiver<Option<GraphRun>>,
}

impl RunHandle {
    pub fn id(&self) -> RunId {
        self.id
    }

    /// Resolves to the final record once the run has finished.
    pub async fn wait(mut self) -> Option<GraphRun> {
        let finished = self.done.wait_for(Option::is_some).await.ok()?.clone();
        finished
    }
}

impl Default for RunRegistry {
    fn default() -> Self {
        Self::new(RuntimeConfig::default())
    }
}
