//! The execution loop.
//!
//! [`GraphRunner::run`] drives one run from a start instance to a terminal
//! node. Each step resolves the current node's dependency and recall fields,
//! then picks the next node: custom logic decides for itself, any other node
//! asks the backend to choose among its declared successors and to fill the
//! chosen type's plain fields. A node is appended to the trace only once its
//! step has fully succeeded, so a failed or cancelled run never exposes a
//! partially built instance.

mod error;
mod trace;

pub use error::{ExecutionError, RunFailure};
pub use trace::ExecutionTrace;

use std::sync::Arc;

use agentgraph_core::{FieldMap, ModelBackend, NodeInstance, NodeLogic, NodeType, Route, StepContext};
use tokio_util::sync::CancellationToken;

use crate::resolver::{resolve_fields, resolve_type_fields, DependencyCache};
use crate::topology::GraphDefinition;

/// Steps allowed per run unless configured otherwise.
pub const DEFAULT_MAX_ITERATIONS: usize = 10;

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub max_iterations: usize,
    /// Checked before every step.
    pub cancel: CancellationToken,
}

impl Default for RunOptions {
    fn default() -> Self {
        RunOptions {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            cancel: CancellationToken::new(),
        }
    }
}

/// Receives every node as it is committed to the trace.
pub trait StepObserver: Send + Sync {
    /// Called before a node's step begins.
    fn node_started(&self, _node: &NodeInstance) {}

    fn node_completed(&self, node: &NodeInstance, position: usize);
}

struct NoopObserver;

impl StepObserver for NoopObserver {
    fn node_completed(&self, _node: &NodeInstance, _position: usize) {}
}

/// A run that reached a terminal node.
#[derive(Debug)]
pub struct RunOutcome {
    pub trace: ExecutionTrace,
    pub cache: DependencyCache,
    pub steps: usize,
}

enum Step {
    Continue { completed: NodeInstance, next: NodeInstance },
    Finish { completed: NodeInstance },
}

/// Executes runs of one graph against one backend.
pub struct GraphRunner {
    graph: Arc<GraphDefinition>,
    backend: Arc<dyn ModelBackend>,
    options: RunOptions,
    observer: Arc<dyn StepObserver>,
}

impl GraphRunner {
    pub fn new(graph: Arc<GraphDefinition>, backend: Arc<dyn ModelBackend>) -> Self {
        GraphRunner {
            graph,
            backend,
            options: RunOptions::default(),
            observer: Arc::new(NoopObserver),
        }
    }

    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn StepObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn graph(&self) -> &Arc<GraphDefinition> {
        &self.graph
    }

    /// Runs from `start` until a terminal node, an error, or cancellation.
    ///
    /// `cache` may carry injected dependency values. On failure the returned
    /// [`RunFailure`] holds every node completed before the error.
    pub async fn run(
        &self,
        start: NodeInstance,
        mut cache: DependencyCache,
    ) -> Result<RunOutcome, RunFailure> {
        let mut trace = ExecutionTrace::new();
        let mut current = start;
        let mut steps = 0;

        loop {
            if self.options.cancel.is_cancelled() {
                tracing::debug!(completed = trace.len(), "run cancelled");
                return Err(RunFailure {
                    error: ExecutionError::Cancelled,
                    trace,
                });
            }
            if steps >= self.options.max_iterations {
                return Err(RunFailure {
                    error: ExecutionError::MaxIterationsExceeded {
                        limit: self.options.max_iterations,
                    },
                    trace,
                });
            }
            steps += 1;
            tracing::debug!(node_type = current.type_name(), step = steps, "executing node");
            self.observer.node_started(&current);

            match self.step(current, &trace, &mut cache).await {
                Ok(Step::Continue { completed, next }) => {
                    self.commit(&mut trace, completed);
                    current = next;
                }
                Ok(Step::Finish { completed }) => {
                    self.commit(&mut trace, completed);
                    return Ok(RunOutcome {
                        trace,
                        cache,
                        steps,
                    });
                }
                Err(error) => return Err(RunFailure { error, trace }),
            }
        }
    }

    fn commit(&self, trace: &mut ExecutionTrace, node: NodeInstance) {
        self.observer.node_completed(&node, trace.len());
        trace.push(node);
    }

    async fn step(
        &self,
        current: NodeInstance,
        trace: &ExecutionTrace,
        cache: &mut DependencyCache,
    ) -> Result<Step, ExecutionError> {
        let node_type = Arc::clone(current.node_type());
        let resolved =
            resolve_fields(&current, cache, trace.nodes()).map_err(|source| ExecutionError::Resolve {
                node_type: node_type.name().to_string(),
                source,
            })?;
        let current = if resolved.is_empty() {
            current
        } else {
            current.revised(resolved)
        };

        if node_type.is_terminal() {
            return Ok(Step::Finish { completed: current });
        }

        let next = match node_type.logic() {
            Some(logic) => self.run_logic(&node_type, logic.as_ref(), &current, trace).await?,
            None => self.auto_route(&node_type, &current, trace, cache).await?,
        };
        Ok(match next {
            Some(next) => Step::Continue {
                completed: current,
                next,
            },
            None => Step::Finish { completed: current },
        })
    }

    async fn run_logic(
        &self,
        node_type: &NodeType,
        logic: &dyn NodeLogic,
        current: &NodeInstance,
        trace: &ExecutionTrace,
    ) -> Result<Option<NodeInstance>, ExecutionError> {
        let ctx = StepContext::new(
            current.clone(),
            trace.nodes().to_vec(),
            Arc::clone(&self.backend),
            Arc::clone(self.graph.types()),
        );
        let next = logic.step(ctx).await.map_err(|source| ExecutionError::Logic {
            node_type: node_type.name().to_string(),
            source,
        })?;

        let returned = match &next {
            Some(node) => Route::node(node.type_name()),
            None => Route::Terminal,
        };
        if !node_type.successors().contains(&returned) {
            return Err(ExecutionError::UndeclaredSuccessor {
                node_type: node_type.name().to_string(),
                returned,
                allowed: node_type.successors().to_vec(),
            });
        }
        Ok(next)
    }

    async fn auto_route(
        &self,
        node_type: &NodeType,
        current: &NodeInstance,
        trace: &ExecutionTrace,
        cache: &mut DependencyCache,
    ) -> Result<Option<NodeInstance>, ExecutionError> {
        let candidates = node_type.successors();
        let choice = match candidates {
            [only] => only.clone(),
            _ => self
                .backend
                .choose_type(candidates, current.fields())
                .await
                .map_err(|source| ExecutionError::Backend {
                    node_type: node_type.name().to_string(),
                    operation: "choose_type",
                    source,
                })?,
        };
        if !candidates.contains(&choice) {
            return Err(ExecutionError::InvalidRoutingChoice {
                node_type: node_type.name().to_string(),
                choice,
                candidates: candidates.to_vec(),
            });
        }
        tracing::debug!(from = node_type.name(), to = %choice, "routing decision");

        let Route::Node(target_name) = &choice else {
            return Ok(None);
        };
        let target = self
            .graph
            .node_type(target_name)
            .cloned()
            .ok_or_else(|| agentgraph_core::InstanceError::UnknownType {
                name: target_name.clone(),
            })?;

        // The target's computed fields may read the current node from the trace.
        let mut lookahead = trace.nodes().to_vec();
        lookahead.push(current.clone());
        let resolved = resolve_type_fields(&target, cache, &lookahead).map_err(|source| {
            ExecutionError::Resolve {
                node_type: target.name().to_string(),
                source,
            }
        })?;

        let mut context = current.fields().clone();
        context.extend(resolved.iter().map(|(k, v)| (k.clone(), v.clone())));
        let filled = self
            .backend
            .fill(&target, &context, target.instruction())
            .await
            .map_err(|source| ExecutionError::Backend {
                node_type: target.name().to_string(),
                operation: "fill",
                source,
            })?;

        let mut values = FieldMap::with_capacity(filled.len());
        for (name, value) in filled {
            match target.field(&name) {
                Some(decl) if decl.kind.is_plain() => {
                    values.insert(name, value);
                }
                Some(decl) => tracing::warn!(
                    node_type = target.name(),
                    field = %name,
                    kind = decl.kind.label(),
                    "backend value for computed field discarded"
                ),
                None => tracing::warn!(
                    node_type = target.name(),
                    field = %name,
                    "backend value for undeclared field discarded"
                ),
            }
        }

        Ok(Some(NodeInstance::new(target, values)?.revised(resolved)))
    }
}
