//! Execution errors.

use std::fmt;

use agentgraph_core::{format_routes, InstanceError, Route};
use thiserror::Error;

use super::trace::ExecutionTrace;
use crate::resolver::ResolveError;

/// Why a run stopped before reaching a terminal node.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("resolving '{node_type}': {source}")]
    Resolve {
        node_type: String,
        #[source]
        source: ResolveError,
    },

    #[error(transparent)]
    Instance(#[from] InstanceError),

    /// The backend picked a route the node does not declare.
    #[error("'{node_type}' was routed to {choice}, expected one of: {}", format_routes(candidates))]
    InvalidRoutingChoice {
        node_type: String,
        choice: Route,
        candidates: Vec<Route>,
    },

    /// Custom logic returned a successor outside its declared contract.
    #[error("'{node_type}' logic returned {returned}, which is not declared (allowed: {})", format_routes(allowed))]
    UndeclaredSuccessor {
        node_type: String,
        returned: Route,
        allowed: Vec<Route>,
    },

    #[error("run did not reach a terminal node within {limit} steps")]
    MaxIterationsExceeded { limit: usize },

    #[error("backend {operation} failed at '{node_type}': {source}")]
    Backend {
        node_type: String,
        operation: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("logic of '{node_type}' failed: {source}")]
    Logic {
        node_type: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("run was cancelled")]
    Cancelled,
}

impl ExecutionError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            ExecutionError::Resolve { source, .. } => source.code(),
            ExecutionError::Instance(InstanceError::UnknownType { .. }) => "UNKNOWN_TYPE",
            ExecutionError::Instance(InstanceError::UnknownField { .. }) => "UNKNOWN_FIELD",
            ExecutionError::Instance(InstanceError::MissingField { .. }) => "MISSING_FIELD",
            ExecutionError::Instance(InstanceError::ComputedField { .. }) => "COMPUTED_FIELD",
            ExecutionError::InvalidRoutingChoice { .. } => "INVALID_ROUTING_CHOICE",
            ExecutionError::UndeclaredSuccessor { .. } => "UNDECLARED_SUCCESSOR",
            ExecutionError::MaxIterationsExceeded { .. } => "MAX_ITERATIONS_EXCEEDED",
            ExecutionError::Backend { .. } => "BACKEND_ERROR",
            ExecutionError::Logic { .. } => "LOGIC_ERROR",
            ExecutionError::Cancelled => "CANCELLED",
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ExecutionError::Cancelled)
    }
}

/// A stopped run: the error plus every node completed before it.
#[derive(Debug)]
pub struct RunFailure {
    pub error: ExecutionError,
    pub trace: ExecutionTrace,
}

impl fmt::Display for RunFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (after {} completed nodes)", self.error, self.trace.len())
    }
}

impl std::error::Error for RunFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}
