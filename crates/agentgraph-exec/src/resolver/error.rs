use thiserror::Error;

/// Errors raised while resolving dependency and recall fields.
///
/// Every variant is fatal to the resolution in progress. Nothing is retried.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The dependency graph contains a cycle; no function was invoked.
    #[error("cyclic dependency between: {}", functions.join(", "))]
    CyclicDependency { functions: Vec<String> },

    /// A node-typed parameter found no matching instance in the trace.
    #[error("'{function}' needs a '{node_type}' from the trace, but none was visited")]
    MissingTraceDependency { function: String, node_type: String },

    /// A recall field without a fallback found no matching instance.
    #[error("'{node_type}.{field}' recalls '{target}', but none was visited")]
    MissingRecall {
        node_type: String,
        field: String,
        target: String,
    },

    /// A forward-declared function was never given a body.
    #[error("dependency function '{function}' was declared but never defined")]
    UndefinedDependency { function: String },

    /// The function body returned an error.
    #[error("dependency function '{function}' failed: {source}")]
    DependencyFailed {
        function: String,
        #[source]
        source: anyhow::Error,
    },
}

impl ResolveError {
    pub fn code(&self) -> &'static str {
        match self {
            ResolveError::CyclicDependency { .. } => "CYCLIC_DEPENDENCY",
            ResolveError::MissingTraceDependency { .. } => "MISSING_TRACE_DEPENDENCY",
            ResolveError::MissingRecall { .. } => "MISSING_RECALL",
            ResolveError::UndefinedDependency { .. } => "UNDEFINED_DEPENDENCY",
            ResolveError::DependencyFailed { .. } => "DEPENDENCY_FAILED",
        }
    }
}
