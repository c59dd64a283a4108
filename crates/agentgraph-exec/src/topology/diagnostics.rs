//! Construction-time diagnostics for graph definitions.

use std::fmt;

use thiserror::Error;

/// One problem found while building a [`GraphDefinition`](super::GraphDefinition).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("node type '{name}' is registered more than once")]
    DuplicateType { name: String },

    #[error("start type '{name}' is not registered")]
    UnknownStart { name: String },

    #[error("'{from}' routes to unknown node type '{to}'")]
    UnknownSuccessor { from: String, to: String },

    /// Custom logic on a node whose contract is empty; the logic could never run.
    #[error("'{node_type}' has custom logic but no successor routes")]
    EmptyContract { node_type: String },

    #[error("no terminal node is reachable from '{node_type}'")]
    MissingTerminalPath { node_type: String },

    /// A recall target or node-typed dependency parameter that no reachable
    /// type satisfies.
    #[error("'{node_type}.{field}' reads '{target}' from the trace, but no reachable type matches")]
    UnknownRecallTarget {
        node_type: String,
        field: String,
        target: String,
    },

    #[error("'{node_type}.{field}' has cyclic dependencies: {}", functions.join(", "))]
    DependencyCycle {
        node_type: String,
        field: String,
        functions: Vec<String>,
    },

    #[error("'{node_type}.{field}' uses dependency function '{function}', which was never defined")]
    UndefinedDependency {
        node_type: String,
        field: String,
        function: String,
    },
}

/// Every problem found while building a graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationReport {
    pub errors: Vec<ValidationError>,
}

impl ValidationReport {
    pub fn new(errors: Vec<ValidationError>) -> Self {
        ValidationReport { errors }
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ValidationError> {
        self.errors.iter()
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid graph ({} problem", self.errors.len())?;
        if self.errors.len() != 1 {
            f.write_str("s")?;
        }
        f.write_str(")")?;
        for error in &self.errors {
            write!(f, "\n  - {error}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationReport {}
