//! Core error types for agentgraph-core.
//!
//! [`ConfigError`] covers bad declarations and is raised while node types are
//! being defined. [`InstanceError`] covers field values that do not fit a
//! node type's schema.

use thiserror::Error;

/// Definition-time errors for node types and dependency functions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A field carries both a dependency marker and a recall marker.
    #[error("field '{field}' on '{node_type}' is marked both dependency and recall")]
    ConflictingMarkers { node_type: String, field: String },

    /// A field carries the same kind of marker more than once.
    #[error("field '{field}' on '{node_type}' has more than one {marker} marker")]
    DuplicateMarker {
        node_type: String,
        field: String,
        marker: &'static str,
    },

    /// Two fields with the same name on one node type.
    #[error("duplicate field '{field}' on '{node_type}'")]
    DuplicateField { node_type: String, field: String },

    /// A plain default was attached to a dependency or recall field.
    #[error(
        "field '{field}' on '{node_type}' is computed and cannot declare a default; \
         use recall_or for a recall fallback"
    )]
    DefaultOnComputedField { node_type: String, field: String },

    /// An empty type, field, or function name.
    #[error("invalid name: '{name}'")]
    InvalidName { name: String },

    /// Registering a node type name that already exists in the table.
    #[error("duplicate node type: '{name}'")]
    DuplicateType { name: String },

    /// A forward-declared dependency function was defined twice.
    #[error("dependency function '{function}' is already defined")]
    DependencyRedefined { function: String },
}

/// Errors raised while constructing a [`NodeInstance`](crate::NodeInstance).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InstanceError {
    /// The requested node type is not known.
    #[error("unknown node type: '{name}'")]
    UnknownType { name: String },

    /// A value was supplied for a field the type does not declare.
    #[error("'{node_type}' has no field '{field}'")]
    UnknownField { node_type: String, field: String },

    /// A plain field has neither a value nor a declared default.
    #[error("'{node_type}' is missing required field '{field}'")]
    MissingField { node_type: String, field: String },

    /// A value was supplied for a dependency or recall field.
    #[error("'{field}' on '{node_type}' is a {kind} field and cannot be set directly")]
    ComputedField {
        node_type: String,
        field: String,
        kind: &'static str,
    },
}
