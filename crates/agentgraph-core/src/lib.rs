//! Data model for typed agent graphs.
//!
//! A graph is a set of [`NodeType`]s chained by declared successor routes.
//! Each node type carries a classified field table ([`FieldKind`]) telling the
//! executor which values come from the caller or the model backend, which are
//! computed by [`DepFn`]s, and which are recalled from earlier steps.

pub mod backend;
pub mod dependency;
pub mod error;
pub mod field;
pub mod id;
pub mod logic;
pub mod node;
pub mod testing;
pub mod type_table;

// Re-export commonly used types
pub use backend::ModelBackend;
pub use dependency::{Arg, DepArgs, DepFn, Param};
pub use error::{ConfigError, InstanceError};
pub use field::{classify, FieldDecl, FieldKind, FieldMap, FieldSpec};
pub use id::DepId;
pub use logic::{logic_fn, NodeLogic, StepContext};
pub use node::{format_routes, NodeInstance, NodeType, NodeTypeBuilder, Route};
pub use type_table::TypeTable;
