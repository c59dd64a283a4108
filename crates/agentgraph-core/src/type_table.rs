//! Name-indexed table of node types.
//!
//! Successor contracts, recall markers and trace parameters all refer to node
//! types by name; the [`TypeTable`] is where those names are looked up.

use std::sync::Arc;

use indexmap::IndexMap;

use crate::error::{ConfigError, InstanceError};
use crate::field::FieldMap;
use crate::node::{NodeInstance, NodeType};

/// Registry of node types keyed by name, in registration order.
#[derive(Debug, Clone, Default)]
pub struct TypeTable {
    types: IndexMap<String, Arc<NodeType>>,
}

impl TypeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a node type.
    ///
    /// Returns [`ConfigError::DuplicateType`] if the name is already taken.
    pub fn register(&mut self, node_type: Arc<NodeType>) -> Result<(), ConfigError> {
        if self.types.contains_key(node_type.name()) {
            return Err(ConfigError::DuplicateType {
                name: node_type.name().to_string(),
            });
        }
        self.types.insert(node_type.name().to_string(), node_type);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Arc<NodeType>> {
        self.types.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    /// True if some registered type is `name` or declares it as a supertype.
    pub fn matches_any(&self, name: &str) -> bool {
        self.types.values().any(|t| t.is_a(name))
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<NodeType>> {
        self.types.values()
    }

    /// Builds an instance of the named type.
    pub fn instantiate(&self, name: &str, fields: FieldMap) -> Result<NodeInstance, InstanceError> {
        let node_type = self.get(name).ok_or_else(|| InstanceError::UnknownType {
            name: name.to_string(),
        })?;
        NodeInstance::new(Arc::clone(node_type), fields)
    }
}
