//! Node types and node instances.
//!
//! A [`NodeType`] is an immutable schema: a classified field table, optional
//! supertype tags used by recall matching, and a successor contract. The
//! contract lists the [`Route`]s the node may take next. Nodes without custom
//! logic auto-route over that contract; nodes with custom logic must return an
//! instance whose type is in it (or `None` when it contains [`Route::Terminal`]).
//!
//! A [`NodeInstance`] pairs a type with concrete field values and is never
//! mutated; [`NodeInstance::revised`] builds a new one.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use smallvec::SmallVec;

use crate::error::{ConfigError, InstanceError};
use crate::field::{classify, FieldDecl, FieldKind, FieldMap, FieldSpec};
use crate::logic::NodeLogic;

/// One entry in a successor contract.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "node_type", rename_all = "snake_case")]
pub enum Route {
    /// Continue with an instance of the named type.
    Node(String),
    /// End the run after the current node.
    Terminal,
}

impl Route {
    pub fn node(name: impl Into<String>) -> Self {
        Route::Node(name.into())
    }

    pub fn node_type(&self) -> Option<&str> {
        match self {
            Route::Node(name) => Some(name),
            Route::Terminal => None,
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Route::Node(name) => f.write_str(name),
            Route::Terminal => f.write_str("<terminal>"),
        }
    }
}

/// Renders a route list as `A | B | <terminal>`.
pub fn format_routes(routes: &[Route]) -> String {
    routes
        .iter()
        .map(|r| r.to_string())
        .collect::<Vec<_>>()
        .join(" | ")
}

/// An immutable node schema.
pub struct NodeType {
    name: String,
    description: Option<String>,
    supertypes: Vec<String>,
    fields: IndexMap<String, FieldDecl>,
    successors: SmallVec<[Route; 4]>,
    logic: Option<Arc<dyn NodeLogic>>,
}

impl NodeType {
    pub fn builder(name: impl Into<String>) -> NodeTypeBuilder {
        NodeTypeBuilder {
            name: name.into(),
            description: None,
            supertypes: Vec::new(),
            fields: Vec::new(),
            successors: SmallVec::new(),
            logic: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Instruction handed to the backend when filling this type.
    pub fn instruction(&self) -> &str {
        self.description.as_deref().unwrap_or(&self.name)
    }

    pub fn supertypes(&self) -> &[String] {
        &self.supertypes
    }

    /// True if `name` is this type's name or one of its supertypes.
    pub fn is_a(&self, name: &str) -> bool {
        self.name == name || self.supertypes.iter().any(|s| s == name)
    }

    /// Classified fields in declaration order.
    pub fn fields(&self) -> &IndexMap<String, FieldDecl> {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldDecl> {
        self.fields.get(name)
    }

    pub fn plain_fields(&self) -> impl Iterator<Item = &FieldDecl> {
        self.fields.values().filter(|f| f.kind.is_plain())
    }

    /// Dependency and recall fields.
    pub fn computed_fields(&self) -> impl Iterator<Item = &FieldDecl> {
        self.fields.values().filter(|f| !f.kind.is_plain())
    }

    pub fn successors(&self) -> &[Route] {
        &self.successors
    }

    /// Successor type names, excluding the terminal route.
    pub fn concrete_successors(&self) -> impl Iterator<Item = &str> {
        self.successors.iter().filter_map(Route::node_type)
    }

    pub fn allows_terminal(&self) -> bool {
        self.successors.contains(&Route::Terminal)
    }

    /// A node with an empty contract ends the run when reached.
    pub fn is_terminal(&self) -> bool {
        self.successors.is_empty()
    }

    pub fn logic(&self) -> Option<&Arc<dyn NodeLogic>> {
        self.logic.as_ref()
    }

    pub fn uses_auto_routing(&self) -> bool {
        self.logic.is_none()
    }
}

impl fmt::Debug for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeType")
            .field("name", &self.name)
            .field("supertypes", &self.supertypes)
            .field("fields", &self.fields.keys().collect::<Vec<_>>())
            .field("successors", &self.successors)
            .field("custom_logic", &self.logic.is_some())
            .finish()
    }
}

/// Builder for [`NodeType`]; classification happens in [`build`](Self::build).
pub struct NodeTypeBuilder {
    name: String,
    description: Option<String>,
    supertypes: Vec<String>,
    fields: Vec<FieldSpec>,
    successors: SmallVec<[Route; 4]>,
    logic: Option<Arc<dyn NodeLogic>>,
}

impl NodeTypeBuilder {
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Declares a supertype tag matched by recall and trace parameters.
    pub fn is_a(mut self, supertype: impl Into<String>) -> Self {
        self.supertypes.push(supertype.into());
        self
    }

    pub fn field(mut self, spec: FieldSpec) -> Self {
        self.fields.push(spec);
        self
    }

    /// Adds candidate successor types to the contract.
    pub fn routes_to<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for name in names {
            self.push_route(Route::Node(name.into()));
        }
        self
    }

    /// Allows the run to end after this node.
    pub fn or_terminal(mut self) -> Self {
        self.push_route(Route::Terminal);
        self
    }

    /// Replaces auto-routing with custom step logic.
    pub fn logic(mut self, logic: impl NodeLogic + 'static) -> Self {
        self.logic = Some(Arc::new(logic));
        self
    }

    fn push_route(&mut self, route: Route) {
        if !self.successors.contains(&route) {
            self.successors.push(route);
        }
    }

    pub fn build(self) -> Result<Arc<NodeType>, ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::InvalidName { name: self.name });
        }
        if let Some(bad) = self.successors.iter().find_map(|r| match r {
            Route::Node(n) if n.trim().is_empty() => Some(n.clone()),
            _ => None,
        }) {
            return Err(ConfigError::InvalidName { name: bad });
        }

        let fields = classify(&self.name, &self.fields)?;
        Ok(Arc::new(NodeType {
            name: self.name,
            description: self.description,
            supertypes: self.supertypes,
            fields,
            successors: self.successors,
            logic: self.logic,
        }))
    }
}

/// Concrete field values for one node type.
#[derive(Clone)]
pub struct NodeInstance {
    node_type: Arc<NodeType>,
    fields: FieldMap,
}

impl NodeInstance {
    /// Builds an instance from plain-field values, filling defaults.
    ///
    /// Every plain field must end up with a value. Dependency and recall
    /// fields are resolved by the executor and are rejected here; inject into
    /// the run's dependency cache to substitute a dependency.
    pub fn new(node_type: Arc<NodeType>, mut values: FieldMap) -> Result<Self, InstanceError> {
        for name in values.keys() {
            match node_type.field(name) {
                None => {
                    return Err(InstanceError::UnknownField {
                        node_type: node_type.name().to_string(),
                        field: name.clone(),
                    })
                }
                Some(decl) if !decl.kind.is_plain() => {
                    return Err(InstanceError::ComputedField {
                        node_type: node_type.name().to_string(),
                        field: name.clone(),
                        kind: decl.kind.label(),
                    })
                }
                Some(_) => {}
            }
        }

        let mut fields = FieldMap::with_capacity(node_type.fields().len());
        for decl in node_type.fields().values() {
            match values.shift_remove(&decl.name) {
                Some(value) => {
                    fields.insert(decl.name.clone(), value);
                }
                None => match (&decl.kind, &decl.default) {
                    (FieldKind::Plain, Some(default)) => {
                        fields.insert(decl.name.clone(), default.clone());
                    }
                    (FieldKind::Plain, None) => {
                        return Err(InstanceError::MissingField {
                            node_type: node_type.name().to_string(),
                            field: decl.name.clone(),
                        })
                    }
                    _ => {}
                },
            }
        }

        Ok(NodeInstance { node_type, fields })
    }

    pub fn node_type(&self) -> &Arc<NodeType> {
        &self.node_type
    }

    pub fn type_name(&self) -> &str {
        self.node_type.name()
    }

    pub fn is_a(&self, name: &str) -> bool {
        self.node_type.is_a(name)
    }

    pub fn fields(&self) -> &FieldMap {
        &self.fields
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Deserializes one field.
    pub fn field<T: DeserializeOwned>(&self, name: &str) -> anyhow::Result<T> {
        let value = self
            .fields
            .get(name)
            .ok_or_else(|| anyhow::anyhow!("'{}' has no value for '{}'", self.type_name(), name))?;
        Ok(serde_json::from_value(value.clone())?)
    }

    /// Names of dependency and recall fields that have no value yet.
    pub fn unresolved(&self) -> impl Iterator<Item = &FieldDecl> {
        self.node_type
            .computed_fields()
            .filter(|d| !self.fields.contains_key(&d.name))
    }

    /// Returns a new instance with `values` merged over this one.
    ///
    /// Unknown field names are ignored. Field order follows the declaration.
    /// The executor re-resolves dependency and recall fields at every step,
    /// so values merged into those fields here do not survive execution.
    pub fn revised(&self, mut values: FieldMap) -> NodeInstance {
        let mut fields = FieldMap::with_capacity(self.node_type.fields().len());
        for name in self.node_type.fields().keys() {
            if let Some(value) = values.shift_remove(name).or_else(|| self.fields.get(name).cloned()) {
                fields.insert(name.clone(), value);
            }
        }
        NodeInstance {
            node_type: Arc::clone(&self.node_type),
            fields,
        }
    }
}

impl PartialEq for NodeInstance {
    fn eq(&self, other: &Self) -> bool {
        self.type_name() == other.type_name() && self.fields == other.fields
    }
}

impl fmt::Debug for NodeInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct(self.type_name());
        for (name, value) in &self.fields {
            s.field(name, value);
        }
        s.finish()
    }
}

impl Serialize for NodeInstance {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("NodeInstance", 2)?;
        s.serialize_field("type", self.type_name())?;
        s.serialize_field("fields", &self.fields)?;
        s.end()
    }
}
