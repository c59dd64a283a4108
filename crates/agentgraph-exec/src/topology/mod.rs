//! Graph topology: discovery of reachable node types and graph construction.
//!
//! A graph is defined by a start type and the node types registered with a
//! [`GraphBuilder`]. [`discover`] walks successor contracts breadth-first from
//! the start; only what it reaches becomes part of the [`GraphDefinition`].
//! Construction fails with a [`ValidationReport`] listing every problem found.

mod diagnostics;
mod validate;

pub use diagnostics::{ValidationError, ValidationReport};

use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;

use agentgraph_core::{format_routes, FieldMap, InstanceError, NodeInstance, NodeType, Route, TypeTable};
use indexmap::IndexMap;

/// Node types reachable from a start type, with their successor routes.
#[derive(Debug, Clone)]
pub struct Topology {
    start: String,
    node_types: IndexMap<String, Arc<NodeType>>,
    successors: IndexMap<String, Vec<Route>>,
}

impl Topology {
    pub fn start(&self) -> &str {
        &self.start
    }

    /// Reachable types in discovery order.
    pub fn node_types(&self) -> impl Iterator<Item = &Arc<NodeType>> {
        self.node_types.values()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.node_types.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.node_types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.node_types.is_empty()
    }

    /// Declared routes of a reachable type. May name unregistered types.
    pub fn successors(&self, name: &str) -> &[Route] {
        self.successors.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every `(from, route)` pair in discovery order.
    pub fn edges(&self) -> impl Iterator<Item = (&str, &Route)> {
        self.successors
            .iter()
            .flat_map(|(from, routes)| routes.iter().map(move |r| (from.as_str(), r)))
    }

    /// Types with an empty contract.
    pub fn terminal_types(&self) -> impl Iterator<Item = &str> {
        self.node_types
            .values()
            .filter(|t| t.is_terminal())
            .map(|t| t.name())
    }
}

impl fmt::Display for Topology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for node_type in self.node_types.values() {
            let marker = if node_type.name() == self.start { "*" } else { " " };
            if node_type.is_terminal() {
                writeln!(f, "{marker} {} (terminal)", node_type.name())?;
            } else {
                writeln!(
                    f,
                    "{marker} {} -> {}",
                    node_type.name(),
                    format_routes(self.successors(node_type.name()))
                )?;
            }
        }
        Ok(())
    }
}

/// Breadth-first discovery of the types reachable from `start`.
///
/// Successor names missing from `types` are kept in the successor map but not
/// followed. Returns `None` if `start` itself is not in `types`.
pub fn discover(start: &str, types: &TypeTable) -> Option<Topology> {
    let root = types.get(start)?;

    let mut node_types = IndexMap::new();
    let mut successors = IndexMap::new();
    let mut seen: HashSet<&str> = HashSet::from([start]);
    let mut queue: VecDeque<&Arc<NodeType>> = VecDeque::from([root]);

    while let Some(node_type) = queue.pop_front() {
        for next in node_type.concrete_successors() {
            if seen.insert(next) {
                if let Some(found) = types.get(next) {
                    queue.push_back(found);
                }
            }
        }
        successors.insert(node_type.name().to_string(), node_type.successors().to_vec());
        node_types.insert(node_type.name().to_string(), Arc::clone(node_type));
    }

    Some(Topology {
        start: start.to_string(),
        node_types,
        successors,
    })
}

/// Collects node types and builds a validated [`GraphDefinition`].
#[derive(Debug)]
pub struct GraphBuilder {
    start: String,
    types: TypeTable,
    errors: Vec<ValidationError>,
}

impl GraphBuilder {
    pub fn new(start: impl Into<String>) -> Self {
        GraphBuilder {
            start: start.into(),
            types: TypeTable::new(),
            errors: Vec::new(),
        }
    }

    pub fn node(mut self, node_type: Arc<NodeType>) -> Self {
        let name = node_type.name().to_string();
        if self.types.register(node_type).is_err() {
            self.errors.push(ValidationError::DuplicateType { name });
        }
        self
    }

    pub fn nodes(self, node_types: impl IntoIterator<Item = Arc<NodeType>>) -> Self {
        node_types.into_iter().fold(self, GraphBuilder::node)
    }

    pub fn build(self) -> Result<GraphDefinition, ValidationReport> {
        let mut errors = self.errors;
        let Some(topology) = discover(&self.start, &self.types) else {
            errors.push(ValidationError::UnknownStart { name: self.start });
            return Err(ValidationReport::new(errors));
        };

        errors.extend(validate::check(&topology, &self.types));
        if !errors.is_empty() {
            return Err(ValidationReport::new(errors));
        }

        let mut reachable = TypeTable::new();
        for node_type in topology.node_types() {
            // Names are unique in the source table.
            let _ = reachable.register(Arc::clone(node_type));
        }
        tracing::debug!(
            start = %self.start,
            node_types = topology.len(),
            "graph definition built"
        );
        Ok(GraphDefinition {
            topology,
            types: Arc::new(reachable),
        })
    }
}

/// An immutable, validated graph.
#[derive(Debug, Clone)]
pub struct GraphDefinition {
    topology: Topology,
    types: Arc<TypeTable>,
}

impl GraphDefinition {
    pub fn builder(start: impl Into<String>) -> GraphBuilder {
        GraphBuilder::new(start)
    }

    pub fn start(&self) -> &str {
        self.topology.start()
    }

    pub fn start_type(&self) -> Option<&Arc<NodeType>> {
        self.types.get(self.topology.start())
    }

    pub fn node_type(&self, name: &str) -> Option<&Arc<NodeType>> {
        self.types.get(name)
    }

    /// The reachable types.
    pub fn types(&self) -> &Arc<TypeTable> {
        &self.types
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn successors(&self, name: &str) -> &[Route] {
        self.topology.successors(name)
    }

    pub fn is_terminal(&self, name: &str) -> bool {
        self.node_type(name).is_some_and(|t| t.is_terminal())
    }

    /// Builds the start instance from caller-supplied arguments.
    pub fn start_instance(&self, args: FieldMap) -> Result<NodeInstance, InstanceError> {
        self.types.instantiate(self.start(), args)
    }
}
