//! Structural and dependency checks run by [`GraphBuilder::build`](super::GraphBuilder::build).

use std::collections::HashMap;

use agentgraph_core::{FieldKind, NodeType, TypeTable};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{Bfs, Reversed};

use super::{Topology, ValidationError};
use crate::resolver::{build_dependency_order, dependency_closure, ResolveError};

pub(super) fn check(topology: &Topology, types: &TypeTable) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    for node_type in topology.node_types() {
        if node_type.is_terminal() && node_type.logic().is_some() {
            errors.push(ValidationError::EmptyContract {
                node_type: node_type.name().to_string(),
            });
        }
        for next in node_type.concrete_successors() {
            if !types.contains(next) {
                errors.push(ValidationError::UnknownSuccessor {
                    from: node_type.name().to_string(),
                    to: next.to_string(),
                });
            }
        }
    }

    errors.extend(check_terminal_paths(topology));
    for node_type in topology.node_types() {
        errors.extend(check_fields(node_type, topology));
    }
    errors
}

/// Every reachable type must be able to reach a node that ends the run.
fn check_terminal_paths(topology: &Topology) -> Vec<ValidationError> {
    let mut graph: DiGraph<&str, ()> = DiGraph::new();
    let sink = graph.add_node("<terminal>");
    let index: HashMap<&str, NodeIndex> = topology
        .node_types()
        .map(|t| (t.name(), graph.add_node(t.name())))
        .collect();

    for node_type in topology.node_types() {
        let from = index[node_type.name()];
        if node_type.is_terminal() || node_type.allows_terminal() {
            graph.add_edge(from, sink, ());
        }
        for next in node_type.concrete_successors() {
            if let Some(&to) = index.get(next) {
                graph.update_edge(from, to, ());
            }
        }
    }

    let reversed = Reversed(&graph);
    let mut can_finish = vec![false; graph.node_count()];
    let mut bfs = Bfs::new(reversed, sink);
    while let Some(node) = bfs.next(reversed) {
        can_finish[node.index()] = true;
    }

    topology
        .node_types()
        .filter(|t| !can_finish[index[t.name()].index()])
        .map(|t| ValidationError::MissingTerminalPath {
            node_type: t.name().to_string(),
        })
        .collect()
}

/// Dependency and recall fields must be resolvable within this graph.
fn check_fields(node_type: &NodeType, topology: &Topology) -> Vec<ValidationError> {
    let known = |target: &str| topology.node_types().any(|t| t.is_a(target));
    let owner = node_type.name();
    let mut errors = Vec::new();

    for decl in node_type.computed_fields() {
        match &decl.kind {
            FieldKind::Recall { target, .. } => {
                if !known(target) {
                    errors.push(ValidationError::UnknownRecallTarget {
                        node_type: owner.to_string(),
                        field: decl.name.clone(),
                        target: target.clone(),
                    });
                }
            }
            FieldKind::Dependency(function) => {
                let roots = std::slice::from_ref(function);
                if let Err(ResolveError::CyclicDependency { functions }) =
                    build_dependency_order(roots)
                {
                    errors.push(ValidationError::DependencyCycle {
                        node_type: owner.to_string(),
                        field: decl.name.clone(),
                        functions,
                    });
                    continue;
                }

                for reached in dependency_closure(roots).values() {
                    if !reached.is_defined() {
                        errors.push(ValidationError::UndefinedDependency {
                            node_type: owner.to_string(),
                            field: decl.name.clone(),
                            function: reached.name().to_string(),
                        });
                    }
                    for target in reached.trace_params().filter(|t| !known(*t)) {
                        errors.push(ValidationError::UnknownRecallTarget {
                            node_type: owner.to_string(),
                            field: decl.name.clone(),
                            target: target.to_string(),
                        });
                    }
                }
            }
            FieldKind::Plain => {}
        }
    }
    errors
}
