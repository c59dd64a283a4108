//! Evaluation order for dependency functions.

use std::collections::{HashMap, VecDeque};

use agentgraph_core::{DepFn, DepId};
use indexmap::IndexMap;
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;

use super::error::ResolveError;

/// Returns `functions` and everything they transitively depend on, ordered so
/// that each function comes after all of its dependencies.
///
/// Fails with [`ResolveError::CyclicDependency`] if the dependency graph has a
/// cycle. Nothing is invoked here, so a cycle is always reported before any
/// function runs.
pub fn build_dependency_order(functions: &[DepFn]) -> Result<Vec<DepFn>, ResolveError> {
    order_until(functions, |_| false)
}

/// Like [`build_dependency_order`], but the dependencies of any function for
/// which `settled` returns true are not followed. Such a function still
/// appears in the order, as a leaf.
pub(crate) fn order_until(
    functions: &[DepFn],
    settled: impl Fn(DepId) -> bool,
) -> Result<Vec<DepFn>, ResolveError> {
    let closure = closure_until(functions, &settled);

    // Edges run from a dependency to the function that consumes it.
    let mut graph: DiGraph<DepId, ()> = DiGraph::with_capacity(closure.len(), closure.len());
    let mut index: HashMap<DepId, NodeIndex> = HashMap::with_capacity(closure.len());
    for id in closure.keys() {
        index.insert(*id, graph.add_node(*id));
    }
    for function in closure.values().filter(|f| !settled(f.id())) {
        let to = index[&function.id()];
        for dep in function.dependencies() {
            graph.update_edge(index[&dep.id()], to, ());
        }
    }

    // Kahn's algorithm
    let mut in_degree: HashMap<NodeIndex, usize> = graph
        .node_indices()
        .map(|n| (n, graph.edges_directed(n, Direction::Incoming).count()))
        .collect();
    let mut queue: VecDeque<NodeIndex> = graph
        .node_indices()
        .filter(|n| in_degree[n] == 0)
        .collect();

    let mut sorted = Vec::with_capacity(closure.len());
    while let Some(node) = queue.pop_front() {
        sorted.push(closure[&graph[node]].clone());
        for edge in graph.edges_directed(node, Direction::Outgoing) {
            if let Some(deg) = in_degree.get_mut(&edge.target()) {
                *deg -= 1;
                if *deg == 0 {
                    queue.push_back(edge.target());
                }
            }
        }
    }

    if sorted.len() != closure.len() {
        return Err(ResolveError::CyclicDependency {
            functions: cycle_members(&graph, &closure),
        });
    }
    Ok(sorted)
}

/// `functions` plus everything they reach through [`DepFn::dependencies`], in
/// discovery order. Terminates on cyclic references.
pub(crate) fn dependency_closure(functions: &[DepFn]) -> IndexMap<DepId, DepFn> {
    closure_until(functions, &|_| false)
}

fn closure_until(functions: &[DepFn], settled: &dyn Fn(DepId) -> bool) -> IndexMap<DepId, DepFn> {
    let mut closure: IndexMap<DepId, DepFn> = IndexMap::new();
    let mut stack: Vec<DepFn> = functions.iter().rev().cloned().collect();
    while let Some(function) = stack.pop() {
        if closure.contains_key(&function.id()) {
            continue;
        }
        if settled(function.id()) {
            closure.insert(function.id(), function);
            continue;
        }
        for dep in function.dependencies() {
            if !closure.contains_key(&dep.id()) {
                stack.push(dep.clone());
            }
        }
        closure.insert(function.id(), function);
    }
    closure
}

/// Names of functions that sit on a cycle, in discovery order.
fn cycle_members(graph: &DiGraph<DepId, ()>, closure: &IndexMap<DepId, DepFn>) -> Vec<String> {
    let mut on_cycle: Vec<DepId> = tarjan_scc(graph)
        .into_iter()
        .filter(|scc| scc.len() > 1 || graph.contains_edge(scc[0], scc[0]))
        .flatten()
        .map(|n| graph[n])
        .collect();
    on_cycle.sort_by_key(|id| closure.get_index_of(id));
    on_cycle
        .into_iter()
        .filter_map(|id| closure.get(&id).map(|f| f.name().to_string()))
        .collect()
}
