//! Dependency resolution.
//!
//! [`resolve`] evaluates a set of dependency functions against a run's
//! [`DependencyCache`] and execution trace. Functions are ordered first, as in
//! [`build_dependency_order`], so a cycle fails before anything runs. Each
//! function is invoked at most once per cache; cached and injected values are
//! reused as-is and their own dependencies are never evaluated.
//!
//! [`resolve_fields`] applies the same machinery to the dependency and recall
//! fields of one node.

mod cache;
mod error;
mod order;

pub use cache::DependencyCache;
pub use error::ResolveError;
pub use order::build_dependency_order;
pub(crate) use order::dependency_closure;
use order::order_until;

use agentgraph_core::{Arg, DepArgs, DepFn, DepId, FieldKind, FieldMap, NodeInstance, NodeType, Param};
use indexmap::IndexMap;
use serde_json::Value;

/// The most recent trace instance whose type is `node_type` or declares it as
/// a supertype.
pub fn find_in_trace<'a>(trace: &'a [NodeInstance], node_type: &str) -> Option<&'a NodeInstance> {
    trace.iter().rev().find(|n| n.is_a(node_type))
}

/// Resolves `functions` (and their transitive dependencies) into `cache`.
///
/// A function already in the cache is a leaf: whatever it depends on is
/// neither ordered nor invoked. Returns the value of each requested function.
/// Stops at the first error.
pub fn resolve(
    functions: &[DepFn],
    cache: &mut DependencyCache,
    trace: &[NodeInstance],
) -> Result<IndexMap<DepId, Value>, ResolveError> {
    let order = order_until(functions, |id| cache.contains(id))?;
    for function in order {
        if cache.contains(function.id()) {
            tracing::debug!(function = function.name(), "dependency cache hit");
            continue;
        }

        let outcome = {
            let args = gather_args(&function, cache, trace)?;
            function.invoke(&DepArgs::new(function.name(), args))
        };
        let value = match outcome {
            Some(Ok(value)) => value,
            Some(Err(source)) => {
                return Err(ResolveError::DependencyFailed {
                    function: function.name().to_string(),
                    source,
                })
            }
            None => {
                return Err(ResolveError::UndefinedDependency {
                    function: function.name().to_string(),
                })
            }
        };
        tracing::debug!(function = function.name(), "dependency invoked");
        cache.insert(function.id(), value);
    }

    let mut resolved = IndexMap::with_capacity(functions.len());
    for function in functions {
        if let Some(value) = cache.get(function.id()) {
            resolved.insert(function.id(), value.clone());
        }
    }
    Ok(resolved)
}

fn gather_args<'a>(
    function: &DepFn,
    cache: &'a DependencyCache,
    trace: &'a [NodeInstance],
) -> Result<Vec<Arg<'a>>, ResolveError> {
    function
        .params()
        .iter()
        .map(|param| match param {
            Param::Dep(dep) => cache
                .get(dep.id())
                .map(Arg::Value)
                .ok_or_else(|| ResolveError::UndefinedDependency {
                    function: dep.name().to_string(),
                }),
            Param::Node(node_type) => find_in_trace(trace, node_type)
                .map(Arg::Node)
                .ok_or_else(|| ResolveError::MissingTraceDependency {
                    function: function.name().to_string(),
                    node_type: node_type.clone(),
                }),
        })
        .collect()
}

/// Resolves the dependency and recall fields of `node`.
pub fn resolve_fields(
    node: &NodeInstance,
    cache: &mut DependencyCache,
    trace: &[NodeInstance],
) -> Result<FieldMap, ResolveError> {
    resolve_type_fields(node.node_type(), cache, trace)
}

/// Resolves every computed field of `node_type`.
///
/// Dependency fields share one evaluation order, so functions used by several
/// fields run once. A recall field takes the fields of the latest matching
/// trace instance as a JSON object, or its declared fallback.
pub fn resolve_type_fields(
    node_type: &NodeType,
    cache: &mut DependencyCache,
    trace: &[NodeInstance],
) -> Result<FieldMap, ResolveError> {
    let missing: Vec<_> = node_type.computed_fields().collect();

    let functions: Vec<DepFn> = missing
        .iter()
        .filter_map(|decl| match &decl.kind {
            FieldKind::Dependency(function) => Some(function.clone()),
            _ => None,
        })
        .collect();
    let values = if functions.is_empty() {
        IndexMap::new()
    } else {
        resolve(&functions, cache, trace)?
    };

    let mut resolved = FieldMap::with_capacity(missing.len());
    for decl in missing {
        let value = match &decl.kind {
            FieldKind::Dependency(function) => values.get(&function.id()).cloned(),
            FieldKind::Recall { target, fallback } => match find_in_trace(trace, target) {
                Some(found) => Some(recalled(found)),
                None => match fallback {
                    Some(fallback) => Some(fallback.clone()),
                    None => {
                        return Err(ResolveError::MissingRecall {
                            node_type: node_type.name().to_string(),
                            field: decl.name.clone(),
                            target: target.clone(),
                        })
                    }
                },
            },
            FieldKind::Plain => None,
        };
        if let Some(value) = value {
            resolved.insert(decl.name.clone(), value);
        }
    }
    Ok(resolved)
}

fn recalled(instance: &NodeInstance) -> Value {
    Value::Object(
        instance
            .fields()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
    )
}
