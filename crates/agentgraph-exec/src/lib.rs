//! Dependency resolution, graph topology and the execution loop.
//!
//! This crate turns node types from `agentgraph-core` into runnable graphs:
//! [`topology`] discovers and validates the reachable types, [`resolver`]
//! computes dependency fields with a per-run cache, and [`runner`] drives one
//! execution from the start instance to a terminal node.

pub mod resolver;
pub mod runner;
pub mod topology;

pub use resolver::{build_dependency_order, resolve, DependencyCache, ResolveError};
pub use runner::{
    ExecutionError, ExecutionTrace, GraphRunner, RunFailure, RunOptions, RunOutcome,
    StepObserver, DEFAULT_MAX_ITERATIONS,
};
pub use topology::{GraphBuilder, GraphDefinition, Topology, ValidationError, ValidationReport};
