//! Runtime configuration.
//!
//! Values come from the environment:
//! - `AGENTGRAPH_ARCHIVE_CAPACITY`: finished runs kept in history (default: 64)
//! - `AGENTGRAPH_MAX_ITERATIONS`: steps allowed per run (default: 10)

use agentgraph_exec::DEFAULT_MAX_ITERATIONS;
use thiserror::Error;

pub const ARCHIVE_CAPACITY_VAR: &str = "AGENTGRAPH_ARCHIVE_CAPACITY";
pub const MAX_ITERATIONS_VAR: &str = "AGENTGRAPH_MAX_ITERATIONS";

pub const DEFAULT_ARCHIVE_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeConfig {
    pub archive_capacity: usize,
    pub max_iterations: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            archive_capacity: DEFAULT_ARCHIVE_CAPACITY,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeConfigError {
    #[error("{var} must be a positive integer, got '{value}'")]
    Invalid { var: &'static str, value: String },
}

impl RuntimeConfig {
    pub fn from_env() -> Result<Self, RuntimeConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Builds a config from an arbitrary variable source; unset variables keep
    /// their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, RuntimeConfigError> {
        let defaults = RuntimeConfig::default();
        Ok(RuntimeConfig {
            archive_capacity: parse_positive(ARCHIVE_CAPACITY_VAR, lookup(ARCHIVE_CAPACITY_VAR))?
                .unwrap_or(defaults.archive_capacity),
            max_iterations: parse_positive(MAX_ITERATIONS_VAR, lookup(MAX_ITERATIONS_VAR))?
                .unwrap_or(defaults.max_iterations),
        })
    }

    pub fn with_archive_capacity(mut self, capacity: usize) -> Self {
        self.archive_capacity = capacity;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }
}

fn parse_positive(var: &'static str, raw: Option<String>) -> Result<Option<usize>, RuntimeConfigError> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    match raw.trim().parse::<usize>() {
        Ok(n) if n > 0 => Ok(Some(n)),
        _ => Err(RuntimeConfigError::Invalid { var, value: raw }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| vars.get(k).cloned()
    }

    #[test]
    fn unset_variables_use_defaults() {
        let config = RuntimeConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, RuntimeConfig::default());
        assert_eq!(config.archive_capacity, 64);
        assert_eq!(config.max_iterations, 10);
    }

    #[test]
    fn variables_override_defaults() {
        let config = RuntimeConfig::from_lookup(lookup(&[
            (ARCHIVE_CAPACITY_VAR, "2"),
            (MAX_ITERATIONS_VAR, " 25 "),
        ]))
        .unwrap();
        assert_eq!(config.archive_capacity, 2);
        assert_eq!(config.max_iterations, 25);
    }

    #[test]
    fn zero_and_garbage_are_rejected() {
        let err = RuntimeConfig::from_lookup(lookup(&[(ARCHIVE_CAPACITY_VAR, "0")])).unwrap_err();
        assert_eq!(
            err,
            RuntimeConfigError::Invalid {
                var: ARCHIVE_CAPACITY_VAR,
                value: "0".to_string()
            }
        );
        assert!(RuntimeConfig::from_lookup(lookup(&[(MAX_ITERATIONS_VAR, "ten")])).is_err());
    }
}
