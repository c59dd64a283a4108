use agentgraph_core::InstanceError;
use thiserror::Error;

/// Errors returned synchronously by [`RunRegistry`](crate::RunRegistry).
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The initial arguments do not fit the graph's start type.
    #[error("invalid start arguments: {0}")]
    InvalidArguments(#[from] InstanceError),
}
