//! Stable identity for dependency functions.
//!
//! Dependency caching is keyed by function identity rather than by name, so
//! two functions that happen to share a name never collide in a run's cache.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

use serde::{Deserialize, Serialize};

static NEXT_DEP_ID: AtomicU32 = AtomicU32::new(0);

/// Process-unique dependency function identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DepId(pub u32);

impl DepId {
    /// Allocates the next unused identifier.
    pub(crate) fn next() -> Self {
        DepId(NEXT_DEP_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for DepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dep#{}", self.0)
    }
}
