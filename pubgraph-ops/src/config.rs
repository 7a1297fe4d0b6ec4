//! Engine configuration.

use serde::Deserialize;

/// Tunables for execution and batching.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Relation depth of the Pub returned by [`crate::Mutation::execute`].
    pub projection_depth: usize,
    /// Batch items prepared concurrently.
    pub batch_concurrency: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            projection_depth: 1,
            batch_concurrency: 8,
        }
    }
}
