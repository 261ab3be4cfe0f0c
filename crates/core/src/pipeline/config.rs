//! Configuration for the pipeline module.

use serde::{Deserialize, Serialize};

/// Configuration for a pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Maximum jobs running at once.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Stop submitting jobs after the first failure.
    #[serde(default)]
    pub fail_fast: bool,

    /// Ignore the cache and rebuild everything.
    #[serde(default)]
    pub force: bool,
}

/// One worker per available CPU.
pub fn default_concurrency() -> usize {
    num_cpus::get().max(1)
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            fail_fast: false,
            force: false,
        }
    }
}

impl PipelineConfig {
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }
}
