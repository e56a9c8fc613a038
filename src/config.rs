use std::num::NonZeroUsize;

use serde::{Deserialize, Serialize};

/// What the executor does once a task fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Skip everything downstream of the failed task, but keep running every
    /// independent branch to completion.
    #[default]
    Drain,
    /// Stop scheduling new tasks after the first failure. Tasks already
    /// running are allowed to finish; everything else is reported as
    /// cancelled.
    Abort,
}

/// Tuning knobs for a single run of the executor.
///
/// Every field has a default, so a config file only needs to name what it
/// changes:
///
/// ```rust
/// let config: dagbench::RunConfig = serde_json::from_str(r#"{"concurrency": 2}"#).unwrap();
/// assert_eq!(config.concurrency, 2);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Upper bound on the number of tasks running at the same time.
    /// Zero is treated as one.
    pub concurrency: usize,
    pub failure_policy: FailurePolicy,
    /// Drop intermediate results as soon as every dependent has consumed
    /// them, instead of keeping them until the run ends.
    pub release_intermediates: bool,
}

impl RunConfig {
    /// A single worker; tasks run one at a time.
    pub fn sequential() -> Self {
        Self {
            concurrency: 1,
            ..Self::default()
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn with_release_intermediates(mut self, release: bool) -> Self {
        self.release_intermediates = release;
        self
    }

    pub(crate) fn workers(&self) -> usize {
        self.concurrency.max(1)
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            concurrency: std::thread::available_parallelism()
                .map(NonZeroUsize::get)
                .unwrap_or(1),
            failure_policy: FailurePolicy::default(),
            release_intermediates: false,
        }
    }
}
