use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::types::NodeRef;

/// Timing of a single task execution.
#[derive(Debug, Clone, Copy)]
pub struct TaskExecution {
    pub start: Instant,
    pub duration: Duration,
}

/// Run diagnostics and performance metrics.
///
/// Returned as part of every [`RunOutput`](crate::RunOutput). Tasks that were
/// skipped or cancelled never started, so they have no entry in
/// `execution_times`.
#[derive(Debug, Default)]
pub struct Diagnostics {
    /// Timing of every task that ran, successful or not.
    pub execution_times: HashMap<NodeRef, TaskExecution>,
    /// Tasks that ran and returned a value.
    pub executed: usize,
    /// Tasks that ran and returned an error or panicked.
    pub failed: usize,
    /// Tasks not run because a dependency failed.
    pub skipped: usize,
    /// Tasks not run because the run was aborted.
    pub cancelled: usize,
    /// Wall clock time of the whole run.
    pub elapsed: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Blueprint, RunConfig};

    #[test]
    fn test_counts_every_task_that_ran() {
        let mut bp = Blueprint::new();
        let a = bp.constant("a", 1u64);
        let b = bp
            .defer("b", [a.into()], |args| Ok(args.get::<u64>(0)? + 1))
            .unwrap();

        let graph = bp.finish();
        let output = graph.run([b], &RunConfig::sequential()).unwrap();
        let diagnostics = &output.diagnostics;

        assert_eq!(diagnostics.executed, 2);
        assert_eq!(diagnostics.failed + diagnostics.skipped + diagnostics.cancelled, 0);
        assert_eq!(diagnostics.execution_times.len(), 2);

        let first = diagnostics.execution_times[&a.node()];
        let second = diagnostics.execution_times[&b.node()];
        assert!(first.start + first.duration <= second.start);
    }

    #[test]
    fn test_empty_run() {
        assert!(Diagnostics::default().execution_times.is_empty());
    }
}
