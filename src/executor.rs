mod diagnostics;

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::mpsc::{Sender, channel};
use std::time::{Duration, Instant};

use anyhow::anyhow;
use petgraph::Direction;
use petgraph::graph::NodeIndex;
use tracing::Level;
use tracing_indicatif::span_ext::IndicatifSpanExt;

use crate::config::{FailurePolicy, RunConfig};
use crate::engine::{Arg, Handle};
use crate::error::{GraphError, TaskError};
use crate::graph::TaskGraph;
use crate::types::{Args, NodeRef, Value};

pub use diagnostics::{Diagnostics, TaskExecution};

/// Result slot of a single node.
pub type NodeResult = Result<Value, TaskError>;

/// Everything a run produced.
#[derive(Debug)]
pub struct RunOutput {
    /// One entry per requested terminal.
    pub results: BTreeMap<NodeRef, NodeResult>,
    pub diagnostics: Diagnostics,
}

impl RunOutput {
    pub fn result(&self, node: impl Into<NodeRef>) -> Option<&NodeResult> {
        self.results.get(&node.into())
    }

    /// Typed access to the result of a terminal. Returns `None` if `handle`
    /// was not one of the requested terminals.
    pub fn value<T: 'static>(&self, handle: Handle<T>) -> Option<Result<&T, &TaskError>> {
        match self.results.get(&handle.node())? {
            Ok(value) => value.downcast_ref::<T>().map(Ok),
            Err(err) => Some(Err(err)),
        }
    }

    /// Whether every terminal produced a value.
    pub fn is_success(&self) -> bool {
        self.results.values().all(Result::is_ok)
    }

    pub fn failures(&self) -> impl Iterator<Item = (&NodeRef, &TaskError)> {
        self.results
            .iter()
            .filter_map(|(node, result)| result.as_ref().err().map(|err| (node, err)))
    }
}

/// Message sent by a worker once a task has finished.
struct Completion {
    index: NodeIndex,
    output: anyhow::Result<Value>,
    start: Instant,
    duration: Duration,
}

/// Executes the part of `graph` needed to compute `terminals`.
///
/// An empty `terminals` slice selects every sink of the graph. Each node in
/// the dependency cone of the terminals runs exactly once, on a worker pool
/// bounded by [`RunConfig::concurrency`]. A task failure never fails the run:
/// it is recorded in the node's result slot, every node downstream of it is
/// reported as [`TaskError::DependencyFailed`], and the rest of the graph is
/// handled according to [`RunConfig::failure_policy`].
///
/// The algorithm works as follows:
/// 1. The terminals are validated and their ancestor cone is collected.
/// 2. For every node in the cone, the number of unfinished dependencies is
///    counted.
/// 3. Nodes with no unfinished dependencies are spawned on the worker pool.
/// 4. The calling thread waits for completions from the workers. When a node
///    succeeds, its output is cached and the counts of its dependents are
///    decremented; a dependent whose count reaches zero is spawned. When a
///    node fails, its whole downstream cone is settled as skipped.
/// 5. The loop continues until every node of the cone is settled.
///
/// # Errors
/// Fails only for structural problems: foreign or unknown terminals, a cycle,
/// or a worker pool that cannot be created.
pub fn run(
    graph: &TaskGraph,
    terminals: &[NodeRef],
    config: &RunConfig,
) -> Result<RunOutput, GraphError> {
    let targets: Vec<NodeIndex> = if terminals.is_empty() {
        graph.sinks().into_iter().map(|node| node.index).collect()
    } else {
        terminals
            .iter()
            .map(|&node| graph.check(node))
            .collect::<Result<_, _>>()?
    };

    // Unreachable for graphs built through a blueprint, which only ever
    // reference existing nodes.
    petgraph::algo::toposort(&graph.graph, None).map_err(|cycle| GraphError::CycleDetected {
        node: graph.node_ref(cycle.node_id()),
    })?;

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.workers())
        .thread_name(|i| format!("dagbench-worker-{i}"))
        .build()?;

    let cone = graph.ancestors(&targets);
    let mut scheduler = Scheduler::new(graph, &cone, &targets, config);
    let started = Instant::now();

    let root_span = tracing::span!(Level::INFO, "run", graph = %graph.id, tasks = cone.len());
    root_span.pb_set_length(cone.len() as u64);
    root_span.pb_set_style(&crate::utils::style_bar());
    root_span.pb_set_message("Running tasks...");
    let _enter = root_span.enter();

    tracing::debug!(workers = config.workers(), policy = ?config.failure_policy, "starting run");

    let (sender, receiver) = channel::<Completion>();

    // The scheduler loop stays on the calling thread, so every pool thread is
    // free for tasks.
    loop {
        while let Some(index) = scheduler.next_ready() {
            scheduler.spawn(&pool, &sender, &root_span, index);
        }

        if scheduler.is_done() {
            break;
        }

        if scheduler.in_flight == 0 {
            if scheduler.aborted {
                break;
            }

            return Err(GraphError::CycleDetected {
                node: graph.node_ref(scheduler.first_unsettled()),
            });
        }

        let Ok(completion) = receiver.recv() else {
            break;
        };

        scheduler.complete(completion);
        root_span.pb_inc(1);
    }

    let output = scheduler.finish(&targets, started.elapsed());

    tracing::info!(
        executed = output.diagnostics.executed,
        failed = output.diagnostics.failed,
        skipped = output.diagnostics.skipped,
        cancelled = output.diagnostics.cancelled,
        elapsed = ?output.diagnostics.elapsed,
        "run complete"
    );

    Ok(output)
}

/// Bookkeeping of one run. Only the thread driving the run touches it;
/// workers communicate exclusively through the completion channel.
struct Scheduler<'g> {
    graph: &'g TaskGraph,
    policy: FailurePolicy,
    release: bool,
    /// Dependency → dependents within the cone, one entry per edge.
    dependents: HashMap<NodeIndex, Vec<NodeIndex>>,
    /// Number of unfinished dependencies per node.
    pending: HashMap<NodeIndex, usize>,
    /// Number of dependents that have not yet collected their input.
    consumers: HashMap<NodeIndex, usize>,
    terminals: HashSet<NodeIndex>,
    ready: VecDeque<NodeIndex>,
    cache: HashMap<NodeIndex, Value>,
    errors: HashMap<NodeIndex, TaskError>,
    settled: HashSet<NodeIndex>,
    total: usize,
    in_flight: usize,
    aborted: bool,
    diagnostics: Diagnostics,
}

impl<'g> Scheduler<'g> {
    fn new(
        graph: &'g TaskGraph,
        cone: &HashSet<NodeIndex>,
        targets: &[NodeIndex],
        config: &RunConfig,
    ) -> Self {
        // The cone is closed under dependencies, so an edge ending inside it
        // also starts inside it.
        let mut dependents: HashMap<NodeIndex, Vec<NodeIndex>> = HashMap::new();
        for edge in graph.graph.raw_edges() {
            if cone.contains(&edge.target()) {
                dependents
                    .entry(edge.source())
                    .or_default()
                    .push(edge.target());
            }
        }

        let pending: HashMap<NodeIndex, usize> = cone
            .iter()
            .map(|&index| {
                (
                    index,
                    graph
                        .graph
                        .neighbors_directed(index, Direction::Incoming)
                        .count(),
                )
            })
            .collect();

        let consumers = dependents
            .iter()
            .map(|(&index, list)| (index, list.len()))
            .collect();

        // Seed in index order so that a sequential run is reproducible.
        let mut ready: Vec<NodeIndex> = pending
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(&index, _)| index)
            .collect();
        ready.sort();

        Self {
            graph,
            policy: config.failure_policy,
            release: config.release_intermediates,
            dependents,
            pending,
            consumers,
            terminals: targets.iter().copied().collect(),
            ready: ready.into(),
            cache: HashMap::new(),
            errors: HashMap::new(),
            settled: HashSet::new(),
            total: cone.len(),
            in_flight: 0,
            aborted: false,
            diagnostics: Diagnostics::default(),
        }
    }

    fn next_ready(&mut self) -> Option<NodeIndex> {
        if self.aborted {
            return None;
        }
        self.ready.pop_front()
    }

    fn is_done(&self) -> bool {
        self.settled.len() == self.total
    }

    fn first_unsettled(&self) -> NodeIndex {
        let mut unsettled: Vec<_> = self
            .pending
            .keys()
            .filter(|index| !self.settled.contains(index))
            .copied()
            .collect();
        unsettled.sort();
        unsettled.first().copied().unwrap_or_default()
    }

    /// Collects the inputs of `index` and hands the task to the pool.
    fn spawn(
        &mut self,
        pool: &rayon::ThreadPool,
        sender: &Sender<Completion>,
        root_span: &tracing::Span,
        index: NodeIndex,
    ) {
        let graph = self.graph;
        let node = &graph.graph[index];

        let mut inputs = Vec::with_capacity(node.args.len());
        for arg in &node.args {
            match arg {
                Arg::Literal(value) => inputs.push(value.clone()),
                Arg::Ref(dependency) => match self.cache.get(&dependency.index) {
                    Some(value) => inputs.push(value.clone()),
                    None => {
                        let cause = anyhow!("output of dependency {dependency} is not available");
                        self.fail(index, Instant::now(), Duration::ZERO, cause);
                        return;
                    }
                },
            }
        }

        for dependency in node.dependencies() {
            self.consume(dependency.index);
        }

        let callable = node.callable.clone();
        let name = node.name.clone();
        let node_ref = graph.node_ref(index);
        let sender = sender.clone();
        let root_span = root_span.clone();

        self.in_flight += 1;

        pool.spawn(move || {
            let span = tracing::span!(parent: &root_span, Level::INFO, "task", name = %name, node = %node_ref);
            span.pb_set_style(&crate::utils::style_task());
            span.pb_set_message(&format!("Running {name}"));
            let _enter = span.enter();

            let start = Instant::now();

            // Task bodies are opaque user code. A panic must not take the
            // scheduler down with it, so it is turned into a task failure.
            let output = match catch_unwind(AssertUnwindSafe(|| {
                callable(&Args::new(&name, &inputs))
            })) {
                Ok(output) => output,
                Err(panic) => {
                    let msg = if let Some(s) = panic.downcast_ref::<&str>() {
                        format!("Task panicked: {s}")
                    } else if let Some(s) = panic.downcast_ref::<String>() {
                        format!("Task panicked: {s}")
                    } else {
                        String::from("Task panicked with unknown payload")
                    };

                    Err(anyhow!(msg))
                }
            };

            let duration = start.elapsed();

            // The receiver only disappears if the run itself is gone.
            let _ = sender.send(Completion {
                index,
                output,
                start,
                duration,
            });
        });
    }

    /// One dependent collected the output of `index`.
    fn consume(&mut self, index: NodeIndex) {
        if let Some(count) = self.consumers.get_mut(&index) {
            *count = count.saturating_sub(1);
            if *count == 0 && self.release && !self.terminals.contains(&index) {
                self.cache.remove(&index);
                tracing::trace!(node = index.index(), "released intermediate result");
            }
        }
    }

    fn complete(&mut self, completion: Completion) {
        self.in_flight -= 1;

        let Completion {
            index,
            output,
            start,
            duration,
        } = completion;

        match output {
            Ok(value) => {
                self.diagnostics
                    .execution_times
                    .insert(self.graph.node_ref(index), TaskExecution { start, duration });
                self.diagnostics.executed += 1;
                self.settled.insert(index);

                // A dependency consumed by nobody in the cone is only kept
                // when somebody asked for it.
                let unused = !self.consumers.contains_key(&index) && !self.terminals.contains(&index);
                if !(self.release && unused) {
                    self.cache.insert(index, value);
                }

                self.unlock(index);
            }
            Err(cause) => self.fail(index, start, duration, cause),
        }
    }

    /// Decrements the pending counts of the dependents of `index`.
    fn unlock(&mut self, index: NodeIndex) {
        let Some(dependents) = self.dependents.get(&index) else {
            return;
        };

        for &dependent in dependents {
            if let Some(count) = self.pending.get_mut(&dependent) {
                *count -= 1;
                if *count == 0 && !self.settled.contains(&dependent) {
                    self.ready.push_back(dependent);
                }
            }
        }
    }

    /// Records the failure of `index` and settles its whole downstream cone.
    fn fail(&mut self, index: NodeIndex, start: Instant, duration: Duration, cause: anyhow::Error) {
        let node = self.graph.node_ref(index);
        let name = self.graph.graph[index].name.to_string();

        tracing::error!(node = %node, name = %name, "task failed: {cause:#}");

        self.diagnostics
            .execution_times
            .insert(node, TaskExecution { start, duration });
        self.diagnostics.failed += 1;
        self.settled.insert(index);
        self.errors.insert(
            index,
            TaskError::Execution {
                node,
                name: name.into(),
                cause: Arc::new(cause),
            },
        );

        let mut queue: VecDeque<NodeIndex> = self
            .dependents
            .get(&index)
            .cloned()
            .unwrap_or_default()
            .into();

        while let Some(dependent) = queue.pop_front() {
            if !self.settled.insert(dependent) {
                continue;
            }

            self.diagnostics.skipped += 1;
            self.errors.insert(
                dependent,
                TaskError::DependencyFailed {
                    node: self.graph.node_ref(dependent),
                    failed: node,
                },
            );

            if let Some(next) = self.dependents.get(&dependent) {
                queue.extend(next.iter().copied());
            }
        }

        if self.policy == FailurePolicy::Abort && !self.aborted {
            tracing::warn!(node = %node, "aborting run, no new tasks will be scheduled");
            self.aborted = true;
        }
    }

    fn finish(mut self, targets: &[NodeIndex], elapsed: Duration) -> RunOutput {
        // Whatever was never settled was cut off by an abort.
        let unsettled: Vec<NodeIndex> = self
            .pending
            .keys()
            .filter(|index| !self.settled.contains(index))
            .copied()
            .collect();

        for index in unsettled {
            self.diagnostics.cancelled += 1;
            self.errors.insert(
                index,
                TaskError::Cancelled {
                    node: self.graph.node_ref(index),
                },
            );
        }

        let mut results = BTreeMap::new();
        for &index in targets {
            let node = self.graph.node_ref(index);
            let result = match self.errors.get(&index) {
                Some(err) => Err(err.clone()),
                None => match self.cache.get(&index) {
                    Some(value) => Ok(value.clone()),
                    None => Err(TaskError::Cancelled { node }),
                },
            };
            results.insert(node, result);
        }

        self.diagnostics.elapsed = elapsed;

        RunOutput {
            results,
            diagnostics: self.diagnostics,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::{Blueprint, Handle};

    fn inc(bp: &mut Blueprint, name: &'static str, input: Handle<u64>) -> Handle<u64> {
        bp.defer(name, [input.into()], |args| Ok(args.get::<u64>(0)? + 1))
            .unwrap()
    }

    fn failing(bp: &mut Blueprint, input: Handle<u64>) -> Handle<u64> {
        bp.defer("boom", [input.into()], |_| -> anyhow::Result<u64> {
            anyhow::bail!("something broke irreparably")
        })
        .unwrap()
    }

    #[test]
    fn test_shared_dependency_runs_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut bp = Blueprint::new();

        let counter = calls.clone();
        let shared = bp
            .defer("shared", [], move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(5u64)
            })
            .unwrap();

        let fanout: Vec<_> = (0..3).map(|_| inc(&mut bp, "inc", shared)).collect();
        let total = bp
            .defer("sum", fanout.iter().map(Arg::from), |args| {
                Ok(args.all::<u64>()?.into_iter().sum::<u64>())
            })
            .unwrap();

        let graph = bp.finish();
        let output = graph.run([total], &RunConfig::default().with_concurrency(4)).unwrap();

        assert_eq!(output.value(total).unwrap().unwrap(), &18);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(output.diagnostics.executed, 5);
    }

    #[test]
    fn test_failure_propagates_downstream_only() {
        // A -> B -> C, B fails
        let mut bp = Blueprint::new();
        let a = bp.constant("a", 1u64);
        let b = failing(&mut bp, a);
        let c = inc(&mut bp, "c", b);

        let graph = bp.finish();
        let output = graph.run([a, b, c], &RunConfig::sequential()).unwrap();

        assert_eq!(output.value(a).unwrap().unwrap(), &1);

        let err = output.value(b).unwrap().unwrap_err();
        assert!(matches!(err, TaskError::Execution { node, .. } if *node == b.node()));
        assert!(err.cause().unwrap().to_string().contains("irreparably"));

        assert!(matches!(
            output.value(c).unwrap(),
            Err(TaskError::DependencyFailed { node, failed }) if *node == c.node() && *failed == b.node()
        ));
        assert!(!output.is_success());
        assert_eq!(output.failures().count(), 2);
    }

    #[test]
    fn test_drain_keeps_independent_branches() {
        let mut bp = Blueprint::new();
        let root = bp.constant("root", 1u64);
        let bad = failing(&mut bp, root);
        let good = (0..5).fold(root, |prev, _| inc(&mut bp, "step", prev));

        let graph = bp.finish();
        let output = graph.run([bad, good], &RunConfig::sequential()).unwrap();

        assert!(output.value(bad).unwrap().is_err());
        assert_eq!(output.value(good).unwrap().unwrap(), &6);
        assert_eq!(output.diagnostics.cancelled, 0);
    }

    #[test]
    fn test_abort_cancels_unscheduled_nodes() {
        let mut bp = Blueprint::new();
        let root = bp.constant("root", 1u64);
        let bad = failing(&mut bp, root);
        let good = (0..5).fold(root, |prev, _| inc(&mut bp, "step", prev));

        let graph = bp.finish();
        let config = RunConfig::sequential().with_failure_policy(FailurePolicy::Abort);
        let output = graph.run([bad, good], &config).unwrap();

        // With a single worker `bad` (index 1) runs before the second step
        // of the chain is unlocked.
        assert!(matches!(output.value(bad).unwrap(), Err(TaskError::Execution { .. })));
        assert!(matches!(
            output.value(good).unwrap(),
            Err(TaskError::Cancelled { node }) if *node == good.node()
        ));
        assert!(output.diagnostics.cancelled > 0);
    }

    #[test]
    fn test_panic_becomes_task_failure() {
        let mut bp = Blueprint::new();
        let bad = bp
            .defer("panics", [], |_| -> anyhow::Result<u64> { panic!("kaboom") })
            .unwrap();

        let graph = bp.finish();
        let output = graph.run([bad], &RunConfig::sequential()).unwrap();

        let err = output.value(bad).unwrap().unwrap_err();
        assert!(err.cause().unwrap().to_string().contains("kaboom"));
    }

    #[test]
    fn test_only_the_cone_of_terminals_runs() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut bp = Blueprint::new();

        let wanted = bp.constant("wanted", 1u64);
        let counter = calls.clone();
        let _unrelated = bp
            .defer("unrelated", [], move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();

        let graph = bp.finish();
        let output = graph.run([wanted], &RunConfig::default()).unwrap();

        assert!(output.is_success());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_empty_terminals_select_sinks() {
        let mut bp = Blueprint::new();
        let a = bp.constant("a", 1u64);
        let b = inc(&mut bp, "b", a);
        let c = bp.constant("c", 7u64);

        let graph = bp.finish();
        let output = run(&graph, &[], &RunConfig::default()).unwrap();

        assert_eq!(output.results.len(), 2);
        assert_eq!(output.value(b).unwrap().unwrap(), &2);
        assert_eq!(output.value(c).unwrap().unwrap(), &7);
        assert!(output.value(a).is_none());
    }

    #[test]
    fn test_foreign_terminal_is_rejected() {
        let mut other = Blueprint::new();
        let foreign = other.constant("x", 1u64);

        let graph = Blueprint::new().finish();
        let result = graph.run([foreign], &RunConfig::default());
        assert!(matches!(result, Err(GraphError::CrossGraphReference { .. })));
    }

    #[test]
    fn test_cycle_is_reported() {
        let mut bp = Blueprint::new();
        let a = bp.constant("a", 1u64);
        let b = inc(&mut bp, "b", a);

        // Blueprints cannot express a back edge, so it is forced in by hand.
        let mut graph = bp.finish();
        graph.graph.add_edge(b.node().index, a.node().index, ());

        let result = graph.run([b], &RunConfig::sequential());
        assert!(matches!(result, Err(GraphError::CycleDetected { .. })));
    }

    #[test]
    fn test_release_intermediates_keeps_terminals() {
        let mut bp = Blueprint::new();
        let a = bp.constant("a", 1u64);
        let b = inc(&mut bp, "b", a);
        let c = inc(&mut bp, "c", b);

        let graph = bp.finish();
        let config = RunConfig::sequential().with_release_intermediates(true);
        let output = graph.run([b, c], &config).unwrap();

        assert_eq!(output.value(b).unwrap().unwrap(), &2);
        assert_eq!(output.value(c).unwrap().unwrap(), &3);
    }

    #[test]
    fn test_results_do_not_depend_on_concurrency() {
        let mut bp = Blueprint::new();
        let leaves: Vec<_> = (0..64u64).map(|i| bp.constant("leaf", i)).collect();
        let squares: Vec<_> = leaves
            .iter()
            .map(|leaf| {
                bp.defer("square", [leaf.into()], |args| {
                    let x = args.get::<u64>(0)?;
                    Ok(x * x)
                })
                .unwrap()
            })
            .collect();
        let total = bp
            .defer("sum", squares.iter().map(Arg::from), |args| {
                Ok(args.all::<u64>()?.into_iter().sum::<u64>())
            })
            .unwrap();

        let graph = bp.finish();
        for workers in [1, 2, 8] {
            let output = graph
                .run([total], &RunConfig::default().with_concurrency(workers))
                .unwrap();
            assert_eq!(output.value(total).unwrap().unwrap(), &85344);
        }
    }
}
