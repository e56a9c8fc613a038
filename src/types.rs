use std::any::{Any, type_name};
use std::fmt::{self, Display};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::anyhow;
use petgraph::graph::NodeIndex;
use serde::Serialize;

/// A type-erased, thread-safe container.
///
/// Every task input and output travels through the graph as a `Value`. The
/// core never looks inside; only task bodies downcast it back to a concrete
/// type through [`Args::get`].
pub type Value = Arc<dyn Any + Send + Sync>;

/// Wraps any thread-safe value into a [`Value`].
pub fn value<T: Send + Sync + 'static>(data: T) -> Value {
    Arc::new(data)
}

/// Process-unique identity of a task graph.
///
/// Every [`Blueprint`](crate::Blueprint) draws a fresh id on creation, which
/// lets the builder recognize handles that were minted by another graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct GraphId(u64);

impl GraphId {
    pub(crate) fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        GraphId(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Display for GraphId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "g{}", self.0)
    }
}

/// Untyped identity of a single node: the graph it lives in and its position.
///
/// Positions are assigned in creation order and never reused, so a `NodeRef`
/// stays valid for the whole lifetime of its graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeRef {
    pub(crate) graph: GraphId,
    pub(crate) index: NodeIndex,
}

impl NodeRef {
    /// Creates a reference from raw parts, e.g. when mapping an exported
    /// graph back onto the live one. Nothing is validated until the reference
    /// is handed to a graph.
    pub fn new(graph: GraphId, index: usize) -> Self {
        Self {
            graph,
            index: NodeIndex::new(index),
        }
    }

    pub fn graph(&self) -> GraphId {
        self.graph
    }

    pub fn index(&self) -> usize {
        self.index.index()
    }
}

impl Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.graph, self.index.index())
    }
}

/// Resolved arguments of a task, bound by position.
///
/// Literal arguments and the outputs of upstream tasks appear here in exactly
/// the order they were passed to [`Blueprint::defer`](crate::Blueprint::defer).
#[derive(Clone, Copy)]
pub struct Args<'a> {
    name: &'a str,
    values: &'a [Value],
}

impl<'a> Args<'a> {
    pub(crate) fn new(name: &'a str, values: &'a [Value]) -> Self {
        Self { name, values }
    }

    /// Name of the task these arguments belong to.
    pub fn task(&self) -> &'a str {
        self.name
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The type-erased argument at `position`.
    pub fn raw(&self, position: usize) -> Option<&'a Value> {
        self.values.get(position)
    }

    /// Downcasts the argument at `position` to `T`.
    ///
    /// A missing argument or a type mismatch is reported as an error, which
    /// the executor records as a failure of this task.
    pub fn get<T: 'static>(&self, position: usize) -> anyhow::Result<&'a T> {
        let value = self.values.get(position).ok_or_else(|| {
            anyhow!(
                "task '{}' has no argument at position {} ({} given)",
                self.name,
                position,
                self.values.len()
            )
        })?;

        value.downcast_ref::<T>().ok_or_else(|| {
            anyhow!(
                "argument {} of task '{}' is not a {}",
                position,
                self.name,
                type_name::<T>()
            )
        })
    }

    /// Downcasts every argument to `T`, for homogeneous fan-in tasks.
    pub fn all<T: 'static>(&self) -> anyhow::Result<Vec<&'a T>> {
        (0..self.values.len()).map(|i| self.get::<T>(i)).collect()
    }
}

impl fmt::Debug for Args<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Args({}, {} values)", self.name, self.values.len())
    }
}
