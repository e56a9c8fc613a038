use std::any::type_name;
use std::borrow::Cow;
use std::sync::Arc;

use crate::engine::{Arg, Callable, Dependencies, Handle, TaskNode};
use crate::error::GraphError;
use crate::graph::TaskGraph;
use crate::types::{Args, GraphId, NodeRef, Value};

/// The blueprint of a task graph.
///
/// `Blueprint` turns ordinary function calls into deferred tasks. Instead of
/// running a callable, [`Blueprint::defer`] records it together with its
/// arguments and hands back a [`Handle`] to its future result. Passing that
/// handle into further deferred calls wires the dependency edges; you never
/// touch edges directly.
///
/// Each blueprint owns its own graph. Handles minted by one blueprint are
/// rejected by every other one, so two graphs are never merged by accident.
///
/// Once configured, call [`Blueprint::finish`] to get the immutable
/// [`TaskGraph`] which can be analyzed and executed.
///
/// # Example
///
/// ```rust
/// use dagbench::{Arg, Blueprint, RunConfig};
///
/// let mut bp = Blueprint::new();
/// let a = bp.constant("a", 20u64);
/// let b = bp
///     .defer("add", [a.into(), Arg::literal(22u64)], |args| {
///         Ok(args.get::<u64>(0)? + args.get::<u64>(1)?)
///     })
///     .unwrap();
///
/// let graph = bp.finish();
/// let output = graph.run([b], &RunConfig::default()).unwrap();
/// assert_eq!(output.value(b).unwrap().unwrap(), &42);
/// ```
pub struct Blueprint {
    pub(crate) graph: TaskGraph,
}

impl Blueprint {
    /// Creates a new, empty blueprint with a fresh graph identity.
    pub fn new() -> Self {
        Self {
            graph: TaskGraph::new(),
        }
    }

    pub fn id(&self) -> GraphId {
        self.graph.id
    }

    /// Read-only view of the graph built so far.
    pub fn graph(&self) -> &TaskGraph {
        &self.graph
    }

    /// Freezes the blueprint into an immutable graph.
    pub fn finish(self) -> TaskGraph {
        tracing::debug!(
            graph = %self.graph.id,
            nodes = self.graph.node_count(),
            edges = self.graph.edge_count(),
            "finished task graph"
        );
        self.graph
    }

    /// Adds a node with an already type-erased callable.
    ///
    /// Fails with [`GraphError::CrossGraphReference`] if an argument refers to
    /// a node of another graph and with [`GraphError::InvalidReference`] if it
    /// refers to a node that does not exist (yet). The graph is not modified
    /// on failure.
    pub fn create_node<F>(
        &mut self,
        name: impl Into<Cow<'static, str>>,
        args: impl IntoIterator<Item = Arg>,
        callable: F,
    ) -> Result<NodeRef, GraphError>
    where
        F: Fn(&Args<'_>) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        let callable: Callable = Arc::new(callable);
        self.insert(name.into(), "Value", args.into_iter().collect(), callable)
    }

    /// Defers a call of `callable` with positional `args`.
    ///
    /// Arguments may freely mix literals ([`Arg::literal`]) and handles of
    /// earlier deferred calls; every handle becomes one dependency edge. The
    /// returned handle can be passed to any number of later calls.
    pub fn defer<R, F>(
        &mut self,
        name: impl Into<Cow<'static, str>>,
        args: impl IntoIterator<Item = Arg>,
        callable: F,
    ) -> Result<Handle<R>, GraphError>
    where
        R: Send + Sync + 'static,
        F: Fn(&Args<'_>) -> anyhow::Result<R> + Send + Sync + 'static,
    {
        let erased: Callable = Arc::new(move |args: &Args<'_>| -> anyhow::Result<Value> {
            Ok(Arc::new(callable(args)?) as Value)
        });
        let node = self.insert(name.into(), type_name::<R>(), args.into_iter().collect(), erased)?;
        Ok(Handle::new(node))
    }

    /// Adds a task without arguments that always yields `data`.
    pub fn constant<T>(&mut self, name: impl Into<Cow<'static, str>>, data: T) -> Handle<T>
    where
        T: Send + Sync + 'static,
    {
        let data: Value = Arc::new(data);
        let callable: Callable = Arc::new(move |_: &Args<'_>| -> anyhow::Result<Value> {
            Ok(data.clone())
        });
        Handle::new(self.push(TaskNode::new(name.into(), type_name::<T>(), vec![], callable)))
    }

    /// The entry point of the typed, fluent task definition.
    pub fn task(&mut self) -> TaskDef<'_> {
        TaskDef {
            blueprint: self,
            name: None,
        }
    }

    fn insert(
        &mut self,
        name: Cow<'static, str>,
        output: &'static str,
        args: Vec<Arg>,
        callable: Callable,
    ) -> Result<NodeRef, GraphError> {
        let node = self
            .graph
            .insert(TaskNode::new(name, output, args, callable))?;

        tracing::trace!(node = %node, name = %self.graph.graph[node.index].name, "deferred task");
        Ok(node)
    }

    /// Appends a node without arguments, which cannot fail validation.
    fn push(&mut self, node: TaskNode) -> NodeRef {
        debug_assert!(node.args.is_empty());
        let index = self.graph.graph.add_node(node);
        self.graph.node_ref(index)
    }
}

impl Default for Blueprint {
    fn default() -> Self {
        Self::new()
    }
}

pub struct TaskDef<'a> {
    blueprint: &'a mut Blueprint,
    name: Option<Cow<'static, str>>,
}

impl<'a> TaskDef<'a> {
    pub fn name(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn depends_on<D>(self, dependencies: D) -> TaskBinder<'a, D>
    where
        D: Dependencies,
    {
        TaskBinder {
            blueprint: self.blueprint,
            name: self.name,
            dependencies,
        }
    }

    /// Defers a task without dependencies.
    pub fn run<F, R>(self, callback: F) -> Handle<R>
    where
        F: Fn() -> anyhow::Result<R> + Send + Sync + 'static,
        R: Send + Sync + 'static,
    {
        let name = self.name.unwrap_or(type_name::<F>().into());
        let callable: Callable = Arc::new(move |_: &Args<'_>| -> anyhow::Result<Value> {
            Ok(Arc::new(callback()?) as Value)
        });
        Handle::new(
            self.blueprint
                .push(TaskNode::new(name, type_name::<R>(), vec![], callable)),
        )
    }
}

pub struct TaskBinder<'a, D> {
    blueprint: &'a mut Blueprint,
    name: Option<Cow<'static, str>>,
    dependencies: D,
}

impl<'a, D> TaskBinder<'a, D>
where
    D: Dependencies + Send + Sync + 'static,
{
    pub fn name(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Defers `callback`, which receives the resolved outputs of the
    /// dependencies.
    pub fn run<F, R>(self, callback: F) -> Result<Handle<R>, GraphError>
    where
        F: for<'b> Fn(D::Output<'b>) -> anyhow::Result<R> + Send + Sync + 'static,
        R: Send + Sync + 'static,
    {
        let name = self.name.unwrap_or(type_name::<F>().into());
        let args = self.dependencies.args();
        let dependencies = self.dependencies;

        self.blueprint.defer(name, args, move |args| {
            let inputs = dependencies.resolve(args)?;
            callback(inputs)
        })
    }
}
