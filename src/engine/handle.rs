use std::marker::PhantomData;

use crate::engine::Arg;
use crate::types::{GraphId, NodeRef};

/// A type-safe reference to a task in the graph.
///
/// A `Handle<T>` is a lightweight, copyable token that represents the future
/// result of type `T` of a deferred call. Passing it as an argument to another
/// deferred call is what creates a dependency edge; the executor guarantees
/// the referenced task runs before every task that holds its handle.
///
/// # Diamond Dependencies
///
/// A handle may be passed to any number of downstream tasks. If Task B and
/// Task C both depend on Task A, and Task D depends on both B and C, Task A is
/// executed *once* per run and its result is shared.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct Handle<T> {
    pub(crate) node: NodeRef,
    _phantom: PhantomData<fn() -> T>,
}

impl<T> Handle<T> {
    pub(crate) fn new(node: NodeRef) -> Self {
        Self {
            node,
            _phantom: PhantomData,
        }
    }

    /// Returns the untyped identity of the task.
    pub fn node(&self) -> NodeRef {
        self.node
    }

    /// The graph this handle was minted by.
    pub fn graph(&self) -> GraphId {
        self.node.graph
    }
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> From<Handle<T>> for NodeRef {
    fn from(handle: Handle<T>) -> Self {
        handle.node
    }
}

impl<T> From<Handle<T>> for Arg {
    fn from(handle: Handle<T>) -> Self {
        Arg::Ref(handle.node)
    }
}

impl<T> From<&Handle<T>> for Arg {
    fn from(handle: &Handle<T>) -> Self {
        Arg::Ref(handle.node)
    }
}
