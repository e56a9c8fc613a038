use std::sync::Arc;

use thiserror::Error;

use crate::types::{GraphId, NodeRef};

/// Structural errors of a task graph, raised while building it or before a
/// run starts.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("node {node} does not exist in this graph")]
    InvalidReference { node: NodeRef },

    #[error("node {node} belongs to graph {found}, not to graph {expected}")]
    CrossGraphReference {
        expected: GraphId,
        found: GraphId,
        node: NodeRef,
    },

    #[error("task graph contains a cycle through node {node}")]
    CycleDetected { node: NodeRef },

    #[error("Failed to build the worker pool")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

/// Failure of a single node during a run.
///
/// A failed run of one node never aborts the whole [`run`](crate::run); the
/// error is attached to that node's result slot instead, and it is cloned into
/// every terminal that observes it.
#[derive(Debug, Error, Clone)]
pub enum TaskError {
    #[error("Task '{name}' ({node}):\n{cause:#}")]
    Execution {
        node: NodeRef,
        name: Arc<str>,
        cause: Arc<anyhow::Error>,
    },

    #[error("Task {node} was skipped because its dependency {failed} failed")]
    DependencyFailed { node: NodeRef, failed: NodeRef },

    #[error("Task {node} was cancelled after an earlier failure")]
    Cancelled { node: NodeRef },
}

impl TaskError {
    /// The node this error is attached to.
    pub fn node(&self) -> NodeRef {
        match self {
            TaskError::Execution { node, .. } => *node,
            TaskError::DependencyFailed { node, .. } => *node,
            TaskError::Cancelled { node } => *node,
        }
    }

    /// The original error raised by a task body, if this node ran and failed.
    pub fn cause(&self) -> Option<&anyhow::Error> {
        match self {
            TaskError::Execution { cause, .. } => Some(cause),
            _ => None,
        }
    }
}

/// Errors of the workload catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Invalid frequency '{0}'")]
    Frequency(String),

    #[error("Unknown workload '{0}'")]
    UnknownWorkload(String),

    #[error("Workload '{workload}': {reason}")]
    Parameter {
        workload: &'static str,
        reason: String,
    },

    #[error(transparent)]
    Graph(#[from] GraphError),
}
