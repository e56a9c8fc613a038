//! The task graph container.
//!
//! A [`TaskGraph`] is a Directed Acyclic Graph of [`TaskNode`]s. It is built
//! through a [`Blueprint`](crate::Blueprint) and is append-only: a node may
//! only reference nodes that already exist, so every edge points from a lower
//! index to a higher one. This makes the graph acyclic by construction and
//! turns the node index order into a valid topological order.
//!
//! Under the hood the graph is a `petgraph::Graph` whose edges carry no data;
//! one edge is stored for each handle-valued argument of a node.

use std::collections::HashSet;

use petgraph::Direction;
use petgraph::Graph;
use petgraph::graph::NodeIndex;
use petgraph::visit::{Dfs, Reversed};
use serde::Serialize;

use crate::config::RunConfig;
use crate::engine::{Arg, TaskNode};
use crate::error::GraphError;
use crate::executor::RunOutput;
use crate::metrics::MetricsReport;
use crate::types::{GraphId, NodeRef};

pub struct TaskGraph {
    pub(crate) id: GraphId,
    pub(crate) graph: Graph<TaskNode, ()>,
}

impl TaskGraph {
    pub(crate) fn new() -> Self {
        Self {
            id: GraphId::next(),
            graph: Graph::new(),
        }
    }

    pub fn id(&self) -> GraphId {
        self.id
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Checks that `node` belongs to this graph and exists in it.
    pub(crate) fn check(&self, node: NodeRef) -> Result<NodeIndex, GraphError> {
        if node.graph != self.id {
            return Err(GraphError::CrossGraphReference {
                expected: self.id,
                found: node.graph,
                node,
            });
        }

        if node.index.index() >= self.graph.node_count() {
            return Err(GraphError::InvalidReference { node });
        }

        Ok(node.index)
    }

    pub(crate) fn node_ref(&self, index: NodeIndex) -> NodeRef {
        NodeRef {
            graph: self.id,
            index,
        }
    }

    /// Validates the arguments of `node` and appends it, deriving one edge per
    /// handle-valued argument. The graph is left untouched on error.
    pub(crate) fn insert(&mut self, node: TaskNode) -> Result<NodeRef, GraphError> {
        let dependencies = node
            .args
            .iter()
            .filter_map(Arg::node)
            .map(|dependency| self.check(dependency))
            .collect::<Result<Vec<_>, _>>()?;

        let index = self.graph.add_node(node);

        for dependency in dependencies {
            self.graph.add_edge(dependency, index, ());
        }

        Ok(self.node_ref(index))
    }

    pub fn node(&self, node: NodeRef) -> Result<&TaskNode, GraphError> {
        let index = self.check(node)?;
        Ok(&self.graph[index])
    }

    /// All nodes in creation order.
    pub fn nodes(&self) -> impl Iterator<Item = NodeRef> + '_ {
        self.graph.node_indices().map(|index| self.node_ref(index))
    }

    /// Direct predecessors of `node`, one entry per edge.
    pub fn dependencies(&self, node: NodeRef) -> Result<Vec<NodeRef>, GraphError> {
        self.neighbors(node, Direction::Incoming)
    }

    /// Direct successors of `node`, one entry per edge.
    pub fn dependents(&self, node: NodeRef) -> Result<Vec<NodeRef>, GraphError> {
        self.neighbors(node, Direction::Outgoing)
    }

    fn neighbors(&self, node: NodeRef, direction: Direction) -> Result<Vec<NodeRef>, GraphError> {
        let index = self.check(node)?;
        let mut list: Vec<_> = self
            .graph
            .neighbors_directed(index, direction)
            .map(|index| self.node_ref(index))
            .collect();
        list.sort();
        Ok(list)
    }

    /// Nodes without dependencies.
    pub fn roots(&self) -> Vec<NodeRef> {
        self.boundary(Direction::Incoming)
    }

    /// Nodes without dependents.
    pub fn sinks(&self) -> Vec<NodeRef> {
        self.boundary(Direction::Outgoing)
    }

    fn boundary(&self, direction: Direction) -> Vec<NodeRef> {
        self.graph
            .node_indices()
            .filter(|&index| {
                self.graph
                    .neighbors_directed(index, direction)
                    .next()
                    .is_none()
            })
            .map(|index| self.node_ref(index))
            .collect()
    }

    /// Every node the given targets transitively depend on, targets included.
    pub(crate) fn ancestors(&self, targets: &[NodeIndex]) -> HashSet<NodeIndex> {
        let reversed = Reversed(&self.graph);
        let mut visited = HashSet::new();

        for &target in targets {
            if visited.contains(&target) {
                continue;
            }

            let mut dfs = Dfs::new(reversed, target);
            while let Some(index) = dfs.next(reversed) {
                visited.insert(index);
            }
        }

        visited
    }

    /// Structural dump of the graph for external renderers.
    pub fn export(&self) -> GraphExport {
        let nodes = self
            .graph
            .node_indices()
            .map(|index| {
                let node = &self.graph[index];
                ExportNode {
                    id: index.index(),
                    label: node.name.to_string(),
                    output: node.output,
                }
            })
            .collect();

        let edges = self
            .graph
            .raw_edges()
            .iter()
            .map(|edge| (edge.source().index(), edge.target().index()))
            .collect();

        GraphExport {
            graph: self.id,
            nodes,
            edges,
        }
    }

    /// Structural metrics of the whole graph.
    pub fn metrics(&self) -> MetricsReport {
        crate::metrics::report(self)
    }

    /// Executes the graph for the given terminals, see [`crate::run`].
    pub fn run<I, N>(&self, terminals: I, config: &RunConfig) -> Result<RunOutput, GraphError>
    where
        I: IntoIterator<Item = N>,
        N: Into<NodeRef>,
    {
        let terminals: Vec<NodeRef> = terminals.into_iter().map(Into::into).collect();
        crate::executor::run(self, &terminals, config)
    }
}

impl std::fmt::Debug for TaskGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskGraph")
            .field("id", &self.id)
            .field("nodes", &self.graph.node_count())
            .field("edges", &self.graph.edge_count())
            .finish()
    }
}

/// Vertex and edge lists of a graph, sufficient to draw it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphExport {
    pub graph: GraphId,
    pub nodes: Vec<ExportNode>,
    /// `(predecessor, successor)` pairs, in creation order.
    pub edges: Vec<(usize, usize)>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportNode {
    pub id: usize,
    /// Name of the task callable.
    pub label: String,
    /// Type name of the task output.
    pub output: &'static str,
}
