//! Structural metrics of a task graph.
//!
//! Everything here is a pure function of an immutable [`TaskGraph`]: the same
//! graph always yields the same numbers.

use std::fmt::{self, Display};

use petgraph::Direction;
use serde::Serialize;

use crate::error::GraphError;
use crate::graph::TaskGraph;
use crate::types::NodeRef;

/// Which nodes the critical path has to end in.
#[derive(Debug, Clone, Copy)]
pub enum Target<'a> {
    /// The longest path anywhere in the graph.
    Global,
    /// The longest path ending in one of the given nodes.
    Terminals(&'a [NodeRef]),
}

/// Summary of the structure of a graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetricsReport {
    pub vertices: usize,
    pub edges: usize,
    /// Number of edges on the longest dependency chain.
    pub critical_path_length: usize,
}

impl Display for MetricsReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} vertices, {} edges, longest path: {}",
            self.vertices, self.edges, self.critical_path_length
        )
    }
}

/// A report labelled with the name of the workload it was computed for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NamedReport {
    pub name: String,
    #[serde(flatten)]
    pub report: MetricsReport,
}

impl Display for NamedReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.report)
    }
}

pub fn vertex_count(graph: &TaskGraph) -> usize {
    graph.node_count()
}

/// Number of edges, i.e. the number of handle-valued arguments over all nodes.
pub fn edge_count(graph: &TaskGraph) -> usize {
    graph.edge_count()
}

/// Length in edges of the longest dependency chain.
///
/// Roots have depth 0 and every other node `1 + max(depth of dependencies)`.
/// The result is 0 exactly when the selected part of the graph has no edges.
///
/// # Errors
/// Only [`Target::Terminals`] can fail, when a terminal is foreign to or
/// missing from `graph`.
pub fn critical_path_length(graph: &TaskGraph, target: Target<'_>) -> Result<usize, GraphError> {
    let depths = depths(graph);

    match target {
        Target::Global => Ok(depths.iter().copied().max().unwrap_or(0)),
        Target::Terminals(terminals) => terminals.iter().try_fold(0, |longest, &node| {
            let index = graph.check(node)?;
            Ok(longest.max(depths[index.index()]))
        }),
    }
}

/// Depth of every node, by index.
fn depths(graph: &TaskGraph) -> Vec<usize> {
    let mut depths = vec![0; graph.node_count()];

    // Dependencies always have a lower index than their dependents, so the
    // index order is a topological order.
    for index in graph.graph.node_indices() {
        depths[index.index()] = graph
            .graph
            .neighbors_directed(index, Direction::Incoming)
            .map(|dependency| depths[dependency.index()] + 1)
            .max()
            .unwrap_or(0);
    }

    depths
}

pub fn report(graph: &TaskGraph) -> MetricsReport {
    MetricsReport {
        vertices: vertex_count(graph),
        edges: edge_count(graph),
        critical_path_length: depths(graph).into_iter().max().unwrap_or(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Arg, Blueprint};

    fn chain(bp: &mut Blueprint, length: usize) -> crate::Handle<u64> {
        let first = bp.constant("start", 0u64);
        (0..length).fold(first, |prev, _| {
            bp.defer("inc", [prev.into()], |args| Ok(args.get::<u64>(0)? + 1))
                .unwrap()
        })
    }

    #[test]
    fn test_empty_graph() {
        let graph = Blueprint::new().finish();
        assert_eq!(
            report(&graph),
            MetricsReport {
                vertices: 0,
                edges: 0,
                critical_path_length: 0
            }
        );
    }

    #[test]
    fn test_no_edges_means_no_path() {
        let mut bp = Blueprint::new();
        for i in 0..4u64 {
            bp.constant("leaf", i);
        }

        let graph = bp.finish();
        let report = graph.metrics();
        assert_eq!(report.vertices, 4);
        assert_eq!(report.critical_path_length, 0);
    }

    #[test]
    fn test_longest_chain_wins() {
        let mut bp = Blueprint::new();
        let short = chain(&mut bp, 2);
        let long = chain(&mut bp, 5);

        let graph = bp.finish();
        assert_eq!(critical_path_length(&graph, Target::Global).unwrap(), 5);
        assert_eq!(
            critical_path_length(&graph, Target::Terminals(&[short.node()])).unwrap(),
            2
        );
        assert_eq!(
            critical_path_length(&graph, Target::Terminals(&[short.node(), long.node()])).unwrap(),
            5
        );
    }

    #[test]
    fn test_terminal_of_other_graph() {
        let mut other = Blueprint::new();
        let foreign = other.constant("x", 0u64);

        let graph = Blueprint::new().finish();
        assert!(critical_path_length(&graph, Target::Terminals(&[foreign.node()])).is_err());
    }

    #[test]
    fn test_edges_equal_handle_arguments() {
        let mut bp = Blueprint::new();
        let a = bp.constant("a", 1u64);
        let b = bp.constant("b", 2u64);
        let _ = bp
            .defer("mix", [a.into(), b.into(), Arg::literal(3u64), a.into()], |_| Ok(()))
            .unwrap();

        let graph = bp.finish();
        let handles: usize = graph
            .nodes()
            .map(|node| graph.node(node).unwrap().dependencies().count())
            .sum();

        assert_eq!(edge_count(&graph), handles);
        assert_eq!(edge_count(&graph), 3);
    }

    #[test]
    fn test_report_is_idempotent() {
        let mut bp = Blueprint::new();
        chain(&mut bp, 3);

        let graph = bp.finish();
        assert_eq!(graph.metrics(), graph.metrics());
    }

    #[test]
    fn test_report_format() {
        let named = NamedReport {
            name: "tree-3".into(),
            report: MetricsReport {
                vertices: 15,
                edges: 14,
                critical_path_length: 3,
            },
        };

        assert_eq!(
            named.to_string(),
            "tree-3: 15 vertices, 14 edges, longest path: 3"
        );

        let json = serde_json::to_value(&named).unwrap();
        assert_eq!(json["vertices"], 15);
        assert_eq!(json["name"], "tree-3");
    }
}
