use crate::blueprint::Blueprint;
use crate::engine::Handle;
use crate::error::CatalogError;

/// Largest supported exponent, bounding the graph to about 33M nodes.
pub const MAX_EXP: u32 = 24;

/// Tree summation of `0..2^exp`.
///
/// Each number becomes a constant leaf, then neighbours are added pairwise,
/// level by level, until a single node is left. The graph has `2^(exp+1) - 1`
/// vertices and its longest path is `exp`.
pub fn tree(bp: &mut Blueprint, exp: u32) -> Result<Handle<u64>, CatalogError> {
    if exp > MAX_EXP {
        return Err(CatalogError::Parameter {
            workload: "tree",
            reason: format!("exponent {exp} is larger than {MAX_EXP}"),
        });
    }

    let mut level: Vec<Handle<u64>> = (0..1u64 << exp).map(|i| bp.constant("leaf", i)).collect();

    while level.len() > 1 {
        level = level
            .chunks(2)
            .map(|pair| {
                bp.task()
                    .name("add")
                    .depends_on((pair[0], pair[1]))
                    .run(|(x, y)| Ok(x + y))
            })
            .collect::<Result<_, _>>()?;
    }

    level.pop().ok_or_else(|| CatalogError::Parameter {
        workload: "tree",
        reason: "no leaves".into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RunConfig;

    #[test]
    fn test_tree_structure() {
        let mut bp = Blueprint::new();
        tree(&mut bp, 3).unwrap();

        let graph = bp.finish();
        let report = graph.metrics();
        assert_eq!(report.vertices, 15);
        assert_eq!(report.edges, 14);
        assert_eq!(report.critical_path_length, 3);

        let leaves = graph.roots();
        assert_eq!(leaves.len(), 8);

        let adds: Vec<_> = graph.nodes().filter(|node| !leaves.contains(node)).collect();
        assert_eq!(adds.len(), 7);
        for node in adds {
            assert_eq!(graph.dependencies(node).unwrap().len(), 2);
        }
    }

    #[test]
    fn test_tree_sum() {
        let mut bp = Blueprint::new();
        let root = tree(&mut bp, 6).unwrap();

        let graph = bp.finish();
        let output = graph.run([root], &RunConfig::default()).unwrap();
        assert_eq!(output.value(root).unwrap().unwrap(), &(0..64).sum::<u64>());
    }

    #[test]
    fn test_single_leaf() {
        let mut bp = Blueprint::new();
        let root = tree(&mut bp, 0).unwrap();

        let graph = bp.finish();
        assert_eq!(graph.metrics().critical_path_length, 0);
        let output = graph.run([root], &RunConfig::sequential()).unwrap();
        assert_eq!(output.value(root).unwrap().unwrap(), &0);
    }

    #[test]
    fn test_exponent_limit() {
        let mut bp = Blueprint::new();
        assert!(matches!(
            tree(&mut bp, MAX_EXP + 1),
            Err(CatalogError::Parameter { workload: "tree", .. })
        ));
        assert!(bp.graph().is_empty());
    }
}
