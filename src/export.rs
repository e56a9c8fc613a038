//! Text renderings of a [`GraphExport`].
//!
//! The only format produced here is Graphviz DOT. Turning it into an image is
//! left to external tools (`dot -Tsvg`).

use std::fmt::{self, Write};

use crate::executor::Diagnostics;
use crate::graph::GraphExport;
use crate::types::NodeRef;

/// Renders `export` as a DOT digraph.
///
/// When `diagnostics` are given, every node that ran is labelled with its
/// duration and colour-coded by it:
///
/// * **Green**: Fast
/// * **Yellow**: Moderate
/// * **Red**: Slow
/// * **Blue**: Did not run
pub fn to_dot(export: &GraphExport, diagnostics: Option<&Diagnostics>) -> String {
    let mut f = String::new();
    // Writing into a String cannot fail.
    let _ = write_dot(&mut f, export, diagnostics);
    f
}

fn write_dot(
    f: &mut String,
    export: &GraphExport,
    diagnostics: Option<&Diagnostics>,
) -> fmt::Result {
    writeln!(f, "digraph \"{}\" {{", export.graph)?;
    writeln!(f, "    rankdir=BT;")?;
    writeln!(f, "    node [shape=box, style=filled, fillcolor=\"#FFFFFF\"];")?;

    let scale = diagnostics.map(Scale::new);

    for node in &export.nodes {
        let label = escape(&node.label);

        let Some((diagnostics, scale)) = diagnostics.zip(scale) else {
            writeln!(f, "    {} [label=\"{}\"];", node.id, label)?;
            continue;
        };

        let node_ref = NodeRef::new(export.graph, node.id);
        match diagnostics.execution_times.get(&node_ref) {
            Some(exec) => {
                let secs = exec.duration.as_secs_f64();
                writeln!(
                    f,
                    "    {} [label=\"{}\\n{:.2?}\", fillcolor=\"{}\"];",
                    node.id,
                    label,
                    exec.duration,
                    scale.color(secs)
                )?;
            }
            None => writeln!(
                f,
                "    {} [label=\"{}\", fillcolor=\"#ADD8E6\"];",
                node.id, label
            )?,
        }
    }

    for (source, target) in &export.edges {
        let output = export
            .nodes
            .get(*source)
            .map(|node| escape(node.output))
            .unwrap_or_default();
        writeln!(f, "    {source} -> {target} [tooltip=\"{output}\"];")?;
    }

    writeln!(f, "}}")
}

/// Maps durations onto a green to red gradient.
#[derive(Clone, Copy)]
struct Scale {
    min: f64,
    max: f64,
}

impl Scale {
    fn new(diagnostics: &Diagnostics) -> Self {
        let mut min = f64::MAX;
        let mut max = f64::MIN;

        for t in diagnostics.execution_times.values() {
            let secs = t.duration.as_secs_f64();
            min = min.min(secs);
            max = max.max(secs);
        }

        if min > max {
            min = 0.0;
            max = 0.0;
        }

        // Avoid divide by zero if all tasks took same time
        if (max - min).abs() < f64::EPSILON {
            max = min + 1.0;
        }

        Self { min, max }
    }

    fn color(&self, secs: f64) -> String {
        let t = ((secs - self.min) / (self.max - self.min)).clamp(0.0, 1.0);

        // 0.0 (Green) -> 0.5 (Yellow) -> 1.0 (Red)
        let (r, g, b) = if t < 0.5 {
            ((255.0 * t * 2.0) as u8, 255, 0)
        } else {
            (255, (255.0 * (1.0 - (t - 0.5) * 2.0)) as u8, 0)
        };

        format!("#{r:02X}{g:02X}{b:02X}")
    }
}

fn escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Blueprint, RunConfig};

    #[test]
    fn test_dot_structure() {
        let mut bp = Blueprint::new();
        let a = bp.constant("say \"hi\"", 1u64);
        let _ = bp
            .defer("double", [a.into()], |args| Ok(args.get::<u64>(0)? * 2))
            .unwrap();

        let dot = to_dot(&bp.finish().export(), None);

        assert!(dot.starts_with("digraph"));
        assert!(dot.contains(r#"0 [label="say \"hi\""];"#));
        assert!(dot.contains(r#"1 [label="double"];"#));
        assert!(dot.contains(r#"0 -> 1 [tooltip="u64"];"#));
        assert!(dot.trim_end().ends_with('}'));
    }

    #[test]
    fn test_dot_with_diagnostics() {
        let mut bp = Blueprint::new();
        let a = bp.constant("a", 1u64);
        let b = bp.constant("unused", 2u64);
        let c = bp
            .defer("inc", [a.into()], |args| Ok(args.get::<u64>(0)? + 1))
            .unwrap();

        let graph = bp.finish();
        let output = graph.run([c], &RunConfig::sequential()).unwrap();
        let dot = to_dot(&graph.export(), Some(&output.diagnostics));

        assert_eq!(dot.matches("fillcolor=\"#ADD8E6\"").count(), 1);
        assert!(dot.contains(&format!("{} [label=\"unused\"", b.node().index())));
    }

    #[test]
    fn test_gradient_ends() {
        let scale = Scale { min: 0.0, max: 2.0 };
        assert_eq!(scale.color(0.0), "#00FF00");
        assert_eq!(scale.color(1.0), "#FFFF00");
        assert_eq!(scale.color(2.0), "#FF0000");
    }
}
