//! Graphviz rendering of a [`StepGraph`].
//!
//! Steps are emitted sorted by identifier and edges sorted by endpoint so
//! the output is byte-for-byte stable. Edges point from a step to the step
//! it depends on. Disabled edges are drawn dashed.

use super::{DisabledEdge, Step, StepGraph};
use std::fmt::{self, Display, Formatter};

/// Render `graph` in DOT syntax.
#[must_use]
pub fn render(graph: &StepGraph) -> String {
    DisplayGraph { graph }.to_string()
}

fn quote(text: &str) -> String {
    format!("\"{}\"", text.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Wrapper struct to display a whole graph.
struct DisplayGraph<'a> {
    graph: &'a StepGraph,
}

impl Display for DisplayGraph<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "digraph kumiki {{")?;
        writeln!(f, "  rankdir=LR;")?;

        let mut steps: Vec<&Step> = self.graph.steps().collect();
        steps.sort_by(|a, b| a.id.cmp(&b.id));
        for step in &steps {
            write!(f, "{}", DisplayNode { step })?;
        }
        for step in &steps {
            for dep in &step.depends_on {
                writeln!(f, "  {} -> {};", quote(step.id.as_str()), quote(dep.as_str()))?;
            }
        }

        let mut disabled: Vec<&DisabledEdge> = self.graph.disabled_edges().iter().collect();
        disabled.sort_by(|a, b| (&a.from, &a.to).cmp(&(&b.from, &b.to)));
        for edge in disabled {
            writeln!(
                f,
                "  {} -> {} [style=dashed];",
                quote(edge.from.as_str()),
                quote(edge.to.as_str())
            )?;
        }
        writeln!(f, "}}")
    }
}

/// Wrapper struct to display one step as a node.
struct DisplayNode<'a> {
    step: &'a Step,
}

impl Display for DisplayNode<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let shape = if self.step.has_side_effect {
            "box"
        } else {
            "ellipse"
        };
        writeln!(
            f,
            "  {} [label={}, shape={shape}];",
            quote(self.step.id.as_str()),
            quote(&format!("{} ({})", self.step.id, self.step.kind))
        )
    }
}
