//! Dependency audit for the step graph.
//!
//! The walk keeps its own stack of partially explored steps instead of
//! recursing, so a dependency chain of any length is checked in constant call
//! depth.

use std::collections::HashMap;
use std::collections::btree_set;

use indexmap::IndexMap;

use super::{Step, StepId};

/// Outcome of walking every dependency edge once.
pub(crate) struct DependencyAudit {
    /// First cycle met, starting and ending at its smallest step.
    pub(crate) cycle: Option<Vec<StepId>>,
    /// `(dependent, unknown dependency)` pairs in the order they were met.
    pub(crate) dangling: Vec<(StepId, StepId)>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Mark {
    /// On the current path; meeting it again closes a cycle.
    OnPath,
    /// Fully explored and known to be acyclic below.
    Done,
}

/// A step on the current path and the dependencies not yet followed.
type Frame<'a> = (&'a StepId, btree_set::Iter<'a, StepId>);

pub(crate) fn audit(steps: &IndexMap<StepId, Step>) -> DependencyAudit {
    let mut walk = Walk {
        steps,
        marks: HashMap::with_capacity(steps.len()),
        dangling: Vec::new(),
    };
    let cycle = steps
        .iter()
        .find_map(|(id, step)| walk.explore_from(id, step));
    DependencyAudit {
        cycle,
        dangling: walk.dangling,
    }
}

struct Walk<'a> {
    steps: &'a IndexMap<StepId, Step>,
    marks: HashMap<&'a StepId, Mark>,
    dangling: Vec<(StepId, StepId)>,
}

impl<'a> Walk<'a> {
    fn explore_from(&mut self, start: &'a StepId, step: &'a Step) -> Option<Vec<StepId>> {
        if self.marks.contains_key(start) {
            return None;
        }
        let steps = self.steps;
        self.marks.insert(start, Mark::OnPath);
        let mut path: Vec<Frame<'a>> = vec![(start, step.depends_on.iter())];

        loop {
            let (top, pending) = path.last_mut()?;
            let current: &'a StepId = *top;
            let Some(dependency) = pending.next() else {
                self.marks.insert(current, Mark::Done);
                path.pop();
                continue;
            };
            let Some((known, next)) = steps.get_key_value(dependency) else {
                tracing::debug!(%current, %dependency, "dependency names no step");
                self.dangling.push((current.clone(), dependency.clone()));
                continue;
            };
            match self.marks.get(known) {
                Some(Mark::Done) => {}
                Some(Mark::OnPath) => return Some(close_cycle(&path, known)),
                None => {
                    self.marks.insert(known, Mark::OnPath);
                    path.push((known, next.depends_on.iter()));
                }
            }
        }
    }
}

/// The part of `path` from `entry` onwards, rotated to begin at its smallest
/// step and closed by repeating that step.
fn close_cycle(path: &[Frame<'_>], entry: &StepId) -> Vec<StepId> {
    let mut ring: Vec<StepId> = path
        .iter()
        .map(|(id, _)| *id)
        .skip_while(|id| *id != entry)
        .cloned()
        .collect();
    let smallest = ring
        .iter()
        .enumerate()
        .min_by_key(|(_, id)| *id)
        .map_or(0, |(position, _)| position);
    ring.rotate_left(smallest);
    if let Some(first) = ring.first().cloned() {
        ring.push(first);
    }
    ring
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{StepAction, StepKind};

    fn id(name: &str) -> StepId {
        StepId::new(name)
    }

    fn steps(edges: &[(&str, &[&str])]) -> IndexMap<StepId, Step> {
        edges
            .iter()
            .map(|(name, deps)| {
                let step = Step::new(*name, StepKind::SystemCommand, StepAction::Nothing)
                    .after_all(deps.iter().map(|dep| id(dep)));
                (id(name), step)
            })
            .collect()
    }

    fn chain(len: usize) -> IndexMap<StepId, Step> {
        (0..len)
            .map(|index| {
                let name = format!("cmd:{index:06}");
                let mut step = Step::new(name.as_str(), StepKind::SystemCommand, StepAction::Nothing);
                if index + 1 < len {
                    step = step.after(StepId::new(format!("cmd:{:06}", index + 1)));
                }
                (id(&name), step)
            })
            .collect()
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let graph = steps(&[("a", &["a"])]);

        let cycle = audit(&graph).cycle.expect("cycle");
        assert_eq!(cycle, vec![id("a"), id("a")]);
    }

    #[test]
    fn two_step_cycle_starts_at_the_smallest_step() {
        let graph = steps(&[("b", &["a"]), ("a", &["b"])]);

        let cycle = audit(&graph).cycle.expect("cycle");
        assert_eq!(cycle, vec![id("a"), id("b"), id("a")]);
    }

    #[test]
    fn cycle_keeps_its_direction() {
        let graph = steps(&[("c", &["b"]), ("b", &["a"]), ("a", &["c"])]);

        let cycle = audit(&graph).cycle.expect("cycle");
        assert_eq!(cycle, vec![id("a"), id("c"), id("b"), id("a")]);
    }

    #[test]
    fn cycle_below_an_acyclic_prefix_excludes_the_prefix() {
        let graph = steps(&[("root", &["x"]), ("x", &["y"]), ("y", &["x"])]);

        let cycle = audit(&graph).cycle.expect("cycle");
        assert_eq!(cycle, vec![id("x"), id("y"), id("x")]);
    }

    #[test]
    fn diamond_is_not_a_cycle() {
        let graph = steps(&[
            ("top", &["left", "right"]),
            ("left", &["bottom"]),
            ("right", &["bottom"]),
            ("bottom", &[]),
        ]);

        assert!(audit(&graph).cycle.is_none());
    }

    #[test]
    fn records_dangling_dependencies() {
        let graph = steps(&[("a", &["b"]), ("c", &["a", "d"])]);

        let report = audit(&graph);

        assert!(report.cycle.is_none());
        assert_eq!(
            report.dangling,
            vec![(id("a"), id("b")), (id("c"), id("d"))]
        );
    }

    #[test]
    fn long_chains_are_walked_without_recursion() {
        let graph = chain(100_000);

        let report = audit(&graph);

        assert!(report.cycle.is_none());
        assert!(report.dangling.is_empty());
    }

    #[test]
    fn cycle_at_the_end_of_a_long_chain_is_found() {
        let mut graph = chain(50_000);
        let last = id("cmd:049999");
        graph
            .get_mut(&last)
            .expect("last step")
            .depends_on
            .insert(id("cmd:000000"));

        let cycle = audit(&graph).cycle.expect("cycle");
        assert_eq!(cycle.len(), 50_001);
        assert_eq!(cycle.first(), Some(&id("cmd:000000")));
        assert_eq!(cycle.get(1), Some(&id("cmd:000001")));
    }
}
