//! Step graph structures.
//!
//! A [`StepGraph`] is the immutable result of the construction phase. It is
//! assembled by a [`GraphBuilder`] from artifact descriptors and explicit
//! ordering edges, validated once, and then only read by the runner.
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//! use kumiki::artifact::ArtifactDescriptor;
//! use kumiki::config::TargetConfig;
//! use kumiki::graph::{GraphBuilder, StepId};
//! use kumiki::layout::Layout;
//! use kumiki::toolchain::Toolchain;
//!
//! let target = Arc::new(TargetConfig::default());
//! let mut builder = GraphBuilder::new(Layout::new("/work"), Toolchain::default());
//! builder
//!     .add_artifact(ArtifactDescriptor::executable("hello", target).with_sources(["main.c"]))
//!     .unwrap();
//! let install = builder.install_artifact("hello").unwrap();
//! builder.entry_point("install", "Install hello", install.clone()).unwrap();
//! let graph = builder.finish().unwrap();
//!
//! let order = graph.topological_order(&graph.closure([&install]));
//! assert_eq!(
//!     order,
//!     vec![StepId::compile("hello"), StepId::link("hello"), install]
//! );
//! ```

mod builder;
mod cycle;
pub mod dot;
pub mod entry;
mod error;
pub mod linker;
mod step;

pub use builder::GraphBuilder;
pub use entry::{EntryPoint, EntryPointRegistry};
pub use error::GraphError;
pub use step::{CommandSpec, Step, StepAction, StepId, StepKind};

use crate::artifact::ArtifactDescriptor;
use indexmap::IndexMap;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// An ordering edge that is declared but not wired into the graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct DisabledEdge {
    /// The step that would wait.
    pub from: StepId,
    /// The step it would wait for.
    pub to: StepId,
}

/// Validated, acyclic set of steps for one invocation.
#[derive(Debug, Clone, Serialize)]
pub struct StepGraph {
    steps: IndexMap<StepId, Step>,
    artifacts: IndexMap<String, ArtifactDescriptor>,
    entry_points: EntryPointRegistry,
    disabled_edges: Vec<DisabledEdge>,
}

impl StepGraph {
    /// Look up a step.
    #[must_use]
    pub fn step(&self, id: &StepId) -> Option<&Step> {
        self.steps.get(id)
    }

    /// Iterate over every step in construction order.
    pub fn steps(&self) -> impl Iterator<Item = &Step> {
        self.steps.values()
    }

    /// Number of steps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether the graph holds no steps.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Look up an artifact descriptor by name.
    #[must_use]
    pub fn artifact(&self, name: &str) -> Option<&ArtifactDescriptor> {
        self.artifacts.get(name)
    }

    /// Named roots exposed to the command line.
    #[must_use]
    pub const fn entry_points(&self) -> &EntryPointRegistry {
        &self.entry_points
    }

    /// Ordering edges that were declared but never enabled.
    #[must_use]
    pub fn disabled_edges(&self) -> &[DisabledEdge] {
        &self.disabled_edges
    }

    /// Every step reachable from `roots` through `depends_on`, roots
    /// included. Identifiers without a step are ignored.
    #[must_use]
    pub fn closure<'a, I>(&self, roots: I) -> BTreeSet<StepId>
    where
        I: IntoIterator<Item = &'a StepId>,
    {
        let mut seen = BTreeSet::new();
        let mut stack: Vec<&StepId> = roots.into_iter().collect();
        while let Some(id) = stack.pop() {
            let Some(step) = self.steps.get(id) else {
                continue;
            };
            if seen.insert(id.clone()) {
                stack.extend(step.depends_on.iter());
            }
        }
        seen
    }

    /// Order `subset` so that every step follows its dependencies.
    ///
    /// Among steps that are ready at the same time the smallest identifier
    /// comes first, so the order is stable across runs. Dependencies outside
    /// `subset` are treated as already satisfied.
    #[must_use]
    pub fn topological_order(&self, subset: &BTreeSet<StepId>) -> Vec<StepId> {
        let mut pending: BTreeMap<&StepId, usize> = BTreeMap::new();
        let mut dependents: BTreeMap<&StepId, Vec<&StepId>> = BTreeMap::new();
        for id in subset {
            let Some(step) = self.steps.get(id) else {
                continue;
            };
            let inside: Vec<&StepId> = step
                .depends_on
                .iter()
                .filter(|dep| subset.contains(*dep))
                .collect();
            pending.insert(id, inside.len());
            for dep in inside {
                dependents.entry(dep).or_default().push(id);
            }
        }

        let mut ready: BTreeSet<&StepId> = pending
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(id, _)| *id)
            .collect();
        let mut order = Vec::with_capacity(pending.len());
        while let Some(id) = ready.pop_first() {
            order.push(id.clone());
            for dependent in dependents.get(id).into_iter().flatten() {
                if let Some(count) = pending.get_mut(*dependent) {
                    *count = count.saturating_sub(1);
                    if *count == 0 {
                        ready.insert(*dependent);
                    }
                }
            }
        }
        order
    }
}
