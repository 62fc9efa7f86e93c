//! Library resolution for link steps.
//!
//! The linker turns an artifact's [`LibraryReference`]s into linker
//! arguments in exactly the declared order. It checks that sibling
//! references name a static library in the same graph and records an edge
//! to that library's archive step. System libraries pass through unchecked;
//! the external linker reports anything missing or misordered.

use super::{GraphError, StepId};
use crate::artifact::{ArtifactDescriptor, ArtifactKind, LibraryReference};
use crate::layout::Layout;
use indexmap::IndexMap;
use std::collections::BTreeSet;

/// Linker flag for the platform C library.
pub const LIBC_FLAG: &str = "-lc";

/// Resolved linker inputs of one artifact.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkPlan {
    /// Arguments placed after the object files, in link order.
    pub args: Vec<String>,
    /// Archive steps the link step must wait for.
    pub depends_on: BTreeSet<StepId>,
}

/// Resolves library references against the artifacts of one graph.
#[derive(Debug, Clone, Copy)]
pub struct DependencyLinker<'a> {
    artifacts: &'a IndexMap<String, ArtifactDescriptor>,
    layout: &'a Layout,
}

impl<'a> DependencyLinker<'a> {
    /// Resolve against `artifacts`, placing archives where `layout` puts them.
    #[must_use]
    pub const fn new(artifacts: &'a IndexMap<String, ArtifactDescriptor>, layout: &'a Layout) -> Self {
        Self { artifacts, layout }
    }

    /// Build the link plan of `descriptor`.
    ///
    /// Disabled references are ignored. The platform C library, when
    /// requested, comes after every declared reference.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::UnresolvedLibrary`] for a sibling reference to an
    /// undeclared artifact and [`GraphError::NotAStaticLibrary`] when it names
    /// anything other than a static library.
    pub fn resolve(&self, descriptor: &ArtifactDescriptor) -> Result<LinkPlan, GraphError> {
        let mut plan = LinkPlan::default();
        for reference in &descriptor.libraries {
            match reference {
                LibraryReference::ForeignRuntimeStdlib => {
                    plan.args
                        .push(format!("-l{}", LibraryReference::RUNTIME_STDLIB));
                }
                LibraryReference::SiblingStaticArtifact(name) => {
                    let sibling = self.sibling(&descriptor.name, name)?;
                    plan.args.push(self.layout.archive_path(&sibling.name).into_string());
                    plan.depends_on.insert(StepId::archive(&sibling.name));
                }
                LibraryReference::SystemLibrary(name) => plan.args.push(format!("-l{name}")),
            }
        }
        if descriptor.link_libc {
            plan.args.push(LIBC_FLAG.to_owned());
        }
        tracing::debug!(
            artifact = %descriptor.name,
            args = ?plan.args,
            "resolved link plan",
        );
        Ok(plan)
    }

    fn sibling(&self, artifact: &str, name: &str) -> Result<&'a ArtifactDescriptor, GraphError> {
        let sibling = self
            .artifacts
            .get(name)
            .ok_or_else(|| GraphError::UnresolvedLibrary {
                artifact: artifact.to_owned(),
                library: name.to_owned(),
            })?;
        if sibling.kind != ArtifactKind::StaticLibrary {
            return Err(GraphError::NotAStaticLibrary {
                artifact: artifact.to_owned(),
                library: name.to_owned(),
                kind: sibling.kind,
            });
        }
        Ok(sibling)
    }
}
