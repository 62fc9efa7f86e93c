//! Construction phase of a [`StepGraph`].
//!
//! A [`GraphBuilder`] is an explicit context value scoped to one invocation.
//! Calls only record data; nothing touches the filesystem or spawns a
//! process. [`GraphBuilder::finish`] materialises the artifact steps,
//! validates the result and hands back an immutable graph.

use super::cycle::{self, DependencyAudit};
use super::linker::{DependencyLinker, LinkPlan};
use super::{
    CommandSpec, DisabledEdge, EntryPoint, EntryPointRegistry, GraphError, Step, StepAction,
    StepGraph, StepId, StepKind,
};
use crate::artifact::{ArtifactDescriptor, ArtifactKind};
use crate::hasher::ObjectHasher;
use crate::layout::{DOCS_DIR, Layout};
use crate::toolchain::{self, Toolchain};
use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};

/// Accumulates artifacts, steps, edges and entry points for one graph.
#[derive(Debug, Clone)]
pub struct GraphBuilder {
    layout: Layout,
    toolchain: Toolchain,
    artifacts: IndexMap<String, ArtifactDescriptor>,
    steps: IndexMap<StepId, Step>,
    edges: Vec<(StepId, StepId)>,
    disabled_edges: Vec<DisabledEdge>,
    entry_points: EntryPointRegistry,
}

impl GraphBuilder {
    /// Start an empty graph that places outputs according to `layout`.
    #[must_use]
    pub fn new(layout: Layout, toolchain: Toolchain) -> Self {
        Self {
            layout,
            toolchain,
            artifacts: IndexMap::new(),
            steps: IndexMap::new(),
            edges: Vec::new(),
            disabled_edges: Vec::new(),
            entry_points: EntryPointRegistry::default(),
        }
    }

    /// Declare a buildable unit.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::DuplicateArtifact`] when the name is taken,
    /// [`GraphError::EmptySources`] when a compiled artifact has no sources
    /// and [`GraphError::DuplicateSource`] when a source is listed twice.
    pub fn add_artifact(&mut self, descriptor: ArtifactDescriptor) -> Result<(), GraphError> {
        if self.artifacts.contains_key(&descriptor.name) {
            return Err(GraphError::DuplicateArtifact {
                name: descriptor.name,
            });
        }
        if descriptor.sources.is_empty() && descriptor.kind != ArtifactKind::GeneratedDirectory {
            return Err(GraphError::EmptySources {
                artifact: descriptor.name,
            });
        }
        if let Some(path) = first_repeated_source(&descriptor) {
            return Err(GraphError::DuplicateSource {
                path: path.to_owned(),
                artifact: descriptor.name,
            });
        }
        self.artifacts.insert(descriptor.name.clone(), descriptor);
        Ok(())
    }

    /// Turn on a library reference declared with
    /// [`ArtifactDescriptor::link_disabled`]. It is linked after every
    /// library already enabled.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::UnknownArtifact`] or
    /// [`GraphError::UnknownDisabledLibrary`] when either name is unknown.
    pub fn enable_library(&mut self, artifact: &str, library: &str) -> Result<(), GraphError> {
        let descriptor = self
            .artifacts
            .get_mut(artifact)
            .ok_or_else(|| GraphError::UnknownArtifact {
                name: artifact.to_owned(),
            })?;
        if descriptor.enable_library(library) {
            Ok(())
        } else {
            Err(GraphError::UnknownDisabledLibrary {
                artifact: artifact.to_owned(),
                library: library.to_owned(),
            })
        }
    }

    /// Add a user-defined step.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::DuplicateStep`] when the identifier is taken.
    pub fn add_step(&mut self, step: Step) -> Result<StepId, GraphError> {
        if self.steps.contains_key(&step.id) {
            return Err(GraphError::DuplicateStep { id: step.id });
        }
        let id = step.id.clone();
        self.steps.insert(id.clone(), step);
        Ok(id)
    }

    /// Order `step` after `dependency`. Both are checked by [`Self::finish`].
    pub fn depend_on(&mut self, step: StepId, dependency: StepId) {
        self.edges.push((step, dependency));
    }

    /// Record an ordering edge without wiring it in.
    pub fn declare_disabled_edge(&mut self, from: StepId, to: StepId) {
        self.disabled_edges.push(DisabledEdge { from, to });
    }

    /// Wire in an edge declared with [`Self::declare_disabled_edge`].
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::UnknownDisabledEdge`] when no such edge exists.
    pub fn enable_edge(&mut self, from: &StepId, to: &StepId) -> Result<(), GraphError> {
        let Some(position) = self
            .disabled_edges
            .iter()
            .position(|edge| edge.from == *from && edge.to == *to)
        else {
            return Err(GraphError::UnknownDisabledEdge {
                from: from.clone(),
                to: to.clone(),
            });
        };
        let edge = self.disabled_edges.remove(position);
        self.edges.push((edge.from, edge.to));
        Ok(())
    }

    /// Copy an artifact into the install prefix.
    ///
    /// Executables land in `<prefix>/bin`, archives in `<prefix>/lib` and
    /// generated directories directly below the prefix. Calling this twice
    /// for the same artifact returns the existing step.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::UnknownArtifact`] for an undeclared artifact,
    /// [`GraphError::NoProducer`] for a generated directory no step produces
    /// and [`GraphError::DuplicateStep`] when a different step already uses
    /// the install identifier.
    pub fn install_artifact(&mut self, name: &str) -> Result<StepId, GraphError> {
        let id = StepId::install(name);
        let kind = self.artifact_kind(name)?;
        let (from, to, producer) = match kind {
            ArtifactKind::Executable => (
                self.layout.executable_path(name),
                self.layout.installed_executable(name),
                StepId::link(name),
            ),
            ArtifactKind::StaticLibrary => (
                self.layout.archive_path(name),
                self.layout.installed_archive(name),
                StepId::archive(name),
            ),
            ArtifactKind::GeneratedDirectory => (
                self.layout.generated_dir(name),
                self.layout.installed_directory(name),
                self.producer_of(name)?,
            ),
        };
        let action = StepAction::Copy { from, to: to.clone() };
        if let Some(existing) = self.steps.get(&id) {
            return if existing.kind == StepKind::Install && existing.action == action {
                Ok(id)
            } else {
                Err(GraphError::DuplicateStep { id })
            };
        }
        let step = Step::new(id, StepKind::Install, action)
            .after(producer)
            .writing(to);
        self.add_step(step)
    }

    /// Execute an installed executable with `args`.
    ///
    /// The run step depends on the install step, which is added when
    /// missing, so the program always runs from the install prefix.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::WrongArtifactKind`] unless `name` is an
    /// executable and [`GraphError::DuplicateStep`] if it already has a run
    /// step.
    pub fn run_artifact<I, S>(&mut self, name: &str, args: I) -> Result<StepId, GraphError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.expect_kind(name, ArtifactKind::Executable)?;
        let install = self.install_artifact(name)?;
        let command = CommandSpec::new(self.layout.installed_executable(name)).args(args);
        let step = Step::new(StepId::run(name), StepKind::Run, StepAction::exec(command))
            .after(install);
        self.add_step(step)
    }

    /// Run a test executable from the build directory.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::WrongArtifactKind`] unless `name` is an
    /// executable.
    pub fn test_artifact(&mut self, name: &str) -> Result<StepId, GraphError> {
        self.expect_kind(name, ArtifactKind::Executable)?;
        let command = CommandSpec::new(self.layout.executable_path(name));
        let step = Step::new(StepId::test(name), StepKind::Test, StepAction::exec(command))
            .after(StepId::link(name));
        self.add_step(step)
    }

    /// Generate documentation from the sources of `artifact`.
    ///
    /// This declares a generated directory artifact named `docs` and a step
    /// that produces it once `artifact` has compiled. Install it with
    /// [`Self::install_artifact`].
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::UnknownArtifact`] for an undeclared artifact,
    /// [`GraphError::WrongArtifactKind`] when it has no sources to document and
    /// [`GraphError::DuplicateArtifact`] when documentation was already
    /// declared.
    pub fn generate_docs(&mut self, artifact: &str) -> Result<StepId, GraphError> {
        let descriptor = self
            .artifacts
            .get(artifact)
            .ok_or_else(|| GraphError::UnknownArtifact {
                name: artifact.to_owned(),
            })?;
        if descriptor.kind == ArtifactKind::GeneratedDirectory {
            return Err(GraphError::WrongArtifactKind {
                name: artifact.to_owned(),
                expected: ArtifactKind::Executable,
                actual: descriptor.kind,
            });
        }
        let output = self.layout.generated_dir(DOCS_DIR);
        let command = CommandSpec::new(self.toolchain.doc.clone())
            .arg(output.as_str())
            .args(
                descriptor
                    .sources
                    .iter()
                    .map(|source| self.layout.source_path(source).into_string()),
            );
        let docs = ArtifactDescriptor::generated_directory(DOCS_DIR, descriptor.target.clone());
        self.add_artifact(docs)?;
        let step = Step::new(
            StepId::docs(artifact),
            StepKind::GenerateDocs,
            StepAction::exec(command),
        )
        .after(StepId::compile(artifact))
        .producing(DOCS_DIR)
        .writing(output);
        self.add_step(step)
    }

    /// Run an arbitrary command as a side-effecting step.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::DuplicateStep`] when `id` is taken.
    pub fn system_command(
        &mut self,
        id: impl Into<StepId>,
        command: CommandSpec,
    ) -> Result<StepId, GraphError> {
        self.add_step(Step::new(id, StepKind::SystemCommand, StepAction::exec(command)))
    }

    /// Expose `root` under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::DuplicateEntryPoint`] when the name is taken.
    pub fn entry_point(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        root: StepId,
    ) -> Result<(), GraphError> {
        self.entry_points.register(EntryPoint {
            name: name.into(),
            description: description.into(),
            root,
        })
    }

    /// Choose the entry point run when none is named.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::UnknownEntryPoint`] when `name` is not
    /// registered.
    pub fn default_entry_point(&mut self, name: &str) -> Result<(), GraphError> {
        self.entry_points.set_default(name)
    }

    /// Materialise artifact steps, validate everything and return the graph.
    ///
    /// # Errors
    ///
    /// Returns the first [`GraphError`] found. No graph is returned in that
    /// case, so nothing can run from an invalid description.
    pub fn finish(self) -> Result<StepGraph, GraphError> {
        let mut steps = IndexMap::new();
        let linker = DependencyLinker::new(&self.artifacts, &self.layout);
        for descriptor in self.artifacts.values() {
            for step in self.artifact_steps(descriptor, &linker)? {
                insert_unique(&mut steps, step)?;
            }
        }
        for step in self.steps.into_values() {
            insert_unique(&mut steps, step)?;
        }
        for (from, to) in self.edges {
            let Some(step) = steps.get_mut(&from) else {
                return Err(GraphError::UnknownStep {
                    step: from,
                    referenced_by: format!("ordering edge to `{to}`"),
                });
            };
            step.depends_on.insert(to);
        }

        validate_producers(&steps, &self.artifacts)?;
        validate_outputs(&steps)?;
        let DependencyAudit { cycle, dangling } = cycle::audit(&steps);
        if let Some((dependent, missing)) = dangling.into_iter().next() {
            return Err(GraphError::UnknownStep {
                step: missing,
                referenced_by: format!("step `{dependent}`"),
            });
        }
        if let Some(found) = cycle {
            return Err(GraphError::Cycle { cycle: found });
        }
        for entry in self.entry_points.iter() {
            if !steps.contains_key(&entry.root) {
                return Err(GraphError::UnknownStep {
                    step: entry.root.clone(),
                    referenced_by: format!("entry point `{}`", entry.name),
                });
            }
        }

        tracing::debug!(
            steps = steps.len(),
            artifacts = self.artifacts.len(),
            disabled_edges = self.disabled_edges.len(),
            "step graph constructed",
        );
        Ok(StepGraph {
            steps,
            artifacts: self.artifacts,
            entry_points: self.entry_points,
            disabled_edges: self.disabled_edges,
        })
    }

    fn artifact_kind(&self, name: &str) -> Result<ArtifactKind, GraphError> {
        self.artifacts
            .get(name)
            .map(|descriptor| descriptor.kind)
            .ok_or_else(|| GraphError::UnknownArtifact {
                name: name.to_owned(),
            })
    }

    fn expect_kind(&self, name: &str, expected: ArtifactKind) -> Result<(), GraphError> {
        let actual = self.artifact_kind(name)?;
        if actual == expected {
            Ok(())
        } else {
            Err(GraphError::WrongArtifactKind {
                name: name.to_owned(),
                expected,
                actual,
            })
        }
    }

    fn producer_of(&self, artifact: &str) -> Result<StepId, GraphError> {
        self.steps
            .values()
            .find(|step| step.produces_artifact.as_deref() == Some(artifact))
            .map(|step| step.id.clone())
            .ok_or_else(|| GraphError::NoProducer {
                artifact: artifact.to_owned(),
            })
    }

    /// Compile, then archive or link, one descriptor.
    fn artifact_steps(
        &self,
        descriptor: &ArtifactDescriptor,
        linker: &DependencyLinker<'_>,
    ) -> Result<Vec<Step>, GraphError> {
        let terminal = match descriptor.kind {
            ArtifactKind::GeneratedDirectory => return Ok(Vec::new()),
            ArtifactKind::StaticLibrary => Self::archive_step,
            ArtifactKind::Executable => Self::link_step,
        };
        let compile = self.compile_step(descriptor);
        let plan = linker.resolve(descriptor)?;
        let last = terminal(self, descriptor, &compile, plan);
        Ok(vec![compile, last])
    }

    fn archive_step(&self, descriptor: &ArtifactDescriptor, compile: &Step, plan: LinkPlan) -> Step {
        let name = descriptor.name.as_str();
        let archive = self.layout.archive_path(name);
        let command = CommandSpec::new(self.toolchain.ar.clone())
            .arg("rcs")
            .arg(archive.as_str())
            .args(compile.outputs.iter().map(|object| object.as_str()));
        Step::new(StepId::archive(name), StepKind::Archive, StepAction::exec(command))
            .after(compile.id.clone())
            .after_all(plan.depends_on)
            .producing(name)
            .writing(archive)
    }

    fn link_step(&self, descriptor: &ArtifactDescriptor, compile: &Step, plan: LinkPlan) -> Step {
        let name = descriptor.name.as_str();
        let executable = self.layout.executable_path(name);
        let command = CommandSpec::new(self.toolchain.cxx.clone())
            .args(toolchain::target_flag(&descriptor.target))
            .args(compile.outputs.iter().map(|object| object.as_str()))
            .args(plan.args)
            .arg("-o")
            .arg(executable.as_str());
        Step::new(StepId::link(name), StepKind::Link, StepAction::exec(command))
            .after(compile.id.clone())
            .after_all(plan.depends_on)
            .producing(name)
            .writing(executable)
    }

    /// One compiler command per source, each writing its own object file.
    fn compile_step(&self, descriptor: &ArtifactDescriptor) -> Step {
        let name = descriptor.name.as_str();
        let flags: Vec<String> = toolchain::config_flags(&descriptor.target)
            .into_iter()
            .chain(descriptor.compile_flags.iter().cloned())
            .chain(
                descriptor
                    .include_dirs
                    .iter()
                    .map(|dir| format!("-I{}", self.layout.source_path(dir))),
            )
            .collect();

        let mut step = Step::new(StepId::compile(name), StepKind::Compile, StepAction::Nothing);
        let mut commands = Vec::with_capacity(descriptor.sources.len());
        for source in &descriptor.sources {
            let fingerprint = ObjectHasher::fingerprint(source, flags.as_slice());
            let object = self.layout.object_path(name, source, &fingerprint);
            commands.push(
                CommandSpec::new(self.toolchain.compiler_for(source))
                    .args(flags.iter().cloned())
                    .arg("-c")
                    .arg(self.layout.source_path(source).into_string())
                    .arg("-o")
                    .arg(object.as_str()),
            );
            step.outputs.push(object);
        }
        step.action = StepAction::Exec { commands };
        step
    }
}

fn first_repeated_source(descriptor: &ArtifactDescriptor) -> Option<&Utf8Path> {
    let mut seen = HashSet::with_capacity(descriptor.sources.len());
    descriptor
        .sources
        .iter()
        .map(Utf8PathBuf::as_path)
        .find(|source| !seen.insert(*source))
}

fn insert_unique(steps: &mut IndexMap<StepId, Step>, step: Step) -> Result<(), GraphError> {
    if steps.contains_key(&step.id) {
        return Err(GraphError::DuplicateStep { id: step.id });
    }
    steps.insert(step.id.clone(), step);
    Ok(())
}

fn validate_producers(
    steps: &IndexMap<StepId, Step>,
    artifacts: &IndexMap<String, ArtifactDescriptor>,
) -> Result<(), GraphError> {
    let mut producers: HashMap<&str, &StepId> = HashMap::new();
    for step in steps.values() {
        let Some(artifact) = step.produces_artifact.as_deref() else {
            continue;
        };
        if !step.kind.may_produce_artifact() {
            return Err(GraphError::InvalidProducer {
                step: step.id.clone(),
                kind: step.kind,
            });
        }
        if !artifacts.contains_key(artifact) {
            return Err(GraphError::UnknownArtifact {
                name: artifact.to_owned(),
            });
        }
        if let Some(first) = producers.insert(artifact, &step.id) {
            return Err(GraphError::ConflictingProducers {
                artifact: artifact.to_owned(),
                first: first.clone(),
                second: step.id.clone(),
            });
        }
    }
    Ok(())
}

fn validate_outputs(steps: &IndexMap<StepId, Step>) -> Result<(), GraphError> {
    let mut writers: HashMap<&Utf8Path, &StepId> = HashMap::new();
    for step in steps.values() {
        for output in &step.outputs {
            if let Some(first) = writers.insert(output.as_path(), &step.id) {
                return Err(GraphError::ConflictingOutputs {
                    path: output.clone(),
                    first: first.clone(),
                    second: step.id.clone(),
                });
            }
        }
    }
    Ok(())
}
