//! Construction-time errors for the step graph.
//!
//! Every variant is fatal: `GraphBuilder::finish` returns no graph, so
//! nothing can be executed from an invalid description.

use super::StepId;
use crate::artifact::ArtifactKind;
use crate::discovery::DiscoveryError;
use camino::Utf8PathBuf;
use itertools::Itertools;
use miette::Diagnostic;
use thiserror::Error;

/// Errors raised while constructing or validating a step graph.
#[derive(Debug, Error, Diagnostic)]
pub enum GraphError {
    /// Two artifact descriptors share a name.
    #[error("artifact `{name}` is declared more than once")]
    #[diagnostic(code(kumiki::graph::duplicate_artifact))]
    DuplicateArtifact {
        /// The repeated name.
        name: String,
    },

    /// Two steps share an identifier.
    #[error("step `{id}` is declared more than once")]
    #[diagnostic(code(kumiki::graph::duplicate_step))]
    DuplicateStep {
        /// The repeated identifier.
        id: StepId,
    },

    /// Two entry points share a name.
    #[error("entry point `{name}` is declared more than once")]
    #[diagnostic(code(kumiki::graph::duplicate_entry_point))]
    DuplicateEntryPoint {
        /// The repeated name.
        name: String,
    },

    /// An entry point name has not been registered.
    #[error("unknown entry point `{name}`")]
    #[diagnostic(code(kumiki::graph::unknown_entry_point))]
    UnknownEntryPoint {
        /// The requested name.
        name: String,
    },

    /// A sibling library reference names no artifact in the graph.
    #[error("artifact `{artifact}` links `{library}`, which is not declared in this graph")]
    #[diagnostic(
        code(kumiki::graph::unresolved_library),
        help("declare the static library before finishing the graph")
    )]
    UnresolvedLibrary {
        /// Artifact holding the reference.
        artifact: String,
        /// The unresolved library name.
        library: String,
    },

    /// A sibling library reference names an artifact that is not an archive.
    #[error("artifact `{artifact}` links `{library}`, which is a {kind:?} rather than a static library")]
    #[diagnostic(code(kumiki::graph::not_a_static_library))]
    NotAStaticLibrary {
        /// Artifact holding the reference.
        artifact: String,
        /// The referenced artifact.
        library: String,
        /// Kind of the referenced artifact.
        kind: ArtifactKind,
    },

    /// A compiled artifact has no sources.
    #[error("artifact `{artifact}` has no sources")]
    #[diagnostic(code(kumiki::graph::empty_sources))]
    EmptySources {
        /// The empty artifact.
        artifact: String,
    },

    /// A compiled artifact lists the same source twice.
    #[error("artifact `{artifact}` lists `{path}` more than once")]
    #[diagnostic(
        code(kumiki::graph::duplicate_source),
        help("each source compiles to one object; list it once")
    )]
    DuplicateSource {
        /// The artifact holding the sources.
        artifact: String,
        /// The repeated source path.
        path: Utf8PathBuf,
    },

    /// An operation names an artifact that was never declared.
    #[error("unknown artifact `{name}`")]
    #[diagnostic(code(kumiki::graph::unknown_artifact))]
    UnknownArtifact {
        /// The requested name.
        name: String,
    },

    /// An artifact has the wrong kind for the requested operation.
    #[error("artifact `{name}` is a {actual:?}, expected {expected:?}")]
    #[diagnostic(code(kumiki::graph::wrong_artifact_kind))]
    WrongArtifactKind {
        /// The artifact.
        name: String,
        /// Kind the operation requires.
        expected: ArtifactKind,
        /// Kind the artifact has.
        actual: ArtifactKind,
    },

    /// A generated artifact is installed before any step produces it.
    #[error("no step produces artifact `{artifact}`")]
    #[diagnostic(code(kumiki::graph::no_producer))]
    NoProducer {
        /// The artifact without a producer.
        artifact: String,
    },

    /// No disabled library of that name is declared on the artifact.
    #[error("artifact `{artifact}` declares no disabled library `{library}`")]
    #[diagnostic(code(kumiki::graph::unknown_disabled_library))]
    UnknownDisabledLibrary {
        /// The artifact.
        artifact: String,
        /// The requested library.
        library: String,
    },

    /// No disabled edge between the two steps is declared.
    #[error("no disabled edge from `{from}` to `{to}` is declared")]
    #[diagnostic(code(kumiki::graph::unknown_disabled_edge))]
    UnknownDisabledEdge {
        /// The dependent step.
        from: StepId,
        /// The dependency.
        to: StepId,
    },

    /// A step, edge or entry point references a step that does not exist.
    #[error("{referenced_by} references unknown step `{step}`")]
    #[diagnostic(code(kumiki::graph::unknown_step))]
    UnknownStep {
        /// The missing step.
        step: StepId,
        /// What holds the reference.
        referenced_by: String,
    },

    /// A step may not declare that it produces an artifact.
    #[error("step `{step}` of kind {kind} cannot produce an artifact")]
    #[diagnostic(code(kumiki::graph::invalid_producer))]
    InvalidProducer {
        /// The offending step.
        step: StepId,
        /// Its kind.
        kind: super::StepKind,
    },

    /// Two steps claim to produce the same artifact.
    #[error("artifact `{artifact}` is produced by both `{first}` and `{second}`")]
    #[diagnostic(code(kumiki::graph::conflicting_producers))]
    ConflictingProducers {
        /// The contested artifact.
        artifact: String,
        /// First producer.
        first: StepId,
        /// Second producer.
        second: StepId,
    },

    /// Two steps write the same output path.
    #[error("output {path} is written by both `{first}` and `{second}`")]
    #[diagnostic(code(kumiki::graph::conflicting_outputs))]
    ConflictingOutputs {
        /// The contested path.
        path: Utf8PathBuf,
        /// First writer.
        first: StepId,
        /// Second writer.
        second: StepId,
    },

    /// The dependency relation contains a cycle.
    #[error("dependency cycle detected: {}", cycle.iter().join(" -> "))]
    #[diagnostic(code(kumiki::graph::cycle))]
    Cycle {
        /// Steps on the cycle, starting and ending with the same step.
        cycle: Vec<StepId>,
    },

    /// Source discovery failed while describing an artifact.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Discovery(#[from] DiscoveryError),
}
