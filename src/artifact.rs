//! Artifact descriptors.
//!
//! An [`ArtifactDescriptor`] is plain data: the sources, flags and libraries
//! of one buildable unit. Descriptors never refer to each other directly;
//! a [`LibraryReference::SiblingStaticArtifact`] is a name looked up when the
//! step graph is finished.
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//! use kumiki::artifact::{ArtifactDescriptor, ArtifactKind, LibraryReference};
//! use kumiki::config::TargetConfig;
//!
//! let target = Arc::new(TargetConfig::default());
//! let exe = ArtifactDescriptor::executable("tool", target)
//!     .with_sources(["src/main.c"])
//!     .link(LibraryReference::system("z"))
//!     .link_libc();
//! assert_eq!(exe.kind, ArtifactKind::Executable);
//! assert_eq!(exe.libraries, vec![LibraryReference::system("z")]);
//! ```

use crate::config::TargetConfig;
use camino::Utf8PathBuf;
use indexmap::IndexSet;
use serde::Serialize;
use std::fmt::{self, Display, Formatter};
use std::sync::Arc;

/// Kind of output an artifact materialises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// A linked program.
    Executable,
    /// An archive of object files.
    StaticLibrary,
    /// A directory produced by a step, such as generated documentation.
    GeneratedDirectory,
}

/// Named reference to a library an artifact links against.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LibraryReference {
    /// The C++ runtime standard library.
    ForeignRuntimeStdlib,
    /// A static library built by another artifact in the same graph.
    SiblingStaticArtifact(String),
    /// A library supplied by the system and passed through to the linker.
    SystemLibrary(String),
}

impl LibraryReference {
    /// Library name used by the C++ runtime reference.
    pub const RUNTIME_STDLIB: &'static str = "stdc++";

    /// Reference a static library artifact in the same graph.
    #[must_use]
    pub fn sibling(name: impl Into<String>) -> Self {
        Self::SiblingStaticArtifact(name.into())
    }

    /// Reference a system library by its linker name.
    #[must_use]
    pub fn system(name: impl Into<String>) -> Self {
        Self::SystemLibrary(name.into())
    }

    /// Name the reference is looked up or enabled by.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::ForeignRuntimeStdlib => Self::RUNTIME_STDLIB,
            Self::SiblingStaticArtifact(name) | Self::SystemLibrary(name) => name,
        }
    }
}

impl Display for LibraryReference {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::ForeignRuntimeStdlib => f.write_str("runtime stdlib"),
            Self::SiblingStaticArtifact(name) => write!(f, "artifact {name}"),
            Self::SystemLibrary(name) => write!(f, "system library {name}"),
        }
    }
}

/// Description of a buildable unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactDescriptor {
    /// Identifier, unique within a graph.
    pub name: String,
    /// What the artifact materialises.
    pub kind: ArtifactKind,
    /// Compile inputs relative to the project root, in compile order.
    pub sources: Vec<Utf8PathBuf>,
    /// Flags applied verbatim to every source.
    pub compile_flags: IndexSet<String>,
    /// Include directories of imported modules.
    pub include_dirs: Vec<Utf8PathBuf>,
    /// Libraries to link, in linker order.
    pub libraries: Vec<LibraryReference>,
    /// Declared but inactive library references.
    pub disabled_libraries: Vec<LibraryReference>,
    /// Link the platform C library after every other library.
    pub link_libc: bool,
    /// Target configuration shared with the rest of the graph.
    pub target: Arc<TargetConfig>,
}

impl ArtifactDescriptor {
    fn new(name: impl Into<String>, kind: ArtifactKind, target: Arc<TargetConfig>) -> Self {
        Self {
            name: name.into(),
            kind,
            sources: Vec::new(),
            compile_flags: IndexSet::new(),
            include_dirs: Vec::new(),
            libraries: Vec::new(),
            disabled_libraries: Vec::new(),
            link_libc: false,
            target,
        }
    }

    /// Describe a linked executable.
    #[must_use]
    pub fn executable(name: impl Into<String>, target: Arc<TargetConfig>) -> Self {
        Self::new(name, ArtifactKind::Executable, target)
    }

    /// Describe a static library.
    #[must_use]
    pub fn static_library(name: impl Into<String>, target: Arc<TargetConfig>) -> Self {
        Self::new(name, ArtifactKind::StaticLibrary, target)
    }

    /// Describe a directory materialised by a step rather than a compiler.
    #[must_use]
    pub fn generated_directory(name: impl Into<String>, target: Arc<TargetConfig>) -> Self {
        Self::new(name, ArtifactKind::GeneratedDirectory, target)
    }

    /// Append compile inputs, keeping their order.
    #[must_use]
    pub fn with_sources<I, P>(mut self, sources: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Utf8PathBuf>,
    {
        self.sources.extend(sources.into_iter().map(Into::into));
        self
    }

    /// Add compile flags. Repeated flags are kept once, at first position.
    #[must_use]
    pub fn with_flags<I, S>(mut self, flags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.compile_flags.extend(flags.into_iter().map(Into::into));
        self
    }

    /// Add an include directory for an imported module.
    #[must_use]
    pub fn with_include_dir(mut self, dir: impl Into<Utf8PathBuf>) -> Self {
        self.include_dirs.push(dir.into());
        self
    }

    /// Link `reference` after every previously declared library.
    #[must_use]
    pub fn link(mut self, reference: LibraryReference) -> Self {
        self.libraries.push(reference);
        self
    }

    /// Declare `reference` without linking it.
    #[must_use]
    pub fn link_disabled(mut self, reference: LibraryReference) -> Self {
        self.disabled_libraries.push(reference);
        self
    }

    /// Link the platform C library.
    #[must_use]
    pub fn link_libc(mut self) -> Self {
        self.link_libc = true;
        self
    }

    /// Move the disabled reference called `name` to the end of the link
    /// order. Returns `false` when no such disabled reference exists.
    pub fn enable_library(&mut self, name: &str) -> bool {
        let Some(position) = self
            .disabled_libraries
            .iter()
            .position(|reference| reference.name() == name)
        else {
            return false;
        };
        let reference = self.disabled_libraries.remove(position);
        self.libraries.push(reference);
        true
    }
}
