//! Build and install directory layout.
//!
//! Every output path in the step graph comes from a [`Layout`], which keeps
//! artifacts write-once: each path below is derived from exactly one
//! artifact name and is written by exactly one step.

use camino::{Utf8Path, Utf8PathBuf};

/// Default build cache directory, relative to the project root.
pub const DEFAULT_BUILD_DIR: &str = ".kumiki-cache";
/// Default install prefix, relative to the project root.
pub const DEFAULT_PREFIX: &str = "kumiki-out";
/// Name of the generated documentation artifact and of its directory below
/// the prefix.
pub const DOCS_DIR: &str = "docs";

/// Project root, build cache and install prefix of one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    root: Utf8PathBuf,
    build_dir: Utf8PathBuf,
    prefix: Utf8PathBuf,
}

impl Layout {
    /// Use the default build directory and prefix below `root`.
    #[must_use]
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        let project_root = root.into();
        Self {
            build_dir: project_root.join(DEFAULT_BUILD_DIR),
            prefix: project_root.join(DEFAULT_PREFIX),
            root: project_root,
        }
    }

    /// Replace the build directory. Relative paths are taken from the root.
    #[must_use]
    pub fn with_build_dir(mut self, dir: impl AsRef<Utf8Path>) -> Self {
        self.build_dir = self.root.join(dir);
        self
    }

    /// Replace the install prefix. Relative paths are taken from the root.
    #[must_use]
    pub fn with_prefix(mut self, dir: impl AsRef<Utf8Path>) -> Self {
        self.prefix = self.root.join(dir);
        self
    }

    /// Project root that sources are relative to.
    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Directory for intermediate outputs.
    #[must_use]
    pub fn build_dir(&self) -> &Utf8Path {
        &self.build_dir
    }

    /// Install prefix.
    #[must_use]
    pub fn prefix(&self) -> &Utf8Path {
        &self.prefix
    }

    /// Resolve a project-relative source path.
    #[must_use]
    pub fn source_path(&self, source: &Utf8Path) -> Utf8PathBuf {
        self.root.join(source)
    }

    /// Object file for `source` of `artifact`, named by its fingerprint.
    #[must_use]
    pub fn object_path(&self, artifact: &str, source: &Utf8Path, fingerprint: &str) -> Utf8PathBuf {
        let stem = source.file_stem().unwrap_or("source");
        self.build_dir
            .join("obj")
            .join(artifact)
            .join(format!("{fingerprint}-{stem}.o"))
    }

    /// Archive produced by a static library artifact.
    #[must_use]
    pub fn archive_path(&self, artifact: &str) -> Utf8PathBuf {
        self.build_dir.join("lib").join(format!("lib{artifact}.a"))
    }

    /// Executable as linked in the build directory.
    #[must_use]
    pub fn executable_path(&self, artifact: &str) -> Utf8PathBuf {
        self.build_dir.join("bin").join(artifact)
    }

    /// Directory a generated artifact is written to before installation.
    #[must_use]
    pub fn generated_dir(&self, artifact: &str) -> Utf8PathBuf {
        self.build_dir.join("gen").join(artifact)
    }

    /// Installed location of an executable.
    #[must_use]
    pub fn installed_executable(&self, artifact: &str) -> Utf8PathBuf {
        self.prefix.join("bin").join(artifact)
    }

    /// Installed location of an archive.
    #[must_use]
    pub fn installed_archive(&self, artifact: &str) -> Utf8PathBuf {
        self.prefix.join("lib").join(format!("lib{artifact}.a"))
    }

    /// Installed location of a generated directory.
    #[must_use]
    pub fn installed_directory(&self, artifact: &str) -> Utf8PathBuf {
        self.prefix.join(artifact)
    }
}
