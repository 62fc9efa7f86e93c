//! A minimal project tree for the decompiler build description.

use anyhow::{Context, Result, anyhow};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use tempfile::TempDir;

/// SLEIGH sources written by [`SampleProject::new`], in sorted order.
pub const SLEIGH_SOURCES: [&str; 3] = [
    "deps/sleigh/address.cc",
    "deps/sleigh/slgh/pcode.cc",
    "deps/sleigh/space.cc",
];
/// Decompiler sources written by [`SampleProject::new`], in sorted order.
pub const SOURCES: [&str; 2] = ["src/main.c", "src/tabled/print.c"];

/// Temporary project directory with SLEIGH and decompiler sources.
#[derive(Debug)]
pub struct SampleProject {
    dir: TempDir,
    root: Utf8PathBuf,
}

impl SampleProject {
    /// Write the sample tree, including files discovery must ignore.
    ///
    /// # Errors
    ///
    /// Returns an error if any file cannot be written.
    pub fn new() -> Result<Self> {
        let dir = TempDir::new().context("create project dir")?;
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf())
            .map_err(|path| anyhow!("non-UTF-8 temp dir {}", path.display()))?;
        let project = Self { dir, root };
        for source in SLEIGH_SOURCES.iter().chain(SOURCES.iter()) {
            project.write(source, "")?;
        }
        project.write("deps/sleigh/README.md", "not a source")?;
        project.write("deps/sleigh/types.h", "")?;
        project.write("src/tabled/local-bfd.h", "")?;
        project.write("deps/clap/clap.h", "")?;
        Ok(project)
    }

    /// Write `contents` to `relative`, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn write(&self, relative: &str, contents: &str) -> Result<()> {
        let path = self.root.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create {parent}"))?;
        }
        fs::write(&path, contents).with_context(|| format!("write {path}"))
    }

    /// Project root.
    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Keep the temporary directory alive for the caller's scope.
    #[must_use]
    pub const fn temp_dir(&self) -> &TempDir {
        &self.dir
    }
}
