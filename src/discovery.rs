//! Source discovery for compile inputs.
//!
//! [`discover`] walks a directory tree and returns every regular file whose
//! extension is accepted. Traversal order depends on the filesystem, so the
//! result is always sorted before it leaves this module; compile inputs and
//! the diagnostics they produce stay in the same order on every machine.

use camino::{Utf8Path, Utf8PathBuf};
use itertools::Itertools;
use miette::Diagnostic;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;

/// Errors raised while scanning a source tree.
#[derive(Debug, Error, Diagnostic)]
pub enum DiscoveryError {
    /// The root does not exist or is not a directory.
    #[error("source directory {root} does not exist")]
    #[diagnostic(code(kumiki::discovery::not_found))]
    DirectoryNotFound {
        /// Directory that was requested.
        root: Utf8PathBuf,
    },

    /// An entry below the root could not be read.
    #[error("failed to read {}", path.display())]
    #[diagnostic(code(kumiki::discovery::io))]
    Io {
        /// Entry that failed, or the root when the walker could not say.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: io::Error,
    },

    /// A matching file has a path that is not valid UTF-8.
    #[error("source path {} is not valid UTF-8", path.display())]
    #[diagnostic(code(kumiki::discovery::non_utf8))]
    NonUtf8Path {
        /// The offending path.
        path: PathBuf,
    },
}

/// Recursively collect files below `root` whose extension is in `extensions`.
///
/// Extensions are compared without the leading dot and are case-sensitive.
/// Symbolic links are neither followed nor reported. Paths are relative to
/// `root`, use `/` as the separator, and are sorted lexicographically.
///
/// # Errors
///
/// Returns [`DiscoveryError::DirectoryNotFound`] when `root` is not a
/// directory and [`DiscoveryError::Io`] when any entry cannot be read.
///
/// # Examples
///
/// ```
/// use camino::Utf8Path;
/// use kumiki::discovery::discover;
///
/// let dir = tempfile::tempdir().expect("tempdir");
/// std::fs::write(dir.path().join("b.cc"), "").expect("write");
/// std::fs::write(dir.path().join("a.cc"), "").expect("write");
/// std::fs::write(dir.path().join("notes.txt"), "").expect("write");
/// let root = Utf8Path::from_path(dir.path()).expect("utf8");
/// let found = discover(root, &["cc"]).expect("discover");
/// assert_eq!(found, vec!["a.cc", "b.cc"]);
/// ```
pub fn discover<S: AsRef<str>>(
    root: &Utf8Path,
    extensions: &[S],
) -> Result<Vec<Utf8PathBuf>, DiscoveryError> {
    if !root.is_dir() {
        return Err(DiscoveryError::DirectoryNotFound {
            root: root.to_owned(),
        });
    }

    let mut found = Vec::new();
    for item in WalkDir::new(root).follow_links(false) {
        let entry = item.map_err(|err| DiscoveryError::Io {
            path: err
                .path()
                .map_or_else(|| root.as_std_path().to_path_buf(), Path::to_path_buf),
            source: err.into(),
        })?;
        if !entry.file_type().is_file() || !has_accepted_extension(entry.path(), extensions) {
            continue;
        }
        found.push(relative_source_path(root.as_std_path(), entry.path())?);
    }

    found.sort();
    debug!(root = %root, count = found.len(), "discovered sources");
    Ok(found)
}

fn has_accepted_extension<S: AsRef<str>>(path: &Path, extensions: &[S]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| extensions.iter().any(|accepted| accepted.as_ref() == ext))
}

fn relative_source_path(root: &Path, path: &Path) -> Result<Utf8PathBuf, DiscoveryError> {
    let relative = path.strip_prefix(root).unwrap_or(path);
    let utf8 = Utf8Path::from_path(relative).ok_or_else(|| DiscoveryError::NonUtf8Path {
        path: path.to_path_buf(),
    })?;
    // Normalise separators so Windows and Unix produce identical inputs.
    Ok(Utf8PathBuf::from(
        utf8.components().map(|c| c.as_str()).join("/"),
    ))
}
