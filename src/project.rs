//! Build description of the decompiler frontend.
//!
//! The project compiles the bundled SLEIGH sources into a static library,
//! links it with the system binary-format and compression libraries into the
//! `decompiler` executable, and exposes four entry points:
//!
//! | Name      | Root                       |
//! |-----------|----------------------------|
//! | `install` | `install:decompiler` (default) |
//! | `run`     | `run:decompiler`           |
//! | `test`    | `test:decompiler-test`     |
//! | `docs`    | `install:docs`             |

use crate::artifact::{ArtifactDescriptor, LibraryReference};
use crate::config::TargetConfig;
use crate::discovery::discover;
use crate::graph::{GraphBuilder, GraphError, StepGraph, StepId};
use crate::layout::{DOCS_DIR, Layout};
use crate::toolchain::Toolchain;
use camino::{Utf8Path, Utf8PathBuf};
use std::sync::Arc;

/// Static library built from the SLEIGH sources.
pub const SLEIGH: &str = "sleigh";
/// The primary executable.
pub const DECOMPILER: &str = "decompiler";
/// Test build of the primary executable.
pub const DECOMPILER_TEST: &str = "decompiler-test";

/// SLEIGH sources, relative to the project root.
pub const SLEIGH_DIR: &str = "deps/sleigh";
/// Decompiler sources, relative to the project root.
pub const SOURCE_DIR: &str = "src";
/// Header-only argument parsing module imported by the decompiler.
pub const CLAP_DIR: &str = "deps/clap";

/// Flags for every SLEIGH source.
pub const SLEIGH_FLAGS: [&str; 8] = [
    "-O3",
    "-Werror",
    "-Wno-sign-compare",
    "-Werror=return-type",
    "-fno-sanitize=undefined",
    "-D__TERMINAL__",
    "-std=c++17",
    "-fPIC",
];
/// Define added to the test build.
pub const TEST_DEFINE: &str = "-DKUMIKI_TEST";
/// Optional backends declared on the decompiler but not linked.
pub const DISABLED_BACKENDS: [&str; 2] = ["capstone", "z3"];
/// System libraries the decompiler links, in link order.
pub const SYSTEM_LIBRARIES: [&str; 2] = ["bfd", "z"];

/// Entry point that builds and installs the decompiler.
pub const INSTALL: &str = "install";
/// Entry point that runs the installed decompiler.
pub const RUN: &str = "run";
/// Entry point that builds and runs the test executable.
pub const TEST: &str = "test";
/// Entry point that generates and installs documentation.
pub const DOCS: &str = "docs";

/// Scan the project tree and construct its step graph.
///
/// `run_args` are forwarded verbatim to the decompiler by the `run` entry
/// point.
///
/// # Errors
///
/// Returns [`GraphError::Discovery`] when a source directory cannot be read
/// and any other [`GraphError`] the construction raises.
pub fn build_graph(
    layout: Layout,
    toolchain: Toolchain,
    target: TargetConfig,
    run_args: &[String],
) -> Result<StepGraph, GraphError> {
    let target = Arc::new(target);
    let sleigh_sources = discover_below(layout.root(), SLEIGH_DIR, "cc")?;
    let sources = discover_below(layout.root(), SOURCE_DIR, "c")?;

    let mut builder = GraphBuilder::new(layout, toolchain);
    builder.add_artifact(
        ArtifactDescriptor::static_library(SLEIGH, Arc::clone(&target))
            .with_sources(sleigh_sources)
            .with_flags(SLEIGH_FLAGS),
    )?;
    builder.add_artifact(decompiler(DECOMPILER, &target, &sources))?;
    builder.add_artifact(decompiler(DECOMPILER_TEST, &target, &sources).with_flags([TEST_DEFINE]))?;

    let install = builder.install_artifact(DECOMPILER)?;
    let run = builder.run_artifact(DECOMPILER, run_args.iter().cloned())?;
    let test = builder.test_artifact(DECOMPILER_TEST)?;
    builder.generate_docs(DECOMPILER)?;
    let docs = builder.install_artifact(DOCS_DIR)?;
    // Gating `run` on the test suite is not wired in yet.
    builder.declare_disabled_edge(run.clone(), StepId::test(DECOMPILER_TEST));

    builder.entry_point(INSTALL, "Build and install the decompiler", install)?;
    builder.entry_point(RUN, "Install and run the decompiler", run)?;
    builder.entry_point(TEST, "Build and run the test executable", test)?;
    builder.entry_point(DOCS, "Generate documentation into <prefix>/docs", docs)?;
    builder.default_entry_point(INSTALL)?;
    builder.finish()
}

fn decompiler(name: &str, target: &Arc<TargetConfig>, sources: &[Utf8PathBuf]) -> ArtifactDescriptor {
    let mut descriptor = ArtifactDescriptor::executable(name, Arc::clone(target))
        .with_sources(sources.iter().cloned())
        .with_include_dir(CLAP_DIR)
        .link(LibraryReference::sibling(SLEIGH));
    for library in SYSTEM_LIBRARIES {
        descriptor = descriptor.link(LibraryReference::system(library));
    }
    descriptor = descriptor.link(LibraryReference::ForeignRuntimeStdlib).link_libc();
    for backend in DISABLED_BACKENDS {
        descriptor = descriptor.link_disabled(LibraryReference::system(backend));
    }
    descriptor
}

fn discover_below(
    root: &Utf8Path,
    dir: &str,
    extension: &str,
) -> Result<Vec<Utf8PathBuf>, GraphError> {
    let base = Utf8Path::new(dir);
    let found = discover(&root.join(base), &[extension])?;
    Ok(found.into_iter().map(|path| base.join(path)).collect())
}
