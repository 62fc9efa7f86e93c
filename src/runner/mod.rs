//! CLI execution and command dispatch logic.
//!
//! This module keeps `main` minimal by providing a single entry point that
//! handles command execution. It constructs the project graph first and
//! only then hands it to a [`StepRunner`], so no step runs unless the whole
//! graph is valid.

mod error;
pub mod executor;
pub mod scheduler;
mod streaming;

pub use error::{RunnerError, StepFailure};
pub use executor::{ProcessExecutor, StepExecutionError, StepExecutor};
pub use scheduler::{StepOutcome, StepRunner};

use crate::cli::{Cli, Request};
use crate::config::TargetConfig;
use crate::graph::{StepGraph, dot};
use crate::layout::Layout;
use crate::project;
use crate::toolchain::Toolchain;
use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use itertools::Itertools;
use std::env;
use std::io::{self, Write};
use std::num::NonZeroUsize;
use std::path::Path;
use std::thread;
use tracing::debug;

/// Execute the parsed [`Cli`] command.
///
/// # Errors
///
/// Returns an error when the configuration is invalid, the graph cannot be
/// constructed or any executed step fails.
pub fn run(cli: &Cli) -> Result<()> {
    let request = cli.request().context("invalid command line")?;
    let target = TargetConfig::parse(cli.target.as_deref(), cli.optimize.as_deref())
        .context("invalid build configuration")?;
    let layout = resolve_layout(cli)?;
    let graph = project::build_graph(layout.clone(), Toolchain::from_env(), target, &cli.run_args)
        .with_context(|| format!("constructing the step graph for {}", layout.root()))?;
    if tracing::enabled!(tracing::Level::DEBUG) {
        let graph_json =
            serde_json::to_string_pretty(&graph).context("serialising the step graph")?;
        debug!("Step graph:\n{graph_json}");
    }

    match request {
        Request::Execute(entries) => execute(cli, &graph, &layout, &entries),
        Request::Graph => write_stdout(&dot::render(&graph)),
        Request::List => write_stdout(&list_entry_points(&graph)),
    }
}

fn execute(cli: &Cli, graph: &StepGraph, layout: &Layout, entries: &[&str]) -> Result<()> {
    let jobs = cli
        .jobs
        .and_then(NonZeroUsize::new)
        .or_else(|| thread::available_parallelism().ok())
        .unwrap_or(NonZeroUsize::MIN);
    let executor = ProcessExecutor::new(layout.root());
    let mut runner = StepRunner::new(graph, executor).with_jobs(jobs);
    let names = entries.iter().map(|entry| format!("`{entry}`")).join(", ");
    runner
        .run_entries(entries.iter().copied())
        .with_context(|| format!("executing {names}"))
}

/// Resolve the project root, build directory and prefix to absolute paths.
fn resolve_layout(cli: &Cli) -> Result<Layout> {
    let root = match &cli.directory {
        Some(dir) => dir.clone(),
        None => env::current_dir().context("reading the current directory")?,
    };
    let canonical = root
        .canonicalize()
        .with_context(|| format!("resolving project directory {}", root.display()))?;
    let utf8_root = to_utf8(&canonical)?;
    Ok(Layout::new(utf8_root)
        .with_build_dir(to_utf8(&cli.build_dir)?)
        .with_prefix(to_utf8(&cli.prefix)?))
}

fn to_utf8(path: &Path) -> Result<Utf8PathBuf> {
    Utf8PathBuf::from_path_buf(path.to_path_buf())
        .map_err(|p| anyhow::anyhow!("path {} is not valid UTF-8", p.display()))
}

fn list_entry_points(graph: &StepGraph) -> String {
    let entries = graph.entry_points();
    let default = entries.default_entry().map(|entry| entry.name.as_str());
    let mut listing = entries
        .iter()
        .map(|entry| {
            let marker = if Some(entry.name.as_str()) == default {
                " (default)"
            } else {
                ""
            };
            format!("{:<8} {}{marker}", entry.name, entry.description)
        })
        .join("\n");
    listing.push('\n');
    listing
}

fn write_stdout(text: &str) -> Result<()> {
    let mut stdout = io::stdout().lock();
    stdout
        .write_all(text.as_bytes())
        .and_then(|()| stdout.flush())
        .context("writing to stdout")
}
