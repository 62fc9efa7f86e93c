//! Command line interface definition using clap.
//!
//! This module defines the [`Cli`] structure and the commands it accepts.
//! Build commands name entry points of the project graph and may be
//! combined, so `kumiki docs test` runs both in one pass. `graph` and
//! `list` only inspect the graph and are used on their own.

use clap::{Parser, ValueEnum};
use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

use crate::layout::{DEFAULT_BUILD_DIR, DEFAULT_PREFIX};
use crate::project;

mod parsing;

use parsing::parse_jobs;

/// Maximum number of jobs accepted by the CLI.
const MAX_JOBS: usize = 64;

/// Describe, build, install and run the decompiler as a step graph.
#[derive(Debug, Parser, Clone, PartialEq, Eq)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Run as if started in this directory.
    ///
    /// Sources are discovered and outputs written relative to it.
    #[arg(short = 'C', long, value_name = "DIR")]
    pub directory: Option<PathBuf>,

    /// Install prefix, relative to the project directory unless absolute.
    #[arg(long, value_name = "DIR", env = "KUMIKI_PREFIX", default_value = DEFAULT_PREFIX)]
    pub prefix: PathBuf,

    /// Directory for objects, archives and unlinked executables.
    #[arg(long, value_name = "DIR", default_value = DEFAULT_BUILD_DIR)]
    pub build_dir: PathBuf,

    /// Set the number of steps run in parallel.
    ///
    /// Values must be between 1 and 64.
    #[arg(short, long, value_name = "N", value_parser = parse_jobs)]
    pub jobs: Option<usize>,

    /// Enable verbose diagnostic logging.
    #[arg(short, long)]
    pub verbose: bool,

    /// Target triple to compile for; defaults to the host.
    #[arg(long, value_name = "TRIPLE", env = "KUMIKI_TARGET")]
    pub target: Option<String>,

    /// Optimisation mode: Debug, ReleaseSafe, ReleaseFast or ReleaseSmall.
    #[arg(long, value_name = "MODE", env = "KUMIKI_OPTIMIZE")]
    pub optimize: Option<String>,

    /// Commands to execute; defaults to `install` when omitted.
    ///
    /// Build commands may be combined, for example `docs test`.
    #[arg(value_enum, value_name = "COMMAND")]
    pub commands: Vec<Commands>,

    /// Arguments passed to the decompiler by `run`, after `--`.
    #[arg(last = true, value_name = "ARGS")]
    pub run_args: Vec<String>,
}

impl Cli {
    /// Apply the default command if none was specified.
    #[must_use]
    pub fn with_default_command(mut self) -> Self {
        if self.commands.is_empty() {
            self.commands.push(Commands::Install);
        }
        self
    }

    /// Decide what this invocation asks for.
    ///
    /// Repeated build commands collapse into one entry point, keeping the
    /// order of first mention.
    ///
    /// # Errors
    ///
    /// Returns [`UsageError::MustRunAlone`] when `graph` or `list` is mixed
    /// with other commands and [`UsageError::ArgumentsWithoutRun`] when
    /// arguments follow `--` but `run` was not requested.
    pub fn request(&self) -> Result<Request, UsageError> {
        let mut entries: Vec<&'static str> = Vec::new();
        for command in &self.commands {
            let Some(entry) = command.entry_point() else {
                if self.commands.len() > 1 {
                    return Err(UsageError::MustRunAlone {
                        command: command.name(),
                    });
                }
                return Ok(if *command == Commands::Graph {
                    Request::Graph
                } else {
                    Request::List
                });
            };
            if !entries.contains(&entry) {
                entries.push(entry);
            }
        }
        if entries.is_empty() {
            entries.push(project::INSTALL);
        }
        if !self.run_args.is_empty() && !entries.contains(&project::RUN) {
            return Err(UsageError::ArgumentsWithoutRun);
        }
        Ok(Request::Execute(entries))
    }
}

impl Default for Cli {
    fn default() -> Self {
        Self {
            directory: None,
            prefix: PathBuf::from(DEFAULT_PREFIX),
            build_dir: PathBuf::from(DEFAULT_BUILD_DIR),
            jobs: None,
            verbose: false,
            target: None,
            optimize: None,
            commands: Vec::new(),
            run_args: Vec::new(),
        }
        .with_default_command()
    }
}

/// Commands accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum Commands {
    /// Build and install the decompiler.
    Install,

    /// Install and run the decompiler with the arguments after `--`.
    Run,

    /// Build and run the test executable.
    Test,

    /// Generate documentation into the `docs` directory of the prefix.
    Docs,

    /// Print the step graph in DOT format without executing anything.
    Graph,

    /// List the available entry points.
    List,
}

impl Commands {
    /// Entry point executed by this command, if it executes one.
    #[must_use]
    pub const fn entry_point(self) -> Option<&'static str> {
        match self {
            Self::Install => Some(project::INSTALL),
            Self::Run => Some(project::RUN),
            Self::Test => Some(project::TEST),
            Self::Docs => Some(project::DOCS),
            Self::Graph | Self::List => None,
        }
    }

    /// Name as typed on the command line.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Install => "install",
            Self::Run => "run",
            Self::Test => "test",
            Self::Docs => "docs",
            Self::Graph => "graph",
            Self::List => "list",
        }
    }
}

/// What one invocation asks for, once the commands are validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Execute these entry points together.
    Execute(Vec<&'static str>),
    /// Print the step graph.
    Graph,
    /// List the entry points.
    List,
}

/// Command combinations that parse but cannot be honoured.
#[derive(Debug, Error, Diagnostic, PartialEq, Eq)]
pub enum UsageError {
    /// An inspection command was combined with others.
    #[error("`{command}` cannot be combined with other commands")]
    #[diagnostic(code(kumiki::cli::must_run_alone))]
    MustRunAlone {
        /// The inspection command.
        command: &'static str,
    },

    /// Arguments were given after `--` without `run`.
    #[error("arguments after `--` are only passed on by `run`")]
    #[diagnostic(
        code(kumiki::cli::arguments_without_run),
        help("add `run` to the commands, for example `kumiki run -- ARGS`")
    )]
    ArgumentsWithoutRun,
}
