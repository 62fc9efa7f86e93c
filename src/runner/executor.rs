//! Step execution against the outside world.
//!
//! [`StepExecutor`] is the seam between the scheduler and external effects.
//! [`ProcessExecutor`] spawns the toolchain, streams its output and copies
//! installed files; tests substitute their own executors.

use super::streaming::wait_relaying_output;
use crate::graph::{CommandSpec, Step, StepAction, StepId};
use camino::{Utf8Path, Utf8PathBuf};
use miette::Diagnostic;
use std::fs;
use std::io;
use std::process::{Command, Stdio};
use thiserror::Error;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Errors raised while executing a single step.
#[derive(Debug, Error, Diagnostic)]
pub enum StepExecutionError {
    /// The program could not be started.
    #[error("failed to start {program}")]
    #[diagnostic(
        code(kumiki::executor::spawn),
        help("check the program exists or override it with the KUMIKI_* variables")
    )]
    Spawn {
        /// Program that failed to start.
        program: Utf8PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: io::Error,
    },

    /// The program ran and reported failure.
    #[error("`{command}` {}", describe_exit(*code))]
    #[diagnostic(code(kumiki::executor::exit_status))]
    ExitStatus {
        /// Rendered command line.
        command: String,
        /// Exit code, or `None` when terminated by a signal.
        code: Option<i32>,
    },

    /// Preparing outputs, waiting on a child or copying files failed.
    #[error("I/O failure on {path}")]
    #[diagnostic(code(kumiki::executor::io))]
    Io {
        /// Path being accessed.
        path: Utf8PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: io::Error,
    },

    /// The executor panicked while running the step.
    #[error("executor panicked while running `{step}`")]
    #[diagnostic(code(kumiki::executor::panicked))]
    Panicked {
        /// The step being executed.
        step: StepId,
    },
}

fn describe_exit(code: Option<i32>) -> String {
    code.map_or_else(
        || "was terminated by a signal".to_owned(),
        |value| format!("exited with status {value}"),
    )
}

/// Performs the action of one step.
///
/// Implementations are shared between worker threads. The scheduler only
/// calls `execute` once every dependency of `step` has succeeded, and at
/// most once per step.
pub trait StepExecutor: Sync {
    /// Run `step` to completion.
    ///
    /// # Errors
    ///
    /// Returns [`StepExecutionError`] when the step's action fails.
    fn execute(&self, step: &Step) -> Result<(), StepExecutionError>;
}

/// Executes steps by spawning processes in the project root.
#[derive(Debug, Clone)]
pub struct ProcessExecutor {
    root: Utf8PathBuf,
}

impl ProcessExecutor {
    /// Run commands with `root` as their working directory.
    #[must_use]
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn run_command(&self, step: &Step, command: &CommandSpec) -> Result<(), StepExecutionError> {
        let line = command.render();
        info!(step = %step.id, "Running command: {line}");
        let child = Command::new(command.program.as_std_path())
            .args(&command.args)
            .current_dir(self.root.as_std_path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| StepExecutionError::Spawn {
                program: command.program.clone(),
                source,
            })?;
        let output = wait_relaying_output(child).map_err(|source| StepExecutionError::Io {
            path: command.program.clone(),
            source,
        })?;
        debug!(
            step = %step.id,
            stdout_bytes = output.stdout.received,
            stderr_bytes = output.stderr.received,
            "{} finished",
            command.program
        );
        if output.stdout.truncated() || output.stderr.truncated() {
            warn!(step = %step.id, "output of {} was cut short", command.program);
        }
        let status = output.status;
        if status.success() {
            Ok(())
        } else {
            Err(StepExecutionError::ExitStatus {
                command: line,
                code: status.code(),
            })
        }
    }
}

impl StepExecutor for ProcessExecutor {
    fn execute(&self, step: &Step) -> Result<(), StepExecutionError> {
        prepare_outputs(step)?;
        match &step.action {
            StepAction::Exec { commands } => {
                for command in commands {
                    self.run_command(step, command)?;
                }
                Ok(())
            }
            StepAction::Copy { from, to } => {
                info!(step = %step.id, "Installing {from} to {to}");
                copy_path(from, to)
            }
            StepAction::Nothing => Ok(()),
        }
    }
}

fn io_error(path: &Utf8Path) -> impl FnOnce(io::Error) -> StepExecutionError + '_ {
    move |source| StepExecutionError::Io {
        path: path.to_owned(),
        source,
    }
}

/// Remove stale outputs and create their parent directories.
fn prepare_outputs(step: &Step) -> Result<(), StepExecutionError> {
    for output in &step.outputs {
        if output.is_dir() {
            debug!(step = %step.id, "removing stale directory {output}");
            fs::remove_dir_all(output).map_err(io_error(output))?;
        } else if output.exists() {
            fs::remove_file(output).map_err(io_error(output))?;
        }
        if let Some(parent) = output.parent() {
            fs::create_dir_all(parent).map_err(io_error(parent))?;
        }
    }
    Ok(())
}

/// Copy a file, or a directory tree, from `from` to `to`.
fn copy_path(from: &Utf8Path, to: &Utf8Path) -> Result<(), StepExecutionError> {
    if !from.is_dir() {
        fs::copy(from, to).map_err(io_error(from))?;
        return Ok(());
    }
    for item in WalkDir::new(from).follow_links(false) {
        let entry = item.map_err(|err| StepExecutionError::Io {
            path: from.to_owned(),
            source: err.into(),
        })?;
        let relative = entry
            .path()
            .strip_prefix(from)
            .map_err(|err| StepExecutionError::Io {
                path: from.to_owned(),
                source: io::Error::other(err),
            })?;
        let target = to.as_std_path().join(relative);
        let file_type = entry.file_type();
        if file_type.is_dir() {
            fs::create_dir_all(&target).map_err(io_error(to))?;
        } else if file_type.is_file() {
            fs::copy(entry.path(), &target).map_err(io_error(to))?;
        }
    }
    Ok(())
}
