//! Error types for the runner module.

use super::executor::StepExecutionError;
use crate::graph::StepId;
use itertools::Itertools;
use miette::Diagnostic;
use std::sync::Arc;
use thiserror::Error;

/// A step that failed, with the error its action reported.
#[derive(Debug, Clone)]
pub struct StepFailure {
    /// The failed step.
    pub step: StepId,
    /// Why it failed. Shared because the outcome is memoised.
    pub error: Arc<StepExecutionError>,
}

/// Errors raised while executing entry points.
#[derive(Debug, Error, Diagnostic)]
pub enum RunnerError {
    /// No entry point has the requested name.
    #[error("unknown entry point `{name}`")]
    #[diagnostic(
        code(kumiki::runner::unknown_entry_point),
        help("run `kumiki list` to see the available entry points")
    )]
    UnknownEntryPoint {
        /// The requested name.
        name: String,
    },

    /// No entry point was requested and the graph has no default.
    #[error("no entry point requested and none is marked as default")]
    #[diagnostic(code(kumiki::runner::no_default_entry_point))]
    NoDefaultEntryPoint,

    /// One or more steps failed. Steps depending on them were skipped.
    #[error(
        "{} step(s) failed: {}",
        failures.len(),
        failures.iter().map(|failure| format!("{}: {}", failure.step, failure.error)).join("; ")
    )]
    #[diagnostic(code(kumiki::runner::steps_failed))]
    StepsFailed {
        /// Every failed step in the requested closure, sorted by identifier.
        failures: Vec<StepFailure>,
    },
}
