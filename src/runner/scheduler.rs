//! Parallel, memoised execution of a step graph.
//!
//! [`StepRunner`] executes the dependency closure of the requested roots.
//! Ready steps are launched in identifier order on scoped worker threads,
//! at most `jobs` at a time, and report back over a channel. Outcomes are
//! kept for the lifetime of the runner, so a step reached by several entry
//! points runs once. A failure skips the steps that depend on it while
//! unrelated branches keep running.

use super::error::{RunnerError, StepFailure};
use super::executor::{StepExecutionError, StepExecutor};
use crate::graph::{StepGraph, StepId};
use std::collections::{BTreeMap, BTreeSet};
use std::num::NonZeroUsize;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, mpsc};
use std::thread;
use tracing::{debug, warn};

/// Final state of a step within one runner.
#[derive(Debug, Clone)]
pub enum StepOutcome {
    /// The step's action completed.
    Succeeded,
    /// The step's action failed.
    Failed(Arc<StepExecutionError>),
    /// The step never ran because a step it needs failed.
    Skipped {
        /// The failed step that blocked it.
        blocked_by: StepId,
    },
}

impl StepOutcome {
    /// Whether the step completed successfully.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }

    /// The failed step responsible for this outcome, if any.
    fn blocker<'a>(&'a self, id: &'a StepId) -> Option<&'a StepId> {
        match self {
            Self::Succeeded => None,
            Self::Failed(_) => Some(id),
            Self::Skipped { blocked_by } => Some(blocked_by),
        }
    }
}

/// Executes entry points of a [`StepGraph`] through a [`StepExecutor`].
#[derive(Debug)]
pub struct StepRunner<'g, E> {
    graph: &'g StepGraph,
    executor: E,
    jobs: NonZeroUsize,
    outcomes: BTreeMap<StepId, StepOutcome>,
}

impl<'g, E: StepExecutor> StepRunner<'g, E> {
    /// Run steps of `graph` one at a time through `executor`.
    #[must_use]
    pub fn new(graph: &'g StepGraph, executor: E) -> Self {
        Self {
            graph,
            executor,
            jobs: NonZeroUsize::MIN,
            outcomes: BTreeMap::new(),
        }
    }

    /// Allow up to `jobs` independent steps to run at once.
    #[must_use]
    pub const fn with_jobs(mut self, jobs: NonZeroUsize) -> Self {
        self.jobs = jobs;
        self
    }

    /// The executor steps are handed to.
    #[must_use]
    pub const fn executor(&self) -> &E {
        &self.executor
    }

    /// Outcome of `id`, if it has been decided.
    #[must_use]
    pub fn outcome(&self, id: &StepId) -> Option<&StepOutcome> {
        self.outcomes.get(id)
    }

    /// Execute the entry point called `name`.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::UnknownEntryPoint`] for an unregistered name and
    /// [`RunnerError::StepsFailed`] when any step in its closure failed.
    pub fn run_entry(&mut self, name: &str) -> Result<(), RunnerError> {
        self.run_entries([name])
    }

    /// Execute several entry points in one pass.
    ///
    /// Their closures are merged before scheduling, so a shared step runs
    /// once and a failure under one entry point does not stop the others.
    /// Every failure across the merged closure is reported together.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::UnknownEntryPoint`] before running anything if
    /// any name is unregistered, and [`RunnerError::StepsFailed`] when any
    /// step failed.
    pub fn run_entries<'n, I>(&mut self, names: I) -> Result<(), RunnerError>
    where
        I: IntoIterator<Item = &'n str>,
    {
        let graph = self.graph;
        let mut roots = Vec::new();
        for name in names {
            let entry = graph
                .entry_points()
                .get(name)
                .ok_or_else(|| RunnerError::UnknownEntryPoint {
                    name: name.to_owned(),
                })?;
            debug!(entry = name, root = %entry.root, "executing entry point");
            roots.push(&entry.root);
        }
        self.run_roots(roots)
    }

    /// Execute the default entry point.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::NoDefaultEntryPoint`] when the graph has no
    /// default and [`RunnerError::StepsFailed`] when any step failed.
    pub fn run_default(&mut self) -> Result<(), RunnerError> {
        let graph = self.graph;
        let entry = graph
            .entry_points()
            .default_entry()
            .ok_or(RunnerError::NoDefaultEntryPoint)?;
        self.run_roots([&entry.root])
    }

    /// Execute the dependency closure of `roots`.
    ///
    /// Steps decided by an earlier call are not run again; earlier failures
    /// inside the closure are reported again.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::StepsFailed`] listing every failed step in the
    /// closure.
    pub fn run_roots<'a, I>(&mut self, roots: I) -> Result<(), RunnerError>
    where
        I: IntoIterator<Item = &'a StepId>,
    {
        let closure = self.graph.closure(roots);
        let pending = self.skip_blocked(&closure);
        self.schedule(&pending);

        let failures: Vec<StepFailure> = closure
            .iter()
            .filter_map(|id| match self.outcomes.get(id) {
                Some(StepOutcome::Failed(error)) => Some(StepFailure {
                    step: id.clone(),
                    error: Arc::clone(error),
                }),
                _ => None,
            })
            .collect();
        if failures.is_empty() {
            Ok(())
        } else {
            Err(RunnerError::StepsFailed { failures })
        }
    }

    /// Mark steps blocked by earlier failures as skipped and return the
    /// steps of `closure` that still need to run.
    fn skip_blocked(&mut self, closure: &BTreeSet<StepId>) -> BTreeSet<StepId> {
        let mut pending = BTreeSet::new();
        for id in self.graph.topological_order(closure) {
            if self.outcomes.contains_key(&id) {
                continue;
            }
            let blocker = self.graph.step(&id).and_then(|step| {
                step.depends_on.iter().find_map(|dep| {
                    self.outcomes
                        .get(dep)
                        .and_then(|outcome| outcome.blocker(dep))
                        .cloned()
                })
            });
            match blocker {
                Some(blocked_by) => {
                    warn!(step = %id, blocked_by = %blocked_by, "skipping step");
                    self.outcomes.insert(id, StepOutcome::Skipped { blocked_by });
                }
                None => {
                    pending.insert(id);
                }
            }
        }
        pending
    }

    fn schedule(&mut self, pending: &BTreeSet<StepId>) {
        let graph = self.graph;
        let executor = &self.executor;
        let outcomes = &mut self.outcomes;
        let jobs = self.jobs.get();

        let mut waiting: BTreeMap<&StepId, usize> = BTreeMap::new();
        let mut dependents: BTreeMap<&StepId, Vec<&StepId>> = BTreeMap::new();
        for id in pending {
            let Some(step) = graph.step(id) else {
                continue;
            };
            let mut count = 0;
            for dep in step.depends_on.iter().filter(|dep| pending.contains(*dep)) {
                dependents.entry(dep).or_default().push(id);
                count += 1;
            }
            waiting.insert(id, count);
        }
        let mut ready: BTreeSet<&StepId> = waiting
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(id, _)| *id)
            .collect();

        thread::scope(|scope| {
            let (tx, rx) = mpsc::channel::<(&StepId, Result<(), StepExecutionError>)>();
            let mut in_flight = 0_usize;
            loop {
                while in_flight < jobs {
                    let Some(id) = ready.pop_first() else {
                        break;
                    };
                    let Some(step) = graph.step(id) else {
                        continue;
                    };
                    debug!(step = %id, kind = %step.kind, "launching step");
                    let sender = tx.clone();
                    scope.spawn(move || {
                        let result = panic::catch_unwind(AssertUnwindSafe(|| executor.execute(step)))
                            .unwrap_or_else(|_| Err(StepExecutionError::Panicked { step: id.clone() }));
                        if sender.send((id, result)).is_err() {
                            debug!(step = %id, "scheduler stopped listening");
                        }
                    });
                    in_flight += 1;
                }
                if in_flight == 0 {
                    break;
                }
                let Ok((id, result)) = rx.recv() else {
                    break;
                };
                in_flight -= 1;
                match result {
                    Ok(()) => {
                        debug!(step = %id, "step succeeded");
                        outcomes.insert(id.clone(), StepOutcome::Succeeded);
                        for dependent in dependents.get(id).into_iter().flatten() {
                            if let Some(count) = waiting.get_mut(*dependent) {
                                *count = count.saturating_sub(1);
                                if *count == 0 && !outcomes.contains_key(*dependent) {
                                    ready.insert(*dependent);
                                }
                            }
                        }
                    }
                    Err(error) => {
                        tracing::error!(step = %id, error = %error, "step failed");
                        outcomes.insert(id.clone(), StepOutcome::Failed(Arc::new(error)));
                        skip_dependents(id, &dependents, outcomes);
                    }
                }
            }
        });
    }
}

/// Mark every transitive dependent of `failed` as skipped.
fn skip_dependents(
    failed: &StepId,
    dependents: &BTreeMap<&StepId, Vec<&StepId>>,
    outcomes: &mut BTreeMap<StepId, StepOutcome>,
) {
    let mut stack: Vec<&StepId> = dependents.get(failed).cloned().unwrap_or_default();
    while let Some(id) = stack.pop() {
        if outcomes.contains_key(id) {
            continue;
        }
        warn!(step = %id, blocked_by = %failed, "skipping step");
        outcomes.insert(
            id.clone(),
            StepOutcome::Skipped {
                blocked_by: failed.clone(),
            },
        );
        stack.extend(dependents.get(id).into_iter().flatten().copied());
    }
}
