//! Tests for the step runner.
//!
//! Most tests drive a recording executor over a small diamond graph:
//!
//! ```text
//! top -> left  -> base
//! top -> right -> base
//! side
//! ```
//!
//! The remaining tests run the decompiler graph against the fake toolchain
//! from `test_support`.

use anyhow::{Context, Result, bail, ensure};
use kumiki::config::TargetConfig;
use kumiki::graph::{CommandSpec, GraphBuilder, Step, StepGraph, StepId};
use kumiki::layout::Layout;
use kumiki::project;
use kumiki::runner::{
    ProcessExecutor, RunnerError, StepExecutionError, StepExecutor, StepOutcome, StepRunner,
};
use kumiki::toolchain::Toolchain;
use mockall::mock;
use mockall::predicate::always;
use rstest::{fixture, rstest};
use std::collections::BTreeSet;
use std::num::NonZeroUsize;
use std::sync::Mutex;
use test_support::FakeToolchain;
use test_support::project::SampleProject;

#[derive(Debug, Default)]
struct RecordingExecutor {
    executed: Mutex<Vec<StepId>>,
    failing: BTreeSet<StepId>,
    panicking: BTreeSet<StepId>,
}

impl RecordingExecutor {
    fn failing(ids: &[&str]) -> Self {
        Self {
            failing: ids.iter().copied().map(StepId::from).collect(),
            ..Self::default()
        }
    }

    fn executed(&self) -> Vec<StepId> {
        self.executed
            .lock()
            .map(|executed| executed.clone())
            .unwrap_or_default()
    }
}

impl StepExecutor for RecordingExecutor {
    fn execute(&self, step: &Step) -> Result<(), StepExecutionError> {
        if let Ok(mut executed) = self.executed.lock() {
            executed.push(step.id.clone());
        }
        if self.panicking.contains(&step.id) {
            explode(&step.id);
        }
        if self.failing.contains(&step.id) {
            return Err(StepExecutionError::ExitStatus {
                command: step.id.to_string(),
                code: Some(1),
            });
        }
        Ok(())
    }
}

fn explode(id: &StepId) -> ! {
    panic!("executor exploded on {id}");
}

#[fixture]
fn diamond() -> StepGraph {
    build_diamond().unwrap_or_else(|err| panic!("diamond graph: {err}"))
}

fn build_diamond() -> Result<StepGraph> {
    let mut builder = GraphBuilder::new(Layout::new("/work"), Toolchain::default());
    for name in ["base", "left", "right", "top", "side"] {
        builder.system_command(name, CommandSpec::new("true"))?;
    }
    for (from, to) in [
        ("left", "base"),
        ("right", "base"),
        ("top", "left"),
        ("top", "right"),
    ] {
        builder.depend_on(StepId::new(from), StepId::new(to));
    }
    builder.entry_point("top", "Everything in the diamond", StepId::new("top"))?;
    builder.entry_point("left", "One branch", StepId::new("left"))?;
    builder.entry_point("side", "Unrelated step", StepId::new("side"))?;
    builder.default_entry_point("side")?;
    Ok(builder.finish()?)
}

fn position(executed: &[StepId], id: &str) -> Result<usize> {
    executed
        .iter()
        .position(|step| step.as_str() == id)
        .with_context(|| format!("{id} was not executed: {executed:?}"))
}

fn sorted(ids: Vec<StepId>) -> Vec<StepId> {
    let mut all = ids;
    all.sort();
    all
}

fn steps(names: &[&str]) -> Vec<StepId> {
    sorted(names.iter().copied().map(StepId::from).collect())
}

#[rstest]
#[case(1)]
#[case(4)]
fn runs_each_step_once_in_dependency_order(
    diamond: StepGraph,
    #[case] job_count: usize,
) -> Result<()> {
    let jobs = NonZeroUsize::new(job_count).context("non-zero jobs")?;
    let mut runner = StepRunner::new(&diamond, RecordingExecutor::default()).with_jobs(jobs);

    runner.run_entry("top")?;

    let executed = runner.executor().executed();
    ensure!(
        sorted(executed.clone()) == steps(&["base", "left", "right", "top"]),
        "unexpected steps {executed:?}"
    );
    ensure!(position(&executed, "base")? == 0, "base must run first");
    ensure!(position(&executed, "top")? == 3, "top must run last");
    Ok(())
}

#[rstest]
fn only_the_requested_closure_runs(diamond: StepGraph) -> Result<()> {
    let mut runner = StepRunner::new(&diamond, RecordingExecutor::default());

    runner.run_entry("left")?;

    ensure!(runner.executor().executed() == steps(&["base", "left"]));
    ensure!(runner.outcome(&StepId::new("right")).is_none());
    ensure!(runner.outcome(&StepId::new("side")).is_none());
    Ok(())
}

#[rstest]
fn shared_steps_run_once_across_entry_points(diamond: StepGraph) -> Result<()> {
    let mut runner = StepRunner::new(&diamond, RecordingExecutor::default());

    runner.run_entry("left")?;
    runner.run_entry("top")?;
    runner.run_entry("left")?;

    let executed = runner.executor().executed();
    ensure!(
        sorted(executed.clone()) == steps(&["base", "left", "right", "top"]),
        "steps ran more than once: {executed:?}"
    );
    Ok(())
}

#[rstest]
fn several_entry_points_share_one_pass(diamond: StepGraph) -> Result<()> {
    let mut runner = StepRunner::new(&diamond, RecordingExecutor::default());

    runner.run_entries(["left", "top", "side"])?;

    let executed = runner.executor().executed();
    ensure!(
        sorted(executed.clone()) == steps(&["base", "left", "right", "side", "top"]),
        "unexpected steps {executed:?}"
    );
    Ok(())
}

#[rstest]
fn several_entry_points_report_every_failure(diamond: StepGraph) -> Result<()> {
    let mut runner = StepRunner::new(&diamond, RecordingExecutor::failing(&["left", "side"]));

    let failures = match runner.run_entries(["top", "side"]) {
        Err(RunnerError::StepsFailed { failures }) => failures,
        other => bail!("expected StepsFailed, got {other:?}"),
    };

    let failed: Vec<&str> = failures.iter().map(|failure| failure.step.as_str()).collect();
    ensure!(failed == ["left", "side"], "unexpected failures {failed:?}");
    ensure!(
        runner
            .outcome(&StepId::new("right"))
            .is_some_and(StepOutcome::is_success),
        "right does not depend on either failure"
    );
    Ok(())
}

#[rstest]
fn unknown_names_stop_before_anything_runs(diamond: StepGraph) -> Result<()> {
    let mut runner = StepRunner::new(&diamond, RecordingExecutor::default());

    let result = runner.run_entries(["left", "deploy"]);

    ensure!(
        matches!(&result, Err(RunnerError::UnknownEntryPoint { name }) if name == "deploy"),
        "expected UnknownEntryPoint, got {result:?}"
    );
    ensure!(runner.executor().executed().is_empty());
    Ok(())
}

#[rstest]
fn failures_skip_dependents_only(diamond: StepGraph) -> Result<()> {
    let top = StepId::new("top");
    let side = StepId::new("side");
    let mut runner = StepRunner::new(&diamond, RecordingExecutor::failing(&["left"]))
        .with_jobs(NonZeroUsize::MIN.saturating_add(1));

    let failures = match runner.run_roots([&top, &side]) {
        Err(RunnerError::StepsFailed { failures }) => failures,
        other => bail!("expected StepsFailed, got {other:?}"),
    };
    let failed: Vec<&str> = failures.iter().map(|failure| failure.step.as_str()).collect();
    ensure!(failed == ["left"], "unexpected failures {failed:?}");
    ensure!(
        matches!(
            runner.outcome(&top),
            Some(StepOutcome::Skipped { blocked_by }) if blocked_by.as_str() == "left"
        ),
        "top should be skipped"
    );
    for unaffected in ["base", "right", "side"] {
        ensure!(
            runner
                .outcome(&StepId::new(unaffected))
                .is_some_and(StepOutcome::is_success),
            "{unaffected} should have succeeded"
        );
    }
    ensure!(!runner.executor().executed().contains(&top));
    Ok(())
}

#[rstest]
fn failures_are_remembered(diamond: StepGraph) -> Result<()> {
    let mut runner = StepRunner::new(&diamond, RecordingExecutor::failing(&["base"]));

    ensure!(runner.run_entry("left").is_err());
    let again = runner.run_entry("top");

    ensure!(
        matches!(again, Err(RunnerError::StepsFailed { ref failures }) if failures.len() == 1),
        "expected the memoised failure, got {again:?}"
    );
    ensure!(runner.executor().executed() == steps(&["base"]));
    ensure!(matches!(
        runner.outcome(&StepId::new("right")),
        Some(StepOutcome::Skipped { .. })
    ));
    Ok(())
}

#[rstest]
fn panics_become_step_failures(diamond: StepGraph) -> Result<()> {
    let executor = RecordingExecutor {
        panicking: BTreeSet::from([StepId::new("side")]),
        ..RecordingExecutor::default()
    };
    let mut runner = StepRunner::new(&diamond, executor);

    let failures = match runner.run_default() {
        Err(RunnerError::StepsFailed { failures }) => failures,
        other => bail!("expected StepsFailed, got {other:?}"),
    };
    let failure = failures.first().context("one failure")?;
    ensure!(matches!(
        failure.error.as_ref(),
        StepExecutionError::Panicked { step } if step.as_str() == "side"
    ));
    Ok(())
}

#[rstest]
fn unknown_entry_points_are_rejected(diamond: StepGraph) -> Result<()> {
    let mut runner = StepRunner::new(&diamond, RecordingExecutor::default());

    let result = runner.run_entry("deploy");

    ensure!(
        matches!(result, Err(RunnerError::UnknownEntryPoint { ref name }) if name == "deploy"),
        "expected UnknownEntryPoint, got {result:?}"
    );
    ensure!(runner.executor().executed().is_empty());
    Ok(())
}

#[test]
fn missing_default_is_reported() -> Result<()> {
    let mut builder = GraphBuilder::new(Layout::new("/work"), Toolchain::default());
    let only = builder.system_command("only", CommandSpec::new("true"))?;
    builder.entry_point("only", "The only step", only)?;
    let graph = builder.finish()?;
    let mut runner = StepRunner::new(&graph, RecordingExecutor::default());

    let result = runner.run_default();

    ensure!(
        matches!(result, Err(RunnerError::NoDefaultEntryPoint)),
        "expected NoDefaultEntryPoint, got {result:?}"
    );
    Ok(())
}

mock! {
    Executor {}
    impl StepExecutor for Executor {
        fn execute(&self, step: &Step) -> Result<(), StepExecutionError>;
    }
}

#[rstest]
fn executor_sees_each_step_of_the_closure(diamond: StepGraph) -> Result<()> {
    let mut executor = MockExecutor::new();
    executor
        .expect_execute()
        .with(always())
        .times(4)
        .returning(|_| Ok(()));
    let mut runner = StepRunner::new(&diamond, executor);

    runner.run_entry("top")?;
    runner.run_entry("top")?;
    Ok(())
}

#[rstest]
fn mocked_failure_stops_the_branch(diamond: StepGraph) -> Result<()> {
    let mut executor = MockExecutor::new();
    executor
        .expect_execute()
        .withf(|step: &Step| step.id.as_str() == "base")
        .times(1)
        .returning(|step| {
            Err(StepExecutionError::ExitStatus {
                command: step.id.to_string(),
                code: None,
            })
        });
    let mut runner = StepRunner::new(&diamond, executor);

    let result = runner.run_entry("top");

    ensure!(
        matches!(result, Err(RunnerError::StepsFailed { .. })),
        "expected StepsFailed, got {result:?}"
    );
    Ok(())
}

fn fake_graph(
    sample: &SampleProject,
    tools: &FakeToolchain,
    run_args: &[String],
) -> Result<StepGraph> {
    project::build_graph(
        Layout::new(sample.root()),
        tools.toolchain(),
        TargetConfig::default(),
        run_args,
    )
    .context("build decompiler graph")
}

#[test]
fn run_passes_arguments_verbatim() -> Result<()> {
    let sample = SampleProject::new()?;
    let tools = FakeToolchain::new()?;
    let args = vec!["foo".to_owned(), "bar".to_owned()];
    let graph = fake_graph(&sample, &tools, &args)?;
    let jobs = NonZeroUsize::new(4).context("non-zero jobs")?;
    let mut runner = StepRunner::new(&graph, ProcessExecutor::new(sample.root())).with_jobs(jobs);

    runner.run_entry(project::RUN)?;

    let runs = tools.program_runs()?;
    ensure!(runs.len() == 1, "expected one program run, got {runs:?}");
    let run = runs.first().context("program run")?;
    ensure!(run.args == args, "unexpected arguments {:?}", run.args);
    let installed = sample.root().join("kumiki-out/bin/decompiler");
    ensure!(run.program == installed.as_str(), "ran {}", run.program);
    ensure!(installed.is_file());
    Ok(())
}

#[test]
fn install_builds_the_library_before_linking() -> Result<()> {
    let sample = SampleProject::new()?;
    let tools = FakeToolchain::new()?;
    let graph = fake_graph(&sample, &tools, &[])?;
    let mut runner = StepRunner::new(&graph, ProcessExecutor::new(sample.root()));

    runner.run_entry(project::INSTALL)?;

    let invocations = tools.tool_invocations()?;
    let archive = invocations
        .iter()
        .position(|call| call.program == "ar")
        .context("archiver was not invoked")?;
    let link = invocations
        .iter()
        .position(|call| call.program == "c++" && !call.args.iter().any(|arg| arg == "-c"))
        .context("linker was not invoked")?;
    ensure!(archive < link, "archive must precede link: {invocations:?}");
    ensure!(
        invocations.iter().filter(|call| call.program == "cc").count()
            == test_support::project::SOURCES.len()
    );
    ensure!(tools.program_runs()?.is_empty(), "install must not run the program");
    Ok(())
}

#[test]
fn docs_and_test_failures_are_reported_together() -> Result<()> {
    let sample = SampleProject::new()?;
    let tools = FakeToolchain::with_failing(&["doc", "program"])?;
    let graph = fake_graph(&sample, &tools, &[])?;
    let mut runner = StepRunner::new(&graph, ProcessExecutor::new(sample.root()))
        .with_jobs(NonZeroUsize::MIN.saturating_add(1));

    let failures = match runner.run_entries([project::DOCS, project::TEST]) {
        Err(RunnerError::StepsFailed { failures }) => failures,
        other => bail!("expected StepsFailed, got {other:?}"),
    };

    let failed: Vec<&str> = failures.iter().map(|failure| failure.step.as_str()).collect();
    ensure!(
        failed == ["docs:decompiler", "test:decompiler-test"],
        "unexpected failures {failed:?}"
    );
    Ok(())
}

#[test]
fn failing_docs_do_not_block_install() -> Result<()> {
    let sample = SampleProject::new()?;
    let tools = FakeToolchain::with_failing(&["doc"])?;
    let graph = fake_graph(&sample, &tools, &[])?;
    let mut runner = StepRunner::new(&graph, ProcessExecutor::new(sample.root()));

    let docs = runner.run_entry(project::DOCS);
    ensure!(
        matches!(docs, Err(RunnerError::StepsFailed { .. })),
        "expected docs to fail, got {docs:?}"
    );
    runner.run_entry(project::INSTALL)?;

    let compiles = tools
        .tool_invocations()?
        .into_iter()
        .filter(|call| call.program == "cc")
        .count();
    ensure!(
        compiles == test_support::project::SOURCES.len(),
        "decompiler sources compiled {compiles} times"
    );
    ensure!(sample.root().join("kumiki-out/bin/decompiler").is_file());
    ensure!(!sample.root().join("kumiki-out/docs").exists());
    Ok(())
}

#[test]
fn docs_are_installed_below_the_prefix() -> Result<()> {
    let sample = SampleProject::new()?;
    let tools = FakeToolchain::new()?;
    let graph = fake_graph(&sample, &tools, &[])?;
    let mut runner = StepRunner::new(&graph, ProcessExecutor::new(sample.root()));

    runner.run_entry(project::DOCS)?;

    ensure!(sample.root().join("kumiki-out/docs/index.html").is_file());
    let documented = tools
        .tool_invocations()?
        .into_iter()
        .find(|call| call.program == "doc")
        .context("doc tool was not invoked")?;
    ensure!(
        documented.args.len() == test_support::project::SOURCES.len() + 1,
        "unexpected doc arguments {:?}",
        documented.args
    );
    Ok(())
}

#[test]
fn test_entry_runs_the_test_build() -> Result<()> {
    let sample = SampleProject::new()?;
    let tools = FakeToolchain::new()?;
    let graph = fake_graph(&sample, &tools, &[])?;
    let mut runner = StepRunner::new(&graph, ProcessExecutor::new(sample.root()));

    runner.run_entry(project::TEST)?;

    let runs = tools.program_runs()?;
    let run = runs.first().context("test program run")?;
    ensure!(run.program.ends_with(".kumiki-cache/bin/decompiler-test"));
    ensure!(run.args.is_empty());
    Ok(())
}

#[rstest]
#[case(&[])]
#[case(&[project::INSTALL])]
#[case(&[project::TEST, project::DOCS])]
fn run_follows_the_install_closure(#[case] earlier: &[&str]) -> Result<()> {
    let sample = SampleProject::new()?;
    let graph = project::build_graph(
        Layout::new(sample.root()),
        Toolchain::default(),
        TargetConfig::default(),
        &[],
    )?;
    let mut runner = StepRunner::new(&graph, RecordingExecutor::default());
    for entry in earlier {
        runner.run_entry(entry)?;
    }

    runner.run_entry(project::RUN)?;

    let executed = runner.executor().executed();
    let install = StepId::install(project::DECOMPILER);
    let install_closure = graph.closure([&install]);
    let run_at = position(&executed, "run:decompiler")?;
    for id in &install_closure {
        let at = position(&executed, id.as_str())?;
        ensure!(at < run_at, "{id} must complete before the run step");
    }
    ensure!(
        sorted(executed.clone()).windows(2).all(|pair| pair.first() != pair.get(1)),
        "a step ran twice: {executed:?}"
    );
    Ok(())
}
