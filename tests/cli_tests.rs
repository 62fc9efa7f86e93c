//! Unit tests for CLI argument parsing and validation.
//!
//! This module exercises the command-line interface defined in [`kumiki::cli`]
//! using `rstest` for parameterised coverage of success and error scenarios.

use anyhow::{Context, Result, ensure};
use clap::Parser;
use clap::error::ErrorKind;
use kumiki::cli::{Cli, Commands, Request, UsageError};
use kumiki::layout::{DEFAULT_BUILD_DIR, DEFAULT_PREFIX};
use kumiki::project;
use rstest::rstest;
use std::path::PathBuf;

#[rstest]
#[case(vec!["kumiki"], vec![])]
#[case(vec!["kumiki", "install"], vec![Commands::Install])]
#[case(vec!["kumiki", "test"], vec![Commands::Test])]
#[case(vec!["kumiki", "docs"], vec![Commands::Docs])]
#[case(vec!["kumiki", "graph"], vec![Commands::Graph])]
#[case(vec!["kumiki", "list"], vec![Commands::List])]
#[case(vec!["kumiki", "run"], vec![Commands::Run])]
#[case(vec!["kumiki", "docs", "test"], vec![Commands::Docs, Commands::Test])]
fn parses_commands(#[case] argv: Vec<&str>, #[case] expected: Vec<Commands>) -> Result<()> {
    let cli = Cli::try_parse_from(argv).context("parse arguments")?;
    ensure!(cli.commands == expected, "unexpected commands {:?}", cli.commands);
    Ok(())
}

#[test]
fn missing_command_defaults_to_install() -> Result<()> {
    let cli = Cli::try_parse_from(["kumiki"])
        .context("parse arguments")?
        .with_default_command();
    ensure!(cli.commands == [Commands::Install]);
    ensure!(cli.request()? == Request::Execute(vec![project::INSTALL]));
    Ok(())
}

#[test]
fn run_forwards_arguments_after_separator() -> Result<()> {
    let cli = Cli::try_parse_from(["kumiki", "run", "--", "foo", "--bar", "-C", "baz"])
        .context("parse arguments")?;
    ensure!(
        cli.run_args == ["foo", "--bar", "-C", "baz"],
        "unexpected run arguments {:?}",
        cli.run_args
    );
    ensure!(cli.directory.is_none(), "-C after -- belongs to the program");
    ensure!(cli.request()? == Request::Execute(vec![project::RUN]));
    Ok(())
}

#[test]
fn run_arguments_require_separator() {
    let err = Cli::try_parse_from(["kumiki", "run", "foo"]);
    assert!(err.is_err(), "positional arguments must follow --");
}

#[test]
fn other_commands_forward_nothing() -> Result<()> {
    let cli = Cli::try_parse_from(["kumiki", "install"]).context("parse arguments")?;
    ensure!(cli.run_args.is_empty());
    Ok(())
}

#[rstest]
#[case(vec!["kumiki", "docs", "test"], vec![project::DOCS, project::TEST])]
#[case(vec!["kumiki", "test", "docs", "test"], vec![project::TEST, project::DOCS])]
#[case(vec!["kumiki", "test", "run", "--", "x"], vec![project::TEST, project::RUN])]
#[case(vec!["kumiki", "install", "run", "test", "docs"], vec![project::INSTALL, project::RUN, project::TEST, project::DOCS])]
fn build_commands_combine_into_one_request(
    #[case] argv: Vec<&str>,
    #[case] expected: Vec<&'static str>,
) -> Result<()> {
    let cli = Cli::try_parse_from(argv).context("parse arguments")?;
    ensure!(cli.request()? == Request::Execute(expected));
    Ok(())
}

#[rstest]
#[case(vec!["kumiki", "graph", "install"], UsageError::MustRunAlone { command: "graph" })]
#[case(vec!["kumiki", "docs", "list"], UsageError::MustRunAlone { command: "list" })]
#[case(vec!["kumiki", "test", "--", "x"], UsageError::ArgumentsWithoutRun)]
#[case(vec!["kumiki", "--", "x"], UsageError::ArgumentsWithoutRun)]
fn rejects_unusable_combinations(#[case] argv: Vec<&str>, #[case] expected: UsageError) -> Result<()> {
    let cli = Cli::try_parse_from(argv).context("parse arguments")?;
    match cli.request() {
        Ok(request) => anyhow::bail!("expected a usage error, got {request:?}"),
        Err(err) => {
            ensure!(err == expected, "unexpected usage error {err:?}");
            Ok(())
        }
    }
}

#[rstest]
#[case(vec!["kumiki", "graph"], Request::Graph)]
#[case(vec!["kumiki", "list"], Request::List)]
fn inspection_commands_run_alone(#[case] argv: Vec<&str>, #[case] expected: Request) -> Result<()> {
    let cli = Cli::try_parse_from(argv).context("parse arguments")?;
    ensure!(cli.request()? == expected);
    Ok(())
}

#[test]
fn global_options_are_parsed() -> Result<()> {
    let cli = Cli::try_parse_from([
        "kumiki",
        "-C",
        "work",
        "-j",
        "8",
        "--prefix",
        "/opt/decompiler",
        "--build-dir",
        "cache",
        "--target",
        "aarch64-linux-gnu",
        "--optimize",
        "ReleaseFast",
        "-v",
        "docs",
    ])
    .context("parse arguments")?;
    ensure!(cli.directory == Some(PathBuf::from("work")));
    ensure!(cli.jobs == Some(8));
    ensure!(cli.prefix == PathBuf::from("/opt/decompiler"));
    ensure!(cli.build_dir == PathBuf::from("cache"));
    ensure!(cli.target.as_deref() == Some("aarch64-linux-gnu"));
    ensure!(cli.optimize.as_deref() == Some("ReleaseFast"));
    ensure!(cli.verbose);
    Ok(())
}

#[test]
fn defaults_match_layout() {
    let cli = Cli::default();
    assert_eq!(cli.prefix, PathBuf::from(DEFAULT_PREFIX));
    assert_eq!(cli.build_dir, PathBuf::from(DEFAULT_BUILD_DIR));
    assert_eq!(cli.commands, vec![Commands::Install]);
}

#[rstest]
#[case(vec!["kumiki", "-j", "0"], ErrorKind::ValueValidation)]
#[case(vec!["kumiki", "-j", "65"], ErrorKind::ValueValidation)]
#[case(vec!["kumiki", "-j", "many"], ErrorKind::ValueValidation)]
#[case(vec!["kumiki", "deploy"], ErrorKind::InvalidValue)]
#[case(vec!["kumiki", "--unknown"], ErrorKind::UnknownArgument)]
fn rejects_invalid_arguments(#[case] argv: Vec<&str>, #[case] expected: ErrorKind) -> Result<()> {
    match Cli::try_parse_from(argv) {
        Ok(cli) => anyhow::bail!("expected a parse error, got {cli:?}"),
        Err(err) => {
            ensure!(err.kind() == expected, "unexpected error kind {:?}", err.kind());
            Ok(())
        }
    }
}

#[rstest]
#[case(Commands::Install, Some(project::INSTALL))]
#[case(Commands::Run, Some(project::RUN))]
#[case(Commands::Test, Some(project::TEST))]
#[case(Commands::Docs, Some(project::DOCS))]
#[case(Commands::Graph, None)]
#[case(Commands::List, None)]
fn commands_map_to_entry_points(#[case] command: Commands, #[case] expected: Option<&str>) {
    assert_eq!(command.entry_point(), expected);
}
