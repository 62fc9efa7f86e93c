//! Step definitions: the nodes of a [`super::StepGraph`].

use camino::Utf8PathBuf;
use itertools::Itertools;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt::{self, Display, Formatter};
use std::iter;

/// Identifier of a step, unique within one graph.
///
/// Steps derived from artifacts use `<kind>:<artifact>` identifiers, for
/// example `compile:sleigh` or `link:decompiler`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct StepId(String);

impl StepId {
    /// Wrap an arbitrary identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    fn derived(prefix: &str, artifact: &str) -> Self {
        Self(format!("{prefix}:{artifact}"))
    }

    /// Compile step of `artifact`.
    #[must_use]
    pub fn compile(artifact: &str) -> Self {
        Self::derived("compile", artifact)
    }

    /// Archive step of a static library.
    #[must_use]
    pub fn archive(artifact: &str) -> Self {
        Self::derived("archive", artifact)
    }

    /// Link step of an executable.
    #[must_use]
    pub fn link(artifact: &str) -> Self {
        Self::derived("link", artifact)
    }

    /// Install step of `artifact`.
    #[must_use]
    pub fn install(artifact: &str) -> Self {
        Self::derived("install", artifact)
    }

    /// Run step of an installed executable.
    #[must_use]
    pub fn run(artifact: &str) -> Self {
        Self::derived("run", artifact)
    }

    /// Test step of a test executable.
    #[must_use]
    pub fn test(artifact: &str) -> Self {
        Self::derived("test", artifact)
    }

    /// Documentation step for the sources of `artifact`.
    #[must_use]
    pub fn docs(artifact: &str) -> Self {
        Self::derived("docs", artifact)
    }

    /// Borrow the identifier text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for StepId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StepId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for StepId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// What a step does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    /// Compile every source of an artifact into object files.
    Compile,
    /// Archive object files into a static library.
    Archive,
    /// Link object files and libraries into an executable.
    Link,
    /// Copy an artifact into the install prefix.
    Install,
    /// Execute an installed program.
    Run,
    /// Execute a test program.
    Test,
    /// Generate documentation.
    GenerateDocs,
    /// Execute an arbitrary command.
    SystemCommand,
}

impl StepKind {
    /// Whether the step changes state outside its own outputs.
    ///
    /// Side-effecting steps are never deduplicated or run speculatively.
    #[must_use]
    pub const fn has_side_effect(self) -> bool {
        matches!(self, Self::Install | Self::Run | Self::SystemCommand)
    }

    /// Whether the step may materialise an artifact.
    #[must_use]
    pub const fn may_produce_artifact(self) -> bool {
        matches!(
            self,
            Self::Compile | Self::Archive | Self::Link | Self::GenerateDocs
        )
    }

    /// Human-readable name of the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Compile => "Compile",
            Self::Archive => "Archive",
            Self::Link => "Link",
            Self::Install => "Install",
            Self::Run => "Run",
            Self::Test => "Test",
            Self::GenerateDocs => "GenerateDocs",
            Self::SystemCommand => "SystemCommand",
        }
    }
}

impl Display for StepKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A program invocation with its argument vector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandSpec {
    /// Program to execute.
    pub program: Utf8PathBuf,
    /// Arguments, passed verbatim and in order.
    pub args: Vec<String>,
}

impl CommandSpec {
    /// Start a command for `program` with no arguments.
    #[must_use]
    pub fn new(program: impl Into<Utf8PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Append one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments in order.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Render the command as a shell-quoted line for logs.
    #[must_use]
    pub fn render(&self) -> String {
        let words = || iter::once(self.program.as_str()).chain(self.args.iter().map(String::as_str));
        shlex::try_join(words()).unwrap_or_else(|_| words().join(" "))
    }
}

/// Concrete work performed by a step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepAction {
    /// Run each command in order, stopping at the first failure.
    Exec {
        /// Commands to run.
        commands: Vec<CommandSpec>,
    },
    /// Copy a file or directory.
    Copy {
        /// Source file or directory.
        from: Utf8PathBuf,
        /// Destination path.
        to: Utf8PathBuf,
    },
    /// Do nothing; the step only orders its dependencies.
    Nothing,
}

impl StepAction {
    /// Action running a single command.
    #[must_use]
    pub fn exec(command: CommandSpec) -> Self {
        Self::Exec {
            commands: vec![command],
        }
    }
}

/// A unit of build work with explicit predecessors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Step {
    /// Unique identifier.
    pub id: StepId,
    /// What the step does.
    pub kind: StepKind,
    /// Steps that must succeed before this one starts.
    pub depends_on: BTreeSet<StepId>,
    /// Whether the step has effects beyond its outputs.
    pub has_side_effect: bool,
    /// Artifact this step materialises, if any.
    pub produces_artifact: Option<String>,
    /// Paths written by this step; each path belongs to exactly one step.
    pub outputs: Vec<Utf8PathBuf>,
    /// The work to perform.
    pub action: StepAction,
}

impl Step {
    /// Create a step with no dependencies or outputs.
    #[must_use]
    pub fn new(id: impl Into<StepId>, kind: StepKind, action: StepAction) -> Self {
        Self {
            id: id.into(),
            kind,
            depends_on: BTreeSet::new(),
            has_side_effect: kind.has_side_effect(),
            produces_artifact: None,
            outputs: Vec::new(),
            action,
        }
    }

    /// Require `dependency` to succeed first.
    #[must_use]
    pub fn after(mut self, dependency: StepId) -> Self {
        self.depends_on.insert(dependency);
        self
    }

    /// Require every step in `dependencies` to succeed first.
    #[must_use]
    pub fn after_all<I: IntoIterator<Item = StepId>>(mut self, dependencies: I) -> Self {
        self.depends_on.extend(dependencies);
        self
    }

    /// Record the artifact materialised by this step.
    #[must_use]
    pub fn producing(mut self, artifact: impl Into<String>) -> Self {
        self.produces_artifact = Some(artifact.into());
        self
    }

    /// Record a path written by this step.
    #[must_use]
    pub fn writing(mut self, output: impl Into<Utf8PathBuf>) -> Self {
        self.outputs.push(output.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(StepKind::Install, true)]
    #[case(StepKind::Run, true)]
    #[case(StepKind::SystemCommand, true)]
    #[case(StepKind::Compile, false)]
    #[case(StepKind::Test, false)]
    fn side_effects_follow_kind(#[case] kind: StepKind, #[case] expected: bool) {
        let step = Step::new("s", kind, StepAction::Nothing);
        assert_eq!(step.has_side_effect, expected);
    }

    #[test]
    fn render_quotes_arguments_with_spaces() {
        let command = CommandSpec::new("c++").args(["-DNAME=a b", "-c", "x.cc"]);
        let words = shlex::split(&command.render()).expect("rendered line splits");
        assert_eq!(words, vec!["c++", "-DNAME=a b", "-c", "x.cc"]);
    }

    #[test]
    fn derived_ids_are_prefixed() {
        assert_eq!(StepId::archive("sleigh").as_str(), "archive:sleigh");
        assert_eq!(StepId::link("decompiler").to_string(), "link:decompiler");
    }
}
