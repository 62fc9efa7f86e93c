//! Test utilities for process-level tests.
//!
//! This crate provides a fake toolchain whose programs log their argument
//! vectors and create the outputs the real tools would, plus a small
//! project tree in the shape the build description expects.

pub mod project;

use anyhow::{Context, Result, anyhow};
use camino::{Utf8Path, Utf8PathBuf};
use kumiki::toolchain::Toolchain;
use kumiki_env::{AR_ENV, CC_ENV, CXX_ENV, DOC_ENV};
use std::fs;
use tempfile::TempDir;

/// File each fake tool appends its invocation to.
pub const TOOL_LOG: &str = "tools.log";
/// File each linked fake program appends its invocation to.
pub const RUN_LOG: &str = "run.log";

/// One logged invocation: the role or program, then its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Tool role (`cc`, `c++`, `ar`, `doc`) or program path.
    pub program: String,
    /// Arguments in the order received.
    pub args: Vec<String>,
}

/// Fake compiler, archiver and documentation generator in a temporary
/// directory.
///
/// Linking produces a shell program that records its own argument vector in
/// [`RUN_LOG`].
#[derive(Debug)]
pub struct FakeToolchain {
    dir: TempDir,
    root: Utf8PathBuf,
}

const LOG_ARGS: &str = r#"{ printf '%s' "$ROLE"; for a in "$@"; do printf '\t%s' "$a"; done; printf '\n'; } >> "$LOG""#;

const COMPILER_BODY: &str = r#"out=""
prev=""
compile=0
for a in "$@"; do
  [ "$prev" = "-o" ] && out="$a"
  [ "$a" = "-c" ] && compile=1
  prev="$a"
done
if [ "$compile" = 1 ]; then
  : > "$out"
else
  cp "$PROGRAM" "$out"
  chmod +x "$out"
fi
"#;

impl FakeToolchain {
    /// Create working fakes for every role.
    ///
    /// # Errors
    ///
    /// Returns an error if the scripts cannot be written.
    pub fn new() -> Result<Self> {
        Self::with_failing(&[])
    }

    /// Create fakes where every role named in `failing` logs its arguments
    /// and exits with status 1.
    ///
    /// Roles are `cc`, `c++`, `ar` and `doc`, plus `program` for the
    /// executables the fake linker produces.
    ///
    /// # Errors
    ///
    /// Returns an error if the scripts cannot be written.
    pub fn with_failing(failing: &[&str]) -> Result<Self> {
        let dir = TempDir::new().context("create fake toolchain dir")?;
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf())
            .map_err(|path| anyhow!("non-UTF-8 temp dir {}", path.display()))?;
        let toolchain = Self { dir, root };

        let run_log = toolchain.root.join(RUN_LOG);
        let program_exit = if failing.contains(&"program") {
            "exit 1\n"
        } else {
            ""
        };
        toolchain.write_script(
            "program.sh",
            &format!(
                "{}\n{program_exit}",
                LOG_ARGS
                    .replace("$ROLE", "$0")
                    .replace("$LOG", run_log.as_str())
            ),
        )?;
        for (role, body) in [
            ("cc", COMPILER_BODY),
            ("c++", COMPILER_BODY),
            ("ar", ": > \"$2\"\n"),
            ("doc", "mkdir -p \"$1\"\necho docs > \"$1/index.html\"\n"),
        ] {
            let script = if failing.contains(&role) {
                "exit 1\n"
            } else {
                body
            };
            toolchain.write_tool(role, script)?;
        }
        Ok(toolchain)
    }

    fn write_tool(&self, role: &str, body: &str) -> Result<()> {
        let log = self.root.join(TOOL_LOG);
        let program = self.root.join("program.sh");
        let script = format!(
            "ROLE='{role}'\nLOG='{log}'\nPROGRAM='{program}'\n{LOG_ARGS}\n{body}"
        );
        self.write_script(role, &script)
    }

    fn write_script(&self, name: &str, body: &str) -> Result<()> {
        let path = self.root.join(name);
        fs::write(&path, format!("#!/bin/sh\n{body}"))
            .with_context(|| format!("write fake tool {path}"))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = fs::metadata(&path)
                .with_context(|| format!("stat {path}"))?
                .permissions();
            perms.set_mode(0o755);
            fs::set_permissions(&path, perms).with_context(|| format!("chmod {path}"))?;
        }
        Ok(())
    }

    /// Directory holding the scripts and logs.
    #[must_use]
    pub fn dir(&self) -> &Utf8Path {
        &self.root
    }

    /// Path of the fake for `role`.
    #[must_use]
    pub fn tool(&self, role: &str) -> Utf8PathBuf {
        self.root.join(role)
    }

    /// A [`Toolchain`] that uses the fakes.
    #[must_use]
    pub fn toolchain(&self) -> Toolchain {
        Toolchain {
            cc: self.tool("cc"),
            cxx: self.tool("c++"),
            ar: self.tool("ar"),
            doc: self.tool("doc"),
        }
    }

    /// Environment overrides pointing the binary at the fakes.
    #[must_use]
    pub fn envs(&self) -> Vec<(&'static str, Utf8PathBuf)> {
        vec![
            (CC_ENV, self.tool("cc")),
            (CXX_ENV, self.tool("c++")),
            (AR_ENV, self.tool("ar")),
            (DOC_ENV, self.tool("doc")),
        ]
    }

    /// Tool invocations in the order they happened.
    ///
    /// # Errors
    ///
    /// Returns an error if the log exists but cannot be read.
    pub fn tool_invocations(&self) -> Result<Vec<Invocation>> {
        read_log(&self.root.join(TOOL_LOG))
    }

    /// Invocations of linked programs in the order they happened.
    ///
    /// # Errors
    ///
    /// Returns an error if the log exists but cannot be read.
    pub fn program_runs(&self) -> Result<Vec<Invocation>> {
        read_log(&self.root.join(RUN_LOG))
    }

    /// Keep the temporary directory alive for the caller's scope.
    #[must_use]
    pub const fn temp_dir(&self) -> &TempDir {
        &self.dir
    }
}

fn read_log(path: &Utf8Path) -> Result<Vec<Invocation>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let text = fs::read_to_string(path).with_context(|| format!("read {path}"))?;
    Ok(text
        .lines()
        .filter(|line| !line.is_empty())
        .map(|line| {
            let mut fields = line.split('\t').map(str::to_owned);
            Invocation {
                program: fields.next().unwrap_or_default(),
                args: fields.collect(),
            }
        })
        .collect())
}
