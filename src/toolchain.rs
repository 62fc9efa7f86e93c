//! External toolchain resolution and flag translation.
//!
//! The compiler, archiver and documentation generator are black boxes.
//! This module only decides which program plays each role and which flags
//! encode the [`TargetConfig`].

use crate::config::{OptimizationMode, TargetConfig};
use camino::{Utf8Path, Utf8PathBuf};
use kumiki_env::{AR_ENV, CC_ENV, CXX_ENV, DOC_ENV};
use std::env;
use std::ffi::OsString;
use std::path::PathBuf;

/// Default C compiler.
pub const CC_PROGRAM: &str = "cc";
/// Default C++ compiler and linker driver.
pub const CXX_PROGRAM: &str = "c++";
/// Default archiver.
pub const AR_PROGRAM: &str = "ar";
/// Default documentation generator.
pub const DOC_PROGRAM: &str = "doxygen";

/// Programs used for each external build role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toolchain {
    /// Compiler for C sources.
    pub cc: Utf8PathBuf,
    /// Compiler for C++ sources, also used to drive the linker.
    pub cxx: Utf8PathBuf,
    /// Static archiver.
    pub ar: Utf8PathBuf,
    /// Documentation generator.
    pub doc: Utf8PathBuf,
}

impl Default for Toolchain {
    fn default() -> Self {
        Self::from_env_with(|_| None)
    }
}

impl Toolchain {
    /// Resolve every program, honouring the `KUMIKI_*` overrides.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_env_with(|key| env::var_os(key))
    }

    /// Resolve every program using `read_env` to look up overrides.
    ///
    /// Overrides that are not valid UTF-8 are ignored.
    #[must_use]
    pub fn from_env_with<F>(mut read_env: F) -> Self
    where
        F: FnMut(&str) -> Option<OsString>,
    {
        let mut resolve = |key: &str, fallback: &str| {
            read_env(key)
                .filter(|value| !value.is_empty())
                .and_then(|value| Utf8PathBuf::from_path_buf(PathBuf::from(value)).ok())
                .unwrap_or_else(|| Utf8PathBuf::from(fallback))
        };
        Self {
            cc: resolve(CC_ENV, CC_PROGRAM),
            cxx: resolve(CXX_ENV, CXX_PROGRAM),
            ar: resolve(AR_ENV, AR_PROGRAM),
            doc: resolve(DOC_ENV, DOC_PROGRAM),
        }
    }

    /// Pick the compiler for `source` by extension: `.c` uses the C
    /// compiler, everything else the C++ compiler.
    #[must_use]
    pub fn compiler_for(&self, source: &Utf8Path) -> &Utf8Path {
        if source.extension() == Some("c") {
            &self.cc
        } else {
            &self.cxx
        }
    }
}

/// Flags selecting the optimisation mode.
#[must_use]
pub const fn optimization_flags(mode: OptimizationMode) -> &'static [&'static str] {
    match mode {
        OptimizationMode::Debug => &["-O0", "-g"],
        OptimizationMode::ReleaseSafe => &["-O2", "-g"],
        OptimizationMode::ReleaseFast => &["-O3", "-DNDEBUG"],
        OptimizationMode::ReleaseSmall => &["-Os", "-DNDEBUG"],
    }
}

/// Flag selecting a cross target, if any.
#[must_use]
pub fn target_flag(config: &TargetConfig) -> Option<String> {
    config
        .triple
        .as_cross()
        .map(|triple| format!("--target={triple}"))
}

/// Leading flags shared by every compile command for `config`.
#[must_use]
pub fn config_flags(config: &TargetConfig) -> Vec<String> {
    target_flag(config)
        .into_iter()
        .chain(
            optimization_flags(config.optimize)
                .iter()
                .map(|flag| (*flag).to_owned()),
        )
        .collect()
}
