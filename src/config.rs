//! Target configuration shared by every artifact in a build.
//!
//! The target triple and optimisation mode are validated before any graph
//! construction begins, so an invalid value never reaches the step graph.
//!
//! # Examples
//!
//! ```
//! use kumiki::config::{OptimizationMode, TargetConfig, TargetTriple};
//!
//! let config = TargetConfig::parse(Some("aarch64-linux-gnu"), Some("ReleaseFast"))
//!     .expect("valid configuration");
//! assert_eq!(config.optimize, OptimizationMode::ReleaseFast);
//! assert!(matches!(config.triple, TargetTriple::Cross(_)));
//! ```

use miette::Diagnostic;
use serde::Serialize;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;
use thiserror::Error;

/// Errors raised while validating the target configuration.
#[derive(Debug, Error, Diagnostic, PartialEq, Eq)]
pub enum ConfigError {
    /// The target triple is not `native` and not a well-formed triple.
    #[error("invalid target triple `{triple}`: {reason}")]
    #[diagnostic(
        code(kumiki::config::target_triple),
        help("use `native` or an `arch-os[-abi]` triple such as `x86_64-linux-gnu`")
    )]
    InvalidTargetTriple {
        /// The rejected value.
        triple: String,
        /// What made the value unusable.
        reason: &'static str,
    },

    /// The optimisation mode is not one of the four supported modes.
    #[error("invalid optimization mode `{mode}`")]
    #[diagnostic(
        code(kumiki::config::optimize),
        help("expected one of Debug, ReleaseSafe, ReleaseFast, ReleaseSmall")
    )]
    InvalidOptimizationMode {
        /// The rejected value.
        mode: String,
    },
}

/// Platform the build compiles for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetTriple {
    /// Compile for the machine running the build.
    #[default]
    Host,
    /// Cross-compile for the named triple.
    Cross(String),
}

impl TargetTriple {
    /// Return the triple passed to the compiler, or `None` for the host.
    #[must_use]
    pub fn as_cross(&self) -> Option<&str> {
        match self {
            Self::Host => None,
            Self::Cross(triple) => Some(triple),
        }
    }
}

impl FromStr for TargetTriple {
    type Err = ConfigError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let value = raw.trim();
        if value.is_empty() || value == "native" || value == "host" {
            return Ok(Self::Host);
        }
        let invalid = |reason| ConfigError::InvalidTargetTriple {
            triple: raw.to_owned(),
            reason,
        };
        let parts: Vec<&str> = value.split('-').collect();
        if !(2..=4).contains(&parts.len()) {
            return Err(invalid("expected between two and four dash-separated components"));
        }
        if parts.iter().any(|part| part.is_empty()) {
            return Err(invalid("components must not be empty"));
        }
        let valid_char = |c: char| c.is_ascii_alphanumeric() || c == '_' || c == '.';
        if !parts.iter().all(|part| part.chars().all(valid_char)) {
            return Err(invalid("components may only contain ASCII letters, digits, `_` and `.`"));
        }
        Ok(Self::Cross(value.to_owned()))
    }
}

impl Display for TargetTriple {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Host => f.write_str("native"),
            Self::Cross(triple) => f.write_str(triple),
        }
    }
}

/// Optimisation mode applied to every compiled artifact.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub enum OptimizationMode {
    /// No optimisation, full debug information.
    #[default]
    Debug,
    /// Optimised with safety checks and debug information retained.
    ReleaseSafe,
    /// Optimised for speed.
    ReleaseFast,
    /// Optimised for size.
    ReleaseSmall,
}

impl OptimizationMode {
    /// All modes in declaration order.
    pub const ALL: [Self; 4] = [
        Self::Debug,
        Self::ReleaseSafe,
        Self::ReleaseFast,
        Self::ReleaseSmall,
    ];

    /// Canonical spelling of the mode.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "Debug",
            Self::ReleaseSafe => "ReleaseSafe",
            Self::ReleaseFast => "ReleaseFast",
            Self::ReleaseSmall => "ReleaseSmall",
        }
    }
}

impl FromStr for OptimizationMode {
    type Err = ConfigError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let value = raw.trim();
        Self::ALL
            .into_iter()
            .find(|mode| mode.as_str().eq_ignore_ascii_case(value))
            .ok_or_else(|| ConfigError::InvalidOptimizationMode {
                mode: raw.to_owned(),
            })
    }
}

impl Display for OptimizationMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Target triple and optimisation mode for one build invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TargetConfig {
    /// Platform to compile for.
    pub triple: TargetTriple,
    /// Optimisation mode for compiled sources.
    pub optimize: OptimizationMode,
}

impl TargetConfig {
    /// Validate raw option values, falling back to the host and `Debug`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when either value is malformed.
    pub fn parse(triple: Option<&str>, optimize: Option<&str>) -> Result<Self, ConfigError> {
        Ok(Self {
            triple: triple.map_or(Ok(TargetTriple::Host), str::parse)?,
            optimize: optimize.map_or(Ok(OptimizationMode::Debug), str::parse)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("native", TargetTriple::Host)]
    #[case("", TargetTriple::Host)]
    #[case("x86_64-linux-gnu", TargetTriple::Cross("x86_64-linux-gnu".into()))]
    #[case("aarch64-macos", TargetTriple::Cross("aarch64-macos".into()))]
    #[case("wasm32-unknown-unknown", TargetTriple::Cross("wasm32-unknown-unknown".into()))]
    fn parses_valid_triples(#[case] raw: &str, #[case] expected: TargetTriple) {
        assert_eq!(raw.parse::<TargetTriple>(), Ok(expected));
    }

    #[rstest]
    #[case("x86_64")]
    #[case("x86_64--gnu")]
    #[case("a-b-c-d-e")]
    #[case("x86 64-linux")]
    fn rejects_malformed_triples(#[case] raw: &str) {
        let err = raw.parse::<TargetTriple>().expect_err("malformed triple");
        assert!(matches!(err, ConfigError::InvalidTargetTriple { .. }));
    }

    #[rstest]
    #[case("Debug", OptimizationMode::Debug)]
    #[case("releasesafe", OptimizationMode::ReleaseSafe)]
    #[case("ReleaseFast", OptimizationMode::ReleaseFast)]
    #[case("RELEASESMALL", OptimizationMode::ReleaseSmall)]
    fn parses_optimization_modes(#[case] raw: &str, #[case] expected: OptimizationMode) {
        assert_eq!(raw.parse::<OptimizationMode>(), Ok(expected));
    }

    #[test]
    fn rejects_unknown_optimization_mode() {
        let err = TargetConfig::parse(None, Some("Fastest")).expect_err("unknown mode");
        assert_eq!(
            err,
            ConfigError::InvalidOptimizationMode {
                mode: "Fastest".into()
            }
        );
    }

    #[test]
    fn defaults_to_host_debug() {
        let config = TargetConfig::parse(None, None).expect("defaults");
        assert_eq!(config, TargetConfig::default());
    }
}
