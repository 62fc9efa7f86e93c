#![forbid(unsafe_code)]

//! Environment variable names shared across kumiki crates (library, tests,
//! and helpers).
//!
//! Each variable overrides one external toolchain program. `test_support`
//! uses the same names to point the binary at fake tools.
//!
//! # Examples
//!
//! ```
//! use kumiki_env::CC_ENV;
//! assert_eq!(CC_ENV, "KUMIKI_CC");
//! ```

/// Override for the C compiler used on `.c` sources.
pub const CC_ENV: &str = "KUMIKI_CC";

/// Override for the C++ compiler, also used as the linker driver.
pub const CXX_ENV: &str = "KUMIKI_CXX";

/// Override for the static archiver.
pub const AR_ENV: &str = "KUMIKI_AR";

/// Override for the documentation generator.
pub const DOC_ENV: &str = "KUMIKI_DOC";
