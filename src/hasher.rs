//! Object fingerprinting utilities.
//!
//! This module provides the [`ObjectHasher`] type used to compute a stable
//! SHA-256 digest for a compile input and its flags. The digest prefixes
//! object file names so that two sources sharing a stem (for example
//! `a/util.cc` and `b/util.cc`) never write the same object file.
//!
//! # Examples
//!
//! ```
//! use camino::Utf8Path;
//! use kumiki::hasher::ObjectHasher;
//!
//! let flags = ["-O3".to_owned(), "-fPIC".to_owned()];
//! let first = ObjectHasher::fingerprint(Utf8Path::new("a/util.cc"), &flags);
//! let second = ObjectHasher::fingerprint(Utf8Path::new("b/util.cc"), &flags);
//! assert_ne!(first, second);
//! assert_eq!(first.len(), ObjectHasher::FINGERPRINT_LEN);
//! ```

use camino::Utf8Path;
use sha2::{Digest, Sha256};

/// Computes stable digests for compile inputs.
pub struct ObjectHasher;

impl ObjectHasher {
    /// Number of hexadecimal characters kept from the digest.
    pub const FINGERPRINT_LEN: usize = 16;

    /// Calculate the full hexadecimal digest of `source` compiled with `flags`.
    #[must_use]
    pub fn hash<S: AsRef<str>>(source: &Utf8Path, flags: &[S]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(b"src");
        Self::update_with_len(&mut hasher, source.as_str().as_bytes());
        hasher.update(b"flags");
        for flag in flags {
            Self::update_with_len(&mut hasher, flag.as_ref().as_bytes());
        }
        format!("{:x}", hasher.finalize())
    }

    /// Shortened digest used in object file names.
    #[must_use]
    pub fn fingerprint<S: AsRef<str>>(source: &Utf8Path, flags: &[S]) -> String {
        let mut digest = Self::hash(source, flags);
        digest.truncate(Self::FINGERPRINT_LEN);
        digest
    }

    fn update_with_len(hasher: &mut Sha256, bytes: &[u8]) {
        let len = bytes.len();
        hasher.update(format!("{len}:").as_bytes());
        hasher.update(bytes);
    }
}
