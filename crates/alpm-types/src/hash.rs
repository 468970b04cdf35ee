//! Content-hash newtype.
//!
//! `alpm-types` carries no I/O, so this crate only validates and wraps a
//! hex digest string; actual hashing is performed behind `alpm-core`'s
//! `Hasher` capability port and compared using [`ContentHash::eq`].

use std::fmt;

use thiserror::Error;

/// A validated, lowercase hex-encoded SHA-256 digest (64 hex characters).
///
/// Mirrors the validated/unvalidated split of `apl-schema`'s
/// `Sha256Hash`/`Sha256Digest`, collapsed to a single always-validated type
/// since the engine only ever compares already-computed digests.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct ContentHash(String);

/// Error returned when a string is not a valid 64-character hex digest.
#[derive(Debug, Error, Eq, PartialEq)]
#[error("{0:?} is not a 64-character lowercase hex sha256 digest")]
pub struct ContentHashError(String);

impl ContentHash {
    /// Validate and wrap a hex digest string, lowercasing it first.
    ///
    /// Accepts an optional `sha256:` prefix, matching the convention used
    /// in package archive metadata.
    ///
    /// # Errors
    /// Returns [`ContentHashError`] if, after stripping the prefix, the
    /// string isn't exactly 64 lowercase-hex characters.
    pub fn new(s: impl AsRef<str>) -> Result<Self, ContentHashError> {
        let raw = s.as_ref();
        let stripped = raw.strip_prefix("sha256:").unwrap_or(raw);
        let lower = stripped.to_ascii_lowercase();
        if lower.len() == 64 && lower.bytes().all(|b| b.is_ascii_hexdigit()) {
            Ok(Self(lower))
        } else {
            Err(ContentHashError(raw.to_string()))
        }
    }

    /// The hex digest, lowercase, without a scheme prefix.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for ContentHash {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<&str> for ContentHash {
    type Error = ContentHashError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<String> for ContentHash {
    type Error = ContentHashError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DIGEST: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b85";

    #[test]
    fn accepts_bare_digest() {
        assert!(ContentHash::new(DIGEST).is_ok());
    }

    #[test]
    fn strips_scheme_prefix_and_lowercases() {
        let prefixed = format!("sha256:{}", DIGEST.to_ascii_uppercase());
        let hash = ContentHash::new(&prefixed).unwrap();
        assert_eq!(hash.as_str(), DIGEST);
    }

    #[test]
    fn rejects_wrong_length() {
        assert!(ContentHash::new("deadbeef").is_err());
    }

    #[test]
    fn rejects_non_hex() {
        let bad = "z".repeat(64);
        assert!(ContentHash::new(bad).is_err());
    }
}
