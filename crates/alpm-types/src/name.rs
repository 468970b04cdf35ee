//! Package name newtype.

use std::borrow::Borrow;
use std::fmt;
use std::ops::Deref;

use thiserror::Error;

/// A validated package name: non-empty, and free of path separators and
/// whitespace so it can be used unmodified as a local-database directory
/// component (`name-version/`).
#[derive(Debug, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct PackageName(String);

/// Error returned when a string cannot be used as a [`PackageName`].
#[derive(Debug, Error, Eq, PartialEq)]
pub enum PackageNameError {
    /// The name was empty.
    #[error("package name cannot be empty")]
    Empty,
    /// The name contained a `/` or whitespace character.
    #[error("package name {0:?} contains an invalid character")]
    InvalidCharacter(String),
}

impl PackageName {
    /// Validate and wrap a package name.
    ///
    /// # Errors
    /// Returns [`PackageNameError`] if `name` is empty or contains `/` or
    /// whitespace.
    pub fn new(name: impl Into<String>) -> Result<Self, PackageNameError> {
        let name = name.into();
        if name.is_empty() {
            return Err(PackageNameError::Empty);
        }
        if name.chars().any(|c| c == '/' || c.is_whitespace()) {
            return Err(PackageNameError::InvalidCharacter(name));
        }
        Ok(Self(name))
    }

    /// Borrow the underlying string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PackageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Deref for PackageName {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for PackageName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for PackageName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for PackageName {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for PackageName {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

impl TryFrom<&str> for PackageName {
    type Error = PackageNameError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<String> for PackageName {
    type Error = PackageNameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty() {
        assert_eq!(PackageName::new(""), Err(PackageNameError::Empty));
    }

    #[test]
    fn rejects_slash_and_whitespace() {
        assert!(PackageName::new("foo/bar").is_err());
        assert!(PackageName::new("foo bar").is_err());
    }

    #[test]
    fn accepts_ordinary_names() {
        assert!(PackageName::new("openssl").is_ok());
        assert!(PackageName::new("lib32-glibc").is_ok());
    }

    #[test]
    fn compares_against_str() {
        let name = PackageName::new("openssl").unwrap();
        assert_eq!(name, "openssl");
    }
}
