//! Dependency expressions and the `satisfies` relation.
//!
//! A dependency is `(name, op, version?)`: a bare name with no version
//! constraint (`op` is [`DepOp::Any`]), or a name paired with a comparison
//! operator and a version it must hold against. `provides` entries reuse
//! the same shape (optionally versioned) since pacman lets a provided name
//! satisfy a versioned dependency when the provide itself carries a
//! version.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::name::{PackageName, PackageNameError};
use crate::version::{self, Version};

/// The comparison operator carried by a dependency expression.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DepOp {
    /// No version constraint.
    Any,
    /// `=`
    Eq,
    /// `>=`
    Ge,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `<`
    Lt,
}

impl DepOp {
    /// The two-or-one character operator token, as written in a dependency
    /// string (`""` for [`DepOp::Any`]).
    pub fn as_str(self) -> &'static str {
        match self {
            DepOp::Any => "",
            DepOp::Eq => "=",
            DepOp::Ge => ">=",
            DepOp::Le => "<=",
            DepOp::Gt => ">",
            DepOp::Lt => "<",
        }
    }

    /// Whether `ordering` between a candidate version and this dependency's
    /// required version satisfies the operator.
    fn accepts(self, ordering: std::cmp::Ordering) -> bool {
        use std::cmp::Ordering::{Equal, Greater, Less};
        match self {
            DepOp::Any => true,
            DepOp::Eq => ordering == Equal,
            DepOp::Ge => ordering == Greater || ordering == Equal,
            DepOp::Le => ordering == Less || ordering == Equal,
            DepOp::Gt => ordering == Greater,
            DepOp::Lt => ordering == Less,
        }
    }
}

/// A dependency expression: `name`, optionally constrained by `op version`.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Dependency {
    /// The required (or provided, or conflicting) name.
    pub name: PackageName,
    /// The comparison operator; [`DepOp::Any`] if `version` is `None`.
    pub op: DepOp,
    /// The version to compare against, when `op` is not [`DepOp::Any`].
    pub version: Option<Version>,
}

/// Error parsing a dependency expression string.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum DependencyParseError {
    /// The name portion failed [`PackageName`] validation.
    #[error("invalid dependency name: {0}")]
    Name(#[from] PackageNameError),
    /// An operator was present but no version followed it.
    #[error("dependency {0:?} has an operator but no version")]
    MissingVersion(String),
}

impl Dependency {
    /// A bare, unconstrained dependency on `name`.
    pub fn unconstrained(name: PackageName) -> Self {
        Self {
            name,
            op: DepOp::Any,
            version: None,
        }
    }

    /// A dependency constrained to `op version`.
    pub fn constrained(name: PackageName, op: DepOp, version: Version) -> Self {
        Self {
            name,
            op,
            version: Some(version),
        }
    }

    /// Whether a candidate `(name, version)` pair — together with anything
    /// it `provides` — satisfies this dependency expression.
    ///
    /// A candidate satisfies the dependency if either its own name and
    /// version match, or one of its `provides` entries does. A bare
    /// (unversioned) provide only satisfies an unversioned dependency.
    pub fn is_satisfied_by(
        &self,
        candidate_name: &str,
        candidate_version: &Version,
        provides: &[Provide],
    ) -> bool {
        if self.name.as_str() == candidate_name && self.matches_version(candidate_version) {
            return true;
        }
        provides.iter().any(|p| self.matches_provide(p))
    }

    fn matches_version(&self, candidate_version: &Version) -> bool {
        match (&self.version, self.op) {
            (None, _) | (_, DepOp::Any) => true,
            (Some(required), op) => op.accepts(version::compare(
                candidate_version.as_str(),
                required.as_str(),
            )),
        }
    }

    fn matches_provide(&self, provide: &Provide) -> bool {
        if self.name.as_str() != provide.name.as_str() {
            return false;
        }
        match (&self.version, &provide.version) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(required), Some(provided)) => {
                self.op.accepts(version::compare(provided.as_str(), required.as_str()))
            }
        }
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            Some(v) => write!(f, "{}{}{}", self.name, self.op.as_str(), v),
            None => write!(f, "{}", self.name),
        }
    }
}

impl FromStr for Dependency {
    type Err = DependencyParseError;

    /// Parse `name`, `name=version`, `name>=version`, `name<=version`,
    /// `name>version`, or `name<version`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        for (token, op) in [
            (">=", DepOp::Ge),
            ("<=", DepOp::Le),
            ("=", DepOp::Eq),
            (">", DepOp::Gt),
            ("<", DepOp::Lt),
        ] {
            if let Some(idx) = s.find(token) {
                let name = &s[..idx];
                let rest = &s[idx + token.len()..];
                if rest.is_empty() {
                    return Err(DependencyParseError::MissingVersion(s.to_string()));
                }
                let name = PackageName::new(name)?;
                return Ok(Self::constrained(name, op, Version::new(rest)));
            }
        }
        let name = PackageName::new(s)?;
        Ok(Self::unconstrained(name))
    }
}

/// A `provides` (or equally-shaped `replaces`/`conflicts`) entry: a name,
/// optionally paired with the version it is provided as.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Provide {
    /// The provided name.
    pub name: PackageName,
    /// The version provided at, if any.
    pub version: Option<Version>,
}

impl Provide {
    /// A bare provide with no version.
    pub fn bare(name: PackageName) -> Self {
        Self {
            name,
            version: None,
        }
    }

    /// A provide pinned to an exact version.
    pub fn versioned(name: PackageName, version: Version) -> Self {
        Self {
            name,
            version: Some(version),
        }
    }
}

impl fmt::Display for Provide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            Some(v) => write!(f, "{}={}", self.name, v),
            None => write!(f, "{}", self.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> PackageName {
        PackageName::new(s).unwrap()
    }

    #[test]
    fn bare_name_is_unconstrained() {
        let dep: Dependency = "openssl".parse().unwrap();
        assert_eq!(dep.op, DepOp::Any);
        assert!(dep.is_satisfied_by("openssl", &Version::new("1.0.0"), &[]));
    }

    #[test]
    fn versioned_dependency_parses_and_matches() {
        let dep: Dependency = "openssl>=1.1.0".parse().unwrap();
        assert_eq!(dep.op, DepOp::Ge);
        assert!(dep.is_satisfied_by("openssl", &Version::new("1.1.1"), &[]));
        assert!(!dep.is_satisfied_by("openssl", &Version::new("1.0.9"), &[]));
    }

    #[test]
    fn satisfied_via_versioned_provide() {
        let dep: Dependency = "libssl>=1.1.0".parse().unwrap();
        let provides = vec![Provide::versioned(name("libssl"), Version::new("1.1.1"))];
        assert!(dep.is_satisfied_by("openssl", &Version::new("3.0.0"), &provides));
    }

    #[test]
    fn bare_provide_does_not_satisfy_versioned_dependency() {
        let dep: Dependency = "libssl>=1.1.0".parse().unwrap();
        let provides = vec![Provide::bare(name("libssl"))];
        assert!(!dep.is_satisfied_by("openssl", &Version::new("3.0.0"), &provides));
    }

    #[test]
    fn bare_provide_satisfies_unversioned_dependency() {
        let dep: Dependency = "libssl".parse().unwrap();
        let provides = vec![Provide::bare(name("libssl"))];
        assert!(dep.is_satisfied_by("openssl", &Version::new("3.0.0"), &provides));
    }

    #[test]
    fn missing_version_after_operator_is_an_error() {
        assert!(matches!(
            "foo>=".parse::<Dependency>(),
            Err(DependencyParseError::MissingVersion(_))
        ));
    }

    #[test]
    fn display_round_trips_through_parse() {
        let dep: Dependency = "openssl>=1.1.0".parse().unwrap();
        assert_eq!(dep.to_string(), "openssl>=1.1.0");
    }
}
