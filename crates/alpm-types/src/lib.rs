//! Shared, I/O-free types for the alpm transaction engine: version algebra,
//! package names, dependency expressions, and content-hash newtypes.
//!
//! Everything here is plain data with no filesystem or network access —
//! `alpm-core` builds the engine on top of these types.

pub mod dependency;
pub mod hash;
pub mod name;
pub mod version;

pub use dependency::{DepOp, Dependency, DependencyParseError, Provide};
pub use hash::{ContentHash, ContentHashError};
pub use name::{PackageName, PackageNameError};
pub use version::Version;
