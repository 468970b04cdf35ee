//! The public error type for the transaction engine.
//!
//! Every kind named in spec §7 appears as a variant (not as an opaque
//! string), the way `apl-core::package::PackageError` enumerates its
//! failure modes with `thiserror`. Helpers that are not part of the public
//! API surface (e.g. internal parsing in [`crate::db`]) may return
//! `anyhow::Result` instead, the way `apl-core::resolver` does.

use std::path::PathBuf;

use alpm_types::{Dependency, PackageName};
use thiserror::Error;

/// A conflict between two already-resolved packages, or between a package
/// and a name it cannot coexist with.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ConflictPair {
    /// The first package name in the conflicting pair.
    pub first: PackageName,
    /// The second package name in the conflicting pair.
    pub second: PackageName,
    /// The `conflicts` expression that matched.
    pub reason: Dependency,
}

/// A file path claimed by more than one package, or by an incoming package
/// and the live filesystem.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct FileConflict {
    /// The contested path.
    pub path: PathBuf,
    /// Name of the package attempting to claim the path.
    pub claimant: PackageName,
    /// Name of the package (or `None` for "the live filesystem") already
    /// owning the path.
    pub owner: Option<PackageName>,
}

/// All errors the transaction engine can surface to a caller.
///
/// Variant names follow spec §7 (`PkgNotFound`, `HandleLock`, ...) rather
/// than idiomatic Rust naming, since they are a stable, documented
/// contract a front-end matches against.
#[derive(Debug, Error)]
pub enum AlpmError {
    /// A filesystem or OS-level error not covered by a more specific variant.
    #[error("system error: {0}")]
    System(#[source] std::io::Error),

    /// The process lacks permission to perform a required filesystem
    /// operation.
    #[error("permission denied: {0}")]
    BadPermissions(PathBuf),

    /// A path expected to name a regular file does not.
    #[error("not a file: {0}")]
    NotAFile(PathBuf),

    /// A caller supplied invalid combination of arguments.
    #[error("invalid arguments: {0}")]
    WrongArgs(String),

    /// A database directory could not be opened.
    #[error("failed to open database at {path}: {reason}")]
    DbOpen {
        /// The database root directory.
        path: PathBuf,
        /// Human-readable cause.
        reason: String,
    },

    /// A database directory does not exist and could not be created.
    #[error("failed to create database at {0}")]
    DbCreate(PathBuf),

    /// The requested database (by treename) is not open.
    #[error("database {0:?} not found")]
    DbNotFound(String),

    /// Writing a package's section files to the local database failed.
    #[error("failed to write package {name} to database: {reason}")]
    DbWrite {
        /// Package whose write failed.
        name: PackageName,
        /// Human-readable cause.
        reason: String,
    },

    /// Removing a package's on-disk database entry failed.
    #[error("failed to remove package {name} from database: {reason}")]
    DbRemove {
        /// Package whose removal failed.
        name: PackageName,
        /// Human-readable cause.
        reason: String,
    },

    /// A transaction is already in progress; `init` cannot start another.
    #[error("a transaction is already in progress")]
    TransNotNull,

    /// An operation required an active transaction but none exists.
    #[error("no transaction is in progress")]
    TransNull,

    /// The same target name was added to a transaction twice.
    #[error("target {0} was already added to this transaction")]
    TransDupTarget(PackageName),

    /// `prepare`/`commit` called before `init`/`add_target`.
    #[error("transaction has not been initialized")]
    TransNotInitialized,

    /// `commit` called before `prepare`.
    #[error("transaction has not been prepared")]
    TransNotPrepared,

    /// The transaction was aborted by the caller or by an unresolved error.
    #[error("transaction aborted: {0}")]
    TransAbort(String),

    /// An operation is not valid for this transaction's kind.
    #[error("operation not valid for this transaction kind")]
    TransType,

    /// An operation was attempted while the transaction is mid-commit.
    #[error("transaction is committing")]
    TransCommitting,

    /// The lock file could not be created because one already exists.
    #[error("failed to acquire transaction lock at {0}")]
    HandleLock(PathBuf),

    /// A named package is not present in the database being searched.
    #[error("package not found: {0}")]
    PkgNotFound(String),

    /// A package record failed validation (bad name, missing version, ...).
    #[error("invalid package: {0}")]
    PkgInvalid(String),

    /// A package's on-disk database entry or archive could not be opened.
    #[error("failed to open package {0}")]
    PkgOpen(String),

    /// The target is already installed and the transaction kind forbids
    /// reinstalling it.
    #[error("package {0} is already installed")]
    PkgInstalled(PackageName),

    /// `freshen` was requested but no installed copy exists to freshen.
    #[error("package {0} is not installed, cannot freshen")]
    PkgCantFresh(PackageName),

    /// A file owned by the target could not be removed.
    #[error("cannot remove package {name}: {reason}")]
    PkgCantRemove {
        /// The package that could not be fully removed.
        name: PackageName,
        /// Human-readable cause.
        reason: String,
    },

    /// A package name failed [`alpm_types::PackageName`] validation.
    #[error("invalid package name: {0}")]
    PkgInvalidName(String),

    /// A package's metadata or archive failed integrity checks.
    #[error("package {0} is corrupted")]
    PkgCorrupted(String),

    /// The target is on the `hold_pkg` list and the user declined removal.
    #[error("package {0} is held and was not removed")]
    PkgHold(PackageName),

    /// Dependency resolution could not satisfy every `depends` expression.
    #[error("unsatisfied dependencies: {0:?}")]
    UnsatisfiedDeps(Vec<Dependency>),

    /// Two resolved packages (or a resolved package and an installed one)
    /// conflict with each other.
    #[error("conflicting dependencies: {0:?}")]
    ConflictingDeps(Vec<ConflictPair>),

    /// Two packages, or a package and the filesystem, claim the same path.
    #[error("file conflicts: {0:?}")]
    FileConflicts(Vec<FileConflict>),

    /// The user declined a question the engine could not proceed without.
    #[error("aborted by user")]
    UserAbort,

    /// A write failed because the target filesystem is full.
    #[error("disk full writing {0}")]
    DiskFull(PathBuf),
}

/// Convenience alias for the engine's public `Result`.
pub type Result<T> = std::result::Result<T, AlpmError>;
