//! A from-scratch reimplementation of libalpm's transaction engine:
//! version algebra, ordered list primitives, the local/sync package
//! databases, the dependency/conflict solver, the file-apply engine, and
//! the transaction state machine that drives them (spec §1-§7).
//!
//! This crate does no I/O beyond the local filesystem paths it is
//! explicitly configured with, and speaks no network protocol, archive
//! format, or cryptographic primitive itself — those are consumed through
//! the [`ports`] traits a front-end supplies.

pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod list;
pub mod log;
pub mod package;
pub mod plan;
pub mod ports;
pub mod reporter;
pub mod solver;
pub mod transaction;

pub use config::{Options, TransactionFlags};
pub use error::{AlpmError, ConflictPair, FileConflict, Result};
pub use package::{InstallReason, Origin, Package};
pub use plan::{Operation, Plan, TransactionKind};
pub use reporter::{EventKind, NullReporter, ProgressKind, QuestionKind, Reporter};
pub use transaction::{Transaction, TransactionState};
