//! Event, question, and progress dispatch (spec §4.7, §6).
//!
//! Grounded on `apl-core::reporter::Reporter`: a single trait the engine
//! calls into, with a blanket `Arc` impl so a shared reporter can be
//! cloned freely, and a `NullReporter` for tests and silent use.

use std::sync::Arc;

use alpm_types::PackageName;

/// An engine event kind (spec §4.7 "Kinds").
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum EventKind {
    /// Dependency checking has started.
    CheckDepsStart,
    /// Dependency checking has finished.
    CheckDepsDone,
    /// File-conflict checking has started.
    FileConflictsStart,
    /// File-conflict checking has finished.
    FileConflictsDone,
    /// Recursive dependency resolution has started.
    ResolveDepsStart,
    /// Recursive dependency resolution has finished.
    ResolveDepsDone,
    /// Inter-package conflict checking has started.
    InterConflictsStart,
    /// Inter-package conflict checking has finished.
    InterConflictsDone,
    /// A package install has started.
    AddStart,
    /// A package install has finished.
    AddDone,
    /// A package removal has started.
    RemoveStart,
    /// A package removal has finished.
    RemoveDone,
    /// A package upgrade has started.
    UpgradeStart,
    /// A package upgrade has finished.
    UpgradeDone,
    /// An archive finished extracting.
    ExtractDone,
    /// Integrity checking has started.
    IntegrityStart,
    /// Integrity checking has finished.
    IntegrityDone,
    /// A scriptlet printed an informational line.
    ScriptletInfo,
    /// A resolved download URI is being printed (`print_uris` flag).
    PrintUri,
    /// A fetch has started.
    RetrieveStart,
}

/// A question the engine cannot resolve without front-end input
/// (spec §4.7 "Kinds").
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum QuestionKind {
    /// Proceed with an ignored package anyway?
    InstallIgnorePkg,
    /// Confirm replacing a local package (Phase B).
    ReplacePkg,
    /// Confirm resolving a conflict by replacement (Phase D).
    ConflictPkg,
    /// A package archive failed integrity checks; proceed anyway?
    CorruptedPkg,
    /// The local copy is newer than the candidate; proceed anyway?
    LocalNewer,
    /// The local copy is already up to date; proceed anyway?
    LocalUpToDate,
    /// Confirm removing a held package.
    RemoveHoldPkg,
}

/// A progress update kind (spec §4.7 "Kinds").
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ProgressKind {
    /// Progress through an Add target.
    AddStart,
    /// Progress through an Upgrade target.
    UpgradeStart,
    /// Progress through a Remove target.
    RemoveStart,
    /// Progress through conflict checking.
    ConflictsStart,
}

/// Sink for the engine's Event/Question/Progress dispatch contracts.
///
/// All methods take `&self`: sinks are infallible and cannot cancel the
/// operation in progress, per spec §4.7 ("the sinks are infallible").
/// `question` is the one exception — it answers through a return value
/// rather than a callback argument, since Rust has no analogue to an
/// out-parameter slot that's as ergonomic to implement against.
pub trait Reporter: Send + Sync {
    /// An event fired with up to two associated names/paths.
    fn event(&self, kind: EventKind, arg1: &str, arg2: &str) {
        let _ = (kind, arg1, arg2);
    }

    /// A yes/no question the caller must answer synchronously. The
    /// default answers `false` (decline), matching a front-end that
    /// never prompts and so must always take the conservative path.
    fn question(&self, kind: QuestionKind, arg1: &str, arg2: &str, arg3: &str) -> bool {
        let _ = (kind, arg1, arg2, arg3);
        false
    }

    /// A progress update within the current target.
    fn progress(
        &self,
        kind: ProgressKind,
        label: &str,
        percent: u8,
        total_targets: usize,
        current_target: usize,
    ) {
        let _ = (kind, label, percent, total_targets, current_target);
    }

    /// A scriptlet for `pkg` failed but is being treated as a non-fatal
    /// warning per spec §7's commit-time propagation policy.
    fn scriptlet_warning(&self, pkg: &PackageName, message: &str) {
        let _ = (pkg, message);
    }
}

impl<T: Reporter + ?Sized> Reporter for Arc<T> {
    fn event(&self, kind: EventKind, arg1: &str, arg2: &str) {
        (**self).event(kind, arg1, arg2);
    }

    fn question(&self, kind: QuestionKind, arg1: &str, arg2: &str, arg3: &str) -> bool {
        (**self).question(kind, arg1, arg2, arg3)
    }

    fn progress(
        &self,
        kind: ProgressKind,
        label: &str,
        percent: u8,
        total_targets: usize,
        current_target: usize,
    ) {
        (**self).progress(kind, label, percent, total_targets, current_target);
    }

    fn scriptlet_warning(&self, pkg: &PackageName, message: &str) {
        (**self).scriptlet_warning(pkg, message);
    }
}

/// A reporter that discards every event, question, and progress update.
/// Questions answer `false` (decline), the conservative default.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullReporter;

impl Reporter for NullReporter {}
