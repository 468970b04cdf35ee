//! The transaction controller (C7): the state machine that owns a
//! transaction's lifetime end to end — locking, target collection,
//! resolution, commit, and release (spec §4.7).
//!
//! Design Notes §9 calls for an explicit `Context` value in place of the
//! source's single process-global handle; [`Transaction`] *is* that
//! value. The lock file is what actually enforces "a process may hold at
//! most one transaction" (spec §4.7), so there is nothing left for a
//! global to provide.

use std::collections::HashSet;
use std::fs::OpenOptions;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use alpm_types::PackageName;

use crate::config::{Options, TransactionFlags};
use crate::db::LocalDatabase;
use crate::db::SyncDatabase;
use crate::engine::{apply_operation, ApplyContext};
use crate::error::AlpmError;
use crate::log::{AuditLog, Level};
use crate::package::InstallReason;
use crate::plan::{Operation, Plan, TransactionKind};
use crate::ports::{ArchiveReader, Hasher, ScriptletRunner};
use crate::reporter::{EventKind, Reporter};
use crate::solver;

/// States a [`Transaction`] moves through, in the order spec §4.7 draws
/// them. `Interrupted` is transient: the loop inside [`Transaction::commit`]
/// never returns control to the caller while in that state, it only
/// passes through it on the way to `Committed` once the in-flight target
/// finishes (spec §5, "cannot be preempted mid-archive").
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum TransactionState {
    /// No transaction is open; the lock file is not held.
    Idle,
    /// The lock is held and targets/sync databases may still be added.
    Initialized,
    /// Resolution succeeded; a [`Plan`] is ready to commit.
    Prepared,
    /// [`Transaction::commit`] is actively applying the plan.
    Committing,
    /// An interruption was requested mid-commit; the in-flight target is
    /// finishing before the transaction settles to `Committed`.
    Interrupted,
    /// The plan (or as much of it as ran before an interruption) has
    /// been applied.
    Committed,
}

/// A cloneable handle that can request a transaction's interruption from
/// outside the thread running [`Transaction::commit`] — a signal handler
/// being the usual caller. Cheap to clone; every clone shares the same
/// flag.
#[derive(Debug, Clone)]
pub struct InterruptHandle(Arc<AtomicBool>);

impl InterruptHandle {
    /// Request interruption. Takes effect before the next target, never
    /// mid-archive (spec §5).
    pub fn signal(&self) {
        self.0.store(true, Ordering::Release);
    }
}

/// The transaction controller: owns the lock, the local database, every
/// sync database added to it, and the resolved [`Plan`] once prepared.
///
/// Borrows its ports (`reporter`, `hasher`, `scriptlets`) for its whole
/// lifetime, set once at [`Transaction::init`] per spec §4.7 ("sinks ...
/// are set at init").
pub struct Transaction<'a> {
    options: Options,
    kind: TransactionKind,
    flags: TransactionFlags,
    reporter: &'a dyn Reporter,
    hasher: &'a dyn Hasher,
    scriptlets: Option<&'a dyn ScriptletRunner>,
    local: LocalDatabase,
    sync_dbs: Vec<SyncDatabase>,
    targets: Vec<String>,
    plan: Option<Plan>,
    state: TransactionState,
    interrupt: Arc<AtomicBool>,
    audit: AuditLog,
    lock_held: bool,
}

impl<'a> Transaction<'a> {
    /// `Idle ──init──▶ Initialized`: acquire the exclusive transaction
    /// lock and open (scanning, not loading) the local database.
    ///
    /// Discards whatever cache a previous transaction in this process
    /// might have built: "the cache is canonical, the disk is
    /// derivative, within a transaction ... when re-entering a
    /// transaction, discard the cache and reload" (Design Notes §9).
    /// Because `init` always opens a fresh [`LocalDatabase`], that
    /// invariant holds by construction.
    ///
    /// # Errors
    /// Returns [`AlpmError::HandleLock`] if the lock file already exists,
    /// or whatever [`LocalDatabase::open`] surfaces if the local database
    /// directory cannot be scanned.
    pub fn init(
        options: Options,
        kind: TransactionKind,
        flags: TransactionFlags,
        reporter: &'a dyn Reporter,
        hasher: &'a dyn Hasher,
        scriptlets: Option<&'a dyn ScriptletRunner>,
    ) -> Result<Self, AlpmError> {
        acquire_lock(&options.lock_file)?;

        let local = match LocalDatabase::open(options.local_db_path()) {
            Ok(db) => db,
            Err(e) => {
                release_lock(&options.lock_file);
                return Err(e);
            }
        };

        let audit = AuditLog::new(options.log_file.clone());
        let _ = audit.write(Level::Info, &format!("transaction initialized ({kind:?})"));

        Ok(Self {
            options,
            kind,
            flags,
            reporter,
            hasher,
            scriptlets,
            local,
            sync_dbs: Vec::new(),
            targets: Vec::new(),
            plan: None,
            state: TransactionState::Initialized,
            interrupt: Arc::new(AtomicBool::new(false)),
            audit,
            lock_held: true,
        })
    }

    /// Current state.
    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// The resolved plan, once [`Transaction::prepare`] has succeeded.
    pub fn plan(&self) -> Option<&Plan> {
        self.plan.as_ref()
    }

    /// A cloneable handle another thread can use to request interruption
    /// of this transaction's commit loop.
    pub fn interrupt_handle(&self) -> InterruptHandle {
        InterruptHandle(Arc::clone(&self.interrupt))
    }

    /// Request interruption directly, for single-threaded callers that
    /// don't need a separate [`InterruptHandle`].
    pub fn request_interrupt(&self) {
        self.interrupt.store(true, Ordering::Release);
    }

    /// `Initialized ──add_target*──▶ Initialized`: queue one raw target
    /// string (a bare name, `repo/name`, or filesystem path — the same
    /// shapes [`solver::resolve`] accepts).
    ///
    /// # Errors
    /// Returns [`AlpmError::TransNotInitialized`] outside the
    /// `Initialized` state, or [`AlpmError::TransDupTarget`] if `target`
    /// was already queued.
    pub fn add_target(&mut self, target: impl Into<String>) -> Result<(), AlpmError> {
        if self.state != TransactionState::Initialized {
            return Err(AlpmError::TransNotInitialized);
        }
        let target = target.into();
        if self.targets.iter().any(|t| *t == target) {
            return Err(AlpmError::TransDupTarget(target_as_package_name(&target)));
        }
        self.targets.push(target);
        Ok(())
    }

    /// Add a sync (remote repository) database this transaction may
    /// resolve `Add`/`Sync`/`Upgrade` targets against.
    ///
    /// # Errors
    /// Returns [`AlpmError::TransNotInitialized`] outside the
    /// `Initialized` state.
    pub fn add_sync_db(&mut self, db: SyncDatabase) -> Result<(), AlpmError> {
        if self.state != TransactionState::Initialized {
            return Err(AlpmError::TransNotInitialized);
        }
        self.sync_dbs.push(db);
        Ok(())
    }

    /// `Initialized ──prepare──▶ Prepared`: run every phase spec §4.5
    /// describes for this transaction's kind and flags.
    ///
    /// On failure the transaction stays `Initialized` — spec §7's
    /// propagation policy is that preparation errors return the
    /// transaction to that state rather than aborting it outright, so a
    /// caller may adjust targets/flags and call `prepare` again.
    ///
    /// # Errors
    /// Returns [`AlpmError::TransNotInitialized`] outside the
    /// `Initialized` state, or whatever [`solver::resolve`] surfaces.
    pub fn prepare(&mut self) -> Result<(), AlpmError> {
        if self.state != TransactionState::Initialized {
            return Err(AlpmError::TransNotInitialized);
        }

        let mut plan = solver::resolve(
            self.kind,
            &self.targets,
            &self.local,
            &mut self.sync_dbs,
            &self.options.root_path,
            self.flags,
            &self.options.ignore_pkg,
            &self.options.hold_pkg,
            self.reporter,
        )?;

        if self.kind != TransactionKind::Remove {
            apply_depends_only_and_all_deps(&mut plan, &self.targets, self.flags);
        }

        let _ = self.audit.write(Level::Info, &format!("prepared {} operations", plan.operations.len()));
        self.plan = Some(plan);
        self.state = TransactionState::Prepared;
        Ok(())
    }

    /// `Prepared ──commit──▶ Committing ──▶ Committed`: apply every
    /// operation of the prepared plan, in order, against the local
    /// database and the filesystem.
    ///
    /// `flags.print_uris` short-circuits to just emitting
    /// [`EventKind::PrintUri`] for each incoming package and settling at
    /// `Committed` without touching the filesystem. `flags.download_only`
    /// does the same without emitting anything — staging archives is a
    /// [`crate::ports::Fetcher`] concern a front end drives before
    /// calling `commit` at all (see `DESIGN.md`).
    ///
    /// Interruption is checked once per operation, never mid-archive
    /// (spec §5): if [`Transaction::request_interrupt`] or an
    /// [`InterruptHandle::signal`] was called before a given operation
    /// starts, the loop stops there and the transaction settles at
    /// `Committed` having applied every earlier operation.
    ///
    /// # Errors
    /// Returns [`AlpmError::TransNotPrepared`] outside the `Prepared`
    /// state, or [`AlpmError::TransAbort`] wrapping the first fatal
    /// per-operation error (spec §7: "a database-write failure is fatal
    /// to the transaction"). Operations applied before the failing one
    /// keep their on-disk state — there is no partial-operation
    /// rollback.
    pub fn commit<R: ArchiveReader>(
        &mut self,
        mut open_archive: impl FnMut(&crate::package::Package) -> Result<R, AlpmError>,
    ) -> Result<(), AlpmError> {
        if self.state != TransactionState::Prepared {
            return Err(AlpmError::TransNotPrepared);
        }
        let plan = self.plan.clone().ok_or(AlpmError::TransNotPrepared)?;
        self.state = TransactionState::Committing;

        if self.flags.print_uris {
            for op in plan.operations.iter() {
                if let Some(pkg) = op.incoming() {
                    self.reporter.event(EventKind::PrintUri, pkg.name.as_str(), "");
                }
            }
            self.state = TransactionState::Committed;
            return Ok(());
        }
        if self.flags.download_only {
            self.state = TransactionState::Committed;
            return Ok(());
        }

        let _ = self.audit.write(Level::Info, "commit started");

        let ctx = ApplyContext {
            options: &self.options,
            flags: self.flags,
            hasher: self.hasher,
            scriptlets: self.scriptlets,
            skip_remove: &plan.skip_remove,
            skip_add: &plan.skip_add,
            reporter: self.reporter,
        };

        let total = plan.operations.len();
        let mut applied = 0usize;

        for (index, op) in plan.operations.iter().enumerate() {
            if self.interrupt.load(Ordering::Acquire) {
                self.state = TransactionState::Interrupted;
                let _ = self
                    .audit
                    .write(Level::Warning, &format!("transaction interrupted after {applied}/{total} operations"));
                break;
            }

            if let Err(e) = apply_operation(&ctx, op, &mut self.local, &mut open_archive, index, total) {
                let _ = self.audit.write(Level::Error, &format!("commit failed on {}: {e}", op.name()));
                return Err(AlpmError::TransAbort(e.to_string()));
            }

            let _ = self.audit.write(Level::Info, &describe(op));
            applied += 1;
        }

        let _ = self.audit.write(Level::Info, "commit finished");
        self.state = TransactionState::Committed;
        Ok(())
    }

    /// Release this transaction: unlink the lock file and return to
    /// `Idle`. Always permitted — by the time `release` can be called
    /// from `Committing` or `Interrupted`, [`Transaction::commit`] has
    /// already run its per-operation loop to completion (this engine is
    /// single-threaded and synchronous per spec §5), so there is never an
    /// actual in-progress target left to wait for.
    ///
    /// # Errors
    /// This never fails; it returns `Result` to match the rest of the
    /// state machine's call shape and so a future stricter lock-release
    /// check has somewhere to surface one.
    pub fn release(&mut self) -> Result<(), AlpmError> {
        if self.lock_held {
            release_lock(&self.options.lock_file);
            self.lock_held = false;
        }
        let _ = self.audit.write(Level::Info, "transaction released");
        self.state = TransactionState::Idle;
        self.targets.clear();
        self.plan = None;
        Ok(())
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if self.lock_held {
            release_lock(&self.options.lock_file);
        }
    }
}

fn acquire_lock(path: &std::path::Path) -> Result<(), AlpmError> {
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map(|_| ())
        .map_err(|_| AlpmError::HandleLock(path.to_path_buf()))
}

fn release_lock(path: &std::path::Path) {
    let _ = std::fs::remove_file(path);
}

/// Best-effort mapping from a raw target string to the [`PackageName`]
/// the public error surface requires — strips a `repo/` prefix or a
/// filesystem path's directory components, falling back to a sentinel
/// only for the pathological case where neither side is a valid package
/// name (see `DESIGN.md`).
fn target_as_package_name(raw: &str) -> PackageName {
    let candidate = raw.rsplit('/').next().unwrap_or(raw);
    PackageName::new(candidate).unwrap_or_else(|_| PackageName::new("target").expect("'target' is a valid package name"))
}

/// `all_deps` (force `install_reason` to `PulledAsDependency` for every
/// resolved package) and `depends_only` (drop the explicitly requested
/// targets from the plan, keeping only what was pulled in to satisfy
/// them) both only make sense for install-type transactions and are
/// applied here, once the plan is fully resolved.
fn apply_depends_only_and_all_deps(plan: &mut Plan, targets: &[String], flags: TransactionFlags) {
    if flags.all_deps {
        for op in plan.operations.iter_mut() {
            if let Operation::InstallNew(p) | Operation::UpgradeOver { new: p, .. } | Operation::ReplaceWith { new: p, .. } = op {
                p.install_reason = InstallReason::PulledAsDependency;
            }
        }
    }

    if flags.depends_only {
        let requested: HashSet<String> = targets.iter().map(|raw| target_as_package_name(raw).as_str().to_string()).collect();
        plan.operations.remove_if(|op| requested.contains(op.name()));
    }
}

fn describe(op: &Operation) -> String {
    match op {
        Operation::InstallNew(p) => format!("installed {}-{}", p.name, p.version),
        Operation::UpgradeOver { new, old } => format!("upgraded {} ({} -> {})", new.name, old.version, new.version),
        Operation::ReplaceWith { new, replaced } => {
            let names: Vec<String> = replaced.iter().map(|p| p.name.to_string()).collect();
            format!("installed {}-{} (replaces {})", new.name, new.version, names.join(", "))
        }
        Operation::RemoveOnly(old) => format!("removed {}-{}", old.name, old.version),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::ReadableDatabase;
    use crate::package::{Origin, Package, Sections};
    use crate::ports::ArchiveEntry;
    use crate::reporter::NullReporter;
    use alpm_types::Version;
    use std::io::{self, Cursor};
    use std::path::{Path, PathBuf};

    struct FixedArchive {
        entries: Vec<(ArchiveEntry, Vec<u8>)>,
        current: Option<Cursor<Vec<u8>>>,
    }

    impl FixedArchive {
        fn new(entries: Vec<(ArchiveEntry, Vec<u8>)>) -> Self {
            Self { entries, current: None }
        }
    }

    impl ArchiveReader for FixedArchive {
        type EntryData<'a> = &'a mut Cursor<Vec<u8>>;

        fn next_entry(&mut self) -> io::Result<Option<ArchiveEntry>> {
            if self.entries.is_empty() {
                self.current = None;
                return Ok(None);
            }
            let (meta, data) = self.entries.remove(0);
            self.current = Some(Cursor::new(data));
            Ok(Some(meta))
        }

        fn read_data(&mut self) -> io::Result<Self::EntryData<'_>> {
            self.current.as_mut().ok_or_else(|| io::Error::other("no current entry"))
        }
    }

    struct NullHasher;
    impl Hasher for NullHasher {
        fn hash_file(&self, path: &Path) -> io::Result<alpm_types::ContentHash> {
            let data = std::fs::read(path)?;
            Ok(self.hash_bytes(&data))
        }
        fn hash_bytes(&self, data: &[u8]) -> alpm_types::ContentHash {
            alpm_types::ContentHash::new(format!("{:064x}", data.len())).unwrap()
        }
    }

    fn seed_sync_db(root: &Path, name: &str, version: &str) {
        let mut seed = LocalDatabase::open(root).unwrap();
        let mut pkg = Package::skeleton(PackageName::new(name).unwrap(), Version::new(version), Origin::SyncDatabase);
        pkg.files = vec![PathBuf::from(format!("usr/bin/{name}"))];
        seed.write(pkg, Sections::ALL).unwrap();
    }

    #[test]
    fn full_lifecycle_installs_a_package_and_releases_the_lock() {
        let root = tempfile::tempdir().unwrap();
        let options = Options::rooted_at(root.path());
        std::fs::create_dir_all(options.local_db_path()).unwrap();

        let sync_dir = tempfile::tempdir().unwrap();
        seed_sync_db(sync_dir.path(), "sample", "1.0-1");
        let mut sync = SyncDatabase::open("core", sync_dir.path()).unwrap();
        sync.load_all(Sections::ALL).unwrap();

        let hasher = NullHasher;
        let mut txn = Transaction::init(options.clone(), TransactionKind::Sync, TransactionFlags::default(), &NullReporter, &hasher, None).unwrap();
        assert_eq!(txn.state(), TransactionState::Initialized);
        assert!(options.lock_file.exists());

        txn.add_sync_db(sync).unwrap();
        txn.add_target("sample").unwrap();
        txn.prepare().unwrap();
        assert_eq!(txn.state(), TransactionState::Prepared);
        assert_eq!(txn.plan().unwrap().packages().len(), 1);

        txn.commit(|_new| Ok(FixedArchive::new(vec![(
            ArchiveEntry {
                path: PathBuf::from("usr/bin/sample"),
                mode: 0o755,
                size: 5,
                is_dir: false,
                symlink_target: None,
            },
            b"hello".to_vec(),
        )])))
        .unwrap();
        assert_eq!(txn.state(), TransactionState::Committed);
        assert!(root.path().join("usr/bin/sample").exists());

        txn.release().unwrap();
        assert_eq!(txn.state(), TransactionState::Idle);
        assert!(!options.lock_file.exists());

        let log = std::fs::read_to_string(&options.log_file).unwrap();
        assert!(log.contains("installed sample-1.0-1"));
    }

    #[test]
    fn init_twice_with_the_same_lock_file_fails() {
        let root = tempfile::tempdir().unwrap();
        let options = Options::rooted_at(root.path());
        std::fs::create_dir_all(options.local_db_path()).unwrap();

        let hasher = NullHasher;
        let _first = Transaction::init(options.clone(), TransactionKind::Add, TransactionFlags::default(), &NullReporter, &hasher, None).unwrap();

        let err = Transaction::init(options, TransactionKind::Add, TransactionFlags::default(), &NullReporter, &hasher, None).unwrap_err();
        assert!(matches!(err, AlpmError::HandleLock(_)));
    }

    #[test]
    fn failed_prepare_returns_to_initialized() {
        let root = tempfile::tempdir().unwrap();
        let options = Options::rooted_at(root.path());
        std::fs::create_dir_all(options.local_db_path()).unwrap();

        let hasher = NullHasher;
        let mut txn = Transaction::init(options, TransactionKind::Remove, TransactionFlags::default(), &NullReporter, &hasher, None).unwrap();
        txn.add_target("not-installed").unwrap();

        let err = txn.prepare().unwrap_err();
        assert!(matches!(err, AlpmError::PkgNotFound(_)));
        assert_eq!(txn.state(), TransactionState::Initialized);
    }

    #[test]
    fn duplicate_target_is_rejected() {
        let root = tempfile::tempdir().unwrap();
        let options = Options::rooted_at(root.path());
        std::fs::create_dir_all(options.local_db_path()).unwrap();

        let hasher = NullHasher;
        let mut txn = Transaction::init(options, TransactionKind::Add, TransactionFlags::default(), &NullReporter, &hasher, None).unwrap();
        txn.add_target("sample").unwrap();
        let err = txn.add_target("sample").unwrap_err();
        assert!(matches!(err, AlpmError::TransDupTarget(_)));
    }

    #[test]
    fn interrupt_before_second_operation_stops_the_plan_there() {
        let root = tempfile::tempdir().unwrap();
        let options = Options::rooted_at(root.path());
        std::fs::create_dir_all(options.local_db_path()).unwrap();

        let sync_dir = tempfile::tempdir().unwrap();
        seed_sync_db(sync_dir.path(), "x", "1.0-1");
        seed_sync_db(sync_dir.path(), "y", "1.0-1");
        let mut sync = SyncDatabase::open("core", sync_dir.path()).unwrap();
        sync.load_all(Sections::ALL).unwrap();

        let hasher = NullHasher;
        let mut txn = Transaction::init(options.clone(), TransactionKind::Sync, TransactionFlags::default(), &NullReporter, &hasher, None).unwrap();
        txn.add_sync_db(sync).unwrap();
        txn.add_target("x").unwrap();
        txn.add_target("y").unwrap();
        txn.prepare().unwrap();

        let handle = txn.interrupt_handle();
        txn.commit(|_new| {
            // Signals during the first operation's archive open, so the
            // interrupt flag is already set by the time the loop checks
            // it before the second operation.
            handle.signal();
            Ok::<_, AlpmError>(FixedArchive::new(vec![]))
        })
        .unwrap();

        assert_eq!(txn.state(), TransactionState::Committed);
        let installed: Vec<&str> = txn.local.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(installed.len(), 1);
    }
}
