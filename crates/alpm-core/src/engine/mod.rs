//! The file-apply engine (C6): drives an already-resolved [`Plan`] against
//! the filesystem and the local database (spec §4.6).
//!
//! Split into [`extract`] (archive extraction and the backup-file
//! three-way merge) and [`remove`] (file deletion and the `.pacsave`
//! rule) the way the solver splits into one file per phase. Scriptlet
//! invocation assumes the front end has already staged a package's
//! `.INSTALL` script at its local-database entry before calling
//! [`apply`] — this engine extracts a package's payload but does not
//! special-case a `.INSTALL` archive member, since [`crate::ports::ArchiveReader`]
//! treats every entry identically (see `DESIGN.md`).

mod extract;
mod remove;

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::config::{Options, TransactionFlags};
use crate::db::LocalDatabase;
use crate::error::AlpmError;
use crate::package::{Package, Sections};
use crate::plan::{Operation, Plan};
use crate::ports::{ArchiveReader, Hasher, ScriptletHook, ScriptletRunner};
use crate::reporter::{EventKind, ProgressKind, Reporter};

/// Apply every operation of `plan`, in order, against `local`.
///
/// `open_archive` supplies a reader over the package archive for a given
/// incoming [`Package`] — this engine has no opinion on where the bytes
/// come from (on-disk cache, already-downloaded URI, ...); that contract
/// lives with [`crate::ports::Fetcher`] one layer up.
///
/// # Errors
/// Returns the first [`AlpmError`] any per-operation step produces. A
/// package already applied before the failing one keeps its on-disk
/// state and local-database entry — there is no partial-operation
/// rollback (spec §4.6, §7).
pub fn apply<R: ArchiveReader>(
    plan: &Plan,
    local: &mut LocalDatabase,
    options: &Options,
    flags: TransactionFlags,
    hasher: &dyn Hasher,
    scriptlets: Option<&dyn ScriptletRunner>,
    reporter: &dyn Reporter,
    mut open_archive: impl FnMut(&Package) -> Result<R, AlpmError>,
) -> Result<(), AlpmError> {
    let ctx = ApplyContext {
        options,
        flags,
        hasher,
        scriptlets,
        skip_remove: &plan.skip_remove,
        skip_add: &plan.skip_add,
        reporter,
    };

    let total = plan.operations.len();
    for (index, op) in plan.operations.iter().enumerate() {
        apply_one(&ctx, op, local, &mut open_archive, index, total)?;
    }
    Ok(())
}

/// `apply`'s per-operation step, exposed so the transaction controller
/// (C7) can drive one operation at a time and check its interrupt flag
/// between them (spec §4.7/§5 suspension points).
pub(crate) struct ApplyContext<'a> {
    pub options: &'a Options,
    pub flags: TransactionFlags,
    pub hasher: &'a dyn Hasher,
    pub scriptlets: Option<&'a dyn ScriptletRunner>,
    pub skip_remove: &'a HashSet<PathBuf>,
    pub skip_add: &'a HashSet<PathBuf>,
    pub reporter: &'a dyn Reporter,
}

/// Apply a single plan operation. See [`apply_one`] for the per-kind logic;
/// this is just its `pub(crate)` door for [`crate::transaction`].
pub(crate) fn apply_operation<R: ArchiveReader>(
    ctx: &ApplyContext<'_>,
    op: &Operation,
    local: &mut LocalDatabase,
    open_archive: &mut impl FnMut(&Package) -> Result<R, AlpmError>,
    index: usize,
    total: usize,
) -> Result<(), AlpmError> {
    apply_one(ctx, op, local, open_archive, index, total)
}

fn apply_one<R: ArchiveReader>(
    ctx: &ApplyContext<'_>,
    op: &Operation,
    local: &mut LocalDatabase,
    open_archive: &mut impl FnMut(&Package) -> Result<R, AlpmError>,
    index: usize,
    total: usize,
) -> Result<(), AlpmError> {
    match op {
        Operation::InstallNew(new) => {
            let mut reader = open_archive(new)?;
            install(ctx, new, None, local, &mut reader, index, total, EventKind::AddStart, EventKind::AddDone, ProgressKind::AddStart)
        }
        Operation::UpgradeOver { new, old } => {
            // Spec §4.6 step 2 / §5(a): the nested remove of the local
            // copy runs before extraction, retaining `old.backup` for
            // the three-way merge (step 5) and relying on the solver's
            // `skip_remove` set to preserve any path `new` also ships.
            remove_one(ctx, old, local)?;
            let mut reader = open_archive(new)?;
            install(
                ctx,
                new,
                Some(old),
                local,
                &mut reader,
                index,
                total,
                EventKind::UpgradeStart,
                EventKind::UpgradeDone,
                ProgressKind::UpgradeStart,
            )
        }
        Operation::ReplaceWith { new, replaced } => {
            let predecessor = replaced.iter().find(|p| p.name.as_str() == new.name.as_str());
            for old in replaced {
                remove_one(ctx, old, local)?;
            }
            let mut reader = open_archive(new)?;
            install(
                ctx,
                new,
                predecessor,
                local,
                &mut reader,
                index,
                total,
                EventKind::UpgradeStart,
                EventKind::UpgradeDone,
                ProgressKind::UpgradeStart,
            )
        }
        Operation::RemoveOnly(old) => {
            ctx.reporter.progress(ProgressKind::RemoveStart, old.name.as_str(), 0, total, index + 1);
            ctx.reporter.event(EventKind::RemoveStart, old.name.as_str(), "");
            run_hook(ctx, old, None, ScriptletHook::PreRemove);
            if !ctx.flags.db_only {
                remove::remove_files(old, &ctx.options.root_path, ctx.hasher, ctx.flags.no_save, ctx.skip_remove, ctx.reporter)?;
            }
            run_hook(ctx, old, None, ScriptletHook::PostRemove);
            local.remove(old.name.as_str())?;
            ctx.reporter.event(EventKind::RemoveDone, old.name.as_str(), "");
            Ok(())
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn install<R: ArchiveReader>(
    ctx: &ApplyContext<'_>,
    new: &Package,
    old: Option<&Package>,
    local: &mut LocalDatabase,
    reader: &mut R,
    index: usize,
    total: usize,
    start: EventKind,
    done: EventKind,
    progress: ProgressKind,
) -> Result<(), AlpmError> {
    ctx.reporter.progress(progress, new.name.as_str(), 0, total, index + 1);
    ctx.reporter.event(start, new.name.as_str(), "");

    let pre_hook = if old.is_some() { ScriptletHook::PreUpgrade } else { ScriptletHook::PreInstall };
    let post_hook = if old.is_some() { ScriptletHook::PostUpgrade } else { ScriptletHook::PostInstall };

    run_hook(ctx, new, old, pre_hook);

    if !ctx.flags.db_only {
        extract::extract(
            reader,
            &ctx.options.root_path,
            new,
            old,
            ctx.hasher,
            &ctx.options.no_upgrade,
            &ctx.options.no_extract,
            ctx.skip_add,
            ctx.reporter,
        )?;
    }

    run_hook(ctx, new, old, post_hook);

    local.write(new.clone(), Sections::ALL)?;
    ctx.reporter.event(done, new.name.as_str(), "");
    Ok(())
}

fn remove_one(ctx: &ApplyContext<'_>, old: &Package, local: &mut LocalDatabase) -> Result<(), AlpmError> {
    if !ctx.flags.db_only {
        remove::remove_files(old, &ctx.options.root_path, ctx.hasher, ctx.flags.no_save, ctx.skip_remove, ctx.reporter)?;
    }
    local.remove(old.name.as_str())
}

/// Run a `.INSTALL` hook for `pkg`, downgrading any failure — a nonzero
/// exit or an outright invocation failure alike — to [`Reporter::scriptlet_warning`]
/// rather than aborting the transaction (spec §1, §7).
fn run_hook(ctx: &ApplyContext<'_>, pkg: &Package, predecessor: Option<&Package>, hook: ScriptletHook) {
    if ctx.flags.no_scriptlet || !pkg.scriptlet_present {
        return;
    }
    let Some(runner) = ctx.scriptlets else {
        return;
    };
    let script_path = ctx.options.local_db_path().join(pkg.dir_name()).join("install");
    let versions = (predecessor.map(|p| p.version.as_str()), Some(pkg.version.as_str()));

    match runner.run_scriptlet(&ctx.options.root_path, &script_path, hook, versions) {
        Ok(true) => {}
        Ok(false) => ctx.reporter.scriptlet_warning(&pkg.name, "scriptlet exited with a nonzero status"),
        Err(e) => ctx.reporter.scriptlet_warning(&pkg.name, &e.to_string()),
    }
}

fn append_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().map(std::ffi::OsStr::to_os_string).unwrap_or_default();
    name.push(".");
    name.push(suffix);
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::ReadableDatabase;
    use crate::package::Origin;
    use crate::ports::ArchiveEntry;
    use crate::reporter::NullReporter;
    use alpm_types::{PackageName, Version};
    use std::io::{self, Cursor};

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

    fn file_entry(path: &str, data: &[u8]) -> (ArchiveEntry, Vec<u8>) {
        (
            ArchiveEntry {
                path: PathBuf::from(path),
                mode: 0o644,
                size: data.len() as u64,
                is_dir: false,
                symlink_target: None,
            },
            data.to_vec(),
        )
    }

    #[test]
    fn install_new_package_extracts_and_writes_db_entry() {
        let root = tempfile::tempdir().unwrap();
        let db_dir = tempfile::tempdir().unwrap();
        let mut local = LocalDatabase::open(db_dir.path()).unwrap();

        let mut pkg = Package::skeleton(PackageName::new("sample").unwrap(), Version::new("1.0-1"), Origin::OnDiskFile);
        pkg.files = vec![PathBuf::from("usr/bin/sample")];

        let mut plan = Plan::new();
        plan.operations.add(Operation::InstallNew(pkg));

        let options = Options::rooted_at(root.path());
        let hasher = NullHasher;

        apply(
            &plan,
            &mut local,
            &options,
            TransactionFlags::default(),
            &hasher,
            None,
            &NullReporter,
            |_new| Ok(FixedArchive::new(vec![file_entry("usr/bin/sample", b"hello")])),
        )
        .unwrap();

        assert!(root.path().join("usr/bin/sample").exists());
        assert!(local.lookup("sample").is_some());
    }

    #[test]
    fn in_place_upgrade_sharing_a_file_path_survives_commit() {
        // Regression test: UpgradeOver used to extract the new package
        // before removing the old one, so the nested remove ran against
        // whatever the *current* cache lookup by name returned — which
        // by then was the just-written new entry, not the predecessor
        // (spec §4.6 step 2 / §5(a)).
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(root.path().join("usr/bin")).unwrap();
        std::fs::write(root.path().join("usr/bin/sample"), b"old").unwrap();

        let db_dir = tempfile::tempdir().unwrap();
        let mut local = LocalDatabase::open(db_dir.path()).unwrap();
        let mut old = Package::skeleton(PackageName::new("sample").unwrap(), Version::new("1.0-1"), Origin::LocalDatabase);
        old.files = vec![PathBuf::from("usr/bin/sample")];
        local.write(old.clone(), Sections::ALL).unwrap();
        let old = local.lookup("sample").unwrap().clone();

        let mut new = Package::skeleton(PackageName::new("sample").unwrap(), Version::new("2.0-1"), Origin::SyncDatabase);
        new.files = vec![PathBuf::from("usr/bin/sample")];

        let mut plan = Plan::new();
        // Mirrors what `conflict::check_file_conflicts` populates: the
        // shared path is skip-listed so the nested remove leaves it for
        // extraction to overwrite.
        plan.skip_remove.insert(PathBuf::from("usr/bin/sample"));
        plan.operations.add(Operation::UpgradeOver { new, old });

        let options = Options::rooted_at(root.path());
        let hasher = NullHasher;

        apply(
            &plan,
            &mut local,
            &options,
            TransactionFlags::default(),
            &hasher,
            None,
            &NullReporter,
            |_new| Ok(FixedArchive::new(vec![file_entry("usr/bin/sample", b"new")])),
        )
        .unwrap();

        let installed = local.lookup("sample").expect("upgraded package must still be in the local database");
        assert_eq!(installed.version.as_str(), "2.0-1");
        assert_eq!(std::fs::read(root.path().join("usr/bin/sample")).unwrap(), b"new");
        assert!(!db_dir.path().join("sample-1.0-1").exists());
        assert!(db_dir.path().join("sample-2.0-1").exists());
    }

    #[test]
    fn remove_only_deletes_files_and_db_entry() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(root.path().join("usr/bin")).unwrap();
        std::fs::write(root.path().join("usr/bin/sample"), b"hello").unwrap();

        let db_dir = tempfile::tempdir().unwrap();
        let mut local = LocalDatabase::open(db_dir.path()).unwrap();
        let mut pkg = Package::skeleton(PackageName::new("sample").unwrap(), Version::new("1.0-1"), Origin::LocalDatabase);
        pkg.files = vec![PathBuf::from("usr/bin/sample")];
        local.write(pkg, Sections::ALL).unwrap();

        let mut plan = Plan::new();
        plan.operations.add(Operation::RemoveOnly(local.lookup("sample").unwrap().clone()));

        let options = Options::rooted_at(root.path());
        let hasher = NullHasher;

        apply(
            &plan,
            &mut local,
            &options,
            TransactionFlags::default(),
            &hasher,
            None,
            &NullReporter,
            |_new| -> Result<FixedArchive, AlpmError> { unreachable!("remove-only operations never open an archive") },
        )
        .unwrap();

        assert!(!root.path().join("usr/bin/sample").exists());
        assert!(local.lookup("sample").is_none());
    }
}
