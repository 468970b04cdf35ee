//! Phase D — inter-package conflict detection, and the file-conflict
//! check that follows it (spec §4.5).

use std::path::Path;

use alpm_types::Dependency;

use crate::config::TransactionFlags;
use crate::db::{LocalDatabase, ReadableDatabase};
use crate::error::{AlpmError, ConflictPair, FileConflict};
use crate::package::Package;
use crate::plan::Plan;
use crate::reporter::{QuestionKind, Reporter};

/// Detect conflicts between incoming packages and the local packages that
/// would remain installed, and between incoming packages themselves.
///
/// A candidate never conflicts with its own predecessor: whatever it is
/// upgrading or replacing is already absorbed out of the "stable" set
/// before this runs, so the common `conflicts=('foo<2.0')` self-versioned
/// pattern never needs a question (Design Notes §9).
///
/// # Errors
/// Returns [`AlpmError::ConflictingDeps`] listing every conflict the user
/// declined to resolve by replacement, plus every incoming-vs-incoming
/// conflict (which has no replacement to offer).
pub(super) fn resolve_conflicts(
    plan: &mut Plan,
    local: &LocalDatabase,
    reporter: &dyn Reporter,
) -> Result<(), AlpmError> {
    let mut claimed = plan.absorbed_names();
    let mut unresolved: Vec<ConflictPair> = Vec::new();
    let incoming: Vec<Package> = plan.packages().into_iter().cloned().collect();

    for cand in &incoming {
        let stable: Vec<Package> = local
            .iter()
            .filter(|p| p.name.as_str() != cand.name.as_str() && !claimed.contains(p.name.as_str()))
            .cloned()
            .collect();

        for other in stable {
            let Some(reason) = conflicting(cand, &other) else {
                continue;
            };
            let resolved = reporter.question(
                QuestionKind::ConflictPkg,
                cand.name.as_str(),
                other.name.as_str(),
                reason.to_string().as_str(),
            );
            if resolved {
                claimed.insert(other.name.to_string());
                plan.absorb(cand.name.as_str(), other);
            } else {
                unresolved.push(ConflictPair {
                    first: cand.name.clone(),
                    second: other.name.clone(),
                    reason,
                });
            }
        }
    }

    for i in 0..incoming.len() {
        for j in (i + 1)..incoming.len() {
            if let Some(reason) = conflicting(&incoming[i], &incoming[j]) {
                unresolved.push(ConflictPair {
                    first: incoming[i].name.clone(),
                    second: incoming[j].name.clone(),
                    reason,
                });
            }
        }
    }

    if unresolved.is_empty() {
        Ok(())
    } else {
        Err(AlpmError::ConflictingDeps(unresolved))
    }
}

fn conflicting(a: &Package, b: &Package) -> Option<Dependency> {
    a.conflicts
        .iter()
        .find(|c| c.is_satisfied_by(b.name.as_str(), &b.version, &b.provides))
        .or_else(|| {
            b.conflicts
                .iter()
                .find(|c| c.is_satisfied_by(a.name.as_str(), &a.version, &a.provides))
        })
        .cloned()
}

/// Detect path collisions between incoming packages, and between an
/// incoming package and the local database or live filesystem, following
/// spec §4.5's "explainable" rules: a collision with a path belonging to
/// a package this plan is already removing is skip-listed rather than
/// flagged, as is a collision with a path on the incoming package's own
/// backup list.
///
/// # Errors
/// Returns [`AlpmError::FileConflicts`] unless `flags.force` is set.
pub(super) fn check_file_conflicts(
    plan: &mut Plan,
    local: &LocalDatabase,
    root: &Path,
    flags: TransactionFlags,
) -> Result<(), AlpmError> {
    let absorbed = plan.absorbed_names();
    let incoming: Vec<Package> = plan.packages().into_iter().cloned().collect();
    let mut conflicts = Vec::new();

    for i in 0..incoming.len() {
        for j in (i + 1)..incoming.len() {
            for path in &incoming[i].files {
                if incoming[j].files.contains(path) {
                    conflicts.push(FileConflict {
                        path: path.clone(),
                        claimant: incoming[j].name.clone(),
                        owner: Some(incoming[i].name.clone()),
                    });
                }
            }
        }
    }

    for cand in &incoming {
        for path in &cand.files {
            // No name filter here: an in-place `UpgradeOver` shares its
            // name with the predecessor it absorbs, and that predecessor
            // must still be found so the `absorbed` check below can
            // skip-list the shared path (spec §4.5 file-conflict check).
            let owner = local.iter().find(|p| p.files.contains(path));

            match owner {
                Some(owner) if absorbed.contains(owner.name.as_str()) => {
                    plan.skip_remove.insert(path.clone());
                }
                Some(owner) => {
                    if cand.backup.contains_key(path) {
                        plan.skip_add.insert(path.clone());
                    } else {
                        conflicts.push(FileConflict {
                            path: path.clone(),
                            claimant: cand.name.clone(),
                            owner: Some(owner.name.clone()),
                        });
                    }
                }
                None => {
                    if std::fs::symlink_metadata(root.join(path)).is_ok() {
                        if cand.backup.contains_key(path) {
                            plan.skip_add.insert(path.clone());
                        } else {
                            conflicts.push(FileConflict {
                                path: path.clone(),
                                claimant: cand.name.clone(),
                                owner: None,
                            });
                        }
                    }
                }
            }
        }
    }

    if conflicts.is_empty() || flags.force {
        Ok(())
    } else {
        Err(AlpmError::FileConflicts(conflicts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::{Origin, Sections};
    use crate::plan::Operation;
    use crate::reporter::NullReporter;
    use alpm_types::{PackageName, Version};
    use std::path::PathBuf;
    use std::str::FromStr;

    fn pkg(name: &str, version: &str) -> Package {
        Package::skeleton(PackageName::new(name).unwrap(), Version::new(version), Origin::SyncDatabase)
    }

    #[test]
    fn declined_conflict_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let mut local = LocalDatabase::open(dir.path()).unwrap();
        local.write(pkg("old", "1.0-1"), Sections::ALL).unwrap();

        let mut cand = pkg("new", "1.0-1");
        cand.conflicts.push(Dependency::from_str("old").unwrap());

        let mut plan = Plan::new();
        plan.operations.add(Operation::InstallNew(cand));

        let err = resolve_conflicts(&mut plan, &local, &NullReporter).unwrap_err();
        assert!(matches!(err, AlpmError::ConflictingDeps(pairs) if pairs.len() == 1));
    }

    #[test]
    fn foreign_owned_path_is_a_hard_conflict() {
        let dir = tempfile::tempdir().unwrap();
        let mut local = LocalDatabase::open(dir.path()).unwrap();
        let mut owner = pkg("owner", "1.0-1");
        owner.files = vec![PathBuf::from("usr/bin/tool")];
        local.write(owner, Sections::ALL).unwrap();

        let mut cand = pkg("newcomer", "1.0-1");
        cand.files = vec![PathBuf::from("usr/bin/tool")];

        let mut plan = Plan::new();
        plan.operations.add(Operation::InstallNew(cand));

        let root = tempfile::tempdir().unwrap();
        let err = check_file_conflicts(&mut plan, &local, root.path(), TransactionFlags::default()).unwrap_err();
        assert!(matches!(err, AlpmError::FileConflicts(c) if c.len() == 1));
    }

    #[test]
    fn path_owned_by_replaced_package_is_skip_listed_not_conflicted() {
        let dir = tempfile::tempdir().unwrap();
        let mut local = LocalDatabase::open(dir.path()).unwrap();
        let mut old = pkg("old", "1.0-1");
        old.files = vec![PathBuf::from("usr/bin/tool")];
        local.write(old.clone(), Sections::ALL).unwrap();

        let mut cand = pkg("old", "2.0-1");
        cand.files = vec![PathBuf::from("usr/bin/tool")];

        let mut plan = Plan::new();
        plan.operations.add(Operation::UpgradeOver { new: cand, old });

        let root = tempfile::tempdir().unwrap();
        check_file_conflicts(&mut plan, &local, root.path(), TransactionFlags::default()).unwrap();
        assert!(plan.skip_remove.contains(&PathBuf::from("usr/bin/tool")));
    }
}
