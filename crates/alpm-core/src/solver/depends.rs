//! Phase C — dependency resolution (spec §4.5).
//!
//! Only `Sync` transactions reach into a sync database to pull in
//! unsatisfied dependencies; `Add`/`Upgrade` install exactly what the
//! caller named and are only checked for satisfaction against what's
//! already installed or already in the plan (a deliberate narrowing of
//! Phase C's scope, recorded in `DESIGN.md`).

use std::collections::{HashSet, VecDeque};

use alpm_types::Dependency;
use tracing::warn;

use crate::db::{LocalDatabase, ReadableDatabase, SyncDatabase};
use crate::error::AlpmError;
use crate::package::{InstallReason, Package};
use crate::plan::{Operation, Plan};

use super::target::find_provider;

/// Check that every candidate's `depends` is already satisfied by the
/// local database or another candidate in the plan, without reaching
/// into a sync database.
///
/// # Errors
/// Returns [`AlpmError::UnsatisfiedDeps`] listing every unmet expression.
pub(super) fn check_satisfied(plan: &Plan, local: &LocalDatabase) -> Result<(), AlpmError> {
    let incoming = plan.packages();
    let mut missing = Vec::new();

    for pkg in &incoming {
        for dep in &pkg.depends {
            if !is_satisfied(dep, &incoming, local) {
                missing.push(dep.clone());
            }
        }
    }

    if missing.is_empty() {
        Ok(())
    } else {
        Err(AlpmError::UnsatisfiedDeps(missing))
    }
}

fn is_satisfied(dep: &Dependency, incoming: &[&Package], local: &LocalDatabase) -> bool {
    incoming
        .iter()
        .any(|p| dep.is_satisfied_by(p.name.as_str(), &p.version, &p.provides))
        || local
            .iter()
            .any(|p| dep.is_satisfied_by(p.name.as_str(), &p.version, &p.provides))
}

/// Recursively pull in whatever the plan needs to become
/// dependency-closed. Cycles are broken by a per-name visitation stamp; an
/// iteration-count backstop additionally guards against runaway growth
/// (spec §4.5, "upper bound on iterations").
///
/// # Errors
/// Returns [`AlpmError::UnsatisfiedDeps`] listing every dependency that
/// could not be resolved from any sync database.
pub(super) fn resolve_recursive(
    plan: &mut Plan,
    local: &LocalDatabase,
    sync_dbs: &[SyncDatabase],
) -> Result<(), AlpmError> {
    let mut visited: HashSet<String> = plan.packages().iter().map(|p| p.name.to_string()).collect();
    let mut queue: VecDeque<String> = visited.iter().cloned().collect();
    let mut missing = Vec::new();

    let bound = (visited.len() as f64).sqrt().ceil() as usize + 8;
    let mut passes = 0usize;

    while let Some(name) = queue.pop_front() {
        passes += 1;
        if passes > bound {
            warn!(bound, "dependency resolution exceeded its iteration bound, possible cycle");
            break;
        }

        let depends = plan
            .operations
            .iter()
            .find_map(|op| op.incoming().filter(|p| p.name.as_str() == name).map(|p| p.depends.clone()));
        let Some(depends) = depends else { continue };

        for dep in depends {
            let already_satisfied = plan
                .packages()
                .iter()
                .any(|p| dep.is_satisfied_by(p.name.as_str(), &p.version, &p.provides))
                || local
                    .iter()
                    .any(|p| dep.is_satisfied_by(p.name.as_str(), &p.version, &p.provides));
            if already_satisfied {
                continue;
            }

            let Some(found) = find_provider(sync_dbs, dep.name.as_str(), None) else {
                missing.push(dep.clone());
                continue;
            };

            let mut candidate = found.package.clone();
            if visited.contains(candidate.name.as_str()) {
                continue;
            }
            visited.insert(candidate.name.as_str().to_string());
            candidate.install_reason = InstallReason::PulledAsDependency;

            let self_old = local
                .lookup(candidate.name.as_str())
                .filter(|old| old.version != candidate.version)
                .cloned();
            let op = match self_old {
                Some(old) => Operation::UpgradeOver { new: candidate, old },
                None => Operation::InstallNew(candidate),
            };
            let pulled_name = op.name().to_string();
            plan.operations.add(op);
            queue.push_back(pulled_name);
        }
    }

    if missing.is_empty() {
        Ok(())
    } else {
        Err(AlpmError::UnsatisfiedDeps(missing))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::{Origin, Sections};
    use alpm_types::{PackageName, Version};
    use std::str::FromStr;

    fn pkg_with_deps(name: &str, version: &str, deps: &[&str]) -> Package {
        let mut pkg = Package::skeleton(PackageName::new(name).unwrap(), Version::new(version), Origin::SyncDatabase);
        pkg.depends = deps.iter().map(|d| Dependency::from_str(d).unwrap()).collect();
        pkg.loaded = Sections::ALL;
        pkg
    }

    #[test]
    fn check_satisfied_reports_every_missing_dependency() {
        let dir = tempfile::tempdir().unwrap();
        let local = LocalDatabase::open(dir.path()).unwrap();

        let mut plan = Plan::new();
        plan.operations.add(Operation::InstallNew(pkg_with_deps("app", "1.0-1", &["missing-a", "missing-b"])));

        let err = check_satisfied(&plan, &local).unwrap_err();
        match err {
            AlpmError::UnsatisfiedDeps(deps) => assert_eq!(deps.len(), 2),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn cyclic_dependency_still_terminates_and_includes_both_packages() {
        let dir = tempfile::tempdir().unwrap();
        let local = LocalDatabase::open(dir.path()).unwrap();
        let sync_dir = tempfile::tempdir().unwrap();
        let mut seed = LocalDatabase::open(sync_dir.path()).unwrap();
        seed.write(pkg_with_deps("b", "1.0-1", &["a"]), Sections::ALL).unwrap();
        let mut sync = SyncDatabase::open("core", sync_dir.path()).unwrap();
        sync.load_all(Sections::ALL).unwrap();
        let sync_dbs = vec![sync];

        let mut plan = Plan::new();
        plan.operations.add(Operation::InstallNew(pkg_with_deps("a", "1.0-1", &["b"])));

        resolve_recursive(&mut plan, &local, &sync_dbs).unwrap();

        let names: Vec<String> = plan.packages().iter().map(|p| p.name.to_string()).collect();
        assert!(names.contains(&"a".to_string()));
        assert!(names.contains(&"b".to_string()));
    }
}
