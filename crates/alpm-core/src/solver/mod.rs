//! The dependency/conflict solver (C5): turns a transaction kind plus a
//! list of raw target strings into an ordered [`Plan`] (spec §4.5).
//!
//! Organized as one module per phase rather than one large file, the way
//! the teacher splits `apl-core::resolver`'s concerns from `apl-core::builder`'s:
//! [`target`] (Phase A, target loading), [`archive`] (the filesystem-path
//! loading helper Phase A falls back to), [`depends`] (Phase C,
//! dependency resolution), [`conflict`] (Phase D plus the file-conflict
//! check), and [`order`] (Phase E, topological ordering). Phase B
//! (replacement election) is short enough to live in [`build_initial_plan`]
//! below rather than its own file.

mod archive;
mod conflict;
mod depends;
mod order;
mod target;

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;

use alpm_types::PackageName;

use crate::config::TransactionFlags;
use crate::db::{LocalDatabase, ReadableDatabase, SyncDatabase};
use crate::error::AlpmError;
use crate::package::{InstallReason, Package, Sections};
use crate::plan::{Operation, Plan, TransactionKind};
use crate::reporter::{EventKind, QuestionKind, Reporter};

/// Resolve `targets` against the local and sync databases into a
/// topologically ordered [`Plan`], running every phase spec §4.5
/// describes for `kind`.
///
/// # Errors
/// Returns whichever of [`AlpmError::PkgNotFound`], [`AlpmError::PkgInstalled`],
/// [`AlpmError::UnsatisfiedDeps`], [`AlpmError::ConflictingDeps`], or
/// [`AlpmError::FileConflicts`] the first failing phase surfaces.
#[allow(clippy::too_many_arguments)]
pub fn resolve(
    kind: TransactionKind,
    targets: &[String],
    local: &LocalDatabase,
    sync_dbs: &mut [SyncDatabase],
    root: &Path,
    flags: TransactionFlags,
    ignore_pkg: &HashSet<String>,
    hold_pkg: &HashSet<String>,
    reporter: &dyn Reporter,
) -> Result<Plan, AlpmError> {
    for db in sync_dbs.iter_mut() {
        db.load_all(Sections::ALL)?;
    }

    if kind == TransactionKind::Remove {
        let mut plan = Plan::new();
        let mut set: std::collections::HashMap<String, Package> = target::load_remove_targets(targets, local)?
            .into_iter()
            .map(|p| (p.name.to_string(), p))
            .collect();

        if flags.cascade {
            expand_cascade(&mut set, local);
        }
        if flags.recurse {
            expand_recurse(&mut set, local);
        }

        for name in set.keys() {
            if hold_pkg.contains(name) && !reporter.question(QuestionKind::RemoveHoldPkg, name, "", "") {
                return Err(AlpmError::PkgHold(
                    PackageName::new(name.as_str()).map_err(|e| AlpmError::PkgInvalidName(e.to_string()))?,
                ));
            }
        }

        for pkg in set.into_values() {
            plan.operations.add(Operation::RemoveOnly(pkg));
        }
        order::order_remove(&mut plan, local);
        return Ok(plan);
    }

    let candidates =
        target::load_install_targets(kind, targets, local, sync_dbs, flags, ignore_pkg, reporter)?;
    let mut plan = build_initial_plan(candidates, local, reporter);

    reporter.event(EventKind::ResolveDepsStart, "", "");
    if !flags.no_deps {
        if kind.resolves_deps() {
            depends::resolve_recursive(&mut plan, local, sync_dbs)?;
        } else {
            depends::check_satisfied(&plan, local)?;
        }
    }
    reporter.event(EventKind::ResolveDepsDone, "", "");

    if !flags.no_conflicts {
        reporter.event(EventKind::InterConflictsStart, "", "");
        conflict::resolve_conflicts(&mut plan, local, reporter)?;
        reporter.event(EventKind::InterConflictsDone, "", "");
    }

    reporter.event(EventKind::FileConflictsStart, "", "");
    conflict::check_file_conflicts(&mut plan, local, root, flags)?;
    reporter.event(EventKind::FileConflictsDone, "", "");

    order::order_install(&mut plan);

    Ok(plan)
}

/// Build the initial, unordered plan: one `InstallNew`/`UpgradeOver`
/// operation per candidate (Phase A/self-upgrade detection), then fold in
/// Phase B's replacement election.
fn build_initial_plan(candidates: Vec<Package>, local: &LocalDatabase, reporter: &dyn Reporter) -> Plan {
    let mut plan = Plan::new();

    for cand in candidates {
        let self_old = local.lookup(cand.name.as_str()).filter(|old| old.version != cand.version).cloned();
        let op = match self_old {
            Some(old) => Operation::UpgradeOver { new: cand, old },
            None => Operation::InstallNew(cand),
        };
        plan.operations.add(op);
    }

    let names: Vec<String> = plan.operations.iter().map(|op| op.name().to_string()).collect();
    let mut claimed: HashSet<String> = HashSet::new();

    for name in names {
        let replaces: Vec<alpm_types::PackageName> = plan
            .operations
            .iter()
            .find(|op| op.name() == name)
            .and_then(crate::plan::Operation::incoming)
            .map(|p| p.replaces.clone())
            .unwrap_or_default();

        for target_name in replaces {
            let target_name = target_name.to_string();
            if target_name == name || claimed.contains(&target_name) {
                continue;
            }
            let Some(old) = local.lookup(&target_name).cloned() else {
                continue;
            };
            if !reporter.question(QuestionKind::ReplacePkg, &name, &target_name, old.version.as_str()) {
                continue;
            }
            plan.absorb(&name, old);
            claimed.insert(target_name);
        }
    }

    plan
}

/// `no_deps`'s Remove-side counterpart: pull in every installed package
/// that depends on something already in `set`, recursively, so a removal
/// never leaves a dangling dependent behind (the `cascade` flag, spec §6).
///
/// Guarded by a visited set — Design Notes §9 flags the original's
/// `_alpm_removedeps` as recursing without one.
fn expand_cascade(set: &mut HashMap<String, Package>, local: &LocalDatabase) {
    let mut queue: VecDeque<String> = set.keys().cloned().collect();
    while let Some(name) = queue.pop_front() {
        for depender in local.cache().requiredby(&name) {
            if set.contains_key(depender.as_str()) {
                continue;
            }
            let Some(pkg) = local.lookup(depender.as_str()).cloned() else {
                continue;
            };
            queue.push_back(pkg.name.to_string());
            set.insert(pkg.name.to_string(), pkg);
        }
    }
}

/// The `recurse` flag's counterpart: once `set` is fixed, pull in each
/// removed package's own dependencies that would otherwise be orphaned —
/// installed only `PulledAsDependency` and with no remaining depender
/// outside `set`.
fn expand_recurse(set: &mut HashMap<String, Package>, local: &LocalDatabase) {
    let mut queue: VecDeque<String> = set.keys().cloned().collect();
    while let Some(name) = queue.pop_front() {
        let Some(depends) = set.get(&name).map(|p| p.depends.clone()) else {
            continue;
        };
        for dep in depends {
            let Some(provider) = local
                .iter()
                .find(|p| dep.is_satisfied_by(p.name.as_str(), &p.version, &p.provides))
            else {
                continue;
            };
            let provider_name = provider.name.to_string();
            if set.contains_key(&provider_name) {
                continue;
            }
            if provider.install_reason != InstallReason::PulledAsDependency {
                continue;
            }
            let still_needed = local
                .cache()
                .requiredby(&provider_name)
                .iter()
                .any(|depender| !set.contains_key(depender.as_str()));
            if still_needed {
                continue;
            }
            let provider = provider.clone();
            queue.push_back(provider_name.clone());
            set.insert(provider_name, provider);
        }
    }
}
