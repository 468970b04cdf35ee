//! Phase A — target loading (spec §4.5).
//!
//! Resolves each raw target string to a concrete [`Package`] record: a
//! bare name searches the local cache (`Remove`) or the sync caches
//! (`Add`/`Sync`/`Upgrade`); a `repo/name` form restricts the sync search
//! to one repository; a filesystem path loads a standalone on-disk
//! package description. Duplicates are merged, preferring the higher
//! version.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use tracing::debug;

use crate::config::TransactionFlags;
use crate::db::{LocalDatabase, ReadableDatabase, SyncDatabase};
use crate::error::AlpmError;
use crate::package::Package;
use crate::plan::TransactionKind;
use crate::reporter::{QuestionKind, Reporter};

use super::archive;

/// A provider match: the repository it came from and the candidate
/// package itself.
pub(super) struct ProviderMatch<'a> {
    pub repo: &'a str,
    pub package: &'a Package,
}

/// Find a provider for `name` across `sync_dbs`, optionally restricted to
/// one repository. Literal name matches win over `provides` matches;
/// within either tier, repositories are searched in slice order and, for
/// a `provides` match, candidates are broken by name — the deterministic
/// tiebreak Design Notes §9 calls for in place of the original's
/// unspecified first-wins scan order.
pub(super) fn find_provider<'a>(
    sync_dbs: &'a [SyncDatabase],
    name: &str,
    repo_filter: Option<&str>,
) -> Option<ProviderMatch<'a>> {
    for db in sync_dbs {
        if repo_filter.is_some_and(|r| db.repo() != r) {
            continue;
        }
        if let Some(pkg) = db.lookup(name) {
            return Some(ProviderMatch {
                repo: db.repo(),
                package: pkg,
            });
        }
    }
    for db in sync_dbs {
        if repo_filter.is_some_and(|r| db.repo() != r) {
            continue;
        }
        let mut candidates = db.what_provides(name);
        candidates.sort_by(|a, b| a.name.as_str().cmp(b.name.as_str()));
        if let Some(pkg) = candidates.into_iter().next() {
            return Some(ProviderMatch {
                repo: db.repo(),
                package: pkg,
            });
        }
    }
    None
}

/// Split a `repo/name` target into its parts, if it has that shape.
fn split_repo_qualified(raw: &str) -> Option<(&str, &str)> {
    raw.split_once('/')
}

/// Resolve every Remove target against the local database. Fails with
/// [`AlpmError::PkgNotFound`] on the first target that isn't installed —
/// Remove's target set is small and user-supplied by name, so unlike
/// Phase C/D this doesn't batch errors.
///
/// # Errors
/// Returns [`AlpmError::PkgNotFound`] if a named target is not installed.
pub(super) fn load_remove_targets(
    targets: &[String],
    local: &LocalDatabase,
) -> Result<Vec<Package>, AlpmError> {
    let mut by_name: HashMap<String, Package> = HashMap::new();
    for raw in targets {
        let pkg = local
            .lookup(raw)
            .cloned()
            .ok_or_else(|| AlpmError::PkgNotFound(raw.clone()))?;
        merge_higher_version(&mut by_name, pkg);
    }
    Ok(by_name.into_values().collect())
}

/// Resolve every Add/Upgrade/Sync target to a concrete candidate package.
///
/// # Errors
/// Returns [`AlpmError::PkgNotFound`] if a target cannot be resolved by
/// literal name, `provides`, or archive path, or [`AlpmError::PkgInstalled`]
/// if it names an already-installed package outside the freshen case.
pub(super) fn load_install_targets(
    kind: TransactionKind,
    targets: &[String],
    local: &LocalDatabase,
    sync_dbs: &[SyncDatabase],
    flags: TransactionFlags,
    ignore_pkg: &HashSet<String>,
    reporter: &dyn Reporter,
) -> Result<Vec<Package>, AlpmError> {
    let mut by_name: HashMap<String, Package> = HashMap::new();

    for raw in targets {
        let candidate = resolve_one_target(raw, local, sync_dbs)?;

        if let Some(installed) = local.lookup(candidate.name.as_str()) {
            if installed.version == candidate.version {
                if kind == TransactionKind::Upgrade && flags.freshen {
                    debug!(target = raw, "freshen: already up to date, skipping");
                    continue;
                }
                return Err(AlpmError::PkgInstalled(candidate.name.clone()));
            }
        } else if kind == TransactionKind::Upgrade && flags.freshen {
            return Err(AlpmError::PkgCantFresh(candidate.name.clone()));
        }

        if ignore_pkg.contains(candidate.name.as_str())
            && !reporter.question(
                QuestionKind::InstallIgnorePkg,
                candidate.name.as_str(),
                candidate.version.as_str(),
                "",
            )
        {
            continue;
        }

        merge_higher_version(&mut by_name, candidate);
    }

    Ok(by_name.into_values().collect())
}

fn resolve_one_target(
    raw: &str,
    local: &LocalDatabase,
    sync_dbs: &[SyncDatabase],
) -> Result<Package, AlpmError> {
    if Path::new(raw).is_file() {
        return archive::load_package_file(Path::new(raw));
    }

    let (repo_filter, name) = match split_repo_qualified(raw) {
        Some((repo, name)) => (Some(repo), name),
        None => (None, raw),
    };

    if let Some(found) = find_provider(sync_dbs, name, repo_filter) {
        return Ok(found.package.clone());
    }

    // Neither a literal name nor a provides match in any sync database;
    // as a last resort, a bare name that happens to already be installed
    // resolves to its own installed record (covers `Upgrade`/`Sync`
    // targets named without an available newer candidate).
    if let Some(installed) = local.lookup(name) {
        return Ok(installed.clone());
    }

    Err(AlpmError::PkgNotFound(raw.to_string()))
}

fn merge_higher_version(by_name: &mut HashMap<String, Package>, pkg: Package) {
    match by_name.get(pkg.name.as_str()) {
        Some(existing) if existing.version >= pkg.version => {}
        _ => {
            by_name.insert(pkg.name.as_str().to_string(), pkg);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::Origin;
    use alpm_types::{PackageName, Version};

    fn pkg(name: &str, version: &str) -> Package {
        Package::skeleton(
            PackageName::new(name).unwrap(),
            Version::new(version),
            Origin::SyncDatabase,
        )
    }

    #[test]
    fn merge_higher_version_prefers_newer() {
        let mut map = HashMap::new();
        merge_higher_version(&mut map, pkg("a", "1.0"));
        merge_higher_version(&mut map, pkg("a", "2.0"));
        merge_higher_version(&mut map, pkg("a", "1.5"));
        assert_eq!(map.get("a").unwrap().version, Version::new("2.0"));
    }
}
