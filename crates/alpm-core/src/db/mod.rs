//! Database backend (C4): on-disk local/sync layout, the lazy-loaded
//! cache, and the read/write operations spec §4.4 names.
//!
//! Modeled as two types sharing a read interface ([`ReadableDatabase`])
//! but only [`local::LocalDatabase`] exposing mutation, per Design
//! Notes §9 ("two types that share a read interface but only the local
//! type exposes a write interface") rather than the original's single
//! struct branching on `treename == "local"`.

pub mod cache;
pub mod format;
pub mod local;
pub mod sync;

use std::fs;
use std::path::{Path, PathBuf};

use alpm_types::{ContentHash, Dependency, PackageName, Provide, Version};
use chrono::{DateTime, TimeZone, Utc};
use tracing::warn;

use crate::error::AlpmError;
use crate::package::{Origin, Package, Sections};

pub use cache::Cache;
pub use local::LocalDatabase;
pub use sync::SyncDatabase;

/// Read-only operations common to local and sync databases.
pub trait ReadableDatabase {
    /// O(1) lookup by exact package name.
    fn lookup(&self, name: &str) -> Option<&Package>;

    /// Every package whose name or `provides` list matches `name`.
    fn what_provides(&self, name: &str) -> Vec<&Package>;

    /// Iterate every package held by this database.
    fn iter(&self) -> Box<dyn Iterator<Item = &Package> + '_>;
}

/// Split a `name-version` local-database directory name into its name and
/// version parts.
///
/// Mirrors libalpm's on-disk convention of `name-pkgver-pkgrel`: the
/// version string itself ends in `-release` (per the version algebra), so
/// the directory name has two trailing dash-delimited components after
/// the name. We split from the right twice rather than guess where the
/// name ends, since names may themselves contain dashes (`lib32-glibc`).
pub fn split_dir_name(dir_name: &str) -> Option<(String, String)> {
    let (rest, release) = dir_name.rsplit_once('-')?;
    let (name, upstream) = rest.rsplit_once('-')?;
    Some((name.to_string(), format!("{upstream}-{release}")))
}

/// Walk `root` once, creating a skeleton [`Package`] per `name-version`
/// subdirectory and indexing it by name. No section files are read yet —
/// that happens lazily via [`ensure_loaded`].
pub fn scan_directory(root: &Path, origin: Origin) -> Result<Cache, AlpmError> {
    let mut cache = Cache::new();
    let entries = fs::read_dir(root).map_err(|e| AlpmError::DbOpen {
        path: root.to_path_buf(),
        reason: e.to_string(),
    })?;

    for entry in entries {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!(root = %root.display(), error = %e, "skipping unreadable directory entry");
                continue;
            }
        };
        let file_type = match entry.file_type() {
            Ok(t) => t,
            Err(_) => continue,
        };
        if !file_type.is_dir() {
            continue;
        }
        let dir_name = entry.file_name();
        let Some(dir_name) = dir_name.to_str() else {
            continue;
        };
        let Some((name, version)) = split_dir_name(dir_name) else {
            warn!(dir = dir_name, "could not parse name-version directory, skipping");
            continue;
        };
        let Ok(name) = PackageName::new(name) else {
            warn!(dir = dir_name, "invalid package name, skipping");
            continue;
        };
        if cache.contains(name.as_str()) {
            warn!(name = %name, "duplicate package entry, keeping first seen");
            continue;
        }
        cache.insert(Package::skeleton(name, Version::new(version), origin));
    }

    Ok(cache)
}

/// Ensure `sections` have been read from disk into the cached record for
/// `name`, loading whatever is still missing.
pub fn ensure_loaded(
    root: &Path,
    cache: &mut Cache,
    name: &str,
    sections: Sections,
) -> Result<(), AlpmError> {
    let (already_loaded, dir) = {
        let Some(pkg) = cache.lookup(name) else {
            return Ok(());
        };
        (pkg.loaded, root.join(pkg.dir_name()))
    };
    if already_loaded.contains(sections) {
        return Ok(());
    }

    if sections.contains(Sections::DESC) && !already_loaded.contains(Sections::DESC) {
        load_desc(&dir, cache, name)?;
    }
    if sections.contains(Sections::FILES) && !already_loaded.contains(Sections::FILES) {
        load_files(&dir, cache, name);
    }
    if sections.contains(Sections::DEPENDS) && !already_loaded.contains(Sections::DEPENDS) {
        load_depends(&dir, cache, name);
    }
    Ok(())
}

fn read_optional(path: &Path) -> Option<String> {
    match fs::read_to_string(path) {
        Ok(content) => Some(content),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to read database section file");
            None
        }
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    raw.trim().parse::<i64>().ok().and_then(|secs| Utc.timestamp_opt(secs, 0).single())
}

fn load_desc(dir: &Path, cache: &mut Cache, name: &str) -> Result<(), AlpmError> {
    let path = dir.join("desc");
    let content = fs::read_to_string(&path).map_err(|e| AlpmError::DbOpen {
        path: path.clone(),
        reason: e.to_string(),
    })?;
    let sections = format::parse_sections(&content);

    let Some(pkg) = cache.lookup_mut(name) else {
        return Ok(());
    };
    pkg.description = format::scalar(&sections, "DESC").map(str::to_string);
    pkg.url = format::scalar(&sections, "URL").map(str::to_string);
    pkg.architecture = format::scalar(&sections, "ARCH").map(str::to_string);
    pkg.builder = format::scalar(&sections, "PACKAGER").map(str::to_string);
    pkg.build_date = format::scalar(&sections, "BUILDDATE").and_then(parse_timestamp);
    pkg.install_date = format::scalar(&sections, "INSTALLDATE").and_then(parse_timestamp);
    pkg.install_size = format::scalar(&sections, "SIZE")
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(0);
    pkg.install_reason = match format::scalar(&sections, "REASON") {
        Some("1") => crate::package::InstallReason::PulledAsDependency,
        _ => crate::package::InstallReason::ExplicitlyRequested,
    };
    pkg.scriptlet_present = dir.join("install").exists();
    pkg.license = sections.get("LICENSE").cloned().unwrap_or_default();
    pkg.groups = sections.get("GROUPS").cloned().unwrap_or_default();
    pkg.replaces = sections
        .get("REPLACES")
        .into_iter()
        .flatten()
        .filter_map(|s| PackageName::new(s.as_str()).ok())
        .collect();
    pkg.loaded.insert(Sections::DESC);
    Ok(())
}

fn load_files(dir: &Path, cache: &mut Cache, name: &str) {
    let path = dir.join("files");
    let Some(content) = read_optional(&path) else {
        if let Some(pkg) = cache.lookup_mut(name) {
            pkg.loaded.insert(Sections::FILES);
        }
        return;
    };
    let sections = format::parse_sections(&content);

    let Some(pkg) = cache.lookup_mut(name) else {
        return;
    };
    pkg.files = sections
        .get("FILES")
        .into_iter()
        .flatten()
        .map(PathBuf::from)
        .collect();
    pkg.backup = sections
        .get("BACKUP")
        .into_iter()
        .flatten()
        .filter_map(|line| {
            let (path, hash) = line.split_once('\t')?;
            let hash = ContentHash::new(hash).ok()?;
            Some((PathBuf::from(path), hash))
        })
        .collect();
    pkg.loaded.insert(Sections::FILES);
}

fn load_depends(dir: &Path, cache: &mut Cache, name: &str) {
    let path = dir.join("depends");
    let Some(content) = read_optional(&path) else {
        if let Some(pkg) = cache.lookup_mut(name) {
            pkg.loaded.insert(Sections::DEPENDS);
        }
        return;
    };
    let sections = format::parse_sections(&content);

    let Some(pkg) = cache.lookup_mut(name) else {
        return;
    };
    pkg.depends = sections
        .get("DEPENDS")
        .into_iter()
        .flatten()
        .filter_map(|s| parse_dependency(s))
        .collect();
    pkg.conflicts = sections
        .get("CONFLICTS")
        .into_iter()
        .flatten()
        .filter_map(|s| parse_dependency(s))
        .collect();
    pkg.provides = sections
        .get("PROVIDES")
        .into_iter()
        .flatten()
        .filter_map(|s| parse_provide(s))
        .collect();
    pkg.loaded.insert(Sections::DEPENDS);
}

fn parse_dependency(raw: &str) -> Option<Dependency> {
    match raw.parse() {
        Ok(dep) => Some(dep),
        Err(e) => {
            warn!(raw, error = %e, "malformed dependency expression, skipping");
            None
        }
    }
}

fn parse_provide(raw: &str) -> Option<Provide> {
    if let Some((name, version)) = raw.split_once('=') {
        let name = PackageName::new(name).ok()?;
        Some(Provide::versioned(name, Version::new(version)))
    } else {
        let name = PackageName::new(raw).ok()?;
        Some(Provide::bare(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_name_version_release() {
        assert_eq!(
            split_dir_name("lib32-glibc-2.38-1"),
            Some(("lib32-glibc".to_string(), "2.38-1".to_string()))
        );
        assert_eq!(split_dir_name("no-dashes-here"), Some(("no".to_string(), "dashes-here".to_string())));
        assert_eq!(split_dir_name("onlyname"), None);
    }

    #[test]
    fn parses_versioned_and_bare_provide() {
        let v = parse_provide("libssl=1.1.0").unwrap();
        assert_eq!(v.name.as_str(), "libssl");
        assert!(v.version.is_some());

        let bare = parse_provide("libssl").unwrap();
        assert!(bare.version.is_none());
    }
}
