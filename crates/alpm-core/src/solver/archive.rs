//! Minimal loader for filesystem-path targets (spec §4.5 Phase A).
//!
//! A literal archive would be opened through the [`crate::ports::ArchiveReader`]
//! port and its `.PKGINFO` member parsed; wiring that here would pull the
//! solver into a dependency on a capability port it otherwise never touches,
//! for a path the rest of the engine treats as an opaque byte stream. Until
//! a front-end needs real archive introspection, a filesystem-path target is
//! read as a single flat `%KEY%`-sectioned text file — the same format the
//! local/sync databases already use — which is enough to drive Phase A's
//! file-path branch end to end. Recorded as a deliberate simplification in
//! `DESIGN.md`.

use std::fs;
use std::path::Path;

use alpm_types::{PackageName, Provide, Version};

use crate::db::format;
use crate::error::AlpmError;
use crate::package::{Origin, Package, Sections};

pub(super) fn load_package_file(path: &Path) -> Result<Package, AlpmError> {
    let content = fs::read_to_string(path).map_err(|e| AlpmError::DbOpen {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let sections = format::parse_sections(&content);

    let name = format::scalar(&sections, "NAME")
        .and_then(|s| PackageName::new(s).ok())
        .ok_or_else(|| AlpmError::PkgInvalid(format!("{}: missing or invalid NAME", path.display())))?;
    let version = format::scalar(&sections, "VERSION")
        .map(Version::new)
        .ok_or_else(|| AlpmError::PkgInvalid(format!("{}: missing VERSION", path.display())))?;

    let mut pkg = Package::skeleton(name, version, Origin::OnDiskFile);
    pkg.description = format::scalar(&sections, "DESC").map(str::to_string);
    pkg.install_size = format::scalar(&sections, "SIZE")
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(0);
    pkg.depends = sections
        .get("DEPENDS")
        .into_iter()
        .flatten()
        .filter_map(|s| s.parse().ok())
        .collect();
    pkg.conflicts = sections
        .get("CONFLICTS")
        .into_iter()
        .flatten()
        .filter_map(|s| s.parse().ok())
        .collect();
    pkg.replaces = sections
        .get("REPLACES")
        .into_iter()
        .flatten()
        .filter_map(|s| PackageName::new(s.as_str()).ok())
        .collect();
    pkg.provides = sections
        .get("PROVIDES")
        .into_iter()
        .flatten()
        .filter_map(|s| parse_provide(s))
        .collect();
    pkg.files = sections
        .get("FILES")
        .into_iter()
        .flatten()
        .map(std::path::PathBuf::from)
        .collect();
    pkg.loaded = Sections::ALL;
    Ok(pkg)
}

fn parse_provide(raw: &str) -> Option<Provide> {
    if let Some((name, version)) = raw.split_once('=') {
        PackageName::new(name).ok().map(|n| Provide::versioned(n, Version::new(version)))
    } else {
        PackageName::new(raw).ok().map(Provide::bare)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_name_version_and_depends_from_flat_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("standalone.pkg");
        fs::write(
            &path,
            "%NAME%\nfoo\n\n%VERSION%\n1.0-1\n\n%DEPENDS%\nbar>=2.0\n\n",
        )
        .unwrap();

        let pkg = load_package_file(&path).unwrap();
        assert_eq!(pkg.name.as_str(), "foo");
        assert_eq!(pkg.version.as_str(), "1.0-1");
        assert_eq!(pkg.depends.len(), 1);
        assert_eq!(pkg.depends[0].name.as_str(), "bar");
        assert!(pkg.loaded.contains(Sections::ALL));
    }

    #[test]
    fn missing_name_is_a_pkg_invalid_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.pkg");
        fs::write(&path, "%VERSION%\n1.0-1\n\n").unwrap();
        assert!(matches!(load_package_file(&path), Err(AlpmError::PkgInvalid(_))));
    }
}
