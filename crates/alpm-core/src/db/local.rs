//! The local (installed) database: the only one the transaction engine
//! mutates (spec §3, §4.4).

use std::fs;
use std::path::{Path, PathBuf};

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

use alpm_types::PackageName;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};

use crate::error::AlpmError;
use crate::package::{Origin, Package, Sections};

use super::{ensure_loaded, format, scan_directory, Cache, ReadableDatabase};

const LASTUPDATE_FORMAT: &str = "%Y%m%d%H%M%S";

/// The mutable, installed-package database.
pub struct LocalDatabase {
    root: PathBuf,
    cache: Cache,
}

impl LocalDatabase {
    /// Open (scanning, but not fully loading) the local database rooted
    /// at `path` (typically `db_path/local`).
    ///
    /// # Errors
    /// Returns [`AlpmError::DbOpen`] if `path` does not exist or cannot
    /// be listed.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, AlpmError> {
        let root = path.into();
        let cache = scan_directory(&root, Origin::LocalDatabase)?;
        Ok(Self { root, cache })
    }

    /// Ensure `sections` are materialized for `name`, then return the
    /// (possibly still partially loaded on other sections) record.
    ///
    /// This is the concrete shape lazy-loading takes in this crate:
    /// rather than intercepting individual field reads (there is no
    /// transparent-proxy mechanism for that over a plain struct), callers
    /// ask for the section groups they are about to use.
    ///
    /// # Errors
    /// Returns [`AlpmError::DbOpen`] if `desc` cannot be read for a
    /// package that is supposed to have one.
    pub fn load(&mut self, name: &str, sections: Sections) -> Result<Option<&Package>, AlpmError> {
        ensure_loaded(&self.root, &mut self.cache, name, sections)?;
        Ok(self.cache.lookup(name))
    }

    /// Borrow the underlying cache.
    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    /// Mutably borrow the underlying cache (for the transaction
    /// controller to mutate directly during commit).
    pub fn cache_mut(&mut self) -> &mut Cache {
        &mut self.cache
    }

    /// Root directory this database was opened from.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write the requested `sections` of `pkg` back to disk, creating the
    /// package directory (mode `0755`) and section files (mode `0644`)
    /// if needed, and update the cache entry in place.
    ///
    /// On failure the in-memory cache entry is left untouched, per
    /// spec §4.4.
    ///
    /// # Errors
    /// Returns [`AlpmError::DbWrite`] if any section file cannot be
    /// written.
    pub fn write(&mut self, pkg: Package, sections: Sections) -> Result<(), AlpmError> {
        let dir = self.root.join(pkg.dir_name());
        self.write_to(&dir, &pkg, sections).map_err(|reason| AlpmError::DbWrite {
            name: pkg.name.clone(),
            reason,
        })?;
        self.cache.insert(pkg);
        Ok(())
    }

    fn write_to(&self, dir: &Path, pkg: &Package, sections: Sections) -> Result<(), String> {
        create_dir(dir).map_err(|e| e.to_string())?;

        if sections.contains(Sections::DESC) {
            write_file(&dir.join("desc"), &desc_content(pkg)).map_err(|e| e.to_string())?;
        }
        if sections.contains(Sections::FILES) {
            write_file(&dir.join("files"), &files_content(pkg)).map_err(|e| e.to_string())?;
        }
        if sections.contains(Sections::DEPENDS) {
            write_file(&dir.join("depends"), &depends_content(pkg)).map_err(|e| e.to_string())?;
        }
        Ok(())
    }

    /// Remove `name`'s on-disk directory (best-effort per file) and its
    /// cache entry.
    ///
    /// # Errors
    /// Returns [`AlpmError::DbRemove`] if the directory itself cannot be
    /// removed (individual missing subfiles are tolerated).
    pub fn remove(&mut self, name: &str) -> Result<(), AlpmError> {
        let Some(pkg) = self.cache.lookup(name) else {
            return Ok(());
        };
        let dir = self.root.join(pkg.dir_name());
        if let Err(e) = fs::remove_dir_all(&dir) {
            if e.kind() != std::io::ErrorKind::NotFound {
                return Err(AlpmError::DbRemove {
                    name: PackageName::new(name).unwrap_or_else(|_| pkg.name.clone()),
                    reason: e.to_string(),
                });
            }
        }
        self.cache.remove(name);
        Ok(())
    }

    /// Read the `.lastupdate` file, if present.
    pub fn get_last_update(&self) -> Option<DateTime<Utc>> {
        let raw = fs::read_to_string(self.root.join(".lastupdate")).ok()?;
        NaiveDateTime::parse_from_str(raw.trim(), LASTUPDATE_FORMAT)
            .ok()
            .map(|naive| naive.and_utc())
    }

    /// Write the `.lastupdate` file as a 14-character `YYYYMMDDHHMMSS`
    /// UTC timestamp.
    ///
    /// # Errors
    /// Returns the underlying [`std::io::Error`] on write failure.
    pub fn set_last_update(&self, at: DateTime<Utc>) -> std::io::Result<()> {
        write_file(&self.root.join(".lastupdate"), &at.format(LASTUPDATE_FORMAT).to_string())
    }
}

impl ReadableDatabase for LocalDatabase {
    fn lookup(&self, name: &str) -> Option<&Package> {
        self.cache.lookup(name)
    }

    fn what_provides(&self, name: &str) -> Vec<&Package> {
        self.cache.what_provides(name)
    }

    fn iter(&self) -> Box<dyn Iterator<Item = &Package> + '_> {
        Box::new(self.cache.iter())
    }
}

fn create_dir(dir: &Path) -> std::io::Result<()> {
    fs::create_dir_all(dir)?;
    #[cfg(unix)]
    fs::set_permissions(dir, fs::Permissions::from_mode(0o755))?;
    Ok(())
}

fn write_file(path: &Path, content: &str) -> std::io::Result<()> {
    fs::write(path, content)?;
    #[cfg(unix)]
    fs::set_permissions(path, fs::Permissions::from_mode(0o644))?;
    Ok(())
}

fn desc_content(pkg: &Package) -> String {
    let reason = match pkg.install_reason {
        crate::package::InstallReason::ExplicitlyRequested => "0",
        crate::package::InstallReason::PulledAsDependency => "1",
    };
    let lines: Vec<(&str, Vec<String>)> = vec![
        ("NAME", vec![pkg.name.to_string()]),
        ("VERSION", vec![pkg.version.to_string()]),
        ("DESC", pkg.description.clone().into_iter().collect()),
        ("URL", pkg.url.clone().into_iter().collect()),
        ("ARCH", pkg.architecture.clone().into_iter().collect()),
        (
            "BUILDDATE",
            pkg.build_date.map(|d| d.timestamp().to_string()).into_iter().collect(),
        ),
        (
            "INSTALLDATE",
            pkg.install_date.map(|d| d.timestamp().to_string()).into_iter().collect(),
        ),
        ("PACKAGER", pkg.builder.clone().into_iter().collect()),
        ("SIZE", vec![pkg.install_size.to_string()]),
        ("REASON", vec![reason.to_string()]),
        ("LICENSE", pkg.license.clone()),
        ("GROUPS", pkg.groups.clone()),
        ("REPLACES", pkg.replaces.iter().map(ToString::to_string).collect()),
    ];
    format::write_sections(lines.iter().map(|(name, values)| (*name, values.as_slice())))
}

fn files_content(pkg: &Package) -> String {
    let files: Vec<String> = pkg.files.iter().map(|p| p.display().to_string()).collect();
    let backup: Vec<String> = pkg
        .backup
        .iter()
        .map(|(path, hash)| format!("{}\t{}", path.display(), hash))
        .collect();
    format::write_sections([("FILES", files.as_slice()), ("BACKUP", backup.as_slice())])
}

fn depends_content(pkg: &Package) -> String {
    let depends: Vec<String> = pkg.depends.iter().map(ToString::to_string).collect();
    let conflicts: Vec<String> = pkg.conflicts.iter().map(ToString::to_string).collect();
    let provides: Vec<String> = pkg.provides.iter().map(ToString::to_string).collect();
    format::write_sections([
        ("DEPENDS", depends.as_slice()),
        ("CONFLICTS", conflicts.as_slice()),
        ("PROVIDES", provides.as_slice()),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use alpm_types::Version;

    fn sample_pkg(name: &str, version: &str) -> Package {
        let mut pkg = Package::skeleton(
            PackageName::new(name).unwrap(),
            Version::new(version),
            Origin::LocalDatabase,
        );
        pkg.description = Some("a sample package".to_string());
        pkg.install_size = 4096;
        pkg.files = vec![PathBuf::from("usr/bin/sample")];
        pkg
    }

    #[test]
    fn write_then_reopen_round_trips_desc() {
        let dir = tempfile::tempdir().unwrap();
        let mut db = LocalDatabase::open(dir.path()).unwrap();
        let all = Sections::DESC;
        db.write(sample_pkg("sample", "1.0-1"), all).unwrap();

        let mut reopened = LocalDatabase::open(dir.path()).unwrap();
        let loaded = reopened.load("sample", Sections::DESC).unwrap().unwrap();
        assert_eq!(loaded.description.as_deref(), Some("a sample package"));
        assert_eq!(loaded.install_size, 4096);
    }

    #[test]
    fn remove_deletes_directory_and_cache_entry() {
        let dir = tempfile::tempdir().unwrap();
        let mut db = LocalDatabase::open(dir.path()).unwrap();
        db.write(sample_pkg("sample", "1.0-1"), Sections::DESC).unwrap();
        assert!(db.lookup("sample").is_some());

        db.remove("sample").unwrap();
        assert!(db.lookup("sample").is_none());
        assert!(!dir.path().join("sample-1.0-1").exists());
    }

    #[test]
    fn last_update_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let db = LocalDatabase::open(dir.path()).unwrap();
        assert_eq!(db.get_last_update(), None);

        let at = Utc.with_ymd_and_hms(2024, 3, 7, 10, 0, 0).unwrap();
        db.set_last_update(at).unwrap();
        assert_eq!(db.get_last_update(), Some(at));
    }
}
