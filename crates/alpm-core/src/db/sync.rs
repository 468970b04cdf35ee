//! A read-only sync (remote repository) database (spec §3, §4.4).
//!
//! Shares the on-disk section-file format and lazy-cache mechanics with
//! [`super::local::LocalDatabase`] but exposes no write path: the
//! transaction engine never mutates a sync database, only the local one.

use std::path::{Path, PathBuf};

use crate::error::AlpmError;
use crate::package::{Origin, Package, Sections};

use super::{ensure_loaded, scan_directory, Cache, ReadableDatabase};

/// A read-only snapshot of candidate packages from one remote repository.
pub struct SyncDatabase {
    repo: String,
    root: PathBuf,
    cache: Cache,
}

impl SyncDatabase {
    /// Open (scanning, but not fully loading) the sync database for `repo`
    /// rooted at `path` (typically `db_path/sync/<repo>`).
    ///
    /// # Errors
    /// Returns [`AlpmError::DbOpen`] if `path` does not exist or cannot be
    /// listed.
    pub fn open(repo: impl Into<String>, path: impl Into<PathBuf>) -> Result<Self, AlpmError> {
        let root = path.into();
        let cache = scan_directory(&root, Origin::SyncDatabase)?;
        Ok(Self {
            repo: repo.into(),
            root,
            cache,
        })
    }

    /// The repository name this database was opened under (e.g. `core`,
    /// `extra`), used to restrict a `repo/name` target lookup.
    pub fn repo(&self) -> &str {
        &self.repo
    }

    /// Root directory this database was opened from.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Ensure `sections` are materialized for `name`.
    ///
    /// # Errors
    /// Returns [`AlpmError::DbOpen`] if `desc` cannot be read for a
    /// package that is supposed to have one.
    pub fn load(&mut self, name: &str, sections: Sections) -> Result<Option<&Package>, AlpmError> {
        ensure_loaded(&self.root, &mut self.cache, name, sections)?;
        Ok(self.cache.lookup(name))
    }

    /// Ensure `sections` are materialized for every package currently in
    /// the cache. The solver's dependency/provides traversal (spec §4.5)
    /// walks every candidate's `depends`, so it loads everything up front
    /// rather than threading a mutable borrow through a recursive walk.
    ///
    /// # Errors
    /// Returns the first [`AlpmError::DbOpen`] encountered; already-loaded
    /// packages before the failure keep their materialized sections.
    pub fn load_all(&mut self, sections: Sections) -> Result<(), AlpmError> {
        let names: Vec<String> = self.cache.iter().map(|p| p.name.to_string()).collect();
        for name in names {
            ensure_loaded(&self.root, &mut self.cache, &name, sections)?;
        }
        Ok(())
    }

    /// Borrow the underlying cache.
    pub fn cache(&self) -> &Cache {
        &self.cache
    }
}

impl ReadableDatabase for SyncDatabase {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::local::LocalDatabase;
    use alpm_types::{Dependency, PackageName, Version};
    use std::str::FromStr;

    fn write_pkg(db: &mut LocalDatabase, name: &str, version: &str, depends: &[&str]) {
        let mut pkg = Package::skeleton(
            PackageName::new(name).unwrap(),
            Version::new(version),
            Origin::LocalDatabase,
        );
        pkg.depends = depends.iter().map(|d| Dependency::from_str(d).unwrap()).collect();
        db.write(pkg, Sections::ALL).unwrap();
    }

    #[test]
    fn load_all_materializes_depends_for_every_package() {
        let dir = tempfile::tempdir().unwrap();
        // Reuse LocalDatabase's write path to seed the on-disk layout; a
        // sync database reads the identical section-file format.
        let mut seed = LocalDatabase::open(dir.path()).unwrap();
        write_pkg(&mut seed, "a", "1.0-1", &["b"]);
        write_pkg(&mut seed, "b", "1.0-1", &[]);

        let mut sync = SyncDatabase::open("core", dir.path()).unwrap();
        sync.load_all(Sections::ALL).unwrap();

        let a = sync.lookup("a").unwrap();
        assert_eq!(a.depends.len(), 1);
        assert_eq!(a.depends[0].name.as_str(), "b");
    }
}
