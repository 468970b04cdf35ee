//! The in-memory package cache shared by local and sync databases.
//!
//! "The cache is canonical, the disk is derivative, within a transaction"
//! (Design Notes §9): a cache is built once by a directory scan and then
//! mutated in place as the transaction proceeds; re-entering a transaction
//! discards and reloads it rather than trusting stale state.

use alpm_types::PackageName;

use crate::package::{NameHashIndex, Package};

/// The name-hash-indexed set of packages backing one database.
#[derive(Default)]
pub struct Cache {
    index: NameHashIndex<Package>,
}

impl Cache {
    /// An empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite the record for `pkg.name`.
    pub fn insert(&mut self, pkg: Package) {
        self.index.insert(pkg.name.as_str().to_string(), pkg);
    }

    /// O(1) lookup by exact name.
    pub fn lookup(&self, name: &str) -> Option<&Package> {
        self.index.get(name)
    }

    /// Mutable O(1) lookup by exact name, used to fill in lazy-loaded
    /// sections in place.
    pub fn lookup_mut(&mut self, name: &str) -> Option<&mut Package> {
        self.index.get_mut(name)
    }

    /// Remove and return the record for `name`, if present.
    pub fn remove(&mut self, name: &str) -> Option<Package> {
        self.index.remove(name)
    }

    /// Whether `name` has a live record.
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains(name)
    }

    /// Number of packages in the cache.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Whether the cache holds no packages.
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Every package whose name equals `name` or whose `provides` list
    /// contains `name` — O(n) over the cache, per spec §4.4.
    pub fn what_provides(&self, name: &str) -> Vec<&Package> {
        self.index
            .iter()
            .map(|(_, pkg)| pkg)
            .filter(|pkg| pkg.provides_name(name))
            .collect()
    }

    /// Packages whose `depends` contains an expression satisfied by the
    /// package named `name` — the reverse-dependency index, computed on
    /// demand by a single scan rather than persisted (Design Notes §9).
    pub fn requiredby(&self, name: &str) -> Vec<PackageName> {
        let Some(target) = self.lookup(name) else {
            return Vec::new();
        };
        self.index
            .iter()
            .filter(|(_, pkg)| {
                pkg.depends
                    .iter()
                    .any(|dep| dep.is_satisfied_by(target.name.as_str(), &target.version, &target.provides))
            })
            .map(|(_, pkg)| pkg.name.clone())
            .collect()
    }

    /// Iterate every package in the cache, in no particular order (the
    /// index does not preserve insertion order).
    pub fn iter(&self) -> impl Iterator<Item = &Package> {
        self.index.iter().map(|(_, pkg)| pkg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::{Origin, Sections};
    use alpm_types::{Dependency, Version};
    use std::str::FromStr;

    fn pkg(name: &str, version: &str) -> Package {
        Package::skeleton(
            PackageName::new(name).unwrap(),
            Version::new(version),
            Origin::LocalDatabase,
        )
    }

    #[test]
    fn what_provides_matches_own_name_and_provides() {
        let mut cache = Cache::new();
        let mut libssl_provider = pkg("openssl", "1.0");
        libssl_provider.provides.push(alpm_types::Provide::bare(
            PackageName::new("libssl").unwrap(),
        ));
        cache.insert(libssl_provider);
        cache.insert(pkg("zlib", "1.0"));

        let hits: Vec<_> = cache.what_provides("libssl").iter().map(|p| p.name.to_string()).collect();
        assert_eq!(hits, vec!["openssl".to_string()]);
        assert_eq!(cache.what_provides("zlib").len(), 1);
        assert!(cache.what_provides("nope").is_empty());
    }

    #[test]
    fn requiredby_scans_depends() {
        let mut cache = Cache::new();
        cache.insert(pkg("zlib", "1.0"));
        let mut app = pkg("app", "1.0");
        app.depends.push(Dependency::from_str("zlib").unwrap());
        cache.insert(app);

        let reverse = cache.requiredby("zlib");
        assert_eq!(reverse, vec![PackageName::new("app").unwrap()]);
        assert!(cache.requiredby("app").is_empty());
    }

    #[test]
    fn loaded_sections_bitmask_tracks_materialization() {
        let mut p = pkg("openssl", "1.0");
        assert!(!p.loaded.contains(Sections::DESC));
        p.loaded.insert(Sections::DESC);
        assert!(p.loaded.contains(Sections::DESC));
        assert!(!p.loaded.contains(Sections::FILES));
    }
}
