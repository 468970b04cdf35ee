//! Package record and name-hash index (C3).

use std::collections::BTreeMap;
use std::path::PathBuf;

use alpm_types::{ContentHash, Dependency, PackageName, Provide, Version};
use chrono::{DateTime, Utc};

/// Why a package was installed.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum InstallReason {
    /// The user named this package directly.
    ExplicitlyRequested,
    /// This package was pulled in to satisfy a dependency.
    PulledAsDependency,
}

/// Where a [`Package`] record came from.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Origin {
    /// Read from the local (installed) database.
    LocalDatabase,
    /// Read from a sync (remote repository) database.
    SyncDatabase,
    /// Loaded directly from an on-disk package archive.
    OnDiskFile,
}

/// Bitmask of which of a record's field groups have been read from disk.
///
/// The database backend (C4) lazy-loads each group independently; a fresh
/// skeleton record from a directory scan carries no bits set.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub struct Sections {
    bits: u8,
}

impl Sections {
    /// Scalar `desc` fields (name, version, description, ...).
    pub const DESC: Self = Self { bits: 0b001 };
    /// `files` and `backup`.
    pub const FILES: Self = Self { bits: 0b010 };
    /// `depends`, `conflicts`, `provides`.
    pub const DEPENDS: Self = Self { bits: 0b100 };
    /// All section groups.
    pub const ALL: Self = Self { bits: 0b111 };

    /// No sections materialized.
    pub fn none() -> Self {
        Self { bits: 0 }
    }

    /// Mark `other` as materialized.
    pub fn insert(&mut self, other: Self) {
        self.bits |= other.bits;
    }

    /// Whether every bit in `other` is set.
    pub fn contains(self, other: Self) -> bool {
        self.bits & other.bits == other.bits
    }
}

/// In-memory representation of a package, local or sync (spec §3).
#[derive(Debug, Clone)]
pub struct Package {
    /// Package name; non-empty, no whitespace or `/`.
    pub name: PackageName,
    /// Required version string.
    pub version: Version,
    /// Short human-readable description.
    pub description: Option<String>,
    /// Upstream project URL.
    pub url: Option<String>,
    /// Target architecture.
    pub architecture: Option<String>,
    /// Name/identity of whoever built the package (`%PACKAGER%`).
    pub builder: Option<String>,
    /// When the package was built.
    pub build_date: Option<DateTime<Utc>>,
    /// When the package was installed (local database only).
    pub install_date: Option<DateTime<Utc>>,
    /// Installed size in bytes.
    pub install_size: u64,
    /// Why this package is installed.
    pub install_reason: InstallReason,
    /// Whether the package ships a `.INSTALL` scriptlet.
    pub scriptlet_present: bool,
    /// License identifiers.
    pub license: Vec<String>,
    /// Group memberships.
    pub groups: Vec<String>,
    /// Packages this one requires.
    pub depends: Vec<Dependency>,
    /// Packages this one cannot coexist with.
    pub conflicts: Vec<Dependency>,
    /// Virtual names this package advertises.
    pub provides: Vec<Provide>,
    /// Packages this one obsoletes when installed.
    pub replaces: Vec<PackageName>,
    /// Installed file paths, sorted.
    pub files: Vec<PathBuf>,
    /// Backup-file paths mapped to the content hash recorded at install
    /// time.
    pub backup: BTreeMap<PathBuf, ContentHash>,
    /// Strong hash of the package artifact itself, if known.
    pub content_hash: Option<ContentHash>,
    /// Where this record was loaded from.
    pub origin: Origin,
    /// Which field groups have been read from disk so far.
    pub loaded: Sections,
}

impl Package {
    /// A minimal, freshly-constructed record with everything but name,
    /// version, and origin left at defaults. Used both as a builder seed
    /// and as the skeleton a directory scan produces before lazy-loading
    /// fills in the rest.
    pub fn skeleton(name: PackageName, version: Version, origin: Origin) -> Self {
        Self {
            name,
            version,
            description: None,
            url: None,
            architecture: None,
            builder: None,
            build_date: None,
            install_date: None,
            install_size: 0,
            install_reason: InstallReason::ExplicitlyRequested,
            scriptlet_present: false,
            license: Vec::new(),
            groups: Vec::new(),
            depends: Vec::new(),
            conflicts: Vec::new(),
            provides: Vec::new(),
            replaces: Vec::new(),
            files: Vec::new(),
            backup: BTreeMap::new(),
            content_hash: None,
            origin,
            loaded: Sections::none(),
        }
    }

    /// The `name-version` directory-name form used by the local database.
    pub fn dir_name(&self) -> String {
        format!("{}-{}", self.name, self.version)
    }

    /// Whether `name` is this package's own name or one if its `provides`.
    pub fn provides_name(&self, name: &str) -> bool {
        self.name.as_str() == name || self.provides.iter().any(|p| p.name.as_str() == name)
    }
}

/// `sdbm`: `h = c + (h << 6) + (h << 16) - h`, the classical mixing
/// function used for the name-hash index.
pub fn sdbm_hash(s: &str) -> u64 {
    let mut h: u64 = 0;
    for b in s.bytes() {
        h = u64::from(b)
            .wrapping_add(h << 6)
            .wrapping_add(h << 16)
            .wrapping_sub(h);
    }
    h
}

/// Built-in prime capacity ladder the index grows through on rehash.
const PRIME_LADDER: &[usize] = &[
    11, 23, 47, 97, 197, 397, 797, 1_597, 3_203, 6_421, 12_853, 25_717, 51_437, 102_877, 205_759,
];

const MAX_LOAD_FACTOR: f64 = 0.7;

enum Slot<V> {
    Empty,
    Occupied { name: String, value: V },
    /// Logically removed: the hash is "zeroed" by collapsing the slot to
    /// this tombstone so later probes don't stop here, while earlier
    /// probe chains that pass through it stay intact.
    Removed,
}

/// An open-addressed, linear-probed hash table keyed by package name,
/// sized from [`PRIME_LADDER`] and rehashed once the load factor passes
/// 0.7. Removal is logical so probe chains through a removed slot are
/// preserved (spec §4.3).
pub struct NameHashIndex<V> {
    slots: Vec<Slot<V>>,
    live: usize,
    ladder_pos: usize,
}

impl<V> Default for NameHashIndex<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> NameHashIndex<V> {
    /// An empty index at the smallest ladder capacity.
    pub fn new() -> Self {
        let capacity = PRIME_LADDER[0];
        Self {
            slots: (0..capacity).map(|_| Slot::Empty).collect(),
            live: 0,
            ladder_pos: 0,
        }
    }

    /// Number of live (non-removed) entries.
    pub fn len(&self) -> usize {
        self.live
    }

    /// Whether the index holds no live entries.
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn probe_start(&self, name: &str) -> usize {
        (sdbm_hash(name) as usize) % self.capacity()
    }

    /// Insert or overwrite the value for `name`.
    pub fn insert(&mut self, name: impl Into<String>, value: V) {
        let name = name.into();
        self.insert_slot(name, value);
        if self.live as f64 > self.capacity() as f64 * MAX_LOAD_FACTOR {
            self.rehash();
        }
    }

    fn insert_slot(&mut self, name: String, value: V) {
        let start = self.probe_start(&name);
        let capacity = self.capacity();
        let mut first_tombstone = None;

        for offset in 0..capacity {
            let idx = (start + offset) % capacity;
            match &self.slots[idx] {
                Slot::Empty => {
                    let idx = first_tombstone.unwrap_or(idx);
                    self.slots[idx] = Slot::Occupied { name, value };
                    self.live += 1;
                    return;
                }
                Slot::Removed => {
                    if first_tombstone.is_none() {
                        first_tombstone = Some(idx);
                    }
                }
                Slot::Occupied { name: existing, .. } if *existing == name => {
                    self.slots[idx] = Slot::Occupied { name, value };
                    return;
                }
                Slot::Occupied { .. } => {}
            }
        }

        // Table is full of tombstones/occupied slots with no exact match
        // and no empty slot: force a rehash and retry once.
        self.rehash();
        self.insert_slot(name, value);
    }

    /// Look up the value stored for `name`, if present.
    pub fn get(&self, name: &str) -> Option<&V> {
        let idx = self.find_index(name)?;
        match &self.slots[idx] {
            Slot::Occupied { value, .. } => Some(value),
            _ => None,
        }
    }

    /// Mutably look up the value stored for `name`, if present.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut V> {
        let idx = self.find_index(name)?;
        match &mut self.slots[idx] {
            Slot::Occupied { value, .. } => Some(value),
            _ => None,
        }
    }

    /// Logically remove `name`, returning its value if it was present.
    /// The slot becomes a tombstone rather than `Empty` so later probes
    /// for other names that hashed through this slot keep working.
    pub fn remove(&mut self, name: &str) -> Option<V> {
        let idx = self.find_index(name)?;
        let removed = std::mem::replace(&mut self.slots[idx], Slot::Removed);
        self.live -= 1;
        match removed {
            Slot::Occupied { value, .. } => Some(value),
            _ => unreachable!("find_index only returns indices of occupied slots"),
        }
    }

    /// Whether `name` currently has a live entry.
    pub fn contains(&self, name: &str) -> bool {
        self.find_index(name).is_some()
    }

    fn find_index(&self, name: &str) -> Option<usize> {
        let start = self.probe_start(name);
        let capacity = self.capacity();
        for offset in 0..capacity {
            let idx = (start + offset) % capacity;
            match &self.slots[idx] {
                Slot::Empty => return None,
                Slot::Occupied { name: existing, .. } if existing == name => return Some(idx),
                Slot::Occupied { .. } | Slot::Removed => {}
            }
        }
        None
    }

    /// Iterate over the live `(name, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.slots.iter().filter_map(|slot| match slot {
            Slot::Occupied { name, value } => Some((name.as_str(), value)),
            _ => None,
        })
    }

    fn rehash(&mut self) {
        let next_capacity = PRIME_LADDER
            .get(self.ladder_pos + 1)
            .copied()
            .unwrap_or_else(|| self.capacity() * 2 + 1);
        if self.ladder_pos + 1 < PRIME_LADDER.len() {
            self.ladder_pos += 1;
        }

        let old_slots = std::mem::replace(
            &mut self.slots,
            (0..next_capacity).map(|_| Slot::Empty).collect(),
        );
        self.live = 0;
        for slot in old_slots {
            if let Slot::Occupied { name, value } = slot {
                self.insert_slot(name, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sdbm_matches_known_values() {
        // Empty string hashes to 0 by construction.
        assert_eq!(sdbm_hash(""), 0);
        // Regression value for a fixed input, pinned so future edits to
        // the mixing function are caught.
        assert_eq!(sdbm_hash("a"), 97);
    }

    #[test]
    fn insert_get_remove_round_trip() {
        let mut index = NameHashIndex::new();
        index.insert("openssl", 1);
        index.insert("zlib", 2);
        assert_eq!(index.get("openssl"), Some(&1));
        assert_eq!(index.get("zlib"), Some(&2));
        assert_eq!(index.get("missing"), None);

        assert_eq!(index.remove("openssl"), Some(1));
        assert_eq!(index.get("openssl"), None);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn removal_preserves_probe_chain() {
        // Force three names into the table and remove the middle one of a
        // probe chain; the last must still be reachable afterward.
        let mut index = NameHashIndex::new();
        for n in 0..50 {
            index.insert(format!("pkg{n}"), n);
        }
        for n in (0..50).step_by(2) {
            index.remove(&format!("pkg{n}"));
        }
        for n in (1..50).step_by(2) {
            assert_eq!(index.get(&format!("pkg{n}")), Some(&n));
        }
    }

    #[test]
    fn rehashes_past_load_factor() {
        let mut index = NameHashIndex::new();
        for n in 0..200 {
            index.insert(format!("pkg{n}"), n);
        }
        assert_eq!(index.len(), 200);
        for n in 0..200 {
            assert_eq!(index.get(&format!("pkg{n}")), Some(&n));
        }
    }

    #[test]
    fn overwrite_existing_name_does_not_grow_count() {
        let mut index = NameHashIndex::new();
        index.insert("openssl", 1);
        index.insert("openssl", 2);
        assert_eq!(index.len(), 1);
        assert_eq!(index.get("openssl"), Some(&2));
    }
}
