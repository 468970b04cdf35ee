//! Engine configuration (spec §6).
//!
//! `Options` is constructed programmatically: parsing `pacman.conf`-style
//! syntax is a front-end concern and stays out of the core, the same way
//! the distilled spec frames "interfaces the core consumes" rather than
//! owns. Mirrors the style of `apl-core::paths`, which also centers
//! everything on a handful of configured root paths.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Configuration options recognized by the core (spec §6).
#[derive(Debug, Clone)]
pub struct Options {
    /// Filesystem prefix for all extraction. Default `/`.
    pub root_path: PathBuf,
    /// Where `local/` and `sync/<repo>/` live.
    pub db_path: PathBuf,
    /// Where downloaded archives are placed.
    pub cache_dir: PathBuf,
    /// Path of the exclusive transaction lock file.
    pub lock_file: PathBuf,
    /// Append-only audit log path.
    pub log_file: PathBuf,
    /// Paths extracted as `.pacnew` when already present on disk.
    pub no_upgrade: HashSet<PathBuf>,
    /// Paths never extracted.
    pub no_extract: HashSet<PathBuf>,
    /// Package names that prompt a confirmation question on upgrade.
    pub ignore_pkg: HashSet<String>,
    /// Package names that prompt a confirmation question on remove.
    pub hold_pkg: HashSet<String>,
}

impl Options {
    /// Build the default option set rooted at `root_path`, deriving the
    /// rest of the paths underneath it the way a fresh install would.
    pub fn rooted_at(root_path: impl Into<PathBuf>) -> Self {
        let root_path = root_path.into();
        let db_path = root_path.join("var/lib/alpm");
        Self {
            cache_dir: root_path.join("var/cache/alpm/pkg"),
            lock_file: db_path.join("db.lck"),
            log_file: root_path.join("var/log/alpm.log"),
            db_path,
            root_path,
            no_upgrade: HashSet::new(),
            no_extract: HashSet::new(),
            ignore_pkg: HashSet::new(),
            hold_pkg: HashSet::new(),
        }
    }

    /// The local database directory (`db_path/local`).
    pub fn local_db_path(&self) -> PathBuf {
        self.db_path.join("local")
    }

    /// A sync database directory (`db_path/sync/<repo>`).
    pub fn sync_db_path(&self, repo: &str) -> PathBuf {
        self.db_path.join("sync").join(repo)
    }

    /// Whether `path` is on the `no_upgrade` list.
    pub fn is_no_upgrade(&self, path: &Path) -> bool {
        self.no_upgrade.contains(path)
    }

    /// Whether `path` is on the `no_extract` list.
    pub fn is_no_extract(&self, path: &Path) -> bool {
        self.no_extract.contains(path)
    }
}

impl Default for Options {
    fn default() -> Self {
        Self::rooted_at("/")
    }
}

/// Transaction flags (spec §6), a bitset expressed as a bool-struct: the
/// workspace carries no bitflags crate, and a set this small is clearer as
/// plain fields than as a packed integer.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub struct TransactionFlags {
    /// Skip dependency checking and resolution entirely.
    pub no_deps: bool,
    /// Overwrite conflicting files instead of failing.
    pub force: bool,
    /// Don't save `.pacsave` sidecars when removing backup files.
    pub no_save: bool,
    /// Upgrade only if already installed; skip silently otherwise.
    pub freshen: bool,
    /// Remove dependent packages recursively (Remove transactions).
    pub cascade: bool,
    /// Remove unneeded dependencies of the target (Remove transactions).
    pub recurse: bool,
    /// Only update the database; skip file-apply entirely.
    pub db_only: bool,
    /// Only install dependencies of the targets, not the targets themselves.
    pub depends_only: bool,
    /// Treat all targets as dependencies for `install_reason` purposes.
    pub all_deps: bool,
    /// Download/stage the archives but do not apply the transaction.
    pub download_only: bool,
    /// Do not run install scriptlets.
    pub no_scriptlet: bool,
    /// Skip conflict checking (Phase D).
    pub no_conflicts: bool,
    /// Only print resolved download URIs; take no other action.
    pub print_uris: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rooted_at_derives_consistent_paths() {
        let opts = Options::rooted_at("/mnt/root");
        assert_eq!(opts.root_path, PathBuf::from("/mnt/root"));
        assert_eq!(opts.local_db_path(), PathBuf::from("/mnt/root/var/lib/alpm/local"));
        assert_eq!(
            opts.sync_db_path("core"),
            PathBuf::from("/mnt/root/var/lib/alpm/sync/core")
        );
    }

    #[test]
    fn default_is_rooted_at_slash() {
        let opts = Options::default();
        assert_eq!(opts.root_path, PathBuf::from("/"));
    }
}
