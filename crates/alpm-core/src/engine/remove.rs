//! Package removal: deletes the files a package owns, honoring
//! `skip_remove` and the backup-file `.pacsave` rule, in deepest-first
//! order so directories have a chance to empty out before removal.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use alpm_types::ContentHash;

use crate::error::AlpmError;
use crate::package::Package;
use crate::ports::Hasher;
use crate::reporter::{EventKind, Reporter};

use super::append_suffix;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
enum RemoveAction {
    Delete,
    SaveAsPacsave,
    Skip,
}

fn resolve_remove_action(
    disk: Option<&ContentHash>,
    recorded: Option<&ContentHash>,
    no_save: bool,
    skip: bool,
) -> RemoveAction {
    if skip {
        return RemoveAction::Skip;
    }
    match (recorded, disk) {
        (Some(recorded), Some(disk)) if !no_save && disk != recorded => RemoveAction::SaveAsPacsave,
        _ => RemoveAction::Delete,
    }
}

/// Remove every file `pkg` owns under `root`.
///
/// # Errors
/// Returns [`AlpmError::PkgCantRemove`] if a file fails to delete for a
/// reason other than already being gone.
pub(super) fn remove_files(
    pkg: &Package,
    root: &Path,
    hasher: &dyn Hasher,
    no_save: bool,
    skip_remove: &HashSet<PathBuf>,
    reporter: &dyn Reporter,
) -> Result<(), AlpmError> {
    let mut paths = pkg.files.clone();
    paths.sort_by(|a, b| b.components().count().cmp(&a.components().count()).then_with(|| b.cmp(a)));

    for rel in &paths {
        let path = root.join(rel);
        let recorded = pkg.backup.get(rel);
        let disk_hash = hasher.hash_file(&path).ok();
        let action = resolve_remove_action(disk_hash.as_ref(), recorded, no_save, skip_remove.contains(rel));

        match action {
            RemoveAction::Skip => continue,
            RemoveAction::SaveAsPacsave => {
                let _ = fs::rename(&path, append_suffix(&path, "pacsave"));
            }
            RemoveAction::Delete => delete_one(&path, pkg)?,
        }
        reporter.event(EventKind::RemoveDone, &rel.display().to_string(), "");
    }

    Ok(())
}

fn delete_one(path: &Path, pkg: &Package) -> Result<(), AlpmError> {
    let result = if path.is_dir() { fs::remove_dir(path) } else { fs::remove_file(path) };
    match result {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) if path.is_dir() => {
            // A non-empty directory left behind by another package is
            // expected, not a failure: it still owns files here.
            let _ = e;
            Ok(())
        }
        Err(e) => Err(AlpmError::PkgCantRemove {
            name: pkg.name.clone(),
            reason: e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn untouched_backup_file_deletes_cleanly() {
        let recorded = ContentHash::new("a".repeat(64)).unwrap();
        let disk = recorded.clone();
        assert_eq!(resolve_remove_action(Some(&disk), Some(&recorded), false, false), RemoveAction::Delete);
    }

    #[test]
    fn modified_backup_file_is_saved() {
        let recorded = ContentHash::new("a".repeat(64)).unwrap();
        let disk = ContentHash::new("b".repeat(64)).unwrap();
        assert_eq!(
            resolve_remove_action(Some(&disk), Some(&recorded), false, false),
            RemoveAction::SaveAsPacsave
        );
    }

    #[test]
    fn no_save_forces_plain_delete_even_if_modified() {
        let recorded = ContentHash::new("a".repeat(64)).unwrap();
        let disk = ContentHash::new("b".repeat(64)).unwrap();
        assert_eq!(resolve_remove_action(Some(&disk), Some(&recorded), true, false), RemoveAction::Delete);
    }

    #[test]
    fn skip_listed_path_is_left_alone() {
        assert_eq!(resolve_remove_action(None, None, false, true), RemoveAction::Skip);
    }
}
