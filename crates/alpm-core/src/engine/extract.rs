//! Archive extraction and the backup-file three-way merge (spec §4.6).
//!
//! A backup-listed path is resolved against up to three hashes: what's on
//! disk, what was recorded at the predecessor's install (if this is an
//! upgrade), and the incoming content. Divergence is handled differently
//! depending on which side of the merge it's on: an upgrade whose three
//! hashes all differ keeps the disk copy and stages the incoming content
//! as `.pacnew` (the disk copy is presumed to be a deliberate local edit);
//! a fresh install colliding with a foreign, pre-existing file instead
//! preserves *that* file as `.pacorig` and installs the package's content
//! in its place, since there is no predecessor whose intent to defer to.

use std::collections::HashSet;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

use alpm_types::ContentHash;

use crate::error::AlpmError;
use crate::package::Package;
use crate::ports::{ArchiveReader, Hasher};
use crate::reporter::{EventKind, Reporter};

use super::append_suffix;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
enum BackupAction {
    /// No prior content worth preserving (or it matches exactly what was
    /// recorded at the last install): extract normally.
    Overwrite,
    /// The incoming content is already what's on disk.
    NoopUpToDate,
    /// Upgrade whose three hashes all differ: stage the incoming content
    /// as `.pacnew`, leave the disk copy (presumed a local edit) in place.
    WriteAsPacnew,
    /// Fresh install colliding with a foreign file: preserve the existing
    /// file as `.pacorig`, then install normally.
    SaveOriginalThenOverwrite,
}

fn resolve_backup_action(disk: Option<&ContentHash>, old: Option<&ContentHash>, new: &ContentHash) -> BackupAction {
    let Some(disk_hash) = disk else {
        return BackupAction::Overwrite;
    };
    match old {
        // Untouched since the predecessor's install: safe to overwrite.
        Some(old_hash) if disk_hash == old_hash => BackupAction::Overwrite,
        // The incoming package didn't actually change this file's
        // content, so whatever is on disk (edited or not) stands.
        Some(old_hash) if old_hash == new => BackupAction::NoopUpToDate,
        Some(_) => BackupAction::WriteAsPacnew,
        None if disk_hash == new => BackupAction::NoopUpToDate,
        None => BackupAction::SaveOriginalThenOverwrite,
    }
}

/// Extract every entry of `reader` under `root` for `new` (optionally
/// upgrading `old`), honoring backup-file semantics, the
/// `no_upgrade`/`no_extract` path sets, and `skip_add`.
///
/// # Errors
/// Returns [`AlpmError::System`] on any filesystem failure.
#[allow(clippy::too_many_arguments)]
pub(super) fn extract<R: ArchiveReader>(
    reader: &mut R,
    root: &Path,
    new: &Package,
    old: Option<&Package>,
    hasher: &dyn Hasher,
    no_upgrade: &HashSet<PathBuf>,
    no_extract: &HashSet<PathBuf>,
    skip_add: &HashSet<PathBuf>,
    reporter: &dyn Reporter,
) -> Result<(), AlpmError> {
    while let Some(entry) = reader.next_entry().map_err(AlpmError::System)? {
        if no_extract.contains(&entry.path) || skip_add.contains(&entry.path) {
            continue;
        }
        let dest = root.join(&entry.path);

        if entry.is_dir {
            fs::create_dir_all(&dest).map_err(AlpmError::System)?;
            continue;
        }

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(AlpmError::System)?;
        }

        if let Some(target) = &entry.symlink_target {
            let _ = fs::remove_file(&dest);
            #[cfg(unix)]
            std::os::unix::fs::symlink(target, &dest).map_err(AlpmError::System)?;
            reporter.event(EventKind::ExtractDone, &entry.path.display().to_string(), "");
            continue;
        }

        let mut data = Vec::with_capacity(entry.size as usize);
        reader
            .read_data()
            .map_err(AlpmError::System)?
            .read_to_end(&mut data)
            .map_err(AlpmError::System)?;

        if new.backup.contains_key(&entry.path) {
            let new_hash = hasher.hash_bytes(&data);
            let disk_hash = hasher.hash_file(&dest).ok();
            let old_hash = old.and_then(|o| o.backup.get(&entry.path));

            match resolve_backup_action(disk_hash.as_ref(), old_hash, &new_hash) {
                BackupAction::NoopUpToDate => continue,
                BackupAction::Overwrite => write_entry(&dest, &data, entry.mode)?,
                BackupAction::WriteAsPacnew => {
                    write_entry(&append_suffix(&dest, "pacnew"), &data, entry.mode)?;
                    reporter.event(EventKind::ExtractDone, &entry.path.display().to_string(), "pacnew");
                    continue;
                }
                BackupAction::SaveOriginalThenOverwrite => {
                    fs::rename(&dest, append_suffix(&dest, "pacorig")).map_err(AlpmError::System)?;
                    write_entry(&dest, &data, entry.mode)?;
                    reporter.event(EventKind::ExtractDone, &entry.path.display().to_string(), "pacorig");
                }
            }
        } else if no_upgrade.contains(&entry.path) && dest.exists() {
            write_entry(&append_suffix(&dest, "pacnew"), &data, entry.mode)?;
            reporter.event(EventKind::ExtractDone, &entry.path.display().to_string(), "pacnew");
            continue;
        } else {
            write_entry(&dest, &data, entry.mode)?;
        }

        reporter.event(EventKind::ExtractDone, &entry.path.display().to_string(), "");
    }
    Ok(())
}

fn write_entry(dest: &Path, data: &[u8], mode: u32) -> Result<(), AlpmError> {
    fs::write(dest, data).map_err(AlpmError::System)?;
    #[cfg(unix)]
    fs::set_permissions(dest, fs::Permissions::from_mode(mode)).map_err(AlpmError::System)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn untouched_backup_file_is_overwritten() {
        let old_hash = ContentHash::new("a".repeat(64)).unwrap();
        let disk = old_hash.clone();
        let new_hash = ContentHash::new("b".repeat(64)).unwrap();
        assert_eq!(
            resolve_backup_action(Some(&disk), Some(&old_hash), &new_hash),
            BackupAction::Overwrite
        );
    }

    #[test]
    fn locally_modified_backup_file_becomes_pacnew() {
        let old_hash = ContentHash::new("a".repeat(64)).unwrap();
        let disk = ContentHash::new("c".repeat(64)).unwrap();
        let new_hash = ContentHash::new("b".repeat(64)).unwrap();
        assert_eq!(
            resolve_backup_action(Some(&disk), Some(&old_hash), &new_hash),
            BackupAction::WriteAsPacnew
        );
    }

    #[test]
    fn unchanged_incoming_content_keeps_the_local_edit() {
        let hash = ContentHash::new("a".repeat(64)).unwrap();
        let disk = ContentHash::new("c".repeat(64)).unwrap();
        assert_eq!(resolve_backup_action(Some(&disk), Some(&hash), &hash), BackupAction::NoopUpToDate);
    }

    #[test]
    fn disk_already_matching_incoming_is_a_noop() {
        let new_hash = ContentHash::new("b".repeat(64)).unwrap();
        let disk = new_hash.clone();
        assert_eq!(resolve_backup_action(Some(&disk), None, &new_hash), BackupAction::NoopUpToDate);
    }

    #[test]
    fn fresh_install_colliding_with_a_foreign_file_preserves_it() {
        let disk = ContentHash::new("c".repeat(64)).unwrap();
        let new_hash = ContentHash::new("b".repeat(64)).unwrap();
        assert_eq!(
            resolve_backup_action(Some(&disk), None, &new_hash),
            BackupAction::SaveOriginalThenOverwrite
        );
    }

    #[test]
    fn no_prior_file_is_a_plain_overwrite() {
        let new_hash = ContentHash::new("b".repeat(64)).unwrap();
        assert_eq!(resolve_backup_action(None, None, &new_hash), BackupAction::Overwrite);
    }
}
