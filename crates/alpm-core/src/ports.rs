//! Capability ports the engine consumes but does not own (spec §1, §6).
//!
//! The core calls through these traits; it never speaks a network
//! protocol, decompresses an archive, verifies a signature, or runs a
//! scriptlet itself. Default, test-oriented implementations are provided
//! behind the `default-ports` feature purely so the file-apply engine can
//! be exercised end to end without a front-end — they are a convenience,
//! not part of the contract (see `DESIGN.md`).

use std::io::{self, Read};
use std::path::{Path, PathBuf};

use alpm_types::ContentHash;

/// One entry of an opened package archive, in archive order.
#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    /// Path of this entry relative to the extraction root.
    pub path: PathBuf,
    /// Unix file mode bits.
    pub mode: u32,
    /// Entry size in bytes.
    pub size: u64,
    /// Whether this entry is a directory rather than a regular file.
    pub is_dir: bool,
    /// Whether this entry is a symlink, and if so its target.
    pub symlink_target: Option<PathBuf>,
}

/// A readable package archive: yields entries in archive order and their
/// data streams, hard-link-aware.
pub trait ArchiveReader {
    /// The per-entry data-stream reader type.
    type EntryData<'a>: Read + 'a
    where
        Self: 'a;

    /// The next entry, or `None` at end of archive.
    ///
    /// # Errors
    /// Returns an [`io::Error`] on a malformed or truncated archive.
    fn next_entry(&mut self) -> io::Result<Option<ArchiveEntry>>;

    /// A reader over the data of the entry just returned by
    /// [`ArchiveReader::next_entry`]. Calling this before any
    /// `next_entry` call, or again without an intervening `next_entry`,
    /// is a logic error left to the implementation to guard against.
    ///
    /// # Errors
    /// Returns an [`io::Error`] if the entry's data cannot be read.
    fn read_data(&mut self) -> io::Result<Self::EntryData<'_>>;
}

/// Result of a conditional download (spec §6).
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    /// A new or updated copy was saved.
    Saved {
        /// Where the artifact was written.
        path: PathBuf,
        /// The artifact's new modification time, if the transport knows it.
        mtime: Option<i64>,
    },
    /// The remote copy is not newer than `if_mtime_newer_than`; nothing
    /// was downloaded.
    Unchanged,
}

/// Downloads an artifact into the configured cache directory.
pub trait Fetcher {
    /// Fetch `url` into `dest_dir`, skipping the download if the remote
    /// resource is not newer than `if_mtime_newer_than`.
    ///
    /// # Errors
    /// Returns an [`io::Error`] on transport failure.
    fn fetch(
        &self,
        url: &str,
        dest_dir: &Path,
        if_mtime_newer_than: Option<i64>,
    ) -> io::Result<FetchOutcome>;
}

/// Computes the content hash of a file. Must be stable across runs — the
/// backup-file three-way merge (§4.6) compares hashes computed at
/// different times and by different callers.
pub trait Hasher {
    /// Hash the file at `path`.
    ///
    /// # Errors
    /// Returns an [`io::Error`] if `path` cannot be read.
    fn hash_file(&self, path: &Path) -> io::Result<ContentHash>;

    /// Hash an in-memory buffer, for entries read straight out of an
    /// archive without first touching disk.
    fn hash_bytes(&self, data: &[u8]) -> ContentHash;
}

/// A level of trust a signature verification returned, consumed opaquely
/// by the core (it makes no policy decision based on the value itself).
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum TrustLevel {
    /// Signed by a fully trusted key.
    Trusted,
    /// Signed by a key present but not marked trusted.
    Marginal,
    /// No valid signature found.
    Unknown,
    /// Verification failed outright (bad signature, revoked key, ...).
    Invalid,
}

/// Verifies a detached signature against a file.
pub trait Signer {
    /// Verify `signature` against `artifact`.
    ///
    /// # Errors
    /// Returns an [`io::Error`] if either file cannot be read.
    fn verify(&self, artifact: &Path, signature: &Path) -> io::Result<TrustLevel>;
}

/// The scriptlet hook points a package's `.INSTALL` script may define.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ScriptletHook {
    /// Runs before a fresh install.
    PreInstall,
    /// Runs after a fresh install.
    PostInstall,
    /// Runs before an upgrade.
    PreUpgrade,
    /// Runs after an upgrade.
    PostUpgrade,
    /// Runs before a removal.
    PreRemove,
    /// Runs after a removal.
    PostRemove,
}

/// Runs a named scriptlet hook, chrooted to `root_path`. Per spec §1,
/// scriptlet failure is treated as a non-fatal warning by the caller, not
/// by the port itself — this trait only reports what happened.
pub trait ScriptletRunner {
    /// Run `hook` from the `.INSTALL` script at `script_path`, passing
    /// `versions` (old, new) as the script sees them.
    ///
    /// # Errors
    /// Returns an [`io::Error`] if the scriptlet could not be invoked at
    /// all (missing interpreter, chroot failure, ...); a nonzero exit
    /// from a scriptlet that *did* run is reported as `Ok(false)`.
    fn run_scriptlet(
        &self,
        root: &Path,
        script_path: &Path,
        hook: ScriptletHook,
        versions: (Option<&str>, Option<&str>),
    ) -> io::Result<bool>;
}

#[cfg(feature = "default-ports")]
pub mod defaults {
    //! Convenience default port implementations, feature-gated behind
    //! `default-ports`. Not part of the public contract: any caller may
    //! supply its own.

    use std::fs::File;
    use std::io::{self, BufReader, Read};
    use std::path::{Path, PathBuf};

    use alpm_types::ContentHash;
    use sha2::{Digest, Sha256};

    use super::{ArchiveEntry, ArchiveReader, Hasher};

    /// A [`Hasher`] backed by `sha2`'s SHA-256 implementation.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct Sha256Hasher;

    impl Hasher for Sha256Hasher {
        fn hash_file(&self, path: &Path) -> io::Result<ContentHash> {
            let mut file = BufReader::new(File::open(path)?);
            let mut hasher = Sha256::new();
            let mut buf = [0u8; 8192];
            loop {
                let n = file.read(&mut buf)?;
                if n == 0 {
                    break;
                }
                hasher.update(&buf[..n]);
            }
            let digest = hex::encode(hasher.finalize());
            ContentHash::new(digest)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))
        }

        fn hash_bytes(&self, data: &[u8]) -> ContentHash {
            let digest = hex::encode(Sha256::digest(data));
            ContentHash::new(digest).expect("sha2 digest is always 64 hex chars")
        }
    }

    /// An [`ArchiveReader`] over a plain (optionally gzip-compressed) tar
    /// stream, using the `tar`/`flate2` crates already in the dependency
    /// tree for the extraction the teacher repo does elsewhere.
    ///
    /// `tar::Archive::entries()` borrows the archive for the life of the
    /// iterator, which doesn't fit a cursor trait that hands out one
    /// entry at a time behind `&mut self`; rather than self-referential
    /// storage, this implementation drains the whole archive up front
    /// into owned buffers. Archives this engine applies are package
    /// archives, not arbitrary-size media, so holding one fully in memory
    /// is an acceptable trade for a convenience/test implementation.
    pub struct TarArchiveReader {
        remaining: std::collections::VecDeque<(ArchiveEntry, Vec<u8>)>,
        current: Option<io::Cursor<Vec<u8>>>,
    }

    impl TarArchiveReader {
        /// Open a plain (uncompressed) tar file.
        ///
        /// # Errors
        /// Returns an [`io::Error`] if `path` cannot be opened or is not
        /// a well-formed tar stream.
        pub fn open(path: &Path) -> io::Result<Self> {
            Self::from_reader(File::open(path)?)
        }

        /// Open a gzip-compressed tar file (`.tar.gz`).
        ///
        /// # Errors
        /// Returns an [`io::Error`] if `path` cannot be opened or is not
        /// a well-formed gzip/tar stream.
        pub fn open_gz(path: &Path) -> io::Result<Self> {
            Self::from_reader(flate2::read::GzDecoder::new(File::open(path)?))
        }

        fn from_reader(reader: impl Read) -> io::Result<Self> {
            let mut archive = tar::Archive::new(reader);
            let mut remaining = std::collections::VecDeque::new();
            for entry in archive.entries()? {
                let mut entry = entry?;
                let header = entry.header();
                let meta = ArchiveEntry {
                    path: entry.path()?.into_owned(),
                    mode: header.mode()?,
                    size: header.size()?,
                    is_dir: header.entry_type().is_dir(),
                    symlink_target: entry.link_name()?.map(|p| p.into_owned()),
                };
                let mut data = Vec::with_capacity(meta.size as usize);
                entry.read_to_end(&mut data)?;
                remaining.push_back((meta, data));
            }
            Ok(Self {
                remaining,
                current: None,
            })
        }
    }

    impl ArchiveReader for TarArchiveReader {
        type EntryData<'a> = &'a mut io::Cursor<Vec<u8>>;

        fn next_entry(&mut self) -> io::Result<Option<ArchiveEntry>> {
            match self.remaining.pop_front() {
                Some((meta, data)) => {
                    self.current = Some(io::Cursor::new(data));
                    Ok(Some(meta))
                }
                None => {
                    self.current = None;
                    Ok(None)
                }
            }
        }

        fn read_data(&mut self) -> io::Result<Self::EntryData<'_>> {
            self.current
                .as_mut()
                .ok_or_else(|| io::Error::other("read_data called with no current entry"))
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn sha256_hasher_matches_known_digest() {
            let hasher = Sha256Hasher;
            let hash = hasher.hash_bytes(b"");
            assert_eq!(
                hash.as_str(),
                "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b85"
            );
        }

        #[test]
        fn tar_archive_reader_yields_entries_in_order() {
            let dir = tempfile::tempdir().unwrap();
            let tar_path = dir.path().join("pkg.tar");
            {
                let file = File::create(&tar_path).unwrap();
                let mut builder = tar::Builder::new(file);
                let mut header = tar::Header::new_gnu();
                header.set_size(5);
                header.set_mode(0o644);
                header.set_cksum();
                builder.append_data(&mut header, "usr/bin/foo", &b"hello"[..]).unwrap();
                builder.finish().unwrap();
            }

            let mut reader = TarArchiveReader::open(&tar_path).unwrap();
            let entry = reader.next_entry().unwrap().expect("one entry");
            assert_eq!(entry.path, PathBuf::from("usr/bin/foo"));
            assert_eq!(entry.size, 5);

            let mut buf = Vec::new();
            reader.read_data().unwrap().read_to_end(&mut buf).unwrap();
            assert_eq!(buf, b"hello");

            assert!(reader.next_entry().unwrap().is_none());
        }
    }
}
