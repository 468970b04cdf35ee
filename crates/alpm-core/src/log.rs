//! The normative audit log (spec §6): `[MM/DD/YY HH:MM] <message>` lines,
//! with a `warning:`/`error:` prefix when applicable.
//!
//! Kept separate from `tracing` because its format is an on-disk contract
//! consumers may grep or rotate, not a debugging aid — it must not drift
//! with whatever `tracing` subscriber happens to be installed.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

/// Severity of an audit log line.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Level {
    /// A plain informational line.
    Info,
    /// Prefixed `warning:`.
    Warning,
    /// Prefixed `error:`.
    Error,
}

/// Appends lines to the configured `log_file` in the normative format.
#[derive(Debug)]
pub struct AuditLog {
    path: PathBuf,
}

impl AuditLog {
    /// Open (creating if necessary) the audit log at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Append one line, timestamped with the current UTC time.
    ///
    /// # Errors
    /// Returns the underlying [`io::Error`] if the log file cannot be
    /// opened or written.
    pub fn write(&self, level: Level, message: &str) -> io::Result<()> {
        self.write_at(Utc::now(), level, message)
    }

    /// As [`AuditLog::write`], but with an explicit timestamp — the entry
    /// point used by tests so assertions don't depend on wall-clock time.
    pub fn write_at(&self, at: DateTime<Utc>, level: Level, message: &str) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        let line = format_line(at, level, message);
        writeln!(file, "{line}")?;
        file.sync_all()
    }

    /// The path this log appends to.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn format_line(at: DateTime<Utc>, level: Level, message: &str) -> String {
    let stamp = at.format("%m/%d/%y %H:%M");
    match level {
        Level::Info => format!("[{stamp}] {message}"),
        Level::Warning => format!("[{stamp}] warning: {message}"),
        Level::Error => format!("[{stamp}] error: {message}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn formats_plain_info_line() {
        let at = Utc.with_ymd_and_hms(2024, 3, 7, 14, 5, 0).unwrap();
        assert_eq!(format_line(at, Level::Info, "installed foo-1.0-1"), "[03/07/24 14:05] installed foo-1.0-1");
    }

    #[test]
    fn prefixes_warning_and_error() {
        let at = Utc.with_ymd_and_hms(2024, 3, 7, 14, 5, 0).unwrap();
        assert_eq!(
            format_line(at, Level::Warning, "backup file diverged"),
            "[03/07/24 14:05] warning: backup file diverged"
        );
        assert_eq!(
            format_line(at, Level::Error, "db write failed"),
            "[03/07/24 14:05] error: db write failed"
        );
    }

    #[test]
    fn appends_across_writes() {
        let dir = tempfile::tempdir().unwrap();
        let log = AuditLog::new(dir.path().join("alpm.log"));
        let at = Utc.with_ymd_and_hms(2024, 3, 7, 14, 5, 0).unwrap();
        log.write_at(at, Level::Info, "first").unwrap();
        log.write_at(at, Level::Info, "second").unwrap();
        let contents = std::fs::read_to_string(log.path()).unwrap();
        assert_eq!(contents.lines().count(), 2);
    }
}
