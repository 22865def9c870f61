//! ---
//! mtce_section: "03-persistence-logging"
//! mtce_subsection: "module"
//! mtce_type: "source"
//! mtce_scope: "code"
//! mtce_description: "Small file-backed stores owned by the maintenance agent."
//! mtce_version: "v0.0.0-prealpha"
//! mtce_owner: "tbd"
//! ---
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::{PersistenceError, Result};

const FILE_SUFFIX: &str = "_ar_count";

/// Per-host auto-recovery attempt counters kept as `<dir>/<hostname>_ar_count`.
///
/// Each file holds a single decimal integer.
#[derive(Debug, Clone)]
pub struct ArCountStore {
    dir: PathBuf,
}

impl ArCountStore {
    /// Create a store rooted at `dir`. The directory is created lazily.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory holding the counter files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the counter file for `hostname`.
    pub fn path_for(&self, hostname: &str) -> PathBuf {
        self.dir.join(format!("{hostname}{FILE_SUFFIX}"))
    }

    /// Current count; a missing file reads as zero.
    pub fn read(&self, hostname: &str) -> Result<u32> {
        let path = self.path_for(hostname);
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(0),
            Err(err) => return Err(err.into()),
        };
        let trimmed = contents.trim();
        if trimmed.is_empty() {
            return Ok(0);
        }
        trimmed.parse::<u32>().map_err(|_| PersistenceError::Corrupt {
            path,
            contents: trimmed.to_owned(),
        })
    }

    /// Overwrite the count for `hostname`.
    pub fn write(&self, hostname: &str, count: u32) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(hostname);
        fs::write(&path, format!("{count}\n"))?;
        debug!(host = hostname, count, path = %path.display(), "auto-recovery count saved");
        Ok(())
    }

    /// Increment and return the new count. A corrupt file restarts at one.
    pub fn increment(&self, hostname: &str) -> Result<u32> {
        let current = match self.read(hostname) {
            Ok(count) => count,
            Err(PersistenceError::Corrupt { .. }) => 0,
            Err(err) => return Err(err),
        };
        let next = current.saturating_add(1);
        self.write(hostname, next)?;
        Ok(next)
    }

    /// Remove the counter file. Removing a missing file is not an error.
    pub fn clear(&self, hostname: &str) -> Result<()> {
        match fs::remove_file(self.path_for(hostname)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_reads_zero() {
        let dir = tempdir().unwrap();
        let store = ArCountStore::new(dir.path());
        assert_eq!(store.read("controller-0").unwrap(), 0);
        store.clear("controller-0").unwrap();
    }

    #[test]
    fn increment_persists_across_instances() {
        let dir = tempdir().unwrap();
        let store = ArCountStore::new(dir.path().join("nested"));
        assert_eq!(store.increment("controller-0").unwrap(), 1);
        assert_eq!(store.increment("controller-0").unwrap(), 2);

        let reopened = ArCountStore::new(dir.path().join("nested"));
        assert_eq!(reopened.read("controller-0").unwrap(), 2);
        assert_eq!(
            fs::read_to_string(reopened.path_for("controller-0")).unwrap(),
            "2\n"
        );
    }

    #[test]
    fn corrupt_file_is_reported_and_incremented_from_zero() {
        let dir = tempdir().unwrap();
        let store = ArCountStore::new(dir.path());
        fs::write(store.path_for("storage-0"), "garbage").unwrap();
        assert!(matches!(
            store.read("storage-0"),
            Err(PersistenceError::Corrupt { .. })
        ));
        assert_eq!(store.increment("storage-0").unwrap(), 1);
    }
}
