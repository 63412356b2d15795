//! Data directory management.
//!
//! ```text
//! <data_dir>/
//! ├─ LOCK              # Advisory lock for single-writer
//! ├─ credentials.log   # Registered credentials
//! ├─ cursors.log       # Per-credential NSU cursor
//! ├─ cooldowns.log     # Per-credential "no new documents" window
//! ├─ documents.log     # Document records
//! └─ acks.log          # Acknowledgment ledger
//! ```
//!
//! The LOCK file ensures only one engine process writes at a time.

use crate::error::{StoreError, StoreResult};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "LOCK";

/// Holds an exclusive lock on the data directory for its lifetime.
#[derive(Debug)]
pub struct DataDir {
    path: PathBuf,
    _lock_file: File,
}

impl DataDir {
    /// Opens or creates a data directory and takes its lock.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The directory doesn't exist and `create_if_missing` is false
    /// - Another process holds the lock (returns `Locked`)
    /// - I/O errors occur
    pub fn open(path: &Path, create_if_missing: bool) -> StoreResult<Self> {
        if !path.exists() {
            if create_if_missing {
                fs::create_dir_all(path)?;
            } else {
                return Err(StoreError::invalid_directory(format!(
                    "data directory does not exist: {}",
                    path.display()
                )));
            }
        }

        if !path.is_dir() {
            return Err(StoreError::invalid_directory(format!(
                "path is not a directory: {}",
                path.display()
            )));
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(StoreError::Locked);
        }

        Ok(Self {
            path: path.to_path_buf(),
            _lock_file: lock_file,
        })
    }

    /// Returns the directory path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the path of the log named `name`.
    #[must_use]
    pub fn log_path(&self, name: &str) -> PathBuf {
        self.path.join(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn creates_missing_directory() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("data");
        let dir = DataDir::open(&path, true).unwrap();
        assert!(dir.path().join(LOCK_FILE).exists());
        assert_eq!(dir.log_path("cursors.log"), path.join("cursors.log"));
    }

    #[test]
    fn refuses_missing_directory_without_create() {
        let tmp = tempdir().unwrap();
        let result = DataDir::open(&tmp.path().join("absent"), false);
        assert!(matches!(result, Err(StoreError::InvalidDirectory { .. })));
    }

    #[test]
    fn second_open_is_locked() {
        let tmp = tempdir().unwrap();
        let _first = DataDir::open(tmp.path(), true).unwrap();
        let second = DataDir::open(tmp.path(), true);
        assert!(matches!(second, Err(StoreError::Locked)));
    }

    #[test]
    fn lock_released_on_drop() {
        let tmp = tempdir().unwrap();
        drop(DataDir::open(tmp.path(), true).unwrap());
        assert!(DataDir::open(tmp.path(), true).is_ok());
    }
}
