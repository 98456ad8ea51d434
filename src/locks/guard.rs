//! RAII lock guard implementation.

use crate::error::{Result, WardenError};
use std::fs;
use std::path::{Path, PathBuf};

/// RAII guard for a held lock file.
///
/// Dropping the guard deletes the lock file; a failed deletion prints a
/// warning naming the covered operation but never panics, since the
/// exclusive section it protected has already ended.
#[derive(Debug)]
pub struct LockGuard {
    path: PathBuf,
    action: String,
    released: bool,
}

impl LockGuard {
    /// Create a guard for an acquired lock.
    pub(super) fn new(path: PathBuf, action: impl Into<String>) -> Self {
        Self {
            path,
            action: action.into(),
            released: false,
        }
    }

    /// Get the path to the lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Release the lock eagerly, surfacing deletion errors to the caller
    /// instead of deferring them to drop.
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        fs::remove_file(&self.path).map_err(|e| {
            WardenError::LockError(format!(
                "failed to release {} lock '{}': {}",
                self.action,
                self.path.display(),
                e
            ))
        })
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = fs::remove_file(&self.path) {
            eprintln!(
                "Warning: failed to release {} lock '{}': {}",
                self.action,
                self.path.display(),
                e
            );
        }
    }
}
