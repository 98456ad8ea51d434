//! Lock acquisition operations.

use super::guard::LockGuard;
use super::metadata::LockMetadata;
use crate::context::WardenContext;
use crate::error::{Result, WardenError};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::time::Duration;

/// How many times a budget-lock acquisition retries before giving up.
const BUDGET_LOCK_ATTEMPTS: u32 = 50;

/// Pause between budget-lock acquisition attempts.
const BUDGET_LOCK_RETRY: Duration = Duration::from_millis(10);

/// Acquire a lock file using create_new semantics.
///
/// Creates the lock file exclusively — if the file already exists, the
/// operation fails with a `LockError` describing the current holder.
pub fn acquire_lock(lock_path: &Path, metadata: &LockMetadata) -> Result<LockGuard> {
    // Ensure the locks directory exists
    if let Some(parent) = lock_path.parent()
        && !parent.exists()
    {
        fs::create_dir_all(parent).map_err(|e| {
            WardenError::UserError(format!(
                "failed to create locks directory '{}': {}",
                parent.display(),
                e
            ))
        })?;
    }

    // Try to create the lock file exclusively
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(lock_path)
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::AlreadyExists {
                // Try to read the existing lock metadata for a helpful error message
                let existing_info = match LockMetadata::from_file(lock_path) {
                    Ok(meta) => format!(
                        "\nLock: {} (held for {} by {}, pid {})\nAction: {}",
                        lock_path.display(),
                        meta.age_string(),
                        meta.owner,
                        meta.pid,
                        meta.action
                    ),
                    Err(_) => format!("\nLock: {}", lock_path.display()),
                };
                WardenError::LockError(format!("lock is held by another process{}", existing_info))
            } else {
                WardenError::LockError(format!(
                    "failed to acquire lock '{}': {}",
                    lock_path.display(),
                    e
                ))
            }
        })?;

    // Write the metadata to the lock file
    let json = metadata.to_json()?;
    file.write_all(json.as_bytes()).map_err(|e| {
        // Clean up the lock file on write failure
        let _ = fs::remove_file(lock_path);
        WardenError::LockError(format!("failed to write lock metadata: {}", e))
    })?;

    file.sync_all().map_err(|e| {
        // Clean up the lock file on sync failure
        let _ = fs::remove_file(lock_path);
        WardenError::LockError(format!("failed to sync lock file: {}", e))
    })?;

    Ok(LockGuard::new(lock_path.to_path_buf(), &metadata.action))
}

/// Acquire the budget-ledger lock for a run key.
///
/// Charge operations against the same run key must serialize, so this
/// acquisition retries with a short pause instead of failing on first
/// contention. The exclusive section per charge is short-lived and never
/// nested, so bounded retries cannot deadlock.
///
/// A lock whose holder process is gone is broken and re-acquired: a
/// crashed charge must not wedge the run's budget forever.
pub fn acquire_budget_lock(ctx: &WardenContext, run_key: &str) -> Result<LockGuard> {
    let lock_path = ctx.budget_lock_path(run_key);
    let metadata = LockMetadata::new("charge");

    let mut last_err = None;
    for attempt in 0..BUDGET_LOCK_ATTEMPTS {
        match acquire_lock(&lock_path, &metadata) {
            Ok(guard) => return Ok(guard),
            Err(err @ WardenError::LockError(_)) => {
                if let Ok(holder) = LockMetadata::from_file(&lock_path)
                    && holder.is_abandoned()
                {
                    let _ = fs::remove_file(&lock_path);
                    continue;
                }
                last_err = Some(err);
                if attempt + 1 < BUDGET_LOCK_ATTEMPTS {
                    std::thread::sleep(BUDGET_LOCK_RETRY);
                }
            }
            Err(other) => return Err(other),
        }
    }

    Err(last_err.unwrap_or_else(|| {
        WardenError::LockError(format!(
            "failed to acquire budget lock '{}'",
            lock_path.display()
        ))
    }))
}

/// Acquire the index rebuild lock for a dashboard project partition.
///
/// Fails immediately on contention: reindex calls for the same project are
/// expected to be serialized by the caller, and a held lock means another
/// indexer is mid-rebuild.
pub fn acquire_index_lock(locks_dir: &Path, project_id: &str) -> Result<LockGuard> {
    let lock_path = locks_dir.join(format!("{}.lock", project_id));
    let metadata = LockMetadata::new("index");
    acquire_lock(&lock_path, &metadata)
}
