//! Orchestration root resolution for warden.
//!
//! This module provides the "environment resolution" layer that locates the
//! orchestration root from any working directory and resolves the canonical
//! layout underneath it:
//!
//! ```text
//! <root>/warden.yaml                  configuration
//! <root>/runs/<run_id>/               run record, events, capsules, manifests, logs
//! <root>/state/budget/                read-budget ledger state + locks (transient)
//! <root>/interop/requests/            immutable interop requests
//! <root>/interop/responses/           write-once interop responses
//! ```
//!
//! All warden commands must use this module to locate state, so operations
//! always target the same root regardless of where they are invoked from.

use crate::error::{Result, WardenError};
use sha2::{Digest, Sha256};
use std::env;
use std::path::{Path, PathBuf};

/// Environment variable naming the orchestration root.
pub const ENV_ROOT: &str = "WARDEN_ROOT";

/// Configuration file name at the orchestration root.
pub const CONFIG_FILE: &str = "warden.yaml";

/// Resolved paths for the warden orchestration context.
///
/// All paths are absolute.
#[derive(Debug, Clone)]
pub struct WardenContext {
    /// Absolute path to the orchestration root.
    pub root: PathBuf,
}

impl WardenContext {
    /// Resolve the orchestration context from the environment.
    ///
    /// Resolution order:
    /// 1. `WARDEN_ROOT` environment variable (must exist)
    /// 2. Nearest ancestor of the current directory containing `warden.yaml`
    /// 3. The current directory itself
    pub fn resolve() -> Result<Self> {
        if let Ok(raw) = env::var(ENV_ROOT) {
            let root = PathBuf::from(raw);
            if !root.is_dir() {
                return Err(WardenError::UserError(format!(
                    "{} points at '{}' which is not a directory",
                    ENV_ROOT,
                    root.display()
                )));
            }
            return Ok(Self::at_root(&root));
        }

        let cwd = env::current_dir().map_err(|e| {
            WardenError::UserError(format!("failed to get current working directory: {}", e))
        })?;
        Ok(Self::resolve_from(&cwd))
    }

    /// Resolve the context by walking up from a specific directory.
    ///
    /// Falls back to the directory itself when no ancestor carries a
    /// `warden.yaml`.
    pub fn resolve_from<P: AsRef<Path>>(dir: P) -> Self {
        let start = dir.as_ref();
        let mut candidate = Some(start);
        while let Some(dir) = candidate {
            if dir.join(CONFIG_FILE).is_file() {
                return Self::at_root(dir);
            }
            candidate = dir.parent();
        }
        Self::at_root(start)
    }

    /// Build a context rooted at a known directory.
    pub fn at_root<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Get the path to the config file.
    pub fn config_path(&self) -> PathBuf {
        self.root.join(CONFIG_FILE)
    }

    /// Get the path to the runs directory.
    pub fn runs_dir(&self) -> PathBuf {
        self.root.join("runs")
    }

    /// Get the path to a run's directory.
    pub fn run_dir(&self, run_id: &str) -> PathBuf {
        self.runs_dir().join(run_id)
    }

    /// Get the path to a run's record file.
    pub fn run_record_path(&self, run_id: &str) -> PathBuf {
        self.run_dir(run_id).join("run.json")
    }

    /// Get the path to a run's append-only event stream.
    pub fn events_path(&self, run_id: &str) -> PathBuf {
        self.run_dir(run_id).join("events.jsonl")
    }

    /// Get the path to a run's capsules directory.
    pub fn capsules_dir(&self, run_id: &str) -> PathBuf {
        self.run_dir(run_id).join("capsules")
    }

    /// Get the path to a run's manifests directory.
    pub fn manifests_dir(&self, run_id: &str) -> PathBuf {
        self.run_dir(run_id).join("manifests")
    }

    /// Get the path to a run's logs directory.
    pub fn logs_dir(&self, run_id: &str) -> PathBuf {
        self.run_dir(run_id).join("logs")
    }

    /// Get the path to the transient budget-state directory.
    pub fn budget_state_dir(&self) -> PathBuf {
        self.root.join("state").join("budget")
    }

    /// Get the path to a run key's budget-ledger state record.
    pub fn budget_state_path(&self, run_key: &str) -> PathBuf {
        self.budget_state_dir()
            .join(format!("{}.json", sanitize_key(run_key)))
    }

    /// Get the path to a run key's budget-ledger lock file.
    pub fn budget_lock_path(&self, run_key: &str) -> PathBuf {
        self.budget_state_dir()
            .join(format!("{}.lock", sanitize_key(run_key)))
    }

    /// Get the path to the interop requests directory.
    pub fn requests_dir(&self) -> PathBuf {
        self.root.join("interop").join("requests")
    }

    /// Get the path to the interop responses directory.
    pub fn responses_dir(&self) -> PathBuf {
        self.root.join("interop").join("responses")
    }

    /// Get the path to an interop request record.
    pub fn request_path(&self, request_id: &str) -> PathBuf {
        self.requests_dir().join(format!("{}.json", request_id))
    }

    /// Get the path to an interop response record.
    pub fn response_path(&self, request_id: &str) -> PathBuf {
        self.responses_dir().join(format!("{}.json", request_id))
    }

    /// Resolve a possibly-relative pointer against the orchestration root,
    /// rejecting paths that escape it.
    ///
    /// Used by bounded log queries so a query can never read outside the
    /// root.
    pub fn resolve_inside_root(&self, raw: &str) -> Result<PathBuf> {
        let candidate = {
            let p = PathBuf::from(raw);
            if p.is_absolute() { p } else { self.root.join(p) }
        };

        let resolved = candidate.canonicalize().map_err(|e| {
            WardenError::UserError(format!("failed to resolve path '{}': {}", raw, e))
        })?;
        let root = self.root.canonicalize().map_err(|e| {
            WardenError::UserError(format!(
                "failed to resolve orchestration root '{}': {}",
                self.root.display(),
                e
            ))
        })?;

        if !resolved.starts_with(&root) {
            return Err(WardenError::UserError(format!(
                "path '{}' resolves outside the orchestration root",
                raw
            )));
        }
        Ok(resolved)
    }

    /// Express a path relative to the orchestration root when possible.
    ///
    /// Pointer fields in records prefer root-relative form so a checked-out
    /// tree can move between machines.
    pub fn rel_to_root(&self, path: &Path) -> String {
        match path.strip_prefix(&self.root) {
            Ok(rel) => rel.to_string_lossy().replace('\\', "/"),
            Err(_) => path.to_string_lossy().replace('\\', "/"),
        }
    }
}

/// Compute the fallback budget run key for a working directory.
///
/// Used when no run is active: budget state is still scoped per directory so
/// independent checkouts never share a ledger.
pub fn fallback_run_key<P: AsRef<Path>>(cwd: P) -> String {
    let digest = Sha256::digest(cwd.as_ref().to_string_lossy().as_bytes());
    format!("cwd-{:x}", digest)[..16].to_string()
}

/// Sanitize a run key for use as a file name.
///
/// Keys containing path separators or other unsafe characters are reduced to
/// a digest so the ledger can never be tricked into writing elsewhere.
fn sanitize_key(run_key: &str) -> String {
    let safe = run_key
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if safe && !run_key.is_empty() {
        run_key.to_string()
    } else {
        let digest = Sha256::digest(run_key.as_bytes());
        format!("key-{:x}", digest)[..20].to_string()
    }
}
