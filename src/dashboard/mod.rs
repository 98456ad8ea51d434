//! Multi-project dashboard: registry, index partitions, and queries.
//!
//! The dashboard builds a read-only, queryable index over many projects'
//! run ledgers without mutating them. Each registered project gets its own
//! index partition file; a project-scoped reindex touches only that
//! partition, so other projects' partitions stay byte-for-byte identical
//! across the call.
//!
//! Dashboard state lives outside any orchestration root, under
//! `$WARDEN_DASHBOARD_HOME` (default `~/.warden-dashboard`):
//!
//! ```text
//! <home>/projects.json            project registry
//! <home>/index/<project_id>.json  one partition per project (atomic swap)
//! <home>/locks/<project_id>.lock  per-partition rebuild lock
//! ```

mod index;
mod query;
mod registry;

#[cfg(test)]
mod tests;

pub use index::{IndexStats, ProjectIndex, RequestEdge, RunSummary, index_all, index_project};
pub use query::{EdgeSummary, global_runs, phase_edges, project_runs, run_thread};
pub use registry::{ProjectRecord, list_projects, load_registry, register, unregister};

use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Environment variable overriding the dashboard home directory.
pub const ENV_DASHBOARD_HOME: &str = "WARDEN_DASHBOARD_HOME";

/// Resolve the dashboard home directory.
///
/// `$WARDEN_DASHBOARD_HOME` wins; otherwise `~/.warden-dashboard`; when the
/// home directory cannot be determined or is not writable, a `/tmp`
/// fallback keeps read-only environments working.
pub fn dashboard_home() -> PathBuf {
    if let Ok(raw) = std::env::var(ENV_DASHBOARD_HOME)
        && !raw.is_empty()
    {
        return PathBuf::from(raw);
    }

    if let Some(home) = std::env::home_dir() {
        let dir = home.join(".warden-dashboard");
        if std::fs::create_dir_all(&dir).is_ok() {
            return dir;
        }
    }

    std::env::temp_dir().join("warden-dashboard")
}

/// Path of the registry file under a dashboard home.
pub fn registry_path(home: &Path) -> PathBuf {
    home.join("projects.json")
}

/// Path of a project's index partition under a dashboard home.
pub fn partition_path(home: &Path, project_id: &str) -> PathBuf {
    home.join("index").join(format!("{}.json", project_id))
}

/// Path of the per-partition lock directory under a dashboard home.
pub fn locks_dir(home: &Path) -> PathBuf {
    home.join("locks")
}

/// Stable project identifier derived from the orchestration root path.
///
/// Registering the same root twice therefore always yields the same id.
pub fn project_id_for(orchestration_root: &Path) -> String {
    let digest = Sha256::digest(orchestration_root.to_string_lossy().as_bytes());
    format!("{:x}", digest)[..12].to_string()
}
