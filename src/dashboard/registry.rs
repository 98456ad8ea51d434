//! Project registry CRUD operations.

use super::{partition_path, project_id_for, registry_path};
use crate::error::{Result, WardenError};
use crate::fs::atomic_write_file;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A registered project: a project tree plus its orchestration root.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProjectRecord {
    /// Stable identifier derived from the orchestration root path.
    pub project_id: String,

    /// Display label (defaults to the project root's directory name).
    pub label: String,

    /// Absolute path of the orchestration root (runs/, interop/ live here).
    pub orchestration_root: String,

    /// Absolute path of the project tree the phases operate on.
    pub project_root: String,

    /// First registration time.
    pub registered_at: DateTime<Utc>,

    /// Last registration or refresh time.
    pub updated_at: DateTime<Utc>,
}

/// Load the registry, tolerating a missing or unreadable file.
pub fn load_registry(home: &Path) -> Vec<ProjectRecord> {
    let path = registry_path(home);
    let Ok(content) = std::fs::read_to_string(&path) else {
        return Vec::new();
    };
    serde_json::from_str(&content).unwrap_or_default()
}

fn save_registry(home: &Path, projects: &[ProjectRecord]) -> Result<()> {
    let json = serde_json::to_string_pretty(projects)
        .map_err(|e| WardenError::UserError(format!("failed to serialize registry: {}", e)))?;
    atomic_write_file(registry_path(home), &json)
}

/// Register a project (idempotent).
///
/// Registering the same orchestration root twice returns the same
/// `project_id` and refreshes the record in place.
pub fn register(
    home: &Path,
    orchestration_root: &Path,
    project_root: &Path,
    label: Option<&str>,
) -> Result<ProjectRecord> {
    let project_id = project_id_for(orchestration_root);
    let now = Utc::now();
    let resolved_label = label
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .map(|l| l.to_string())
        .unwrap_or_else(|| {
            project_root
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| project_id.clone())
        });

    let mut projects = load_registry(home);
    let record = match projects.iter_mut().find(|p| p.project_id == project_id) {
        Some(existing) => {
            existing.label = resolved_label;
            existing.orchestration_root = orchestration_root.to_string_lossy().to_string();
            existing.project_root = project_root.to_string_lossy().to_string();
            existing.updated_at = now;
            existing.clone()
        }
        None => {
            let record = ProjectRecord {
                project_id: project_id.clone(),
                label: resolved_label,
                orchestration_root: orchestration_root.to_string_lossy().to_string(),
                project_root: project_root.to_string_lossy().to_string(),
                registered_at: now,
                updated_at: now,
            };
            projects.push(record.clone());
            record
        }
    };

    projects.sort_by(|a, b| a.label.to_lowercase().cmp(&b.label.to_lowercase()));
    save_registry(home, &projects)?;
    Ok(record)
}

/// Unregister a project and remove only its index partition.
///
/// Returns whether the project was registered. Other projects' partitions
/// are untouched.
pub fn unregister(home: &Path, project_id: &str) -> Result<bool> {
    let mut projects = load_registry(home);
    let before = projects.len();
    projects.retain(|p| p.project_id != project_id);

    if projects.len() == before {
        return Ok(false);
    }

    save_registry(home, &projects)?;

    let partition = partition_path(home, project_id);
    if partition.is_file() {
        std::fs::remove_file(&partition).map_err(|e| {
            WardenError::UserError(format!(
                "failed to remove index partition '{}': {}",
                partition.display(),
                e
            ))
        })?;
    }

    Ok(true)
}

/// List registered projects, sorted by label.
pub fn list_projects(home: &Path) -> Vec<ProjectRecord> {
    load_registry(home)
}
