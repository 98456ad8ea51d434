//! Manifest writer: the bounded, structured pointer record for a run.
//!
//! A manifest is produced once at phase end. It indexes tracked artifacts
//! by path, size, and digest — never content — plus pointers to the truth
//! source, the phase log, and the capsule. The artifact index is itself
//! size-bounded: entries beyond the configured ceiling are summarized into
//! the omitted counters rather than listed.

use super::RunRecord;
use crate::config::Config;
use crate::context::WardenContext;
use crate::error::{Result, WardenError};
use crate::events::{Event, EventKind, append_event};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Run metadata block of a manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    pub run_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_run_id: Option<String>,
    pub subsystem: String,
    pub phase: String,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    pub host: String,
    pub pid: u32,
    pub agent_runtime: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}

/// One tracked artifact: a pointer plus integrity data, never content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackedArtifact {
    /// Root-relative path.
    pub path: String,
    /// Coarse kind derived from the extension.
    pub kind: String,
    /// Size in bytes.
    pub bytes: u64,
    /// SHA-256 digest of the content.
    pub sha256: String,
}

/// Counters for artifacts beyond the index ceiling.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OmittedArtifacts {
    pub files: u64,
    pub bytes: u64,
}

/// The bounds the index was built under.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactLimits {
    pub max_files: usize,
    pub max_total_bytes: u64,
}

/// Bounded index of a run's tracked artifacts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactIndex {
    pub tracked: Vec<TrackedArtifact>,
    pub omitted: OmittedArtifacts,
    pub limits: ArtifactLimits,
}

/// A typed pointer into the tree (truth source, log, ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pointer {
    /// Root-relative path.
    pub path: String,
    /// Pointer kind (e.g. `truth`, `phase_log`).
    pub kind: String,
    /// Optional bounded-access hint (e.g. a tail command).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

/// The complete manifest record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub metadata: ManifestMetadata,
    pub artifact_index: ArtifactIndex,
    pub truth_pointers: Vec<Pointer>,
    pub log_pointers: Vec<Pointer>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capsule_path: Option<String>,
}

impl Manifest {
    /// Load a manifest from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            WardenError::UserError(format!(
                "failed to read manifest '{}': {}",
                path.display(),
                e
            ))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            WardenError::UserError(format!(
                "failed to parse manifest '{}': {}",
                path.display(),
                e
            ))
        })
    }
}

/// Write a run's manifest.
///
/// `artifacts` are indexed up to the configured entry ceiling; the
/// remainder is accounted in `omitted`. Fails if the manifest was already
/// written — a manifest is produced exactly once and immutable afterwards.
pub fn write_manifest(
    ctx: &WardenContext,
    config: &Config,
    record: &RunRecord,
    artifacts: &[PathBuf],
    truth_pointers: Vec<Pointer>,
    log_path: Option<&Path>,
    capsule_path: Option<&Path>,
) -> Result<PathBuf> {
    let mut tracked = Vec::new();
    let mut omitted = OmittedArtifacts::default();

    for artifact in artifacts {
        let bytes = std::fs::metadata(artifact).map(|m| m.len()).unwrap_or(0);
        if tracked.len() >= config.manifest_max_entries {
            omitted.files += 1;
            omitted.bytes += bytes;
            continue;
        }
        tracked.push(TrackedArtifact {
            path: ctx.rel_to_root(artifact),
            kind: artifact_kind(artifact),
            bytes,
            sha256: file_digest(artifact)?,
        });
    }

    let log_pointers = log_path
        .map(|log| {
            vec![Pointer {
                path: ctx.rel_to_root(log),
                kind: "phase_log".to_string(),
                hint: Some(format!("tail -n 200 {}", ctx.rel_to_root(log))),
            }]
        })
        .unwrap_or_default();

    let manifest = Manifest {
        metadata: ManifestMetadata {
            run_id: record.run_id.clone(),
            parent_run_id: record.parent_run_id.clone(),
            subsystem: record.subsystem.clone(),
            phase: record.phase.clone(),
            started_at: record.created_at,
            finished_at: record.finished_at,
            exit_code: record.exit_code,
            host: record.host.clone(),
            pid: record.pid,
            agent_runtime: record.agent_runtime.clone(),
            reasoning: record.reasoning.clone(),
        },
        artifact_index: ArtifactIndex {
            tracked,
            omitted,
            limits: ArtifactLimits {
                max_files: config.manifest_max_entries,
                max_total_bytes: config.manifest_max_total_bytes,
            },
        },
        truth_pointers,
        log_pointers,
        capsule_path: capsule_path.map(|p| ctx.rel_to_root(p)),
    };

    let dir = ctx.manifests_dir(&record.run_id);
    std::fs::create_dir_all(&dir).map_err(|e| {
        WardenError::UserError(format!(
            "failed to create manifests directory '{}': {}",
            dir.display(),
            e
        ))
    })?;

    let path = dir.join(format!("{}_{}.json", record.subsystem, record.phase));
    let json = serde_json::to_string_pretty(&manifest)
        .map_err(|e| WardenError::UserError(format!("failed to serialize manifest: {}", e)))?;

    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&path)
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::AlreadyExists {
                WardenError::UserError(format!(
                    "manifest '{}' already written; manifests are immutable",
                    path.display()
                ))
            } else {
                WardenError::UserError(format!(
                    "failed to create manifest '{}': {}",
                    path.display(),
                    e
                ))
            }
        })?;

    file.write_all(json.as_bytes()).map_err(|e| {
        let _ = std::fs::remove_file(&path);
        WardenError::UserError(format!(
            "failed to write manifest '{}': {}",
            path.display(),
            e
        ))
    })?;
    file.sync_all().map_err(|e| {
        let _ = std::fs::remove_file(&path);
        WardenError::UserError(format!(
            "failed to sync manifest '{}': {}",
            path.display(),
            e
        ))
    })?;

    let event = Event::new(EventKind::ManifestWritten, &record.run_id)
        .with_details(json!({"manifest_path": ctx.rel_to_root(&path)}));
    append_event(ctx, &event)?;

    Ok(path)
}

/// Validate a manifest file against its bounds.
///
/// Parsing enforces required fields; this additionally checks the artifact
/// index stayed within its declared limits.
pub fn validate_manifest(path: &Path) -> Result<()> {
    let manifest = Manifest::load(path).map_err(|e| {
        WardenError::ValidationError(format!(
            "manifest '{}' is missing required fields: {}",
            path.display(),
            e
        ))
    })?;

    let index = &manifest.artifact_index;
    if index.tracked.len() > index.limits.max_files {
        return Err(WardenError::ValidationError(format!(
            "manifest '{}' tracks {} artifacts, exceeds max {}",
            path.display(),
            index.tracked.len(),
            index.limits.max_files
        )));
    }

    for artifact in &index.tracked {
        if artifact.sha256.len() != 64 {
            return Err(WardenError::ValidationError(format!(
                "manifest '{}' has malformed digest for '{}'",
                path.display(),
                artifact.path
            )));
        }
    }

    Ok(())
}

/// Coarse artifact kind from the file extension.
fn artifact_kind(path: &Path) -> String {
    match path.extension().and_then(|e| e.to_str()) {
        Some("json" | "jsonl" | "yaml" | "yml") => "structured".to_string(),
        Some("md" | "txt" | "log" | "csv") => "text".to_string(),
        _ => "binary".to_string(),
    }
}

/// SHA-256 digest of a file's content.
fn file_digest(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path).map_err(|e| {
        WardenError::UserError(format!(
            "failed to read artifact '{}': {}",
            path.display(),
            e
        ))
    })?;
    Ok(format!("{:x}", Sha256::digest(&bytes)))
}
