//! Index building: scan run ledgers, write partition files.
//!
//! The index is derived purely from pointer artifacts: each run's
//! `events.jsonl` stream, its run record, the bounded `metadata` block of
//! its manifest, and the interop request/response records. Capsule bodies
//! and raw logs are never read.
//!
//! A partition rebuild writes to a temporary location and atomically swaps
//! it in, so concurrent readers see either the old complete partition or
//! the new complete partition, never a partial one. Rebuilds of the same
//! partition are serialized by a project-scoped lock.

use super::registry::ProjectRecord;
use super::{load_registry, locks_dir, partition_path};
use crate::context::WardenContext;
use crate::error::{Result, WardenError};
use crate::events::{EventKind, read_events};
use crate::fs::atomic_write_file;
use crate::interop::{InteropRequest, InteropResponse};
use crate::locks::acquire_index_lock;
use crate::run::{RunLedger, is_orphaned};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One run, as the dashboard sees it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunSummary {
    pub project_id: String,
    pub run_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_run_id: Option<String>,
    pub subsystem: String,
    pub phase: String,
    pub status: String,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capsule_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manifest_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_path: Option<String>,
    pub events_path: String,
    pub host: String,
    pub pid: u32,
    pub agent_runtime: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    /// Whether the run looked orphaned at index time (in-progress with a
    /// dead owning process).
    #[serde(default)]
    pub orphaned: bool,
}

/// One interop edge, derived from a request/response pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RequestEdge {
    pub project_id: String,
    pub request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_run_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub child_run_id: Option<String>,
    pub from_subsystem: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_phase: Option<String>,
    pub to_subsystem: String,
    pub to_phase: String,
    pub action: String,
    /// `pending` until a response exists, then the response status.
    pub status: String,
    pub enqueued_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}

/// A complete index partition for one project.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProjectIndex {
    pub project_id: String,
    pub generated_at: DateTime<Utc>,
    pub runs: Vec<RunSummary>,
    pub requests: Vec<RequestEdge>,
}

impl ProjectIndex {
    /// Load a partition, returning None when it does not exist.
    pub fn load(home: &Path, project_id: &str) -> Result<Option<Self>> {
        let path = partition_path(home, project_id);
        if !path.is_file() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path).map_err(|e| {
            WardenError::UserError(format!(
                "failed to read index partition '{}': {}",
                path.display(),
                e
            ))
        })?;
        let index = serde_json::from_str(&content).map_err(|e| {
            WardenError::UserError(format!(
                "failed to parse index partition '{}': {}",
                path.display(),
                e
            ))
        })?;
        Ok(Some(index))
    }
}

/// Outcome counters of an indexing pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexStats {
    pub projects_indexed: usize,
    pub runs_indexed: usize,
    pub requests_indexed: usize,
    /// Orchestration roots that had no runs directory.
    pub missing_roots: Vec<String>,
}

/// Rebuild one project's index partition.
///
/// Touches only that project's partition file; every other partition is
/// byte-for-byte unchanged across the call.
pub fn index_project(home: &Path, project: &ProjectRecord) -> Result<IndexStats> {
    let _lock = acquire_index_lock(&locks_dir(home), &project.project_id)?;

    let ctx = WardenContext::at_root(&project.orchestration_root);
    let mut stats = IndexStats {
        projects_indexed: 1,
        ..Default::default()
    };

    let mut runs = Vec::new();
    let mut requests = Vec::new();

    if ctx.runs_dir().is_dir() {
        let ledger = RunLedger::new(ctx.clone());
        for run_id in ledger.list()? {
            if let Some(summary) = summarize_run(&ctx, project, &run_id) {
                runs.push(summary);
                stats.runs_indexed += 1;
            }
        }
        requests = collect_requests(&ctx, project)?;
        stats.requests_indexed = requests.len();
    } else {
        stats.missing_roots.push(project.orchestration_root.clone());
    }

    runs.sort_by(|a, b| a.started_at.cmp(&b.started_at).then(a.run_id.cmp(&b.run_id)));
    requests.sort_by(|a, b| {
        a.enqueued_at
            .cmp(&b.enqueued_at)
            .then(a.request_id.cmp(&b.request_id))
    });

    let index = ProjectIndex {
        project_id: project.project_id.clone(),
        generated_at: Utc::now(),
        runs,
        requests,
    };
    let json = serde_json::to_string_pretty(&index)
        .map_err(|e| WardenError::UserError(format!("failed to serialize index: {}", e)))?;

    // Temp-write + rename: readers see old or new, never partial.
    atomic_write_file(partition_path(home, &project.project_id), &json)?;

    Ok(stats)
}

/// Rebuild every registered project's partition.
pub fn index_all(home: &Path) -> Result<IndexStats> {
    let mut total = IndexStats::default();
    for project in load_registry(home) {
        let stats = index_project(home, &project)?;
        total.projects_indexed += stats.projects_indexed;
        total.runs_indexed += stats.runs_indexed;
        total.requests_indexed += stats.requests_indexed;
        total.missing_roots.extend(stats.missing_roots);
    }
    Ok(total)
}

/// Build a run summary from the run's pointer artifacts.
///
/// The run record is authoritative; the event trail fills pointer fields
/// the record may not carry. Nothing beyond bounded fields is read.
fn summarize_run(
    ctx: &WardenContext,
    project: &ProjectRecord,
    run_id: &str,
) -> Option<RunSummary> {
    let ledger = RunLedger::new(ctx.clone());
    let record = ledger.load(run_id).ok()?;

    let mut summary = RunSummary {
        project_id: project.project_id.clone(),
        run_id: record.run_id.clone(),
        parent_run_id: record.parent_run_id.clone(),
        subsystem: record.subsystem.clone(),
        phase: record.phase.clone(),
        status: record.status.to_string(),
        started_at: record.created_at,
        finished_at: record.finished_at,
        exit_code: record.exit_code,
        capsule_path: record.capsule_path.clone(),
        manifest_path: record.manifest_path.clone(),
        log_path: record.log_path.clone(),
        events_path: ctx.rel_to_root(&ctx.events_path(run_id)),
        host: record.host.clone(),
        pid: record.pid,
        agent_runtime: record.agent_runtime.clone(),
        reasoning: record.reasoning.clone(),
        orphaned: is_orphaned(&record),
    };

    // Pointer fields from the event trail, when the record lacks them.
    if summary.capsule_path.is_none() || summary.manifest_path.is_none() {
        if let Ok(events) = read_events(&ctx.events_path(run_id)) {
            for event in events {
                match event.event {
                    EventKind::CapsuleWritten if summary.capsule_path.is_none() => {
                        summary.capsule_path = event
                            .details
                            .get("capsule_path")
                            .and_then(|v| v.as_str())
                            .map(|s| s.to_string());
                    }
                    EventKind::ManifestWritten if summary.manifest_path.is_none() => {
                        summary.manifest_path = event
                            .details
                            .get("manifest_path")
                            .and_then(|v| v.as_str())
                            .map(|s| s.to_string());
                    }
                    _ => {}
                }
            }
        }
    }

    Some(summary)
}

/// Derive interop edges from request/response records.
fn collect_requests(ctx: &WardenContext, project: &ProjectRecord) -> Result<Vec<RequestEdge>> {
    let dir = ctx.requests_dir();
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut edges = Vec::new();
    let entries = std::fs::read_dir(&dir).map_err(|e| {
        WardenError::UserError(format!(
            "failed to read requests directory '{}': {}",
            dir.display(),
            e
        ))
    })?;
    for entry in entries {
        let entry = entry.map_err(|e| {
            WardenError::UserError(format!("failed to read requests directory entry: {}", e))
        })?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let Some(request_id) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let Ok(request) = InteropRequest::load(ctx, request_id) else {
            continue;
        };

        let mut edge = RequestEdge {
            project_id: project.project_id.clone(),
            request_id: request.request_id.clone(),
            parent_run_id: request.parent_run_id.clone(),
            child_run_id: None,
            from_subsystem: request.from_subsystem.clone(),
            from_phase: request.from_phase.clone(),
            to_subsystem: request.to_subsystem.clone(),
            to_phase: request.to_phase().to_string(),
            action: request.action.clone(),
            status: "pending".to_string(),
            enqueued_at: request.created_at,
            completed_at: None,
            reasoning: request.reasoning.clone(),
        };

        if let Ok(response) = InteropResponse::load(ctx, request_id) {
            edge.status = response.status.to_string();
            edge.child_run_id = response.run_id.clone();
            edge.completed_at = Some(response.written_at);
        }

        edges.push(edge);
    }

    Ok(edges)
}
