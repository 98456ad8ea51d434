//! Run ledger: creation, finalization, and orphan detection.
//!
//! A run is one execution of a phase. Its record lives at
//! `runs/<run_id>/run.json` and is the root that capsules, manifests, logs,
//! and events attach to. The record is exclusively owned by the process
//! that created it until the run reaches a terminal status; after that it
//! is read-only to everyone.
//!
//! Parent linkage is recorded at creation time, before any child artifact
//! can reference the run, so a reader can always resolve a run tree
//! bottom-up. Runs form a tree (each run stores only its parent id); the
//! interop graph across runs is kept separately as request/response pairs
//! and may contain cycles.

pub mod capsule;
pub mod manifest;


pub use capsule::{Capsule, MAX_CAPSULE_LINES, validate_capsule, write_capsule};
pub use manifest::{Manifest, Pointer, validate_manifest, write_manifest};

use crate::budget::BudgetLimits;
use crate::context::WardenContext;
use crate::error::{Result, WardenError};
use crate::events::{Event, EventKind, append_event};
use crate::fs::atomic_write_file;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Terminal and non-terminal statuses of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunStatus {
    /// The run is still executing (or its process was killed).
    InProgress,
    /// The phase completed successfully.
    Ok,
    /// The phase completed with a failure.
    Failed,
    /// The phase could not proceed (e.g. routing ambiguity).
    Blocked,
}

impl RunStatus {
    /// Whether this status is terminal.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::InProgress)
    }

    /// Status name as recorded on disk.
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::InProgress => "in-progress",
            RunStatus::Ok => "ok",
            RunStatus::Failed => "failed",
            RunStatus::Blocked => "blocked",
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The persisted record of one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    /// Globally unique run identifier.
    pub run_id: String,

    /// Owning subsystem name.
    pub subsystem: String,

    /// Phase name within the subsystem.
    pub phase: String,

    /// Parent run, when this run was spawned by another (run tree edge).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_run_id: Option<String>,

    /// Host that created the run.
    pub host: String,

    /// Process id of the creating process.
    pub pid: u32,

    /// Agent runtime label (configuration data, recorded verbatim).
    pub agent_runtime: String,

    /// Creation timestamp.
    pub created_at: DateTime<Utc>,

    /// Completion timestamp, set at finalization.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,

    /// Exit code of the phase command, when one ran.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,

    /// Current status.
    pub status: RunStatus,

    /// Root-relative pointer to the capsule, once written.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capsule_path: Option<String>,

    /// Root-relative pointer to the manifest, once written.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manifest_path: Option<String>,

    /// Root-relative pointer to the phase log, once written.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_path: Option<String>,

    /// Read budget applied to this run (from an interop request or phase
    /// defaults).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_budget: Option<BudgetLimits>,

    /// Allowlist applied to this run's reads.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_paths: Vec<String>,

    /// Free-text justification carried from the creating request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}

/// Options for run creation beyond the required identity fields.
#[derive(Debug, Clone, Default)]
pub struct CreateOptions {
    /// Agent runtime label; defaults to the configured label at the call
    /// site.
    pub agent_runtime: String,
    /// Budget to apply to the run's reads.
    pub read_budget: Option<BudgetLimits>,
    /// Allowlist to apply to the run's reads.
    pub allowed_paths: Vec<String>,
    /// Free-text justification.
    pub reasoning: Option<String>,
}

/// The run ledger: creates, loads, mutates, and finalizes run records.
#[derive(Debug, Clone)]
pub struct RunLedger {
    ctx: WardenContext,
}

impl RunLedger {
    /// Create a ledger rooted at the given orchestration context.
    pub fn new(ctx: WardenContext) -> Self {
        Self { ctx }
    }

    /// Access the underlying context.
    pub fn context(&self) -> &WardenContext {
        &self.ctx
    }

    /// Allocate a run and persist its record.
    ///
    /// The record (including parent linkage) and the `run_created` event are
    /// written before control returns, so no artifact can ever reference a
    /// run that a reader cannot resolve.
    pub fn create(
        &self,
        subsystem: &str,
        phase: &str,
        parent_run_id: Option<&str>,
        options: CreateOptions,
    ) -> Result<RunRecord> {
        if subsystem.is_empty() || phase.is_empty() {
            return Err(WardenError::UserError(
                "subsystem and phase must be non-empty".to_string(),
            ));
        }

        let record = RunRecord {
            run_id: new_run_id(subsystem, phase),
            subsystem: subsystem.to_string(),
            phase: phase.to_string(),
            parent_run_id: parent_run_id.map(|s| s.to_string()),
            host: local_host(),
            pid: std::process::id(),
            agent_runtime: options.agent_runtime,
            created_at: Utc::now(),
            finished_at: None,
            exit_code: None,
            status: RunStatus::InProgress,
            capsule_path: None,
            manifest_path: None,
            log_path: None,
            read_budget: options.read_budget,
            allowed_paths: options.allowed_paths,
            reasoning: options.reasoning,
        };

        self.save(&record)?;

        let event = Event::new(EventKind::RunCreated, &record.run_id).with_details(json!({
            "subsystem": record.subsystem,
            "phase": record.phase,
            "parent_run_id": record.parent_run_id,
            "host": record.host,
            "pid": record.pid,
            "agent_runtime": record.agent_runtime,
            "reasoning": record.reasoning,
        }));
        append_event(&self.ctx, &event)?;

        Ok(record)
    }

    /// Load a run record.
    pub fn load(&self, run_id: &str) -> Result<RunRecord> {
        let path = self.ctx.run_record_path(run_id);
        let content = std::fs::read_to_string(&path).map_err(|e| {
            WardenError::UserError(format!("failed to read run '{}': {}", run_id, e))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            WardenError::UserError(format!("failed to parse run record '{}': {}", run_id, e))
        })
    }

    /// Attach artifact pointers to an in-progress run.
    ///
    /// Terminal records are immutable; attaching to one is an error.
    pub fn attach_artifacts(
        &self,
        run_id: &str,
        capsule_path: Option<String>,
        manifest_path: Option<String>,
        log_path: Option<String>,
    ) -> Result<RunRecord> {
        let mut record = self.load(run_id)?;
        if record.status.is_terminal() {
            return Err(WardenError::UserError(format!(
                "run '{}' is terminal; its record is immutable",
                run_id
            )));
        }

        if capsule_path.is_some() {
            record.capsule_path = capsule_path;
        }
        if manifest_path.is_some() {
            record.manifest_path = manifest_path;
        }
        if log_path.is_some() {
            record.log_path = log_path;
        }

        self.save(&record)?;
        Ok(record)
    }

    /// Finalize a run with a terminal status.
    ///
    /// Idempotent for the same terminal status; finalizing with a different
    /// status after terminal is `AlreadyFinalized`.
    pub fn finalize(
        &self,
        run_id: &str,
        status: RunStatus,
        exit_code: Option<i32>,
    ) -> Result<RunRecord> {
        if !status.is_terminal() {
            return Err(WardenError::UserError(format!(
                "cannot finalize run '{}' with non-terminal status '{}'",
                run_id, status
            )));
        }

        let mut record = self.load(run_id)?;

        if record.status.is_terminal() {
            if record.status == status {
                return Ok(record);
            }
            return Err(WardenError::AlreadyFinalized {
                run_id: run_id.to_string(),
                existing: record.status.to_string(),
            });
        }

        record.status = status;
        record.finished_at = Some(Utc::now());
        if exit_code.is_some() {
            record.exit_code = exit_code;
        }
        self.save(&record)?;

        let event = Event::new(EventKind::RunFinalized, run_id).with_details(json!({
            "status": record.status,
            "exit_code": record.exit_code,
            "capsule_path": record.capsule_path,
            "manifest_path": record.manifest_path,
            "log_path": record.log_path,
        }));
        append_event(&self.ctx, &event)?;

        Ok(record)
    }

    /// List all run ids under the orchestration root.
    pub fn list(&self) -> Result<Vec<String>> {
        let runs_dir = self.ctx.runs_dir();
        if !runs_dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut ids = Vec::new();
        let entries = std::fs::read_dir(&runs_dir).map_err(|e| {
            WardenError::UserError(format!(
                "failed to read runs directory '{}': {}",
                runs_dir.display(),
                e
            ))
        })?;
        for entry in entries {
            let entry = entry.map_err(|e| {
                WardenError::UserError(format!("failed to read runs directory entry: {}", e))
            })?;
            let path = entry.path();
            if path.is_dir() && path.join("run.json").is_file() {
                if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                    ids.push(name.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// Resolve the most recently created run, by record modification time.
    pub fn latest(&self) -> Result<Option<String>> {
        let mut best: Option<(std::time::SystemTime, String)> = None;
        for run_id in self.list()? {
            let path = self.ctx.run_record_path(&run_id);
            let Ok(meta) = std::fs::metadata(&path) else {
                continue;
            };
            let Ok(modified) = meta.modified() else {
                continue;
            };
            if best.as_ref().is_none_or(|(t, _)| modified > *t) {
                best = Some((modified, run_id));
            }
        }
        Ok(best.map(|(_, id)| id))
    }

    fn save(&self, record: &RunRecord) -> Result<()> {
        let json = serde_json::to_string_pretty(record).map_err(|e| {
            WardenError::UserError(format!("failed to serialize run record: {}", e))
        })?;
        atomic_write_file(self.ctx.run_record_path(&record.run_id), &json)
    }
}

/// Detect whether a run is orphaned: still `in-progress` but its owning
/// process no longer exists.
///
/// Only meaningful for records created on the local host; a record from
/// another host is never reported orphaned. Detection reports, it never
/// auto-resolves — the record stays `in-progress`.
pub fn is_orphaned(record: &RunRecord) -> bool {
    if record.status.is_terminal() {
        return false;
    }
    if record.host != local_host() {
        return false;
    }
    !process_exists(record.pid)
}

/// Generate a collision-free, time-ordered run identifier.
pub fn new_run_id(subsystem: &str, phase: &str) -> String {
    let ts = Utc::now().format("%Y%m%dT%H%M%SZ");
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}-{}-{}", subsystem, phase, ts, &suffix[..6])
}

/// Local host name for run records and orphan checks.
pub(crate) fn local_host() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string())
}

#[cfg(target_os = "linux")]
fn process_exists(pid: u32) -> bool {
    std::path::Path::new(&format!("/proc/{}", pid)).exists()
}

#[cfg(all(unix, not(target_os = "linux")))]
fn process_exists(pid: u32) -> bool {
    std::process::Command::new("kill")
        .args(["-0", &pid.to_string()])
        .output()
        .map(|o| o.status.success())
        .unwrap_or(true)
}

#[cfg(windows)]
fn process_exists(_pid: u32) -> bool {
    // No cheap probe available; stay conservative and never report orphaned.
    true
}
