//! Interop request records.
//!
//! A request is created by any subsystem phase and never mutated after
//! creation — superseding requires a new request. Records live at
//! `interop/requests/<request_id>.json`.

use crate::config::{Config, Priority};
use crate::context::WardenContext;
use crate::error::{Result, WardenError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;

use crate::budget::BudgetLimits;

/// The read-budget contract a request declares for its target phase.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RequestBudget {
    /// Ceiling on distinct files the receiving phase may read (0 = unset).
    pub max_files: u64,

    /// Ceiling on cumulative bytes the receiving phase may read (0 = unset).
    pub max_total_bytes: u64,

    /// Allow globs exempt from the ceilings.
    pub allowed_paths: Vec<String>,
}

impl RequestBudget {
    /// Express the declared ceilings as ledger limits.
    pub fn to_limits(&self) -> BudgetLimits {
        BudgetLimits {
            max_bytes_per_read: 0,
            max_files: self.max_files,
            max_total_bytes: self.max_total_bytes,
        }
    }
}

/// A persisted interop request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteropRequest {
    /// Unique request identifier (`rq-<timestamp>-<suffix>`).
    pub request_id: String,

    /// Requesting subsystem.
    pub from_subsystem: String,

    /// Requesting phase; inferable from the parent run when omitted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_phase: Option<String>,

    /// Target subsystem.
    pub to_subsystem: String,

    /// Target action (`<phase>` or `<subsystem>.<phase>`).
    pub action: String,

    /// Argument payload appended to the target action's argv.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,

    /// The run this request was created under.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_run_id: Option<String>,

    /// Pointers the receiving phase is expected to read first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub must_read: Vec<String>,

    /// Declared read-budget ceiling for the receiving phase.
    pub read_budget: RequestBudget,

    /// Pointer patterns the receiving phase is expected to deliver.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub expected_deliverables: Vec<String>,

    /// Queue priority.
    #[serde(default)]
    pub priority: Priority,

    /// Free-text justification for the handoff.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,

    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl InteropRequest {
    /// Load a request record.
    pub fn load(ctx: &WardenContext, request_id: &str) -> Result<Self> {
        let path = ctx.request_path(request_id);
        let content = std::fs::read_to_string(&path).map_err(|e| {
            WardenError::UserError(format!("failed to read request '{}': {}", request_id, e))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            WardenError::UserError(format!("failed to parse request '{}': {}", request_id, e))
        })
    }

    /// The target phase name, parsed from the action.
    pub fn to_phase(&self) -> &str {
        self.action.rsplit('.').next().unwrap_or(&self.action)
    }

    /// Persist the request with create_new semantics.
    ///
    /// A request record is immutable; an id collision is an error rather
    /// than an overwrite.
    pub(super) fn persist(&self, ctx: &WardenContext) -> Result<()> {
        let dir = ctx.requests_dir();
        std::fs::create_dir_all(&dir).map_err(|e| {
            WardenError::UserError(format!(
                "failed to create requests directory '{}': {}",
                dir.display(),
                e
            ))
        })?;

        let path = ctx.request_path(&self.request_id);
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| WardenError::UserError(format!("failed to serialize request: {}", e)))?;

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::AlreadyExists {
                    WardenError::UserError(format!(
                        "request '{}' already exists; requests are immutable",
                        self.request_id
                    ))
                } else {
                    WardenError::UserError(format!(
                        "failed to create request '{}': {}",
                        path.display(),
                        e
                    ))
                }
            })?;

        file.write_all(json.as_bytes()).map_err(|e| {
            let _ = std::fs::remove_file(&path);
            WardenError::UserError(format!("failed to write request '{}': {}", path.display(), e))
        })?;
        file.sync_all().map_err(|e| {
            let _ = std::fs::remove_file(&path);
            WardenError::UserError(format!("failed to sync request '{}': {}", path.display(), e))
        })?;

        Ok(())
    }
}

/// Caller-facing request parameters; everything else is derived.
#[derive(Debug, Clone, Default)]
pub struct RequestSpec {
    pub from_subsystem: String,
    pub from_phase: Option<String>,
    pub to_subsystem: String,
    pub action: String,
    pub args: Vec<String>,
    pub parent_run_id: Option<String>,
    pub must_read: Vec<String>,
    pub read_budget: Option<RequestBudget>,
    pub expected_deliverables: Vec<String>,
    pub priority: Priority,
    pub reasoning: Option<String>,
}

impl RequestSpec {
    /// Validate the parameters and materialize a request record.
    ///
    /// An omitted budget falls back to the configured request defaults, so
    /// a handoff always carries an explicit ceiling.
    pub(super) fn into_request(self, config: &Config) -> Result<InteropRequest> {
        for (field, value) in [
            ("from_subsystem", &self.from_subsystem),
            ("to_subsystem", &self.to_subsystem),
            ("action", &self.action),
        ] {
            if value.is_empty() {
                return Err(WardenError::UserError(format!(
                    "{} is required and must be non-empty",
                    field
                )));
            }
        }

        if let Some(phase) = &self.from_phase
            && phase.is_empty()
        {
            return Err(WardenError::UserError(
                "from_phase must be non-empty when provided".to_string(),
            ));
        }

        let read_budget = self.read_budget.unwrap_or(RequestBudget {
            max_files: config.request_default_max_files,
            max_total_bytes: config.request_default_max_total_bytes,
            allowed_paths: Vec::new(),
        });

        Ok(InteropRequest {
            request_id: new_request_id(),
            from_subsystem: self.from_subsystem,
            from_phase: self.from_phase,
            to_subsystem: self.to_subsystem,
            action: self.action,
            args: self.args,
            parent_run_id: self.parent_run_id,
            must_read: self.must_read,
            read_budget,
            expected_deliverables: self.expected_deliverables,
            priority: self.priority,
            reasoning: self.reasoning,
            created_at: Utc::now(),
        })
    }
}

/// Generate a collision-free, time-ordered request identifier.
pub fn new_request_id() -> String {
    let ts = Utc::now().format("%Y%m%dT%H%M%SZ");
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("rq-{}-{}", ts, &suffix[..6])
}
