//! Interop response records.
//!
//! A response is written exactly once by the dispatch that executed the
//! request, keyed by the same `request_id`. Records live at
//! `interop/responses/<request_id>.json`; their existence is the
//! already-dispatched marker.

use crate::context::WardenContext;
use crate::error::{Result, WardenError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;

/// Terminal status of a dispatched request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    /// The target phase completed successfully.
    Ok,
    /// The target phase completed with a failure.
    Failed,
    /// The request could not be routed or the phase could not proceed.
    Blocked,
}

impl std::fmt::Display for ResponseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ResponseStatus::Ok => "ok",
            ResponseStatus::Failed => "failed",
            ResponseStatus::Blocked => "blocked",
        };
        write!(f, "{}", name)
    }
}

/// A persisted interop response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteropResponse {
    /// The request this answers.
    pub request_id: String,

    /// Terminal status.
    pub status: ResponseStatus,

    /// The child run that executed the request, when one was created.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,

    /// Root-relative pointer to the child run's capsule.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capsule_pointer: Option<String>,

    /// Root-relative pointer to the child run's manifest.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manifest_pointer: Option<String>,

    /// Pointer patterns the receiving phase delivered against.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deliverables: Vec<String>,

    /// Short free-text notes (failure summary, routing diagnostics).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,

    /// Write timestamp.
    pub written_at: DateTime<Utc>,
}

impl InteropResponse {
    /// Whether a response exists for a request.
    pub fn exists(ctx: &WardenContext, request_id: &str) -> bool {
        ctx.response_path(request_id).is_file()
    }

    /// Load a response record.
    pub fn load(ctx: &WardenContext, request_id: &str) -> Result<Self> {
        let path = ctx.response_path(request_id);
        let content = std::fs::read_to_string(&path).map_err(|e| {
            WardenError::UserError(format!(
                "failed to read response for '{}': {}",
                request_id, e
            ))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            WardenError::UserError(format!(
                "failed to parse response for '{}': {}",
                request_id, e
            ))
        })
    }

    /// Persist the response with create_new semantics.
    ///
    /// Responses are write-once: an existing response means the request was
    /// already dispatched, surfaced as `AlreadyDispatched`.
    pub(super) fn persist(&self, ctx: &WardenContext) -> Result<()> {
        let dir = ctx.responses_dir();
        std::fs::create_dir_all(&dir).map_err(|e| {
            WardenError::UserError(format!(
                "failed to create responses directory '{}': {}",
                dir.display(),
                e
            ))
        })?;

        let path = ctx.response_path(&self.request_id);
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| WardenError::UserError(format!("failed to serialize response: {}", e)))?;

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::AlreadyExists {
                    WardenError::AlreadyDispatched(self.request_id.clone())
                } else {
                    WardenError::UserError(format!(
                        "failed to create response '{}': {}",
                        path.display(),
                        e
                    ))
                }
            })?;

        file.write_all(json.as_bytes()).map_err(|e| {
            let _ = std::fs::remove_file(&path);
            WardenError::UserError(format!(
                "failed to write response '{}': {}",
                path.display(),
                e
            ))
        })?;
        file.sync_all().map_err(|e| {
            let _ = std::fs::remove_file(&path);
            WardenError::UserError(format!(
                "failed to sync response '{}': {}",
                path.display(),
                e
            ))
        })?;

        Ok(())
    }
}
