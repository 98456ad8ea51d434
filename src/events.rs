//! Append-only event streams for runs.
//!
//! Each run carries an `events.jsonl` stream (one JSON object per line)
//! recording every significant transition: run created, budget or write
//! denied, interop request created, response written, capsule/manifest
//! written, run finalized. The stream is the pointer-level truth the
//! dashboard indexer derives from; it never contains artifact content.
//!
//! # Event Format
//!
//! - `ts`: RFC3339 timestamp
//! - `event`: the transition name
//! - `actor`: `user@HOST`
//! - `run_id`: the owning run
//! - `details`: freeform object with event-specific pointer fields

use crate::context::WardenContext;
use crate::error::{Result, WardenError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

/// Transitions that can be logged as events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Run record created (carries subsystem/phase/parent/process identity).
    RunCreated,
    /// A read was denied by the budget ledger.
    BudgetDenied,
    /// A write to a protected path was denied.
    WriteDenied,
    /// An interop request was created under this run.
    RequestCreated,
    /// An interop response was written for a request under this run.
    ResponseWritten,
    /// The run's capsule was written.
    CapsuleWritten,
    /// The run's manifest was written.
    ManifestWritten,
    /// The run reached a terminal status.
    RunFinalized,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            EventKind::RunCreated => "run_created",
            EventKind::BudgetDenied => "budget_denied",
            EventKind::WriteDenied => "write_denied",
            EventKind::RequestCreated => "request_created",
            EventKind::ResponseWritten => "response_written",
            EventKind::CapsuleWritten => "capsule_written",
            EventKind::ManifestWritten => "manifest_written",
            EventKind::RunFinalized => "run_finalized",
        };
        write!(f, "{}", name)
    }
}

/// An event record in a run's stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// RFC3339 timestamp when the event occurred.
    pub ts: DateTime<Utc>,

    /// The transition that occurred.
    pub event: EventKind,

    /// The actor (e.g., `user@HOST`).
    pub actor: String,

    /// The owning run.
    pub run_id: String,

    /// Freeform details object with event-specific pointer fields.
    pub details: Value,
}

impl Event {
    /// Create a new event for a run.
    pub fn new(kind: EventKind, run_id: impl Into<String>) -> Self {
        Self {
            ts: Utc::now(),
            event: kind,
            actor: get_actor_string(),
            run_id: run_id.into(),
            details: Value::Object(serde_json::Map::new()),
        }
    }

    /// Set the details object for this event.
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }

    /// Serialize the event to a single-line JSON string.
    pub fn to_jsonl_line(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| WardenError::UserError(format!("failed to serialize event: {}", e)))
    }
}

/// Get the actor string for event metadata.
fn get_actor_string() -> String {
    let user = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string());

    let host = hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    format!("{}@{}", user, host)
}

/// Append an event to a run's stream.
///
/// The stream (and run directory) is created on first append. Each append
/// results in exactly one line with a trailing newline, synced to disk.
pub fn append_event(ctx: &WardenContext, event: &Event) -> Result<()> {
    let events_file = ctx.events_path(&event.run_id);
    let json_line = event.to_jsonl_line()?;

    if let Some(parent) = events_file.parent()
        && !parent.exists()
    {
        fs::create_dir_all(parent).map_err(|e| {
            WardenError::UserError(format!(
                "failed to create run directory '{}': {}",
                parent.display(),
                e
            ))
        })?;
    }

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&events_file)
        .map_err(|e| {
            WardenError::UserError(format!(
                "failed to open events file '{}': {}",
                events_file.display(),
                e
            ))
        })?;

    writeln!(file, "{}", json_line).map_err(|e| {
        WardenError::UserError(format!(
            "failed to write event to '{}': {}",
            events_file.display(),
            e
        ))
    })?;

    file.sync_all().map_err(|e| {
        WardenError::UserError(format!(
            "failed to sync events file '{}': {}",
            events_file.display(),
            e
        ))
    })?;

    Ok(())
}

/// Read all events from a stream, skipping lines that fail to parse.
///
/// Readers tolerate torn trailing lines: an interrupted append must never
/// make the whole stream unreadable.
pub fn read_events(path: &Path) -> Result<Vec<Event>> {
    if !path.is_file() {
        return Ok(Vec::new());
    }
    let content = std::fs::read_to_string(path).map_err(|e| {
        WardenError::UserError(format!(
            "failed to read events file '{}': {}",
            path.display(),
            e
        ))
    })?;

    Ok(content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| serde_json::from_str::<Event>(line).ok())
        .collect())
}
