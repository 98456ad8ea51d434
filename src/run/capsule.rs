//! Capsule writer: the bounded, human-readable phase summary.
//!
//! A capsule is produced once, at phase end, and is immutable afterwards.
//! It carries the outcome, pointers to evidence (paths, never content), and
//! on failure the failure reason. The hard ceiling is 30 lines, enforced at
//! write time by truncate-and-flag so a truncated capsule is always
//! distinguishable from a complete one.

use super::RunRecord;
use crate::context::WardenContext;
use crate::error::{Result, WardenError};
use crate::events::{Event, EventKind, append_event};
use serde_json::json;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Hard ceiling on capsule length, in lines.
pub const MAX_CAPSULE_LINES: usize = 30;

/// Marker prefix of the flag line appended when a capsule is truncated.
const TRUNCATION_MARKER: &str = "[truncated:";

/// Builder for a capsule's content.
#[derive(Debug, Clone)]
pub struct Capsule {
    outcome: String,
    next_action: String,
    evidence: Vec<String>,
    blocked_reason: Option<String>,
}

impl Capsule {
    /// Start a capsule with the phase outcome summary.
    pub fn new(outcome: impl Into<String>) -> Self {
        Self {
            outcome: outcome.into(),
            next_action: "none".to_string(),
            evidence: Vec::new(),
            blocked_reason: None,
        }
    }

    /// Set the single requested next action.
    pub fn with_next_action(mut self, next_action: impl Into<String>) -> Self {
        self.next_action = next_action.into();
        self
    }

    /// Add an evidence pointer (a path, never content).
    pub fn with_evidence(mut self, pointer: impl Into<String>) -> Self {
        self.evidence.push(pointer.into());
        self
    }

    /// Record the failure reason for a failed or blocked phase.
    pub fn with_blocked_reason(mut self, reason: impl Into<String>) -> Self {
        self.blocked_reason = Some(reason.into());
        self
    }

    /// Render the capsule body for a run, bounded to the line ceiling.
    fn render(&self, record: &RunRecord) -> String {
        let mut lines: Vec<String> = Vec::new();
        lines.push(format!(
            "Goal: {}.{} ({})",
            record.subsystem, record.phase, record.run_id
        ));
        lines.push(format!("What happened: {}", single_line(&self.outcome)));
        lines.push(format!("Current status: {}", record.status));
        lines.push(format!(
            "Next action requested (exactly one): {}",
            single_line(&self.next_action)
        ));
        lines.push("Evidence pointers:".to_string());
        if self.evidence.is_empty() {
            lines.push("- none".to_string());
        }
        for pointer in &self.evidence {
            lines.push(format!("- {}", single_line(pointer)));
        }
        lines.push(format!(
            "If blocked: {}",
            self.blocked_reason
                .as_deref()
                .map(single_line)
                .unwrap_or_else(|| "none".to_string())
        ));

        if lines.len() > MAX_CAPSULE_LINES {
            let omitted = lines.len() - (MAX_CAPSULE_LINES - 1);
            lines.truncate(MAX_CAPSULE_LINES - 1);
            lines.push(format!("{} {} lines omitted]", TRUNCATION_MARKER, omitted));
        }

        let mut body = lines.join("\n");
        body.push('\n');
        body
    }
}

/// Write a run's capsule.
///
/// Returns the capsule path. Fails if the capsule was already written — a
/// capsule is produced exactly once and immutable afterwards.
pub fn write_capsule(
    ctx: &WardenContext,
    record: &RunRecord,
    capsule: &Capsule,
) -> Result<PathBuf> {
    let dir = ctx.capsules_dir(&record.run_id);
    std::fs::create_dir_all(&dir).map_err(|e| {
        WardenError::UserError(format!(
            "failed to create capsules directory '{}': {}",
            dir.display(),
            e
        ))
    })?;

    let path = dir.join(format!("{}_{}.md", record.subsystem, record.phase));
    let body = capsule.render(record);

    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&path)
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::AlreadyExists {
                WardenError::UserError(format!(
                    "capsule '{}' already written; capsules are immutable",
                    path.display()
                ))
            } else {
                WardenError::UserError(format!(
                    "failed to create capsule '{}': {}",
                    path.display(),
                    e
                ))
            }
        })?;

    file.write_all(body.as_bytes()).map_err(|e| {
        let _ = std::fs::remove_file(&path);
        WardenError::UserError(format!("failed to write capsule '{}': {}", path.display(), e))
    })?;
    file.sync_all().map_err(|e| {
        let _ = std::fs::remove_file(&path);
        WardenError::UserError(format!("failed to sync capsule '{}': {}", path.display(), e))
    })?;

    let event = Event::new(EventKind::CapsuleWritten, &record.run_id)
        .with_details(json!({"capsule_path": ctx.rel_to_root(&path)}));
    append_event(ctx, &event)?;

    Ok(path)
}

/// Validate a capsule file against its bounds.
///
/// Checks the line ceiling and the presence of the fixed sections. Used by
/// the `validate` command; never mutates anything.
pub fn validate_capsule(path: &Path) -> Result<()> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        WardenError::UserError(format!(
            "failed to read capsule '{}': {}",
            path.display(),
            e
        ))
    })?;

    let lines: Vec<&str> = content.lines().collect();
    if lines.len() > MAX_CAPSULE_LINES {
        return Err(WardenError::ValidationError(format!(
            "capsule '{}' has {} lines, exceeds max {}",
            path.display(),
            lines.len(),
            MAX_CAPSULE_LINES
        )));
    }

    for required in ["Goal:", "What happened:", "Evidence pointers:"] {
        if !lines.iter().any(|line| line.starts_with(required)) {
            return Err(WardenError::ValidationError(format!(
                "capsule '{}' is missing required section '{}'",
                path.display(),
                required
            )));
        }
    }

    Ok(())
}

/// Whether a capsule body carries the truncation flag.
pub fn is_truncated(content: &str) -> bool {
    content
        .lines()
        .last()
        .is_some_and(|line| line.starts_with(TRUNCATION_MARKER))
}

/// Collapse a value to a single line so one field cannot spend the ceiling.
fn single_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
