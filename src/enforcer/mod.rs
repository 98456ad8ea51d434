//! Guardrail enforcer: tool-call interception.
//!
//! Every tool invocation is intercepted before it executes. The enforcer
//! composes, in order:
//!
//! 1. **Delegation** — when an outer orchestrator-level enforcer is
//!    configured and this call did not originate from it, the call is
//!    handed to the outer enforcer exactly once and its verdict adopted.
//!    The `delegated` marker on the call context prevents re-entry, so the
//!    same read is never charged against two independent budgets.
//! 2. **Universal checks** — privilege-escalation commands and
//!    version-control commands that would revert protected files are
//!    denied for any write-capable tool kind, regardless of phase.
//! 3. **Phase-scoped write protection** — writes, edits, and deletes
//!    targeting a path protected for the active phase are denied, as are
//!    shell commands whose text looks mutating and mentions a protected
//!    path.
//! 4. **Read-budget accounting** — read-kind calls are charged against the
//!    run's ledger after the classifier confirms the path is not
//!    allowlisted.
//!
//! Every denial is synchronous, carries a one-line actionable reason, and
//! is fatal only to the single tool call. The enforcer never downgrades a
//! denial to a warning.

#[cfg(test)]
mod tests;

use crate::budget::{BudgetLimits, Charge, ReadBudgetLedger};
use crate::classify::{PathClassifier, command};
use crate::context::{WardenContext, fallback_run_key};
use crate::error::Result;
use crate::events::{Event, EventKind, append_event};
use serde_json::json;

/// Environment variable names consumed by `EnforcerConfig::from_env`.
pub mod env_vars {
    /// Active phase name.
    pub const PHASE: &str = "WARDEN_PHASE";
    /// Active run key for budget accounting.
    pub const RUN_KEY: &str = "WARDEN_RUN_KEY";
    /// Single-read byte ceiling.
    pub const MAX_BYTES_PER_READ: &str = "WARDEN_READ_MAX_BYTES_PER_READ";
    /// Cumulative unique-file ceiling.
    pub const MAX_FILES: &str = "WARDEN_READ_MAX_FILES";
    /// Cumulative byte ceiling.
    pub const MAX_TOTAL_BYTES: &str = "WARDEN_READ_MAX_TOTAL_BYTES";
    /// Comma-separated allowlist globs.
    pub const ALLOWLIST: &str = "WARDEN_READ_ALLOWLIST";
    /// Outer-enforcer delegation switch ("1" enables).
    pub const OUTER_HOOK: &str = "WARDEN_OUTER_HOOK";
    /// Marker set by an outer hook on the calls it re-issues.
    pub const HOOK_ACTIVE: &str = "WARDEN_HOOK_ACTIVE";
    /// Tool name of the intercepted call.
    pub const TOOL_NAME: &str = "WARDEN_TOOL_NAME";
    /// JSON payload of the intercepted call.
    pub const TOOL_INPUT: &str = "WARDEN_TOOL_INPUT";
}

/// The kind of tool behind an intercepted call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    /// Reads file content (budget-charged).
    Read,
    /// Creates or overwrites a file.
    Write,
    /// Edits an existing file in place.
    Edit,
    /// Deletes a file.
    Delete,
    /// Runs an opaque shell command.
    Shell,
    /// Anything else (searches, listings); allowed without checks.
    Other,
}

impl ToolKind {
    /// Map a tool name to its kind.
    pub fn from_tool_name(name: &str) -> Self {
        match name {
            "Read" => ToolKind::Read,
            "Write" => ToolKind::Write,
            "Edit" | "MultiEdit" | "NotebookEdit" => ToolKind::Edit,
            "Delete" | "Remove" => ToolKind::Delete,
            "Bash" | "Shell" => ToolKind::Shell,
            _ => ToolKind::Other,
        }
    }

    /// Whether this kind can mutate files.
    pub fn is_write_capable(&self) -> bool {
        matches!(
            self,
            ToolKind::Write | ToolKind::Edit | ToolKind::Delete | ToolKind::Shell
        )
    }
}

/// One intercepted tool call.
#[derive(Debug, Clone)]
pub struct ToolCall {
    /// The tool kind.
    pub kind: ToolKind,
    /// The raw tool name (for messages).
    pub name: String,
    /// Target file path, for file-oriented tools.
    pub target: Option<String>,
    /// Command text, for shell tools.
    pub command: Option<String>,
    /// Read size in bytes, when known; probed from disk otherwise.
    pub size: Option<u64>,
    /// Whether an outer enforcer already adjudicated this call.
    pub delegated: bool,
}

impl ToolCall {
    /// Build a call from a tool name and its JSON input payload.
    pub fn from_tool(name: &str, input: &serde_json::Value) -> Self {
        let target = input
            .get("file_path")
            .or_else(|| input.get("path"))
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());
        let command = input
            .get("command")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());

        Self {
            kind: ToolKind::from_tool_name(name),
            name: name.to_string(),
            target,
            command,
            size: None,
            delegated: false,
        }
    }

    /// Mark the call as already adjudicated by an outer enforcer.
    pub fn as_delegated(mut self) -> Self {
        self.delegated = true;
        self
    }
}

/// Verdict of an interception.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// The call may proceed.
    Allow,
    /// The call is denied, with a one-line actionable reason.
    Block(String),
}

impl Verdict {
    /// Whether the call was allowed.
    pub fn is_allow(&self) -> bool {
        matches!(self, Verdict::Allow)
    }
}

/// The interception seam. The inner enforcer delegates to an outer one
/// through this trait, and tests substitute their own.
pub trait Intercept {
    /// Adjudicate one tool call.
    fn intercept(&self, call: &ToolCall) -> Result<Verdict>;
}

/// Enforcer configuration, constructed once per process and passed into the
/// constructor. The interception logic itself performs no environment
/// lookups.
#[derive(Debug, Clone)]
pub struct EnforcerConfig {
    /// Active phase name, when a phase is running.
    pub phase: Option<String>,
    /// Run key for budget accounting (run id, or working-directory
    /// fallback).
    pub run_key: String,
    /// Budget ceilings for reads.
    pub limits: BudgetLimits,
    /// Allow globs from the environment surface.
    pub allow_globs: Vec<String>,
    /// Whether to delegate to an outer orchestrator-level enforcer.
    pub delegate_to_outer: bool,
    /// Whether this process was itself invoked by the outer hook (its calls
    /// arrive pre-adjudicated).
    pub already_delegated: bool,
}

impl EnforcerConfig {
    /// Read the configuration surface from the environment, once.
    pub fn from_env() -> Self {
        let phase = std::env::var(env_vars::PHASE).ok().filter(|s| !s.is_empty());
        let run_key = std::env::var(env_vars::RUN_KEY)
            .ok()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| {
                let cwd = std::env::current_dir().unwrap_or_else(|_| ".".into());
                fallback_run_key(cwd)
            });

        let limits = BudgetLimits {
            max_bytes_per_read: env_u64(env_vars::MAX_BYTES_PER_READ),
            max_files: env_u64(env_vars::MAX_FILES),
            max_total_bytes: env_u64(env_vars::MAX_TOTAL_BYTES),
        };

        let allow_globs = std::env::var(env_vars::ALLOWLIST)
            .ok()
            .map(|raw| {
                raw.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Self {
            phase,
            run_key,
            limits,
            allow_globs,
            delegate_to_outer: env_flag(env_vars::OUTER_HOOK),
            already_delegated: env_flag(env_vars::HOOK_ACTIVE),
        }
    }
}

fn env_u64(name: &str) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(0)
}

fn env_flag(name: &str) -> bool {
    matches!(
        std::env::var(name).ok().as_deref(),
        Some("1") | Some("true")
    )
}

/// The guardrail enforcer.
pub struct Enforcer {
    ctx: WardenContext,
    config: EnforcerConfig,
    classifier: PathClassifier,
    ledger: ReadBudgetLedger,
    outer: Option<Box<dyn Intercept>>,
}

impl Enforcer {
    /// Build an enforcer from an explicit configuration object.
    pub fn new(ctx: WardenContext, config: EnforcerConfig, classifier: PathClassifier) -> Self {
        let ledger = ReadBudgetLedger::new(ctx.clone());
        Self {
            ctx,
            config,
            classifier,
            ledger,
            outer: None,
        }
    }

    /// Attach an outer orchestrator-level enforcer to delegate to.
    pub fn with_outer(mut self, outer: Box<dyn Intercept>) -> Self {
        self.outer = Some(outer);
        self
    }

    fn active_phase(&self) -> &str {
        self.config.phase.as_deref().unwrap_or("")
    }

    /// Record a denial on the run's event stream, best-effort.
    ///
    /// Denials for a working-directory run key have no run directory to
    /// record into; that is not an error.
    fn record_denial(&self, kind: EventKind, call: &ToolCall, reason: &str) {
        if !self.ctx.run_dir(&self.config.run_key).is_dir() {
            return;
        }
        let event = Event::new(kind, &self.config.run_key).with_details(json!({
            "tool": call.name,
            "target": call.target,
            "reason": reason,
        }));
        if let Err(e) = append_event(&self.ctx, &event) {
            eprintln!("Warning: failed to record denial event: {}", e);
        }
    }

    fn block(&self, kind: EventKind, call: &ToolCall, reason: String) -> Verdict {
        self.record_denial(kind, call, &reason);
        Verdict::Block(reason)
    }

    fn check_universal(&self, call: &ToolCall) -> Option<Verdict> {
        let Some(text) = call.command.as_deref() else {
            return None;
        };
        if !call.kind.is_write_capable() {
            return None;
        }

        if command::is_privilege_escalation(text) {
            return Some(self.block(
                EventKind::WriteDenied,
                call,
                format!("privilege escalation is not permitted: `{}`", text),
            ));
        }

        if command::is_vcs_revert(text) {
            if command::is_wholesale_revert(text) {
                return Some(self.block(
                    EventKind::WriteDenied,
                    call,
                    format!(
                        "wholesale version-control revert would discard protected files: `{}`",
                        text
                    ),
                ));
            }
            for candidate in command::command_path_candidates(text) {
                if let Some(category) = self.classifier.category_of(&candidate) {
                    return Some(self.block(
                        EventKind::WriteDenied,
                        call,
                        format!(
                            "version-control revert of {} '{}' is not permitted",
                            category, candidate
                        ),
                    ));
                }
            }
        }

        None
    }

    fn check_phase_writes(&self, call: &ToolCall) -> Option<Verdict> {
        let phase = self.active_phase();
        if phase.is_empty() {
            return None;
        }

        match call.kind {
            ToolKind::Write | ToolKind::Edit | ToolKind::Delete => {
                let target = call.target.as_deref()?;
                let classification = self.classifier.classify(target, phase);
                if classification.protected {
                    let category = classification
                        .category
                        .map(|c| c.as_str())
                        .unwrap_or("protected");
                    return Some(self.block(
                        EventKind::WriteDenied,
                        call,
                        format!(
                            "{} '{}' is read-only during the {} phase ({})",
                            category, target, phase, call.name
                        ),
                    ));
                }
            }
            ToolKind::Shell => {
                let text = call.command.as_deref()?;
                if !command::looks_like_mutating_command(text) {
                    return None;
                }
                for candidate in command::command_path_candidates(text) {
                    let classification = self.classifier.classify(&candidate, phase);
                    if classification.protected {
                        let category = classification
                            .category
                            .map(|c| c.as_str())
                            .unwrap_or("protected");
                        return Some(self.block(
                            EventKind::WriteDenied,
                            call,
                            format!(
                                "shell command mutates {} '{}', which is read-only during the {} phase",
                                category, candidate, phase
                            ),
                        ));
                    }
                }
            }
            _ => {}
        }
        None
    }

    fn check_read_budget(&self, call: &ToolCall) -> Result<Option<Verdict>> {
        if call.kind != ToolKind::Read {
            return Ok(None);
        }
        let Some(target) = call.target.as_deref() else {
            return Ok(None);
        };

        // An allowlisted path is never charged and never denied.
        if self.classifier.is_allowlisted(target) {
            return Ok(None);
        }

        let size = match call.size {
            Some(size) => size,
            None => std::fs::metadata(target).map(|m| m.len()).unwrap_or(0),
        };

        let charge = self
            .ledger
            .charge(&self.config.run_key, target, size, &self.config.limits)?;
        match charge {
            Charge::Allowed { .. } => Ok(None),
            Charge::Denied { code, reason } => {
                let message = format!("{} [{}]", reason, code);
                Ok(Some(self.block(EventKind::BudgetDenied, call, message)))
            }
        }
    }
}

impl Intercept for Enforcer {
    fn intercept(&self, call: &ToolCall) -> Result<Verdict> {
        // Delegation happens exactly once per call: either the marker is
        // already set (the outer hook re-issued this call), or we forward
        // with the marker set and adopt the outer verdict.
        if let Some(outer) = &self.outer
            && self.config.delegate_to_outer
            && !call.delegated
            && !self.config.already_delegated
        {
            return outer.intercept(&call.clone().as_delegated());
        }

        if let Some(verdict) = self.check_universal(call) {
            return Ok(verdict);
        }

        if let Some(verdict) = self.check_phase_writes(call) {
            return Ok(verdict);
        }

        if let Some(verdict) = self.check_read_budget(call)? {
            return Ok(verdict);
        }

        Ok(Verdict::Allow)
    }
}
