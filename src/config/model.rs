//! Config struct definition and default implementation.

use super::types::*;
use crate::budget::BudgetLimits;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Configuration for the warden engine.
///
/// This struct represents the contents of `warden.yaml` at the
/// orchestration root. Unknown fields in the YAML are ignored for forward
/// compatibility.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // =========================================================================
    // Phase execution
    // =========================================================================
    /// Label recorded on runs for the agent runtime in use.
    #[serde(default = "default_agent_runtime")]
    pub agent_runtime: String,

    /// Maximum seconds a phase command may run before it is killed.
    #[serde(default = "default_phase_timeout_seconds")]
    pub phase_timeout_seconds: u64,

    /// Command templates per `subsystem.phase` action key.
    ///
    /// The command string is shell-words parsed (no shell); request args are
    /// appended as extra argv entries.
    #[serde(default)]
    pub actions: BTreeMap<String, String>,

    // =========================================================================
    // Read budgets
    // =========================================================================
    /// Engine-wide default read budget (0 fields = unlimited).
    #[serde(default)]
    pub default_read_budget: BudgetLimits,

    /// Per-phase budget overrides keyed by `subsystem.phase`.
    #[serde(default)]
    pub phase_budgets: BTreeMap<String, BudgetLimits>,

    // =========================================================================
    // Protection
    // =========================================================================
    /// Configured default allow globs (unioned with environment and
    /// caller-supplied allow sources).
    #[serde(default)]
    pub allow_globs: Vec<String>,

    /// Phase name -> protected category names.
    #[serde(default = "crate::classify::default_phase_policies")]
    pub phase_policies: BTreeMap<String, Vec<String>>,

    /// Protected category name -> recognition regexes.
    #[serde(default = "crate::classify::default_category_patterns")]
    pub category_patterns: BTreeMap<String, Vec<String>>,

    // =========================================================================
    // Artifact bounds
    // =========================================================================
    /// Maximum entries in a manifest artifact index; the remainder is
    /// summarized into the omitted counters.
    #[serde(default = "default_manifest_max_entries")]
    pub manifest_max_entries: usize,

    /// Advisory byte bound recorded in the manifest limits block.
    #[serde(default = "default_manifest_max_total_bytes")]
    pub manifest_max_total_bytes: u64,

    /// Maximum bytes a bounded log query may return.
    #[serde(default = "default_log_query_max_bytes")]
    pub log_query_max_bytes: usize,

    // =========================================================================
    // Interop defaults
    // =========================================================================
    /// Default distinct-file ceiling for interop requests that omit one.
    #[serde(default = "default_request_max_files")]
    pub request_default_max_files: u64,

    /// Default total-byte ceiling for interop requests that omit one.
    #[serde(default = "default_request_max_total_bytes")]
    pub request_default_max_total_bytes: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            agent_runtime: default_agent_runtime(),
            phase_timeout_seconds: default_phase_timeout_seconds(),
            actions: BTreeMap::new(),
            default_read_budget: BudgetLimits::default(),
            phase_budgets: BTreeMap::new(),
            allow_globs: Vec::new(),
            phase_policies: crate::classify::default_phase_policies(),
            category_patterns: crate::classify::default_category_patterns(),
            manifest_max_entries: default_manifest_max_entries(),
            manifest_max_total_bytes: default_manifest_max_total_bytes(),
            log_query_max_bytes: default_log_query_max_bytes(),
            request_default_max_files: default_request_max_files(),
            request_default_max_total_bytes: default_request_max_total_bytes(),
        }
    }
}

impl Config {
    /// Effective default budget for an action key (`subsystem.phase`).
    ///
    /// A per-phase override wins over the engine-wide default; both are
    /// combined stricter-wins with whatever ceiling a request declares.
    pub fn phase_budget(&self, action_key: &str) -> BudgetLimits {
        match self.phase_budgets.get(action_key) {
            Some(limits) => *limits,
            None => self.default_read_budget,
        }
    }

    /// Command template for an action key, if configured.
    pub fn action_command(&self, action_key: &str) -> Option<&str> {
        self.actions.get(action_key).map(|s| s.as_str())
    }
}
