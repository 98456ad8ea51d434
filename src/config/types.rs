//! Configuration types and defaults for warden.

use serde::{Deserialize, Serialize};

/// Priority of an interop request. The queue pump prefers higher priority,
/// then older enqueue time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Background work; dispatched when nothing else waits.
    Low,
    /// Default priority.
    #[default]
    Normal,
    /// Dispatched ahead of normal work.
    High,
}

impl Priority {
    /// Parse a priority from a string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Self::Low),
            "normal" => Some(Self::Normal),
            "high" => Some(Self::High),
            _ => None,
        }
    }

    /// Configuration name of the priority.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// Default value functions for serde

pub(crate) fn default_agent_runtime() -> String {
    "cli".to_string()
}
pub(crate) fn default_phase_timeout_seconds() -> u64 {
    900
}
pub(crate) fn default_manifest_max_entries() -> usize {
    400
}
pub(crate) fn default_manifest_max_total_bytes() -> u64 {
    20_000_000
}
pub(crate) fn default_log_query_max_bytes() -> usize {
    32_000
}
pub(crate) fn default_request_max_files() -> u64 {
    8
}
pub(crate) fn default_request_max_total_bytes() -> u64 {
    300_000
}
