//! Persisted per-run read-budget ledger.
//!
//! The ledger tracks, per run key, the set of distinct absolute paths
//! already charged and the cumulative bytes charged. State is a small JSON
//! record under `state/budget/<run_key>.json`, mutated only inside the run
//! key's lock so concurrent charges against the same run never lose updates.
//!
//! Charging policy: bytes are charged on every read; the unique-file slot is
//! charged only on first sight of a path. A denied charge leaves the
//! persisted state byte-identical to the state before the charge.

use super::{BudgetLimits, deny_codes};
use crate::context::WardenContext;
use crate::error::{Result, WardenError};
use crate::fs::atomic_write_file;
use crate::locks;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Persisted ledger state for one run key.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LedgerState {
    /// Absolute paths already charged a unique-file slot.
    pub files: BTreeSet<String>,

    /// Cumulative bytes charged across all reads.
    pub total_bytes: u64,
}

impl LedgerState {
    /// Load ledger state, returning the empty state when no record exists.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|e| {
            WardenError::UserError(format!(
                "failed to read budget state '{}': {}",
                path.display(),
                e
            ))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            WardenError::UserError(format!(
                "failed to parse budget state '{}': {}",
                path.display(),
                e
            ))
        })
    }

    fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).map_err(|e| {
            WardenError::UserError(format!("failed to serialize budget state: {}", e))
        })?;
        atomic_write_file(path, &json)
    }
}

/// Outcome of a single charge attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Charge {
    /// The read is within budget; ledger state has been updated.
    Allowed {
        /// Distinct files charged so far (after this read).
        unique_files: u64,
        /// Cumulative bytes charged so far (after this read).
        total_bytes: u64,
    },
    /// The read would exceed a ceiling; ledger state is unchanged.
    Denied {
        /// Machine-readable reason code (see `deny_codes`).
        code: &'static str,
        /// Human-readable one-line reason.
        reason: String,
    },
}

impl Charge {
    /// Whether the charge was allowed.
    pub fn is_allowed(&self) -> bool {
        matches!(self, Charge::Allowed { .. })
    }

    /// Convert a denial into the corresponding error, passing allowances
    /// through.
    pub fn into_result(self) -> Result<()> {
        match self {
            Charge::Allowed { .. } => Ok(()),
            Charge::Denied { code, reason } => Err(WardenError::BudgetExceeded { code, reason }),
        }
    }
}

/// Per-run read-budget ledger with cross-process persistence.
#[derive(Debug, Clone)]
pub struct ReadBudgetLedger {
    ctx: WardenContext,
}

impl ReadBudgetLedger {
    /// Create a ledger rooted at the given orchestration context.
    pub fn new(ctx: WardenContext) -> Self {
        Self { ctx }
    }

    /// Attempt to charge a read of `size` bytes of `path` against the run
    /// key's budget.
    ///
    /// The per-read ceiling is checked before any state is touched: an
    /// oversized read is denied without acquiring the lock, so it can never
    /// be partially charged. When both cumulative ceilings are unset the
    /// ledger is a no-op that permits the call without creating state.
    pub fn charge(
        &self,
        run_key: &str,
        path: &str,
        size: u64,
        limits: &BudgetLimits,
    ) -> Result<Charge> {
        if limits.max_bytes_per_read > 0 && size > limits.max_bytes_per_read {
            return Ok(Charge::Denied {
                code: deny_codes::SINGLE_READ_TOO_LARGE,
                reason: format!(
                    "read of {} bytes from '{}' exceeds the {}-byte single-read ceiling",
                    size, path, limits.max_bytes_per_read
                ),
            });
        }

        if limits.cumulative_unlimited() {
            return Ok(Charge::Allowed {
                unique_files: 0,
                total_bytes: 0,
            });
        }

        // Single short exclusive section per charge, never nested.
        let _lock = locks::acquire_budget_lock(&self.ctx, run_key)?;

        let state_path = self.ctx.budget_state_path(run_key);
        let mut state = LedgerState::load(&state_path)?;

        let abs = absolutize(path);
        let first_sight = !state.files.contains(&abs);

        if limits.max_files > 0 && first_sight && state.files.len() as u64 >= limits.max_files {
            return Ok(Charge::Denied {
                code: deny_codes::UNIQUE_FILE_LIMIT_EXCEEDED,
                reason: format!(
                    "reading '{}' would exceed the {}-distinct-file ceiling ({} already charged)",
                    path,
                    limits.max_files,
                    state.files.len()
                ),
            });
        }

        let new_total = state.total_bytes.saturating_add(size);
        if limits.max_total_bytes > 0 && new_total > limits.max_total_bytes {
            return Ok(Charge::Denied {
                code: deny_codes::TOTAL_BYTES_EXCEEDED,
                reason: format!(
                    "read of {} bytes from '{}' would bring the total to {} bytes, over the {}-byte ceiling",
                    size, path, new_total, limits.max_total_bytes
                ),
            });
        }

        state.files.insert(abs);
        state.total_bytes = new_total;
        state.save(&state_path)?;

        Ok(Charge::Allowed {
            unique_files: state.files.len() as u64,
            total_bytes: state.total_bytes,
        })
    }

    /// Current ledger state for a run key (empty when nothing was charged).
    pub fn state(&self, run_key: &str) -> Result<LedgerState> {
        LedgerState::load(&self.ctx.budget_state_path(run_key))
    }
}

/// Absolutize a path for the unique-file set.
///
/// Uniqueness is keyed on the absolute form so `./a.txt` and `a.txt` charge
/// one slot. Symlinks are not chased; this is an accounting key, not a
/// security boundary.
fn absolutize(path: &str) -> String {
    let p = PathBuf::from(path);
    let abs = if p.is_absolute() {
        p
    } else {
        match std::env::current_dir() {
            Ok(cwd) => cwd.join(p),
            Err(_) => p,
        }
    };
    normalize_components(&abs)
}

/// Collapse `.` and `..` components lexically.
fn normalize_components(path: &Path) -> String {
    use std::path::Component;

    let mut parts: Vec<std::ffi::OsString> = Vec::new();
    let mut prefix = String::new();
    for component in path.components() {
        match component {
            Component::Prefix(p) => prefix = p.as_os_str().to_string_lossy().to_string(),
            Component::RootDir => parts.clear(),
            Component::CurDir => {}
            Component::ParentDir => {
                parts.pop();
            }
            Component::Normal(part) => parts.push(part.to_os_string()),
        }
    }

    let joined = parts
        .iter()
        .map(|p| p.to_string_lossy().to_string())
        .collect::<Vec<_>>()
        .join("/");
    format!("{}/{}", prefix, joined)
}
