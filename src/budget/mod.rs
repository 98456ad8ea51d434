//! Read-budget accounting for phase tool calls.
//!
//! A phase operates under an optional read budget: a ceiling on the number
//! of distinct files it may read, a ceiling on cumulative bytes, and an
//! independent per-read byte ceiling. Budgets keep agent context small and
//! cost predictable; they are enforced by the guardrail layer before a read
//! executes.
//!
//! The persisted ledger state is transient: it lives under `state/budget/`
//! keyed by run key and is not part of the permanent run record.

mod ledger;


pub use ledger::{Charge, LedgerState, ReadBudgetLedger};

use serde::{Deserialize, Serialize};

/// Machine-readable denial reason codes.
pub mod deny_codes {
    /// A single read exceeded the per-read byte ceiling.
    pub const SINGLE_READ_TOO_LARGE: &str = "single-read-too-large";

    /// Adding this path would exceed the distinct-file ceiling.
    pub const UNIQUE_FILE_LIMIT_EXCEEDED: &str = "unique-file-limit-exceeded";

    /// Cumulative bytes would exceed the total-byte ceiling.
    pub const TOTAL_BYTES_EXCEEDED: &str = "total-bytes-exceeded";
}

/// Read-budget ceilings. A value of 0 means "no ceiling".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct BudgetLimits {
    /// Maximum bytes a single read may return (0 = unlimited).
    pub max_bytes_per_read: u64,

    /// Maximum distinct files ever charged in one run (0 = unlimited).
    pub max_files: u64,

    /// Maximum cumulative bytes charged in one run (0 = unlimited).
    pub max_total_bytes: u64,
}

impl BudgetLimits {
    /// Whether no cumulative ceiling is set at all.
    ///
    /// With both cumulative ceilings unset the ledger is a no-op that still
    /// permits the call; the per-read ceiling is checked independently.
    pub fn cumulative_unlimited(&self) -> bool {
        self.max_files == 0 && self.max_total_bytes == 0
    }

    /// Combine two budgets, keeping the stricter ceiling per field.
    ///
    /// An unset ceiling (0) never wins over a set one: when an interop
    /// request declares a ceiling and the target phase has its own default,
    /// the smaller set value applies.
    pub fn stricter(self, other: Self) -> Self {
        Self {
            max_bytes_per_read: min_set(self.max_bytes_per_read, other.max_bytes_per_read),
            max_files: min_set(self.max_files, other.max_files),
            max_total_bytes: min_set(self.max_total_bytes, other.max_total_bytes),
        }
    }
}

/// Minimum of two ceilings where 0 means "unset".
fn min_set(a: u64, b: u64) -> u64 {
    match (a, b) {
        (0, b) => b,
        (a, 0) => a,
        (a, b) => a.min(b),
    }
}
