//! Locking subsystem for warden.
//!
//! Two mutual-exclusion concerns exist in the engine:
//! - Budget-ledger locks (`state/budget/<run_key>.lock`): one lock per run
//!   key so concurrent tool calls in the same run serialize their charge
//!   operations. Acquisition retries briefly instead of failing outright,
//!   since contention here is routine.
//! - Index partition locks (`<dashboard home>/locks/<project_id>.lock`): at
//!   most one indexer rebuilds a project partition at a time. Acquisition
//!   fails immediately; callers are expected to serialize reindex calls.
//!
//! # Lock Files
//!
//! Lock files are created using **create_new** semantics (exclusive create)
//! so only one process can hold a given lock. Each lock file contains JSON
//! metadata: `owner` (`user@HOST`), `host`, `pid`, `created_at` (RFC3339),
//! `action`. A budget lock whose holder process is gone is broken during
//! acquisition; a crashed charge never wedges a run's budget.
//!
//! # RAII Guards
//!
//! Locks are managed through RAII guard objects that automatically release
//! the lock when dropped. If deletion fails during drop, a warning is
//! printed but the program does not crash.

mod guard;
mod metadata;
mod operations;


pub use guard::LockGuard;
pub use metadata::LockMetadata;
pub use operations::{acquire_budget_lock, acquire_index_lock, acquire_lock};
