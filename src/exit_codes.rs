//! Exit code constants for the warden CLI.
//!
//! - 0: Success
//! - 1: User error (bad args, invalid state)
//! - 2: Guardrail denial (tool call blocked, including budget ceilings)
//! - 3: Validation failure (capsule/manifest bounds)
//! - 4: Conflict (already finalized / already dispatched)
//! - 5: Lock acquisition failure

/// Successful execution.
pub const SUCCESS: i32 = 0;

/// User error: bad arguments or invalid state.
pub const USER_ERROR: i32 = 1;

/// Guardrail denial: a tool call was blocked. The calling process decides
/// whether to retry with a different action.
pub const DENIED: i32 = 2;

/// Validation failure: capsule or manifest violated its bounds.
pub const VALIDATION_FAILURE: i32 = 3;

/// Conflict: an idempotency rule was violated (run already finalized with a
/// different status, request already answered).
pub const CONFLICT: i32 = 4;

/// Lock acquisition failure: budget state or index partition lock could not
/// be acquired.
pub const LOCK_FAILURE: i32 = 5;
