//! Error types for the warden CLI.
//!
//! Uses thiserror for derive macros and provides user-actionable error messages.

use crate::exit_codes;
use thiserror::Error;

/// Main error type for warden operations.
///
/// Guardrail denials (`Denied`, `BudgetExceeded`) are always recoverable by
/// the caller choosing a different action; they terminate a single tool call,
/// never the phase. The conflict variants (`AlreadyFinalized`,
/// `AlreadyDispatched`) signal idempotency violations and are surfaced
/// immediately rather than silently ignored.
#[derive(Error, Debug)]
pub enum WardenError {
    /// User provided invalid arguments or the system is in an invalid state.
    #[error("{0}")]
    UserError(String),

    /// A guardrail refused a tool call.
    #[error("{0}")]
    Denied(String),

    /// A read-budget ceiling refused a tool call. Specialization of a denial
    /// with a machine-readable reason code.
    #[error("{reason} [{code}]")]
    BudgetExceeded {
        /// Machine-readable reason code (see `budget::deny_codes`).
        code: &'static str,
        /// Human-readable one-line reason.
        reason: String,
    },

    /// A run was finalized a second time with a conflicting status.
    #[error("run '{run_id}' is already finalized as '{existing}'")]
    AlreadyFinalized {
        /// The run that was already terminal.
        run_id: String,
        /// The status it was finalized with.
        existing: String,
    },

    /// A request was dispatched after its response was already written.
    #[error("request '{0}' already has a response; supersede it with a new request")]
    AlreadyDispatched(String),

    /// Artifact validation failed (capsule/manifest bounds or required fields).
    #[error("Validation failed: {0}")]
    ValidationError(String),

    /// Lock could not be acquired.
    #[error("Lock acquisition failed: {0}")]
    LockError(String),
}

impl WardenError {
    /// Returns the appropriate exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            WardenError::UserError(_) => exit_codes::USER_ERROR,
            WardenError::Denied(_) => exit_codes::DENIED,
            WardenError::BudgetExceeded { .. } => exit_codes::DENIED,
            WardenError::AlreadyFinalized { .. } => exit_codes::CONFLICT,
            WardenError::AlreadyDispatched(_) => exit_codes::CONFLICT,
            WardenError::ValidationError(_) => exit_codes::VALIDATION_FAILURE,
            WardenError::LockError(_) => exit_codes::LOCK_FAILURE,
        }
    }

    /// Whether this error is a guardrail denial (as opposed to an
    /// operational failure).
    pub fn is_denial(&self) -> bool {
        matches!(
            self,
            WardenError::Denied(_) | WardenError::BudgetExceeded { .. }
        )
    }
}

/// Result type alias for warden operations.
pub type Result<T> = std::result::Result<T, WardenError>;
