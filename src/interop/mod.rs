//! Interop: the request/response handoff protocol between phases.
//!
//! A phase hands work to another phase (in the same or a sibling subsystem)
//! by creating an immutable request record and having it dispatched. The
//! dispatch creates exactly one child run under the target subsystem,
//! applies the request's declared read budget (stricter-wins against the
//! target phase's defaults), executes the target phase, and writes exactly
//! one response keyed by the request id.
//!
//! Requests and responses are the only legal link between runs of different
//! subsystems. There is no static adjacency restriction: any
//! `{subsystem, phase}` pair may target any other pair, including one that
//! closes a cycle back to an ancestor subsystem — cycles are a supported
//! case, bounded because every hop is a fresh request created by a live
//! phase.

mod request;
mod response;
mod router;

#[cfg(test)]
mod tests;

pub use request::{InteropRequest, RequestBudget, RequestSpec, new_request_id};
pub use response::{InteropResponse, ResponseStatus};
pub use router::InteropRouter;
