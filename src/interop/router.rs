//! Interop router: request validation, dispatch, and queue selection.

use super::request::{InteropRequest, RequestSpec};
use super::response::{InteropResponse, ResponseStatus};
use crate::config::Config;
use crate::context::WardenContext;
use crate::error::{Result, WardenError};
use crate::events::{Event, EventKind, append_event, read_events};
use crate::phase::PhaseRunner;
use crate::run::{Capsule, CreateOptions, RunLedger, RunStatus, write_capsule, write_manifest};
use chrono::Utc;
use serde_json::json;

/// The interop router.
///
/// `dispatch` is synchronous from the requester's point of view: it blocks
/// for the duration of the target phase. Long-running phases should be
/// driven through the "fire once, poll the response file" pattern instead
/// of holding the call open (`pump --request <id>`, then `response <id>`).
pub struct InteropRouter<'a> {
    ctx: &'a WardenContext,
    config: &'a Config,
}

impl<'a> InteropRouter<'a> {
    /// Create a router over the given context and configuration.
    pub fn new(ctx: &'a WardenContext, config: &'a Config) -> Self {
        Self { ctx, config }
    }

    /// Validate and persist a request, recording it on the parent run's
    /// event stream.
    ///
    /// No routing policy is applied here: any pair may target any pair,
    /// cycles included.
    pub fn create_request(&self, spec: RequestSpec) -> Result<InteropRequest> {
        let request = spec.into_request(self.config)?;
        request.persist(self.ctx)?;

        if let Some(parent) = &request.parent_run_id
            && self.ctx.run_dir(parent).is_dir()
        {
            let event = Event::new(EventKind::RequestCreated, parent).with_details(json!({
                "request_id": request.request_id,
                "from_subsystem": request.from_subsystem,
                "from_phase": request.from_phase,
                "to_subsystem": request.to_subsystem,
                "action": request.action,
                "priority": request.priority,
                "reasoning": request.reasoning,
                "request_path": self.ctx.rel_to_root(&self.ctx.request_path(&request.request_id)),
            }));
            append_event(self.ctx, &event)?;
        }

        Ok(request)
    }

    /// Dispatch a request: create exactly one child run, execute the target
    /// phase under the request's budget, and write exactly one response.
    ///
    /// Phase failures and routing ambiguity are terminal response statuses
    /// (`failed`/`blocked`), not errors — the requester discovers them
    /// through the response file. Only idempotency violations and I/O
    /// failures surface as errors; re-dispatching an answered request is
    /// `AlreadyDispatched` and never creates a second child run.
    pub fn dispatch(
        &self,
        request_id: &str,
        runner: &dyn PhaseRunner,
    ) -> Result<InteropResponse> {
        if InteropResponse::exists(self.ctx, request_id) {
            return Err(WardenError::AlreadyDispatched(request_id.to_string()));
        }

        let request = InteropRequest::load(self.ctx, request_id)?;

        // Resolve the requesting phase before any child state is created.
        if self.resolve_from_phase(&request).is_none() {
            let response = InteropResponse {
                request_id: request.request_id.clone(),
                status: ResponseStatus::Blocked,
                run_id: None,
                capsule_pointer: None,
                manifest_pointer: None,
                deliverables: Vec::new(),
                notes: Some(format!(
                    "routing ambiguous: from_phase omitted and not inferable from parent run {}",
                    request.parent_run_id.as_deref().unwrap_or("<none>")
                )),
                written_at: Utc::now(),
            };
            return self.finish(&request, response);
        }

        let to_phase = request.to_phase().to_string();
        let action_key = format!("{}.{}", request.to_subsystem, to_phase);

        // The stricter of the request's ceiling and the target phase's own
        // defaults always wins.
        let effective_budget = request
            .read_budget
            .to_limits()
            .stricter(self.config.phase_budget(&action_key));

        let ledger = RunLedger::new(self.ctx.clone());
        let child = ledger.create(
            &request.to_subsystem,
            &to_phase,
            request.parent_run_id.as_deref(),
            CreateOptions {
                agent_runtime: self.config.agent_runtime.clone(),
                read_budget: Some(effective_budget),
                allowed_paths: request.read_budget.allowed_paths.clone(),
                reasoning: request.reasoning.clone(),
            },
        )?;

        let outcome = match runner.run_phase(self.ctx, &child, &request.args) {
            Ok(outcome) => outcome,
            Err(e) => {
                // The phase never ran; the child run fails and the error
                // travels in the response, not across the process boundary.
                let child = ledger.finalize(&child.run_id, RunStatus::Failed, None)?;
                let response = InteropResponse {
                    request_id: request.request_id.clone(),
                    status: ResponseStatus::Failed,
                    run_id: Some(child.run_id.clone()),
                    capsule_pointer: None,
                    manifest_pointer: None,
                    deliverables: Vec::new(),
                    notes: Some(e.to_string()),
                    written_at: Utc::now(),
                };
                return self.finish(&request, response);
            }
        };

        let status = if outcome.is_success() {
            RunStatus::Ok
        } else {
            RunStatus::Failed
        };
        let log_rel = self.ctx.rel_to_root(&outcome.log_path);
        ledger.attach_artifacts(&child.run_id, None, None, Some(log_rel.clone()))?;
        let child = ledger.finalize(&child.run_id, status, outcome.exit_code)?;

        // Guarantee the bounded summary artifacts exist, whether or not the
        // phase produced its own.
        let capsule_path = {
            let existing = self
                .ctx
                .capsules_dir(&child.run_id)
                .join(format!("{}_{}.md", child.subsystem, child.phase));
            if existing.is_file() {
                existing
            } else {
                let mut capsule = Capsule::new(match outcome.exit_code {
                    Some(0) => format!("{} completed", request.action),
                    Some(code) => format!("{} exited with code {}", request.action, code),
                    None => format!("{} timed out and was killed", request.action),
                })
                .with_evidence(log_rel.clone());
                if !outcome.is_success() {
                    capsule = capsule
                        .with_blocked_reason(format!("see {} for the full trace", log_rel));
                }
                write_capsule(self.ctx, &child, &capsule)?
            }
        };

        let manifest_path = {
            let existing = self
                .ctx
                .manifests_dir(&child.run_id)
                .join(format!("{}_{}.json", child.subsystem, child.phase));
            if existing.is_file() {
                existing
            } else {
                write_manifest(
                    self.ctx,
                    self.config,
                    &child,
                    &[outcome.log_path.clone()],
                    Vec::new(),
                    Some(&outcome.log_path),
                    Some(&capsule_path),
                )?
            }
        };

        let capsule_rel = self.ctx.rel_to_root(&capsule_path);
        let manifest_rel = self.ctx.rel_to_root(&manifest_path);

        let response = InteropResponse {
            request_id: request.request_id.clone(),
            status: if outcome.is_success() {
                ResponseStatus::Ok
            } else {
                ResponseStatus::Failed
            },
            run_id: Some(child.run_id.clone()),
            capsule_pointer: Some(capsule_rel),
            manifest_pointer: Some(manifest_rel),
            deliverables: request.expected_deliverables.clone(),
            notes: if outcome.timed_out {
                Some("phase timed out".to_string())
            } else {
                None
            },
            written_at: Utc::now(),
        };
        self.finish(&request, response)
    }

    /// The oldest unanswered request id, honoring priority.
    pub fn queue_front(&self) -> Result<Option<String>> {
        let dir = self.ctx.requests_dir();
        if !dir.is_dir() {
            return Ok(None);
        }

        let mut pending: Vec<InteropRequest> = Vec::new();
        let entries = std::fs::read_dir(&dir).map_err(|e| {
            WardenError::UserError(format!(
                "failed to read requests directory '{}': {}",
                dir.display(),
                e
            ))
        })?;
        for entry in entries {
            let entry = entry.map_err(|e| {
                WardenError::UserError(format!("failed to read requests directory entry: {}", e))
            })?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(request_id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if InteropResponse::exists(self.ctx, request_id) {
                continue;
            }
            // Skip malformed records rather than wedging the queue.
            if let Ok(request) = InteropRequest::load(self.ctx, request_id) {
                pending.push(request);
            }
        }

        pending.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(a.created_at.cmp(&b.created_at))
                .then(a.request_id.cmp(&b.request_id))
        });

        Ok(pending.into_iter().next().map(|r| r.request_id))
    }

    /// Resolve the requesting phase: the request's own field, else the
    /// parent run's record, else the parent's event trail.
    fn resolve_from_phase(&self, request: &InteropRequest) -> Option<String> {
        if let Some(phase) = &request.from_phase {
            return Some(phase.clone());
        }

        let parent_id = request.parent_run_id.as_deref()?;

        let ledger = RunLedger::new(self.ctx.clone());
        if let Ok(parent) = ledger.load(parent_id) {
            return Some(parent.phase);
        }

        // Record missing or unreadable: fall back to the event trail.
        let events = read_events(&self.ctx.events_path(parent_id)).ok()?;
        events.iter().find_map(|event| {
            if event.event == EventKind::RunCreated {
                event
                    .details
                    .get("phase")
                    .and_then(|v| v.as_str())
                    .map(|s| s.to_string())
            } else {
                None
            }
        })
    }

    /// Persist the response and record it on the parent run's stream.
    fn finish(
        &self,
        request: &InteropRequest,
        response: InteropResponse,
    ) -> Result<InteropResponse> {
        response.persist(self.ctx)?;

        if let Some(parent) = &request.parent_run_id
            && self.ctx.run_dir(parent).is_dir()
        {
            let event = Event::new(EventKind::ResponseWritten, parent).with_details(json!({
                "request_id": response.request_id,
                "status": response.status,
                "child_run_id": response.run_id,
                "response_path": self.ctx.rel_to_root(&self.ctx.response_path(&response.request_id)),
            }));
            append_event(self.ctx, &event)?;
        }

        Ok(response)
    }
}
