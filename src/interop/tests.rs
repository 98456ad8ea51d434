//! Tests for the interop request/response protocol.

use super::*;
use crate::budget::BudgetLimits;
use crate::config::{Config, Priority};
use crate::context::WardenContext;
use crate::error::WardenError;
use crate::events::{EventKind, read_events};
use crate::phase::CommandPhaseRunner;
use crate::run::{CreateOptions, RunLedger, RunStatus};
use tempfile::TempDir;

fn make_root(actions: &[(&str, &str)]) -> (TempDir, WardenContext, Config) {
    let temp_dir = TempDir::new().unwrap();
    let ctx = WardenContext::at_root(temp_dir.path());

    let mut config = Config::default();
    config.phase_timeout_seconds = 30;
    for (key, command) in actions {
        config.actions.insert(key.to_string(), command.to_string());
    }

    (temp_dir, ctx, config)
}

fn make_parent(ctx: &WardenContext, subsystem: &str, phase: &str) -> String {
    let ledger = RunLedger::new(ctx.clone());
    ledger
        .create(
            subsystem,
            phase,
            None,
            CreateOptions {
                agent_runtime: "cli".to_string(),
                ..Default::default()
            },
        )
        .unwrap()
        .run_id
}

fn spec(from: &str, from_phase: Option<&str>, to: &str, action: &str, parent: Option<&str>) -> RequestSpec {
    RequestSpec {
        from_subsystem: from.to_string(),
        from_phase: from_phase.map(|s| s.to_string()),
        to_subsystem: to.to_string(),
        action: action.to_string(),
        parent_run_id: parent.map(|s| s.to_string()),
        ..Default::default()
    }
}

#[test]
fn create_request_persists_immutable_record() {
    let (_t, ctx, config) = make_root(&[]);
    let router = InteropRouter::new(&ctx, &config);
    let parent = make_parent(&ctx, "tdd", "implement");

    let request = router
        .create_request(spec("tdd", Some("implement"), "research", "analyze", Some(&parent)))
        .unwrap();

    assert!(request.request_id.starts_with("rq-"));
    assert!(ctx.request_path(&request.request_id).is_file());

    let loaded = InteropRequest::load(&ctx, &request.request_id).unwrap();
    assert_eq!(loaded.to_subsystem, "research");
    assert_eq!(loaded.to_phase(), "analyze");

    // Recorded on the parent's event stream.
    let events = read_events(&ctx.events_path(&parent)).unwrap();
    assert!(events.iter().any(|e| e.event == EventKind::RequestCreated
        && e.details["request_id"] == request.request_id.as_str()));
}

#[test]
fn create_request_rejects_empty_fields() {
    let (_t, ctx, config) = make_root(&[]);
    let router = InteropRouter::new(&ctx, &config);

    let result = router.create_request(spec("", None, "research", "analyze", None));
    assert!(result.is_err());

    let result = router.create_request(spec("tdd", None, "research", "", None));
    assert!(result.is_err());
}

#[test]
fn omitted_budget_falls_back_to_configured_defaults() {
    let (_t, ctx, config) = make_root(&[]);
    let router = InteropRouter::new(&ctx, &config);

    let request = router
        .create_request(spec("tdd", Some("implement"), "research", "analyze", None))
        .unwrap();

    assert_eq!(request.read_budget.max_files, 8);
    assert_eq!(request.read_budget.max_total_bytes, 300_000);
}

#[test]
fn action_phase_parsing_handles_namespaced_actions() {
    let (_t, ctx, config) = make_root(&[]);
    let router = InteropRouter::new(&ctx, &config);

    let request = router
        .create_request(spec("tdd", Some("implement"), "research", "research.analyze", None))
        .unwrap();
    assert_eq!(request.to_phase(), "analyze");
}

#[test]
fn dispatch_creates_one_child_run_and_one_response() {
    let (_t, ctx, config) = make_root(&[("research.analyze", "echo analyzing")]);
    let router = InteropRouter::new(&ctx, &config);
    let parent = make_parent(&ctx, "tdd", "implement");

    let request = router
        .create_request(spec("tdd", Some("implement"), "research", "analyze", Some(&parent)))
        .unwrap();

    let runner = CommandPhaseRunner::new(&config);
    let response = router.dispatch(&request.request_id, &runner).unwrap();

    assert_eq!(response.status, ResponseStatus::Ok);
    let child_run_id = response.run_id.clone().unwrap();

    // The child run is scoped to the target subsystem/phase and linked to
    // the parent.
    let ledger = RunLedger::new(ctx.clone());
    let child = ledger.load(&child_run_id).unwrap();
    assert_eq!(child.subsystem, "research");
    assert_eq!(child.phase, "analyze");
    assert_eq!(child.parent_run_id.as_deref(), Some(parent.as_str()));
    assert_eq!(child.status, RunStatus::Ok);

    // Pointers resolve to real bounded artifacts.
    let capsule = ctx.root.join(response.capsule_pointer.as_deref().unwrap());
    assert!(capsule.is_file());
    let manifest = ctx.root.join(response.manifest_pointer.as_deref().unwrap());
    assert!(manifest.is_file());

    // The parent's stream records the response.
    let events = read_events(&ctx.events_path(&parent)).unwrap();
    assert!(events.iter().any(|e| e.event == EventKind::ResponseWritten));
}

#[test]
fn redispatch_is_rejected_and_creates_no_second_run() {
    let (_t, ctx, config) = make_root(&[("research.analyze", "echo analyzing")]);
    let router = InteropRouter::new(&ctx, &config);
    let parent = make_parent(&ctx, "tdd", "implement");

    let request = router
        .create_request(spec("tdd", Some("implement"), "research", "analyze", Some(&parent)))
        .unwrap();

    let runner = CommandPhaseRunner::new(&config);
    router.dispatch(&request.request_id, &runner).unwrap();

    let ledger = RunLedger::new(ctx.clone());
    let runs_before = ledger.list().unwrap().len();

    let second = router.dispatch(&request.request_id, &runner);
    match second {
        Err(WardenError::AlreadyDispatched(id)) => assert_eq!(id, request.request_id),
        other => panic!("expected AlreadyDispatched, got {:?}", other),
    }

    assert_eq!(ledger.list().unwrap().len(), runs_before);
}

#[test]
fn request_budget_stricter_than_phase_default_wins() {
    let (_t, ctx, mut config) = make_root(&[("research.analyze", "echo analyzing")]);
    config.phase_budgets.insert(
        "research.analyze".to_string(),
        BudgetLimits {
            max_bytes_per_read: 0,
            max_files: 0,
            max_total_bytes: 20_000,
        },
    );
    let router = InteropRouter::new(&ctx, &config);
    let parent = make_parent(&ctx, "tdd", "implement");

    let mut request_spec = spec("tdd", Some("implement"), "research", "analyze", Some(&parent));
    request_spec.read_budget = Some(RequestBudget {
        max_files: 8,
        max_total_bytes: 5_000,
        allowed_paths: vec!["runs/*/capsules/*.md".to_string()],
    });
    let request = router.create_request(request_spec).unwrap();

    let runner = CommandPhaseRunner::new(&config);
    let response = router.dispatch(&request.request_id, &runner).unwrap();

    let ledger = RunLedger::new(ctx.clone());
    let child = ledger.load(response.run_id.as_deref().unwrap()).unwrap();
    let budget = child.read_budget.unwrap();

    // Effective ceiling is the request's stricter 5000, not the phase's
    // 20000.
    assert_eq!(budget.max_total_bytes, 5_000);
    assert_eq!(budget.max_files, 8);
    assert_eq!(child.allowed_paths, vec!["runs/*/capsules/*.md"]);
}

#[test]
fn from_phase_is_inferred_from_parent_run() {
    let (_t, ctx, config) = make_root(&[("research.analyze", "echo analyzing")]);
    let router = InteropRouter::new(&ctx, &config);
    let parent = make_parent(&ctx, "tdd", "implement");

    // from_phase omitted: the parent's recorded phase supplies it.
    let request = router
        .create_request(spec("tdd", None, "research", "analyze", Some(&parent)))
        .unwrap();

    let runner = CommandPhaseRunner::new(&config);
    let response = router.dispatch(&request.request_id, &runner).unwrap();
    assert_eq!(response.status, ResponseStatus::Ok);
}

#[test]
fn inference_failure_is_a_blocked_response_not_a_crash() {
    let (_t, ctx, config) = make_root(&[("research.analyze", "echo analyzing")]);
    let router = InteropRouter::new(&ctx, &config);

    // No from_phase and no parent run to infer from.
    let request = router
        .create_request(spec("tdd", None, "research", "analyze", None))
        .unwrap();

    let runner = CommandPhaseRunner::new(&config);
    let response = router.dispatch(&request.request_id, &runner).unwrap();

    assert_eq!(response.status, ResponseStatus::Blocked);
    assert!(response.run_id.is_none());
    assert!(response.notes.unwrap().contains("routing ambiguous"));

    // No child run was created.
    let ledger = RunLedger::new(ctx.clone());
    assert_eq!(ledger.list().unwrap().len(), 0);
}

#[test]
fn failed_phase_is_a_failed_response_with_pointers() {
    let (_t, ctx, config) = make_root(&[("research.analyze", "sh -c \"exit 2\"")]);
    let router = InteropRouter::new(&ctx, &config);
    let parent = make_parent(&ctx, "tdd", "implement");

    let request = router
        .create_request(spec("tdd", Some("implement"), "research", "analyze", Some(&parent)))
        .unwrap();

    let runner = CommandPhaseRunner::new(&config);
    let response = router.dispatch(&request.request_id, &runner).unwrap();

    assert_eq!(response.status, ResponseStatus::Failed);
    let child_run_id = response.run_id.unwrap();
    let ledger = RunLedger::new(ctx.clone());
    let child = ledger.load(&child_run_id).unwrap();
    assert_eq!(child.status, RunStatus::Failed);
    assert_eq!(child.exit_code, Some(2));

    // Failure is discoverable from the capsule without reading logs.
    let capsule = ctx.root.join(response.capsule_pointer.unwrap());
    let content = std::fs::read_to_string(capsule).unwrap();
    assert!(content.contains("exited with code 2"));
    assert!(content.contains("If blocked: see"));
}

#[test]
fn unconfigured_action_is_a_failed_response() {
    let (_t, ctx, config) = make_root(&[]);
    let router = InteropRouter::new(&ctx, &config);
    let parent = make_parent(&ctx, "tdd", "implement");

    let request = router
        .create_request(spec("tdd", Some("implement"), "research", "analyze", Some(&parent)))
        .unwrap();

    let runner = CommandPhaseRunner::new(&config);
    let response = router.dispatch(&request.request_id, &runner).unwrap();

    assert_eq!(response.status, ResponseStatus::Failed);
    assert!(response.notes.unwrap().contains("no action configured"));

    // The child run exists and is terminal, so the attempt is auditable.
    let child = RunLedger::new(ctx.clone())
        .load(response.run_id.as_deref().unwrap())
        .unwrap();
    assert_eq!(child.status, RunStatus::Failed);
}

#[test]
fn routing_cycle_completes_with_correct_parents() {
    let (_t, ctx, config) = make_root(&[
        ("research.analyze", "echo hop"),
        ("math.formalize-proof", "echo hop"),
        ("tdd.implement", "echo hop"),
    ]);
    let router = InteropRouter::new(&ctx, &config);
    let runner = CommandPhaseRunner::new(&config);

    let start = make_parent(&ctx, "tdd", "implement");

    // tdd -> research -> math -> back into tdd: a cycle at the subsystem
    // level, a plain chain at the run level.
    let mut parent = start.clone();
    let mut hops = Vec::new();
    for (to, action) in [
        ("research", "analyze"),
        ("math", "formalize-proof"),
        ("tdd", "implement"),
    ] {
        let ledger = RunLedger::new(ctx.clone());
        let from = ledger.load(&parent).unwrap();
        let request = router
            .create_request(spec(
                &from.subsystem,
                Some(&from.phase),
                to,
                action,
                Some(&parent),
            ))
            .unwrap();
        let response = router.dispatch(&request.request_id, &runner).unwrap();
        assert_eq!(response.status, ResponseStatus::Ok);
        let child = response.run_id.unwrap();
        hops.push((parent.clone(), child.clone()));
        parent = child;
    }

    // Bounded chain of runs, each with the correct parent pointer.
    let ledger = RunLedger::new(ctx.clone());
    assert_eq!(ledger.list().unwrap().len(), 4);
    for (expected_parent, child_id) in &hops {
        let child = ledger.load(child_id).unwrap();
        assert_eq!(child.parent_run_id.as_deref(), Some(expected_parent.as_str()));
    }

    // The final hop landed back in the starting subsystem.
    let last = ledger.load(&parent).unwrap();
    assert_eq!(last.subsystem, "tdd");
}

#[test]
fn queue_front_prefers_priority_then_age() {
    let (_t, ctx, config) = make_root(&[]);
    let router = InteropRouter::new(&ctx, &config);

    assert!(router.queue_front().unwrap().is_none());

    let mut low = spec("tdd", Some("implement"), "research", "analyze", None);
    low.priority = Priority::Low;
    let low = router.create_request(low).unwrap();

    std::thread::sleep(std::time::Duration::from_millis(20));

    let normal = router
        .create_request(spec("tdd", Some("implement"), "research", "analyze", None))
        .unwrap();

    std::thread::sleep(std::time::Duration::from_millis(20));

    let mut high = spec("tdd", Some("implement"), "research", "analyze", None);
    high.priority = Priority::High;
    let high = router.create_request(high).unwrap();

    // Highest priority first, despite being newest.
    assert_eq!(router.queue_front().unwrap(), Some(high.request_id.clone()));

    // Answer it; normal outranks low.
    InteropResponse {
        request_id: high.request_id.clone(),
        status: ResponseStatus::Ok,
        run_id: None,
        capsule_pointer: None,
        manifest_pointer: None,
        deliverables: Vec::new(),
        notes: None,
        written_at: chrono::Utc::now(),
    }
    .persist(&ctx)
    .unwrap();

    assert_eq!(router.queue_front().unwrap(), Some(normal.request_id.clone()));

    InteropResponse {
        request_id: normal.request_id.clone(),
        status: ResponseStatus::Ok,
        run_id: None,
        capsule_pointer: None,
        manifest_pointer: None,
        deliverables: Vec::new(),
        notes: None,
        written_at: chrono::Utc::now(),
    }
    .persist(&ctx)
    .unwrap();

    assert_eq!(router.queue_front().unwrap(), Some(low.request_id.clone()));
}

#[test]
fn response_write_is_once_only() {
    let (_t, ctx, _config) = make_root(&[]);

    let response = InteropResponse {
        request_id: "rq-test-000001".to_string(),
        status: ResponseStatus::Ok,
        run_id: None,
        capsule_pointer: None,
        manifest_pointer: None,
        deliverables: Vec::new(),
        notes: None,
        written_at: chrono::Utc::now(),
    };
    response.persist(&ctx).unwrap();

    let second = response.persist(&ctx);
    assert!(matches!(second, Err(WardenError::AlreadyDispatched(_))));
}
