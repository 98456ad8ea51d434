//! Tests for the dashboard registry, indexer, and queries.

use super::*;
use crate::config::Config;
use crate::context::WardenContext;
use crate::interop::{InteropRouter, RequestSpec};
use crate::phase::CommandPhaseRunner;
use crate::run::{CreateOptions, RunLedger};
use std::path::Path;
use tempfile::TempDir;

fn make_project(home: &Path, name: &str) -> (TempDir, WardenContext, ProjectRecord) {
    let temp_dir = TempDir::new().unwrap();
    let ctx = WardenContext::at_root(temp_dir.path());
    let record = register(home, &ctx.root, &ctx.root, Some(name)).unwrap();
    (temp_dir, ctx, record)
}

fn add_run(ctx: &WardenContext, subsystem: &str, phase: &str) -> String {
    let ledger = RunLedger::new(ctx.clone());
    let record = ledger
        .create(
            subsystem,
            phase,
            None,
            CreateOptions {
                agent_runtime: "cli".to_string(),
                ..Default::default()
            },
        )
        .unwrap();
    ledger
        .finalize(&record.run_id, crate::run::RunStatus::Ok, Some(0))
        .unwrap();
    record.run_id
}

#[test]
fn register_is_idempotent() {
    let home = TempDir::new().unwrap();
    let project = TempDir::new().unwrap();

    let first = register(home.path(), project.path(), project.path(), Some("demo")).unwrap();
    let second = register(home.path(), project.path(), project.path(), Some("demo")).unwrap();

    // Same id both times, and only one registry entry.
    assert_eq!(first.project_id, second.project_id);
    assert_eq!(list_projects(home.path()).len(), 1);
    assert_eq!(first.registered_at, second.registered_at);
}

#[test]
fn project_id_is_stable_per_root() {
    let a = project_id_for(Path::new("/srv/project-a/.warden"));
    let b = project_id_for(Path::new("/srv/project-b/.warden"));
    assert_ne!(a, b);
    assert_eq!(a, project_id_for(Path::new("/srv/project-a/.warden")));
    assert_eq!(a.len(), 12);
}

#[test]
fn unregister_removes_only_that_partition() {
    let home = TempDir::new().unwrap();
    let (_ta, ctx_a, project_a) = make_project(home.path(), "alpha");
    let (_tb, ctx_b, project_b) = make_project(home.path(), "beta");

    add_run(&ctx_a, "tdd", "implement");
    add_run(&ctx_b, "research", "run-experiment");
    index_all(home.path()).unwrap();

    let partition_b = partition_path(home.path(), &project_b.project_id);
    let before = std::fs::read(&partition_b).unwrap();

    assert!(unregister(home.path(), &project_a.project_id).unwrap());

    // Alpha's partition is gone, beta's registry entry and partition are
    // untouched.
    assert!(!partition_path(home.path(), &project_a.project_id).exists());
    assert_eq!(std::fs::read(&partition_b).unwrap(), before);
    let remaining = list_projects(home.path());
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].project_id, project_b.project_id);

    // Unregistering twice reports absence.
    assert!(!unregister(home.path(), &project_a.project_id).unwrap());
}

#[test]
fn project_scoped_reindex_leaves_other_partitions_identical() {
    let home = TempDir::new().unwrap();
    let (_ta, ctx_a, project_a) = make_project(home.path(), "alpha");
    let (_tb, ctx_b, project_b) = make_project(home.path(), "beta");

    add_run(&ctx_a, "tdd", "implement");
    add_run(&ctx_b, "research", "run-experiment");
    index_all(home.path()).unwrap();

    let partition_b = partition_path(home.path(), &project_b.project_id);
    let before = std::fs::read(&partition_b).unwrap();

    // New activity in alpha, then an alpha-scoped reindex.
    add_run(&ctx_a, "tdd", "refactor");
    let stats = index_project(home.path(), &project_a).unwrap();
    assert_eq!(stats.runs_indexed, 2);

    // Beta's partition is byte-for-byte identical.
    assert_eq!(std::fs::read(&partition_b).unwrap(), before);

    // Alpha's partition reflects the new run.
    let runs = project_runs(home.path(), &project_a.project_id).unwrap();
    assert_eq!(runs.len(), 2);
}

#[test]
fn index_summarizes_runs_from_pointer_artifacts() {
    let home = TempDir::new().unwrap();
    let (_t, ctx, project) = make_project(home.path(), "demo");

    let run_id = add_run(&ctx, "tdd", "implement");
    index_project(home.path(), &project).unwrap();

    let runs = project_runs(home.path(), &project.project_id).unwrap();
    assert_eq!(runs.len(), 1);
    let summary = &runs[0];
    assert_eq!(summary.run_id, run_id);
    assert_eq!(summary.subsystem, "tdd");
    assert_eq!(summary.phase, "implement");
    assert_eq!(summary.status, "ok");
    assert!(summary.events_path.ends_with("events.jsonl"));
    assert!(!summary.orphaned);
}

#[test]
fn index_flags_orphaned_runs() {
    let home = TempDir::new().unwrap();
    let (_t, ctx, project) = make_project(home.path(), "demo");

    // An in-progress run whose recorded pid is dead.
    let ledger = RunLedger::new(ctx.clone());
    let record = ledger
        .create(
            "tdd",
            "implement",
            None,
            CreateOptions {
                agent_runtime: "cli".to_string(),
                ..Default::default()
            },
        )
        .unwrap();
    let record_path = ctx.run_record_path(&record.run_id);
    let content = std::fs::read_to_string(&record_path)
        .unwrap()
        .replace(
            &format!("\"pid\": {}", record.pid),
            &format!("\"pid\": {}", u32::MAX - 1),
        );
    std::fs::write(&record_path, content).unwrap();

    index_project(home.path(), &project).unwrap();

    let runs = project_runs(home.path(), &project.project_id).unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, "in-progress");
    assert!(runs[0].orphaned);
}

#[test]
fn global_runs_merge_partitions() {
    let home = TempDir::new().unwrap();
    let (_ta, ctx_a, _pa) = make_project(home.path(), "alpha");
    let (_tb, ctx_b, _pb) = make_project(home.path(), "beta");

    add_run(&ctx_a, "tdd", "implement");
    add_run(&ctx_b, "research", "run-experiment");
    index_all(home.path()).unwrap();

    let runs = global_runs(home.path()).unwrap();
    assert_eq!(runs.len(), 2);
    let subsystems: Vec<_> = runs.iter().map(|r| r.subsystem.as_str()).collect();
    assert!(subsystems.contains(&"tdd"));
    assert!(subsystems.contains(&"research"));
}

#[test]
fn run_thread_walks_parents_and_children() {
    let home = TempDir::new().unwrap();
    let (_t, ctx, project) = make_project(home.path(), "demo");

    let ledger = RunLedger::new(ctx.clone());
    let options = || CreateOptions {
        agent_runtime: "cli".to_string(),
        ..Default::default()
    };
    let root = ledger.create("tdd", "write-tests", None, options()).unwrap();
    let middle = ledger
        .create("tdd", "implement", Some(&root.run_id), options())
        .unwrap();
    let leaf = ledger
        .create("tdd", "refactor", Some(&middle.run_id), options())
        .unwrap();

    index_project(home.path(), &project).unwrap();

    let thread = run_thread(home.path(), &project.project_id, &middle.run_id).unwrap();
    let ids: Vec<_> = thread.iter().map(|r| r.run_id.as_str()).collect();
    assert_eq!(
        ids,
        vec![
            root.run_id.as_str(),
            middle.run_id.as_str(),
            leaf.run_id.as_str()
        ]
    );

    // Unknown run: empty thread.
    assert!(
        run_thread(home.path(), &project.project_id, "absent")
            .unwrap()
            .is_empty()
    );
}

#[test]
fn phase_edges_aggregate_request_response_pairs() {
    let home = TempDir::new().unwrap();
    let (_t, ctx, project) = make_project(home.path(), "demo");

    let mut config = Config::default();
    config
        .actions
        .insert("research.analyze".to_string(), "echo hop".to_string());
    let router = InteropRouter::new(&ctx, &config);
    let runner = CommandPhaseRunner::new(&config);

    let parent = add_run(&ctx, "tdd", "implement");
    for _ in 0..2 {
        let request = router
            .create_request(RequestSpec {
                from_subsystem: "tdd".to_string(),
                from_phase: Some("implement".to_string()),
                to_subsystem: "research".to_string(),
                action: "analyze".to_string(),
                parent_run_id: Some(parent.clone()),
                ..Default::default()
            })
            .unwrap();
        router.dispatch(&request.request_id, &runner).unwrap();
    }

    // One more request left pending.
    router
        .create_request(RequestSpec {
            from_subsystem: "tdd".to_string(),
            from_phase: Some("implement".to_string()),
            to_subsystem: "research".to_string(),
            action: "analyze".to_string(),
            parent_run_id: Some(parent.clone()),
            ..Default::default()
        })
        .unwrap();

    index_project(home.path(), &project).unwrap();

    let edges = phase_edges(home.path(), Some(&project.project_id)).unwrap();
    assert_eq!(edges.len(), 1);
    let edge = &edges[0];
    assert_eq!(edge.from_subsystem, "tdd");
    assert_eq!(edge.from_phase, "implement");
    assert_eq!(edge.to_subsystem, "research");
    assert_eq!(edge.to_phase, "analyze");
    assert_eq!(edge.total, 3);
    assert_eq!(edge.ok, 2);
    assert_eq!(edge.pending, 1);

    // The global view includes the same edge.
    let global = phase_edges(home.path(), None).unwrap();
    assert_eq!(global, edges);
}

#[test]
fn queries_on_missing_partition_are_empty() {
    let home = TempDir::new().unwrap();
    assert!(project_runs(home.path(), "unknown").unwrap().is_empty());
    assert!(global_runs(home.path()).unwrap().is_empty());
    assert!(phase_edges(home.path(), Some("unknown")).unwrap().is_empty());
}
