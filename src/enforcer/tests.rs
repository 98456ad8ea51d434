//! Tests for the guardrail enforcer.

use super::*;
use crate::classify::{default_category_patterns, default_phase_policies};
use crate::run::{CreateOptions, RunLedger};
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use tempfile::TempDir;

fn make_enforcer(phase: Option<&str>, limits: BudgetLimits, allow: &[&str]) -> (TempDir, Enforcer) {
    let temp_dir = TempDir::new().unwrap();
    let ctx = crate::context::WardenContext::at_root(temp_dir.path());

    let allow: Vec<String> = allow.iter().map(|s| s.to_string()).collect();
    let classifier = PathClassifier::new(
        &default_phase_policies(),
        &default_category_patterns(),
        &allow,
    )
    .unwrap();

    let config = EnforcerConfig {
        phase: phase.map(|s| s.to_string()),
        run_key: "run-under-test".to_string(),
        limits,
        allow_globs: allow,
        delegate_to_outer: false,
        already_delegated: false,
    };

    (temp_dir, Enforcer::new(ctx, config, classifier))
}

fn read_call(path: &str, size: u64) -> ToolCall {
    let mut call = ToolCall::from_tool("Read", &json!({"file_path": path}));
    call.size = Some(size);
    call
}

fn shell_call(command: &str) -> ToolCall {
    ToolCall::from_tool("Bash", &json!({"command": command}))
}

#[test]
fn tool_kind_mapping() {
    assert_eq!(ToolKind::from_tool_name("Read"), ToolKind::Read);
    assert_eq!(ToolKind::from_tool_name("Write"), ToolKind::Write);
    assert_eq!(ToolKind::from_tool_name("MultiEdit"), ToolKind::Edit);
    assert_eq!(ToolKind::from_tool_name("Bash"), ToolKind::Shell);
    assert_eq!(ToolKind::from_tool_name("Grep"), ToolKind::Other);
    assert!(ToolKind::Shell.is_write_capable());
    assert!(!ToolKind::Read.is_write_capable());
}

#[test]
fn tool_call_parses_input_payload() {
    let call = ToolCall::from_tool("Write", &json!({"file_path": "src/a.rs", "content": "x"}));
    assert_eq!(call.kind, ToolKind::Write);
    assert_eq!(call.target.as_deref(), Some("src/a.rs"));

    let call = ToolCall::from_tool("Bash", &json!({"command": "ls -la"}));
    assert_eq!(call.command.as_deref(), Some("ls -la"));
}

// =========================================================================
// Phase-scoped write protection
// =========================================================================

#[test]
fn write_to_protected_test_file_is_blocked_during_implement() {
    let (_t, enforcer) = make_enforcer(Some("implement"), BudgetLimits::default(), &[]);

    let call = ToolCall::from_tool("Write", &json!({"file_path": "tests/test_core.py"}));
    let verdict = enforcer.intercept(&call).unwrap();
    match verdict {
        Verdict::Block(reason) => {
            assert!(reason.contains("test-file"));
            assert!(reason.contains("implement"));
        }
        Verdict::Allow => panic!("write to protected test file must be blocked"),
    }
}

#[test]
fn edit_and_delete_are_also_protected() {
    let (_t, enforcer) = make_enforcer(Some("refactor"), BudgetLimits::default(), &[]);

    let edit = ToolCall::from_tool("Edit", &json!({"file_path": "tests/test_core.py"}));
    assert!(!enforcer.intercept(&edit).unwrap().is_allow());

    let delete = ToolCall::from_tool("Delete", &json!({"file_path": "tests/test_core.py"}));
    assert!(!enforcer.intercept(&delete).unwrap().is_allow());
}

#[test]
fn write_to_source_is_allowed_during_implement() {
    let (_t, enforcer) = make_enforcer(Some("implement"), BudgetLimits::default(), &[]);

    let call = ToolCall::from_tool("Write", &json!({"file_path": "src/core.py"}));
    assert!(enforcer.intercept(&call).unwrap().is_allow());
}

#[test]
fn write_to_test_file_is_allowed_during_write_tests() {
    let (_t, enforcer) = make_enforcer(Some("write-tests"), BudgetLimits::default(), &[]);

    let call = ToolCall::from_tool("Write", &json!({"file_path": "tests/test_core.py"}));
    assert!(enforcer.intercept(&call).unwrap().is_allow());
}

#[test]
fn unknown_phase_enforces_only_universal_checks() {
    let (_t, enforcer) = make_enforcer(Some("triage"), BudgetLimits::default(), &[]);

    // No protected categories for an unknown phase name.
    let call = ToolCall::from_tool("Write", &json!({"file_path": "tests/test_core.py"}));
    assert!(enforcer.intercept(&call).unwrap().is_allow());

    // Universal checks still apply.
    let sudo = shell_call("sudo rm -rf /");
    assert!(!enforcer.intercept(&sudo).unwrap().is_allow());
}

#[test]
fn mutating_shell_command_on_protected_path_is_blocked() {
    let (_t, enforcer) = make_enforcer(Some("implement"), BudgetLimits::default(), &[]);

    let call = shell_call("rm tests/test_core.py");
    let verdict = enforcer.intercept(&call).unwrap();
    match verdict {
        Verdict::Block(reason) => assert!(reason.contains("tests/test_core.py")),
        Verdict::Allow => panic!("mutating command on protected path must be blocked"),
    }

    // Same path, non-mutating command: allowed.
    let call = shell_call("cat tests/test_core.py");
    assert!(enforcer.intercept(&call).unwrap().is_allow());
}

// =========================================================================
// Universal checks
// =========================================================================

#[test]
fn privilege_escalation_is_blocked_without_any_phase() {
    let (_t, enforcer) = make_enforcer(None, BudgetLimits::default(), &[]);

    let call = shell_call("sudo tee /etc/hosts");
    let verdict = enforcer.intercept(&call).unwrap();
    assert!(!verdict.is_allow());
}

#[test]
fn vcs_revert_of_protected_file_is_blocked() {
    let (_t, enforcer) = make_enforcer(None, BudgetLimits::default(), &[]);

    let call = shell_call("git checkout -- tests/test_core.py");
    let verdict = enforcer.intercept(&call).unwrap();
    match verdict {
        Verdict::Block(reason) => assert!(reason.contains("version-control revert")),
        Verdict::Allow => panic!("revert of protected file must be blocked"),
    }
}

#[test]
fn wholesale_revert_is_blocked() {
    let (_t, enforcer) = make_enforcer(None, BudgetLimits::default(), &[]);
    assert!(!enforcer.intercept(&shell_call("git reset --hard")).unwrap().is_allow());
    assert!(!enforcer.intercept(&shell_call("git clean -fdx")).unwrap().is_allow());
}

#[test]
fn benign_vcs_commands_are_allowed() {
    let (_t, enforcer) = make_enforcer(Some("implement"), BudgetLimits::default(), &[]);
    assert!(enforcer.intercept(&shell_call("git status")).unwrap().is_allow());
    assert!(enforcer.intercept(&shell_call("git diff src/core.py")).unwrap().is_allow());
    assert!(enforcer.intercept(&shell_call("git restore src/core.py")).unwrap().is_allow());
}

// =========================================================================
// Read-budget accounting
// =========================================================================

#[test]
fn reads_are_charged_and_denied_over_budget() {
    let limits = BudgetLimits {
        max_bytes_per_read: 0,
        max_files: 2,
        max_total_bytes: 0,
    };
    let (_t, enforcer) = make_enforcer(Some("implement"), limits, &[]);

    assert!(enforcer.intercept(&read_call("/data/a.txt", 100)).unwrap().is_allow());
    assert!(enforcer.intercept(&read_call("/data/b.txt", 100)).unwrap().is_allow());

    let verdict = enforcer.intercept(&read_call("/data/c.txt", 100)).unwrap();
    match verdict {
        Verdict::Block(reason) => assert!(reason.contains("unique-file-limit-exceeded")),
        Verdict::Allow => panic!("third distinct file must be denied"),
    }

    // Re-reading an already-counted file still succeeds.
    assert!(enforcer.intercept(&read_call("/data/a.txt", 100)).unwrap().is_allow());
}

#[test]
fn oversized_single_read_is_denied() {
    let limits = BudgetLimits {
        max_bytes_per_read: 1000,
        max_files: 0,
        max_total_bytes: 0,
    };
    let (_t, enforcer) = make_enforcer(Some("implement"), limits, &[]);

    let verdict = enforcer.intercept(&read_call("/data/big.bin", 1500)).unwrap();
    match verdict {
        Verdict::Block(reason) => assert!(reason.contains("single-read-too-large")),
        Verdict::Allow => panic!("oversized read must be denied"),
    }
}

#[test]
fn allowlisted_read_is_never_denied() {
    let limits = BudgetLimits {
        max_bytes_per_read: 10,
        max_files: 1,
        max_total_bytes: 10,
    };
    let (_t, enforcer) = make_enforcer(Some("implement"), limits, &["docs/**"]);

    // Vastly over every ceiling, but allowlisted.
    for _ in 0..5 {
        let verdict = enforcer
            .intercept(&read_call("docs/guide.md", 1_000_000))
            .unwrap();
        assert!(verdict.is_allow());
    }
}

#[test]
fn non_read_tools_are_not_charged() {
    let limits = BudgetLimits {
        max_bytes_per_read: 0,
        max_files: 1,
        max_total_bytes: 0,
    };
    let (_t, enforcer) = make_enforcer(Some("implement"), limits, &[]);

    // Greps and globs do not consume the budget.
    let grep = ToolCall::from_tool("Grep", &json!({"pattern": "x", "path": "/data/a.txt"}));
    assert!(enforcer.intercept(&grep).unwrap().is_allow());
    assert!(enforcer.intercept(&read_call("/data/b.txt", 1)).unwrap().is_allow());
}

// =========================================================================
// Delegation
// =========================================================================

struct CountingOuter {
    calls: Arc<AtomicU32>,
    saw_delegated: Arc<AtomicU32>,
    verdict: Verdict,
}

impl Intercept for CountingOuter {
    fn intercept(&self, call: &ToolCall) -> crate::error::Result<Verdict> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if call.delegated {
            self.saw_delegated.fetch_add(1, Ordering::SeqCst);
        }
        Ok(self.verdict.clone())
    }
}

#[test]
fn delegation_happens_exactly_once_and_adopts_outer_verdict() {
    let limits = BudgetLimits {
        max_bytes_per_read: 0,
        max_files: 10,
        max_total_bytes: 0,
    };
    let (temp_dir, enforcer) = make_enforcer(Some("implement"), limits, &[]);

    let calls = Arc::new(AtomicU32::new(0));
    let saw_delegated = Arc::new(AtomicU32::new(0));
    let outer = CountingOuter {
        calls: Arc::clone(&calls),
        saw_delegated: Arc::clone(&saw_delegated),
        verdict: Verdict::Block("outer budget wins".to_string()),
    };

    let mut config = enforcer.config.clone();
    config.delegate_to_outer = true;
    let classifier = PathClassifier::new(
        &default_phase_policies(),
        &default_category_patterns(),
        &[],
    )
    .unwrap();
    let ctx = crate::context::WardenContext::at_root(temp_dir.path());
    let enforcer = Enforcer::new(ctx.clone(), config, classifier).with_outer(Box::new(outer));

    let verdict = enforcer.intercept(&read_call("/data/a.txt", 100)).unwrap();
    assert_eq!(verdict, Verdict::Block("outer budget wins".to_string()));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(saw_delegated.load(Ordering::SeqCst), 1);

    // The inner ledger never charged the read: the outer verdict was
    // adopted wholesale, avoiding double-charging.
    let ledger = ReadBudgetLedger::new(ctx);
    assert_eq!(ledger.state("run-under-test").unwrap().files.len(), 0);
}

#[test]
fn delegated_calls_are_not_re_delegated() {
    let limits = BudgetLimits::default();
    let (temp_dir, enforcer) = make_enforcer(Some("implement"), limits, &[]);

    let calls = Arc::new(AtomicU32::new(0));
    let outer = CountingOuter {
        calls: Arc::clone(&calls),
        saw_delegated: Arc::new(AtomicU32::new(0)),
        verdict: Verdict::Allow,
    };

    let mut config = enforcer.config.clone();
    config.delegate_to_outer = true;
    let classifier = PathClassifier::new(
        &default_phase_policies(),
        &default_category_patterns(),
        &[],
    )
    .unwrap();
    let enforcer = Enforcer::new(
        crate::context::WardenContext::at_root(temp_dir.path()),
        config,
        classifier,
    )
    .with_outer(Box::new(outer));

    // A call carrying the delegated marker is adjudicated locally.
    let call = read_call("/data/a.txt", 100).as_delegated();
    assert!(enforcer.intercept(&call).unwrap().is_allow());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn already_delegated_process_skips_outer() {
    let (temp_dir, enforcer) = make_enforcer(Some("implement"), BudgetLimits::default(), &[]);

    let calls = Arc::new(AtomicU32::new(0));
    let outer = CountingOuter {
        calls: Arc::clone(&calls),
        saw_delegated: Arc::new(AtomicU32::new(0)),
        verdict: Verdict::Allow,
    };

    let mut config = enforcer.config.clone();
    config.delegate_to_outer = true;
    // This process was itself launched by the outer hook.
    config.already_delegated = true;

    let classifier = PathClassifier::new(
        &default_phase_policies(),
        &default_category_patterns(),
        &[],
    )
    .unwrap();
    let enforcer = Enforcer::new(
        crate::context::WardenContext::at_root(temp_dir.path()),
        config,
        classifier,
    )
    .with_outer(Box::new(outer));

    assert!(enforcer.intercept(&read_call("/data/a.txt", 1)).unwrap().is_allow());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

// =========================================================================
// Denial events
// =========================================================================

#[test]
fn denials_under_an_active_run_are_recorded() {
    let temp_dir = TempDir::new().unwrap();
    let ctx = crate::context::WardenContext::at_root(temp_dir.path());

    // A real run provides the event stream to record into.
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

    let classifier = PathClassifier::new(
        &default_phase_policies(),
        &default_category_patterns(),
        &[],
    )
    .unwrap();
    let config = EnforcerConfig {
        phase: Some("implement".to_string()),
        run_key: record.run_id.clone(),
        limits: BudgetLimits {
            max_bytes_per_read: 100,
            max_files: 0,
            max_total_bytes: 0,
        },
        allow_globs: Vec::new(),
        delegate_to_outer: false,
        already_delegated: false,
    };
    let enforcer = Enforcer::new(ctx.clone(), config, classifier);

    // One write denial, one budget denial.
    let write = ToolCall::from_tool("Write", &json!({"file_path": "tests/test_core.py"}));
    assert!(!enforcer.intercept(&write).unwrap().is_allow());
    assert!(!enforcer.intercept(&read_call("/data/big.bin", 500)).unwrap().is_allow());

    let events = crate::events::read_events(&ctx.events_path(&record.run_id)).unwrap();
    let kinds: Vec<_> = events.iter().map(|e| e.event).collect();
    assert!(kinds.contains(&EventKind::WriteDenied));
    assert!(kinds.contains(&EventKind::BudgetDenied));
}
