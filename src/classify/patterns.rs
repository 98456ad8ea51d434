//! Default category patterns and phase policies.
//!
//! These are configuration data consumed by the classifier, not part of its
//! logic: `warden.yaml` can replace any of them. The defaults cover the
//! common layouts of the workflows the engine ships with.

use std::collections::BTreeMap;

/// Default recognition regexes per protected category.
pub fn default_category_patterns() -> BTreeMap<String, Vec<String>> {
    let mut patterns = BTreeMap::new();
    patterns.insert(
        "test-file".to_string(),
        vec![
            r"(^|/)tests?/".to_string(),
            r"_test\.[A-Za-z0-9]+$".to_string(),
            r"(^|/)test_[^/]+\.py$".to_string(),
            r"\.spec\.[jt]sx?$".to_string(),
            r"(^|/)conftest\.py$".to_string(),
        ],
    );
    patterns.insert(
        "spec-file".to_string(),
        vec![
            r"(^|/)specs?/".to_string(),
            r"(^|/)docs/requirements/".to_string(),
            r"\.feature$".to_string(),
        ],
    );
    patterns.insert(
        "metrics-file".to_string(),
        vec![
            r"(^|/)metrics/".to_string(),
            r"\.metrics\.json$".to_string(),
            r"(^|/)results/[^/]+\.(json|csv)$".to_string(),
        ],
    );
    patterns.insert(
        "log-file".to_string(),
        vec![r"\.log$".to_string(), r"(^|/)logs/".to_string()],
    );
    patterns.insert(
        "state-file".to_string(),
        vec![
            r"(^|/)state/".to_string(),
            r"(^|/)runs/[^/]+/(run\.json|events\.jsonl)$".to_string(),
            r"\.lock$".to_string(),
        ],
    );
    patterns
}

/// Default phase policies: phase name -> protected category names.
///
/// Phases not listed here enforce only the universal checks. Names are per
/// subsystem; two subsystems that share a phase name share its policy unless
/// configuration overrides one of them.
pub fn default_phase_policies() -> BTreeMap<String, Vec<String>> {
    let mut policies = BTreeMap::new();

    // Test-driven workflow: tests are authored in write-tests and read-only
    // for every later phase.
    policies.insert(
        "write-tests".to_string(),
        string_vec(&["spec-file", "metrics-file", "log-file", "state-file"]),
    );
    policies.insert(
        "implement".to_string(),
        string_vec(&[
            "test-file",
            "spec-file",
            "metrics-file",
            "log-file",
            "state-file",
        ]),
    );
    policies.insert(
        "refactor".to_string(),
        string_vec(&[
            "test-file",
            "spec-file",
            "metrics-file",
            "log-file",
            "state-file",
        ]),
    );

    // Experiment workflow: an experiment run may write results but not the
    // experiment definition.
    policies.insert(
        "run-experiment".to_string(),
        string_vec(&["spec-file", "log-file", "state-file"]),
    );

    // Proof workflow: formalization edits proofs, everything else is
    // evidence.
    policies.insert(
        "formalize-proof".to_string(),
        string_vec(&["test-file", "metrics-file", "log-file", "state-file"]),
    );

    policies
}

fn string_vec(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
