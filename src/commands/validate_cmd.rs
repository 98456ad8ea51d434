//! The `validate` command: re-check capsule and manifest bounds.

use crate::context::WardenContext;
use crate::error::{Result, WardenError};
use crate::run::{RunLedger, validate_capsule, validate_manifest};

pub fn cmd_validate() -> Result<()> {
    let ctx = WardenContext::resolve()?;
    let ledger = RunLedger::new(ctx.clone());

    let mut checked = 0usize;
    let mut violations: Vec<String> = Vec::new();

    for run_id in ledger.list()? {
        for capsule in files_in(&ctx.capsules_dir(&run_id), "md") {
            checked += 1;
            if let Err(e) = validate_capsule(&capsule) {
                violations.push(e.to_string());
            }
        }
        for manifest in files_in(&ctx.manifests_dir(&run_id), "json") {
            checked += 1;
            if let Err(e) = validate_manifest(&manifest) {
                violations.push(e.to_string());
            }
        }
    }

    if violations.is_empty() {
        println!("Validated {} artifact(s); no violations.", checked);
        return Ok(());
    }

    for violation in &violations {
        eprintln!("  x {}", violation);
    }
    Err(WardenError::ValidationError(format!(
        "{} of {} artifact(s) violate their bounds",
        violations.len(),
        checked
    )))
}

fn files_in(dir: &std::path::Path, extension: &str) -> Vec<std::path::PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut files: Vec<_> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some(extension))
        .collect();
    files.sort();
    files
}
