//! The `show` command: pointer summary for a run.

use crate::cli::ShowArgs;
use crate::context::WardenContext;
use crate::error::{Result, WardenError};
use crate::run::{RunLedger, is_orphaned};
use serde_json::json;

pub fn cmd_show(args: ShowArgs) -> Result<()> {
    let ctx = WardenContext::resolve()?;
    let ledger = RunLedger::new(ctx.clone());

    let run_id = if args.run_id == "latest" {
        ledger.latest()?.ok_or_else(|| {
            WardenError::UserError("no runs recorded yet".to_string())
        })?
    } else {
        args.run_id
    };

    let record = ledger.load(&run_id)?;
    let orphaned = is_orphaned(&record);
    let events_rel = ctx.rel_to_root(&ctx.events_path(&run_id));

    if args.json {
        let payload = json!({
            "run_id": record.run_id,
            "subsystem": record.subsystem,
            "phase": record.phase,
            "parent_run_id": record.parent_run_id,
            "status": record.status,
            "orphaned": orphaned,
            "exit_code": record.exit_code,
            "host": record.host,
            "pid": record.pid,
            "agent_runtime": record.agent_runtime,
            "created_at": record.created_at,
            "finished_at": record.finished_at,
            "paths": {
                "capsule": record.capsule_path,
                "manifest": record.manifest_path,
                "log": record.log_path,
                "events": events_rel,
            },
        });
        println!("{}", payload);
        return Ok(());
    }

    println!("Run:       {}", record.run_id);
    println!("Phase:     {}.{}", record.subsystem, record.phase);
    if let Some(parent) = &record.parent_run_id {
        println!("Parent:    {}", parent);
    }
    if orphaned {
        println!(
            "Status:    {} (ORPHANED: process {} on {} no longer exists)",
            record.status, record.pid, record.host
        );
    } else {
        println!("Status:    {}", record.status);
    }
    if let Some(code) = record.exit_code {
        println!("Exit:      {}", code);
    }
    println!("Owner:     pid {} on {}", record.pid, record.host);
    println!("Runtime:   {}", record.agent_runtime);
    if let Some(capsule) = &record.capsule_path {
        println!("Capsule:   {}", capsule);
    }
    if let Some(manifest) = &record.manifest_path {
        println!("Manifest:  {}", manifest);
    }
    if let Some(log) = &record.log_path {
        println!("Log:       {} (query with `warden log {}`)", log, log);
    }
    println!("Events:    {}", events_rel);
    if let Some(reasoning) = &record.reasoning {
        println!("Reasoning: {}", reasoning);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::run::CreateOptions;
    use crate::test_support::EnvGuard;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    #[serial]
    fn show_resolves_latest() {
        let temp_dir = TempDir::new().unwrap();
        let _root = EnvGuard::set(crate::context::ENV_ROOT, temp_dir.path().to_str().unwrap());

        let ctx = WardenContext::at_root(temp_dir.path());
        RunLedger::new(ctx)
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

        cmd_show(ShowArgs {
            run_id: "latest".to_string(),
            json: true,
        })
        .unwrap();
    }

    #[test]
    #[serial]
    fn show_latest_without_runs_is_a_user_error() {
        let temp_dir = TempDir::new().unwrap();
        let _root = EnvGuard::set(crate::context::ENV_ROOT, temp_dir.path().to_str().unwrap());

        let result = cmd_show(ShowArgs {
            run_id: "latest".to_string(),
            json: false,
        });
        assert!(result.is_err());
    }

    #[test]
    #[serial]
    fn show_unknown_run_is_a_user_error() {
        let temp_dir = TempDir::new().unwrap();
        let _root = EnvGuard::set(crate::context::ENV_ROOT, temp_dir.path().to_str().unwrap());

        let result = cmd_show(ShowArgs {
            run_id: "absent-run".to_string(),
            json: false,
        });
        assert!(result.is_err());
    }
}
