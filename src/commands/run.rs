//! The `run` command: execute a phase as a recorded run.

use crate::cli::RunArgs;
use crate::config::Config;
use crate::context::WardenContext;
use crate::error::Result;
use crate::phase::{CommandPhaseRunner, PhaseRunner};
use crate::run::{Capsule, CreateOptions, RunLedger, RunStatus, write_capsule, write_manifest};
use serde_json::json;

pub fn cmd_run(args: RunArgs) -> Result<()> {
    let ctx = WardenContext::resolve()?;
    let config = Config::load(ctx.config_path())?;

    let action_key = format!("{}.{}", args.subsystem, args.phase);
    let ledger = RunLedger::new(ctx.clone());
    let record = ledger.create(
        &args.subsystem,
        &args.phase,
        args.parent.as_deref(),
        CreateOptions {
            agent_runtime: config.agent_runtime.clone(),
            read_budget: Some(config.phase_budget(&action_key)),
            allowed_paths: config.allow_globs.clone(),
            reasoning: args.reasoning.clone(),
        },
    )?;

    let runner = CommandPhaseRunner::new(&config);
    let outcome = match runner.run_phase(&ctx, &record, &args.args) {
        Ok(outcome) => outcome,
        Err(e) => {
            // The phase never started; the run still terminates cleanly.
            ledger.finalize(&record.run_id, RunStatus::Failed, None)?;
            return Err(e);
        }
    };

    let status = if outcome.is_success() {
        RunStatus::Ok
    } else {
        RunStatus::Failed
    };
    let log_rel = ctx.rel_to_root(&outcome.log_path);
    ledger.attach_artifacts(&record.run_id, None, None, Some(log_rel.clone()))?;
    let record = ledger.finalize(&record.run_id, status, outcome.exit_code)?;

    let mut capsule = Capsule::new(match outcome.exit_code {
        Some(0) => format!("{} completed in {:.1}s", action_key, outcome.duration.as_secs_f64()),
        Some(code) => format!("{} exited with code {}", action_key, code),
        None => format!("{} timed out and was killed", action_key),
    })
    .with_evidence(log_rel.clone());
    if !outcome.is_success() {
        capsule = capsule.with_blocked_reason(format!("see {} for the full trace", log_rel));
    }
    let capsule_path = write_capsule(&ctx, &record, &capsule)?;

    let manifest_path = write_manifest(
        &ctx,
        &config,
        &record,
        &[outcome.log_path.clone()],
        Vec::new(),
        Some(&outcome.log_path),
        Some(&capsule_path),
    )?;

    let capsule_rel = ctx.rel_to_root(&capsule_path);
    let manifest_rel = ctx.rel_to_root(&manifest_path);

    if args.json {
        let payload = json!({
            "run_id": record.run_id,
            "subsystem": record.subsystem,
            "phase": record.phase,
            "status": record.status,
            "exit_code": record.exit_code,
            "paths": {
                "capsule": capsule_rel,
                "manifest": manifest_rel,
                "log": log_rel,
                "events": ctx.rel_to_root(&ctx.events_path(&record.run_id)),
            },
        });
        println!("{}", payload);
    } else {
        println!("Run:      {}", record.run_id);
        println!("Status:   {}", record.status);
        if let Some(code) = record.exit_code {
            println!("Exit:     {}", code);
        }
        println!("Capsule:  {}", capsule_rel);
        println!("Manifest: {}", manifest_rel);
        println!("Log:      {}", log_rel);
    }

    if status == RunStatus::Ok {
        Ok(())
    } else {
        Err(crate::error::WardenError::UserError(format!(
            "phase {} failed; capsule at {}",
            action_key, capsule_rel
        )))
    }
}
