//! The `guard` command: adjudicate one intercepted tool call.
//!
//! Invoked by the agent runtime as a pre-tool-use hook. Configuration is
//! read once from the environment surface, merged with the active run's
//! recorded budget, and handed to the enforcer as an explicit object — the
//! interception logic itself never consults the environment.

use crate::cli::GuardArgs;
use crate::classify::PathClassifier;
use crate::config::Config;
use crate::context::WardenContext;
use crate::enforcer::{Enforcer, EnforcerConfig, Intercept, ToolCall, Verdict, env_vars};
use crate::error::{Result, WardenError};
use crate::run::RunLedger;

pub fn cmd_guard(args: GuardArgs) -> Result<()> {
    let ctx = WardenContext::resolve()?;
    let config = Config::load(ctx.config_path())?;

    let tool = args
        .tool
        .or_else(|| std::env::var(env_vars::TOOL_NAME).ok())
        .ok_or_else(|| {
            WardenError::UserError(format!(
                "no tool name given\n\
                 Fix: pass --tool or set {}.",
                env_vars::TOOL_NAME
            ))
        })?;
    let raw_input = args
        .input
        .or_else(|| std::env::var(env_vars::TOOL_INPUT).ok())
        .unwrap_or_else(|| "{}".to_string());
    let input: serde_json::Value = serde_json::from_str(&raw_input).map_err(|e| {
        WardenError::UserError(format!("tool input is not valid JSON: {}", e))
    })?;

    let enforcer_config = resolve_config(&ctx)?;

    let mut allow = enforcer_config.allow_globs.clone();
    allow.extend(run_allowlist(&ctx, &enforcer_config.run_key));
    let classifier = PathClassifier::from_config(&config, &allow)?;

    let enforcer = Enforcer::new(ctx, enforcer_config, classifier);
    let call = ToolCall::from_tool(&tool, &input);

    match enforcer.intercept(&call)? {
        Verdict::Allow => Ok(()),
        Verdict::Block(reason) => Err(WardenError::Denied(reason)),
    }
}

/// Build the enforcer configuration: the environment surface, tightened by
/// the active run's recorded budget when one exists.
fn resolve_config(ctx: &WardenContext) -> Result<EnforcerConfig> {
    let mut config = EnforcerConfig::from_env();

    let ledger = RunLedger::new(ctx.clone());
    if let Ok(record) = ledger.load(&config.run_key) {
        if let Some(budget) = record.read_budget {
            config.limits = config.limits.stricter(budget);
        }
        if config.phase.is_none() {
            config.phase = Some(record.phase);
        }
    }

    Ok(config)
}

/// Allow globs recorded on the active run, when the run key names one.
fn run_allowlist(ctx: &WardenContext, run_key: &str) -> Vec<String> {
    RunLedger::new(ctx.clone())
        .load(run_key)
        .map(|record| record.allowed_paths)
        .unwrap_or_default()
}
