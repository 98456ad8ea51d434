//! The `request` command: create an interop request.

use crate::cli::RequestArgs;
use crate::config::{Config, Priority};
use crate::context::WardenContext;
use crate::error::{Result, WardenError};
use crate::interop::{InteropRouter, RequestBudget, RequestSpec};
use serde_json::json;

pub fn cmd_request(args: RequestArgs) -> Result<()> {
    let ctx = WardenContext::resolve()?;
    let config = Config::load(ctx.config_path())?;
    let router = InteropRouter::new(&ctx, &config);

    let priority = Priority::from_str(&args.priority).ok_or_else(|| {
        WardenError::UserError(format!(
            "unknown priority '{}'\n\
             Fix: use one of low, normal, high.",
            args.priority
        ))
    })?;

    let read_budget = if args.max_files.is_some()
        || args.max_total_bytes.is_some()
        || !args.allowed_paths.is_empty()
    {
        Some(RequestBudget {
            max_files: args.max_files.unwrap_or(config.request_default_max_files),
            max_total_bytes: args
                .max_total_bytes
                .unwrap_or(config.request_default_max_total_bytes),
            allowed_paths: args.allowed_paths.clone(),
        })
    } else {
        None
    };

    let request = router.create_request(RequestSpec {
        from_subsystem: args.from_subsystem,
        from_phase: args.from_phase,
        to_subsystem: args.to_subsystem,
        action: args.action,
        args: args.args,
        parent_run_id: args.parent_run_id,
        must_read: args.must_read,
        read_budget,
        expected_deliverables: args.deliverables,
        priority,
        reasoning: args.reasoning,
    })?;

    let path = ctx.rel_to_root(&ctx.request_path(&request.request_id));
    if args.json {
        println!(
            "{}",
            json!({"request_id": request.request_id, "path": path})
        );
    } else {
        println!("Request: {}", request.request_id);
        println!("Path:    {}", path);
        println!(
            "Next:    warden pump --request {} (then poll: warden response {})",
            request.request_id, request.request_id
        );
    }

    Ok(())
}
