//! The `pump` and `response` commands: dispatch requests and poll results.

use crate::cli::{PumpArgs, ResponseArgs};
use crate::config::Config;
use crate::context::WardenContext;
use crate::error::{Result, WardenError};
use crate::interop::{InteropResponse, InteropRouter};
use crate::phase::CommandPhaseRunner;
use serde_json::json;

pub fn cmd_pump(args: PumpArgs) -> Result<()> {
    let ctx = WardenContext::resolve()?;
    let config = Config::load(ctx.config_path())?;
    let router = InteropRouter::new(&ctx, &config);

    let request_id = match args.request {
        Some(id) => id,
        None => match router.queue_front()? {
            Some(id) => id,
            None => {
                println!("No pending requests.");
                return Ok(());
            }
        },
    };

    let runner = CommandPhaseRunner::new(&config);
    let response = router.dispatch(&request_id, &runner)?;

    print_response(&ctx, &response, args.json);
    Ok(())
}

pub fn cmd_response(args: ResponseArgs) -> Result<()> {
    let ctx = WardenContext::resolve()?;

    if !InteropResponse::exists(&ctx, &args.request_id) {
        return Err(WardenError::UserError(format!(
            "no response yet for '{}'\n\
             The request may still be pending; dispatch it with `warden pump --request {}`.",
            args.request_id, args.request_id
        )));
    }

    let response = InteropResponse::load(&ctx, &args.request_id)?;
    print_response(&ctx, &response, args.json);
    Ok(())
}

fn print_response(ctx: &WardenContext, response: &InteropResponse, json: bool) {
    if json {
        let payload = json!({
            "request_id": response.request_id,
            "status": response.status,
            "child_run_id": response.run_id,
            "capsule_path": response.capsule_pointer,
            "manifest_path": response.manifest_pointer,
            "response_path": ctx.rel_to_root(&ctx.response_path(&response.request_id)),
            "notes": response.notes,
        });
        println!("{}", payload);
    } else {
        println!("Request:  {}", response.request_id);
        println!("Status:   {}", response.status);
        if let Some(run_id) = &response.run_id {
            println!("Child:    {}", run_id);
        }
        if let Some(capsule) = &response.capsule_pointer {
            println!("Capsule:  {}", capsule);
        }
        if let Some(manifest) = &response.manifest_pointer {
            println!("Manifest: {}", manifest);
        }
        if let Some(notes) = &response.notes {
            println!("Notes:    {}", notes);
        }
    }
}
