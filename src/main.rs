//! Warden: file-based guardrail and interop engine for multi-phase agent
//! pipelines.
//!
//! This is the main entry point for the `warden` CLI. It parses arguments,
//! dispatches to the appropriate command handler, and handles errors with
//! proper exit codes. Guardrail denials print a one-line `BLOCKED:` reason
//! to the operator-facing channel (stderr) so the calling runtime can drop
//! the single tool call and pick a different action.

mod cli;
mod commands;
pub mod budget;
pub mod classify;
pub mod config;
pub mod context;
pub mod dashboard;
pub mod enforcer;
pub mod error;
pub mod events;
pub mod exit_codes;
pub mod fs;
pub mod interop;
pub mod locks;
pub mod phase;
pub mod run;

#[cfg(test)]
mod test_support;

use cli::Cli;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse_args();

    match commands::dispatch(cli.command) {
        Ok(()) => ExitCode::from(exit_codes::SUCCESS as u8),
        Err(err) => {
            if err.is_denial() {
                eprintln!("BLOCKED: {}", err);
            } else {
                eprintln!("Error: {}", err);
            }

            ExitCode::from(err.exit_code() as u8)
        }
    }
}
