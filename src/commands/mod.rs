//! Command implementations for warden.
//!
//! This module provides the dispatcher that routes CLI commands to their
//! implementations.

mod dashboard;
mod guard;
mod pump;
mod query_log;
mod request;
mod run;
mod show;
mod validate_cmd;

use crate::cli::Command;
use crate::error::Result;

/// Dispatch a command to its implementation.
pub fn dispatch(command: Command) -> Result<()> {
    match command {
        Command::Guard(args) => guard::cmd_guard(args),
        Command::Run(args) => run::cmd_run(args),
        Command::Request(args) => request::cmd_request(args),
        Command::Pump(args) => pump::cmd_pump(args),
        Command::Response(args) => pump::cmd_response(args),
        Command::Show(args) => show::cmd_show(args),
        Command::Log(args) => query_log::cmd_log(args),
        Command::Validate => validate_cmd::cmd_validate(),
        Command::Dashboard(cmd) => dashboard::dispatch_dashboard(cmd),
    }
}
