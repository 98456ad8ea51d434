//! CLI argument parsing for warden.
//!
//! Uses clap derive macros for declarative argument definitions.
//! This module defines the command structure; actual implementations
//! are in the `commands` module.

use clap::{Parser, Subcommand};

/// Warden: file-based guardrail and interop engine for multi-phase agent
/// pipelines.
///
/// State is expressed as files under an orchestration root:
/// - `runs/` holds one directory per phase execution (record, events,
///   capsule, manifest, log)
/// - `interop/` holds immutable requests and write-once responses
/// - `state/budget/` holds transient read-budget ledgers
#[derive(Parser, Debug)]
#[command(name = "warden")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands for warden.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Adjudicate one intercepted tool call.
    ///
    /// Invoked as a pre-tool-use hook by the agent runtime. Reads the tool
    /// name and JSON input from flags or the environment, prints a BLOCKED
    /// reason to stderr on denial, and exits nonzero so the runtime drops
    /// the call.
    Guard(GuardArgs),

    /// Execute a phase as a recorded run.
    ///
    /// Allocates a run, executes the configured action command under the
    /// guard environment, writes the capsule and manifest, and finalizes
    /// the run.
    Run(RunArgs),

    /// Create an interop request for another subsystem's phase.
    ///
    /// The request is immutable once created; dispatch it with `pump`.
    Request(RequestArgs),

    /// Dispatch one interop request.
    ///
    /// With --request, dispatches that request; otherwise the oldest
    /// unanswered request (highest priority first). Writes exactly one
    /// response keyed by the request id.
    Pump(PumpArgs),

    /// Show the recorded response for a request.
    ///
    /// The poll half of the "fire once, poll the response file" pattern
    /// for long-running phases.
    Response(ResponseArgs),

    /// Show a run's pointer summary.
    ///
    /// Prints run metadata and artifact pointers; never dumps artifact
    /// content. `latest` resolves to the most recent run.
    Show(ShowArgs),

    /// Query a log with bounded output.
    ///
    /// Tail or grep a log file under the orchestration root; output is
    /// capped, the full log stays on disk.
    Log(LogArgs),

    /// Validate capsule and manifest bounds across all runs.
    ///
    /// Reports violations without mutating anything.
    Validate,

    /// Multi-project dashboard commands.
    ///
    /// Register projects, rebuild index partitions, and query runs and
    /// cross-phase edges.
    Dashboard(DashboardCommand),
}

/// Arguments for the `guard` command.
#[derive(Parser, Debug)]
pub struct GuardArgs {
    /// Tool name of the intercepted call (falls back to $WARDEN_TOOL_NAME).
    #[arg(long)]
    pub tool: Option<String>,

    /// JSON input payload of the call (falls back to $WARDEN_TOOL_INPUT).
    #[arg(long)]
    pub input: Option<String>,
}

/// Arguments for the `run` command.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Subsystem owning the phase (e.g. tdd, research, math).
    pub subsystem: String,

    /// Phase to execute (e.g. write-tests, implement, run-experiment).
    pub phase: String,

    /// Extra arguments appended to the action command.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<String>,

    /// Parent run id, when this run continues another.
    #[arg(long)]
    pub parent: Option<String>,

    /// Short justification recorded on the run.
    #[arg(long)]
    pub reasoning: Option<String>,

    /// Emit a JSON pointer summary on stdout.
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `request` command.
#[derive(Parser, Debug)]
pub struct RequestArgs {
    /// Requesting subsystem.
    #[arg(long = "from")]
    pub from_subsystem: String,

    /// Requesting phase (inferred from the parent run when omitted).
    #[arg(long)]
    pub from_phase: Option<String>,

    /// Target subsystem.
    #[arg(long = "to")]
    pub to_subsystem: String,

    /// Target action (`<phase>` or `<subsystem>.<phase>`).
    #[arg(long)]
    pub action: String,

    /// Parent run id this request is created under.
    #[arg(long = "run-id")]
    pub parent_run_id: Option<String>,

    /// Argument appended to the target action's argv (repeatable).
    #[arg(long = "arg")]
    pub args: Vec<String>,

    /// Pointer the receiving phase must read first (repeatable).
    #[arg(long = "must-read")]
    pub must_read: Vec<String>,

    /// Allow glob exempt from the receiving phase's budget (repeatable).
    #[arg(long = "allowed-path")]
    pub allowed_paths: Vec<String>,

    /// Pointer pattern the receiving phase is expected to deliver
    /// (repeatable).
    #[arg(long = "deliverable")]
    pub deliverables: Vec<String>,

    /// Ceiling on distinct files the receiving phase may read.
    #[arg(long)]
    pub max_files: Option<u64>,

    /// Ceiling on cumulative bytes the receiving phase may read.
    #[arg(long)]
    pub max_total_bytes: Option<u64>,

    /// Queue priority (low, normal, high).
    #[arg(long, default_value = "normal")]
    pub priority: String,

    /// Short justification for the handoff.
    #[arg(long)]
    pub reasoning: Option<String>,

    /// Emit a JSON pointer summary on stdout.
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `pump` command.
#[derive(Parser, Debug)]
pub struct PumpArgs {
    /// Dispatch this specific request instead of the queue front.
    #[arg(long)]
    pub request: Option<String>,

    /// Emit a JSON pointer summary on stdout.
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `response` command.
#[derive(Parser, Debug)]
pub struct ResponseArgs {
    /// Request id to look up.
    pub request_id: String,

    /// Emit the raw JSON record on stdout.
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `show` command.
#[derive(Parser, Debug)]
pub struct ShowArgs {
    /// Run id to show, or `latest`.
    pub run_id: String,

    /// Emit a JSON pointer summary on stdout.
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `log` command.
#[derive(Parser, Debug)]
pub struct LogArgs {
    /// Log path (absolute, or relative to the orchestration root).
    pub path: String,

    /// Show the last N lines (default mode).
    #[arg(long, default_value_t = 120)]
    pub tail: usize,

    /// Show lines matching a pattern instead of tailing.
    #[arg(long)]
    pub grep: Option<String>,
}

/// Dashboard subcommands.
#[derive(Parser, Debug)]
pub struct DashboardCommand {
    #[command(subcommand)]
    pub action: DashboardAction,
}

/// Available dashboard actions.
#[derive(Subcommand, Debug)]
pub enum DashboardAction {
    /// Register the current (or named) orchestration root.
    ///
    /// Idempotent: re-registering the same root returns the same project
    /// id.
    Register(DashboardRegisterArgs),

    /// Unregister a project, removing only its index partition.
    Unregister(DashboardUnregisterArgs),

    /// Rebuild index partitions.
    ///
    /// With --project, rebuilds only that project's partition; other
    /// partitions are untouched.
    Index(DashboardIndexArgs),

    /// List registered projects.
    Projects,

    /// List indexed runs, project-scoped or global.
    Runs(DashboardRunsArgs),

    /// Show the run thread (ancestors and descendants) of a run.
    Thread(DashboardThreadArgs),

    /// Summarize cross-phase edges from request/response pairs.
    Edges(DashboardEdgesArgs),
}

/// Arguments for `dashboard register`.
#[derive(Parser, Debug)]
pub struct DashboardRegisterArgs {
    /// Orchestration root to register (defaults to the resolved root).
    #[arg(long)]
    pub root: Option<String>,

    /// Project tree the phases operate on (defaults to the root).
    #[arg(long)]
    pub project_root: Option<String>,

    /// Display label (defaults to the project root's directory name).
    #[arg(long)]
    pub label: Option<String>,
}

/// Arguments for `dashboard unregister`.
#[derive(Parser, Debug)]
pub struct DashboardUnregisterArgs {
    /// Project id to unregister.
    pub project_id: String,
}

/// Arguments for `dashboard index`.
#[derive(Parser, Debug)]
pub struct DashboardIndexArgs {
    /// Rebuild only this project's partition.
    #[arg(long)]
    pub project: Option<String>,
}

/// Arguments for `dashboard runs`.
#[derive(Parser, Debug)]
pub struct DashboardRunsArgs {
    /// Restrict to one project's partition.
    #[arg(long)]
    pub project: Option<String>,
}

/// Arguments for `dashboard thread`.
#[derive(Parser, Debug)]
pub struct DashboardThreadArgs {
    /// Project id the run belongs to.
    #[arg(long)]
    pub project: String,

    /// Run id to thread from.
    pub run_id: String,
}

/// Arguments for `dashboard edges`.
#[derive(Parser, Debug)]
pub struct DashboardEdgesArgs {
    /// Restrict to one project's partition.
    #[arg(long)]
    pub project: Option<String>,
}

impl Cli {
    /// Parse command line arguments.
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_debug_assert() {
        // Verifies the CLI arguments configuration is valid
        Cli::command().debug_assert();
    }

    #[test]
    fn parse_guard() {
        let cli = Cli::try_parse_from([
            "warden",
            "guard",
            "--tool",
            "Read",
            "--input",
            r#"{"file_path": "a.txt"}"#,
        ])
        .unwrap();
        if let Command::Guard(args) = cli.command {
            assert_eq!(args.tool.as_deref(), Some("Read"));
            assert!(args.input.unwrap().contains("a.txt"));
        } else {
            panic!("Expected Guard command");
        }
    }

    #[test]
    fn parse_run_with_trailing_args() {
        let cli = Cli::try_parse_from([
            "warden",
            "run",
            "tdd",
            "implement",
            "--parent",
            "tdd-write-tests-x",
            "docs/feature.md",
            "--resolve",
        ])
        .unwrap();
        if let Command::Run(args) = cli.command {
            assert_eq!(args.subsystem, "tdd");
            assert_eq!(args.phase, "implement");
            assert_eq!(args.parent.as_deref(), Some("tdd-write-tests-x"));
            assert_eq!(args.args, vec!["docs/feature.md", "--resolve"]);
        } else {
            panic!("Expected Run command");
        }
    }

    #[test]
    fn parse_request_full() {
        let cli = Cli::try_parse_from([
            "warden",
            "request",
            "--from",
            "tdd",
            "--from-phase",
            "implement",
            "--to",
            "research",
            "--action",
            "analyze",
            "--run-id",
            "tdd-implement-x",
            "--must-read",
            "runs/x/capsules/a.md",
            "--allowed-path",
            "runs/*/capsules/*.md",
            "--deliverable",
            "runs/*/manifests/*.json",
            "--max-files",
            "8",
            "--max-total-bytes",
            "300000",
            "--priority",
            "high",
            "--json",
        ])
        .unwrap();
        if let Command::Request(args) = cli.command {
            assert_eq!(args.from_subsystem, "tdd");
            assert_eq!(args.to_subsystem, "research");
            assert_eq!(args.action, "analyze");
            assert_eq!(args.must_read, vec!["runs/x/capsules/a.md"]);
            assert_eq!(args.max_files, Some(8));
            assert_eq!(args.priority, "high");
            assert!(args.json);
        } else {
            panic!("Expected Request command");
        }
    }

    #[test]
    fn parse_pump() {
        let cli = Cli::try_parse_from(["warden", "pump", "--request", "rq-1", "--json"]).unwrap();
        if let Command::Pump(args) = cli.command {
            assert_eq!(args.request.as_deref(), Some("rq-1"));
            assert!(args.json);
        } else {
            panic!("Expected Pump command");
        }
    }

    #[test]
    fn parse_show_latest() {
        let cli = Cli::try_parse_from(["warden", "show", "latest"]).unwrap();
        if let Command::Show(args) = cli.command {
            assert_eq!(args.run_id, "latest");
        } else {
            panic!("Expected Show command");
        }
    }

    #[test]
    fn parse_log_modes() {
        let cli = Cli::try_parse_from(["warden", "log", "runs/r1/logs/implement.log"]).unwrap();
        if let Command::Log(args) = cli.command {
            assert_eq!(args.tail, 120);
            assert!(args.grep.is_none());
        } else {
            panic!("Expected Log command");
        }

        let cli = Cli::try_parse_from([
            "warden",
            "log",
            "runs/r1/logs/implement.log",
            "--grep",
            "error",
        ])
        .unwrap();
        if let Command::Log(args) = cli.command {
            assert_eq!(args.grep.as_deref(), Some("error"));
        } else {
            panic!("Expected Log command");
        }
    }

    #[test]
    fn parse_validate() {
        let cli = Cli::try_parse_from(["warden", "validate"]).unwrap();
        assert!(matches!(cli.command, Command::Validate));
    }

    #[test]
    fn parse_dashboard_actions() {
        let cli = Cli::try_parse_from(["warden", "dashboard", "projects"]).unwrap();
        if let Command::Dashboard(cmd) = cli.command {
            assert!(matches!(cmd.action, DashboardAction::Projects));
        } else {
            panic!("Expected Dashboard command");
        }

        let cli =
            Cli::try_parse_from(["warden", "dashboard", "index", "--project", "abc123"]).unwrap();
        if let Command::Dashboard(cmd) = cli.command {
            if let DashboardAction::Index(args) = cmd.action {
                assert_eq!(args.project.as_deref(), Some("abc123"));
            } else {
                panic!("Expected Index action");
            }
        } else {
            panic!("Expected Dashboard command");
        }

        let cli = Cli::try_parse_from([
            "warden",
            "dashboard",
            "thread",
            "--project",
            "abc123",
            "tdd-implement-x",
        ])
        .unwrap();
        if let Command::Dashboard(cmd) = cli.command {
            if let DashboardAction::Thread(args) = cmd.action {
                assert_eq!(args.project, "abc123");
                assert_eq!(args.run_id, "tdd-implement-x");
            } else {
                panic!("Expected Thread action");
            }
        } else {
            panic!("Expected Dashboard command");
        }
    }
}
