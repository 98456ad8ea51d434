//! Phase execution.
//!
//! The engine resolves `subsystem.phase` to a configured command template,
//! spawns it with stdout and stderr captured to the run's log file, and
//! enforces a timeout with poll-and-kill. The agent process itself is an
//! external collaborator: everything behind the spawned command is outside
//! the engine, which only provides the guarded environment (run key, phase,
//! budget ceilings, allowlist) through environment variables.
//!
//! `PhaseRunner` is the seam: the interop router and the `run` command
//! drive phases through the trait, and tests substitute their own runner.

use crate::config::Config;
use crate::context::{ENV_ROOT, WardenContext};
use crate::enforcer::env_vars;
use crate::error::{Result, WardenError};
use crate::run::RunRecord;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

/// Result of executing a phase command.
#[derive(Debug, Clone)]
pub struct PhaseOutcome {
    /// Exit code of the process (None if killed or didn't exit normally).
    pub exit_code: Option<i32>,
    /// Whether the process was killed due to timeout.
    pub timed_out: bool,
    /// Path to the combined stdout/stderr log.
    pub log_path: PathBuf,
    /// Duration of execution.
    pub duration: Duration,
}

impl PhaseOutcome {
    /// Whether the phase completed successfully.
    pub fn is_success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }
}

/// The phase execution seam.
pub trait PhaseRunner {
    /// Execute the phase behind a run record, returning its outcome.
    fn run_phase(&self, ctx: &WardenContext, record: &RunRecord, args: &[String])
    -> Result<PhaseOutcome>;
}

/// Runs phases through configured command templates.
pub struct CommandPhaseRunner<'a> {
    config: &'a Config,
}

impl<'a> CommandPhaseRunner<'a> {
    /// Create a runner over the given configuration.
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }
}

impl PhaseRunner for CommandPhaseRunner<'_> {
    fn run_phase(
        &self,
        ctx: &WardenContext,
        record: &RunRecord,
        args: &[String],
    ) -> Result<PhaseOutcome> {
        let action_key = format!("{}.{}", record.subsystem, record.phase);
        let template = self.config.action_command(&action_key).ok_or_else(|| {
            WardenError::UserError(format!(
                "no action configured for '{}'\n\
                 Fix: add an `actions: {{\"{}\": \"<command>\"}}` entry to warden.yaml.",
                action_key, action_key
            ))
        })?;

        let mut argv = shell_words::split(template).map_err(|e| {
            WardenError::UserError(format!(
                "failed to parse action command '{}': {}\n\
                 Fix: check for unmatched quotes or invalid escape sequences.",
                template, e
            ))
        })?;
        argv.extend(args.iter().cloned());

        if argv.is_empty() {
            return Err(WardenError::UserError(format!(
                "action command for '{}' is empty after parsing",
                action_key
            )));
        }

        let logs_dir = ctx.logs_dir(&record.run_id);
        std::fs::create_dir_all(&logs_dir).map_err(|e| {
            WardenError::UserError(format!(
                "failed to create logs directory '{}': {}",
                logs_dir.display(),
                e
            ))
        })?;
        let log_path = logs_dir.join(format!("{}.log", record.phase));

        let log_file = std::fs::File::create(&log_path).map_err(|e| {
            WardenError::UserError(format!(
                "failed to create phase log '{}': {}",
                log_path.display(),
                e
            ))
        })?;
        let log_for_stderr = log_file.try_clone().map_err(|e| {
            WardenError::UserError(format!("failed to clone phase log handle: {}", e))
        })?;

        let mut command = Command::new(&argv[0]);
        command
            .args(&argv[1..])
            .current_dir(&ctx.root)
            .stdout(Stdio::from(log_file))
            .stderr(Stdio::from(log_for_stderr));

        apply_guard_env(&mut command, ctx, record);

        let start_time = Instant::now();
        let mut child = command.spawn().map_err(|e| {
            WardenError::UserError(format!(
                "failed to execute action command '{}': {}\n\
                 Fix: ensure the command is installed and in PATH.",
                argv[0], e
            ))
        })?;

        let timeout = Duration::from_secs(self.config.phase_timeout_seconds);
        let (exit_code, timed_out) = wait_with_timeout(&mut child, timeout)?;
        let duration = start_time.elapsed();

        Ok(PhaseOutcome {
            exit_code,
            timed_out,
            log_path,
            duration,
        })
    }
}

/// Export the guard environment to the phase command.
///
/// The spawned agent runtime (and any warden guard hook inside it) reads
/// this surface once at startup.
fn apply_guard_env(command: &mut Command, ctx: &WardenContext, record: &RunRecord) {
    command.env(ENV_ROOT, &ctx.root);
    command.env(env_vars::RUN_KEY, &record.run_id);
    command.env(env_vars::PHASE, &record.phase);

    if let Some(budget) = &record.read_budget {
        command.env(
            env_vars::MAX_BYTES_PER_READ,
            budget.max_bytes_per_read.to_string(),
        );
        command.env(env_vars::MAX_FILES, budget.max_files.to_string());
        command.env(
            env_vars::MAX_TOTAL_BYTES,
            budget.max_total_bytes.to_string(),
        );
    }

    if !record.allowed_paths.is_empty() {
        command.env(env_vars::ALLOWLIST, record.allowed_paths.join(","));
    }
}

/// Wait for a child process with timeout.
///
/// Returns (exit_code, timed_out).
fn wait_with_timeout(child: &mut Child, timeout: Duration) -> Result<(Option<i32>, bool)> {
    let start = Instant::now();
    let poll_interval = Duration::from_millis(100);

    loop {
        match child.try_wait() {
            Ok(Some(status)) => {
                return Ok((status.code(), false));
            }
            Ok(None) => {
                if start.elapsed() >= timeout {
                    kill_process(child);
                    return Ok((None, true));
                }
                std::thread::sleep(poll_interval);
            }
            Err(e) => {
                return Err(WardenError::UserError(format!(
                    "failed to check phase process status: {}",
                    e
                )));
            }
        }
    }
}

/// Kill a process and wait for it to terminate.
fn kill_process(child: &mut Child) {
    // On Unix this is SIGKILL; on Windows it is TerminateProcess.
    let _ = child.kill();
    let _ = child.wait();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::run::{CreateOptions, RunLedger};
    use tempfile::TempDir;

    fn make_run(
        actions: &[(&str, &str)],
        timeout: u64,
    ) -> (TempDir, WardenContext, Config, RunRecord) {
        let temp_dir = TempDir::new().unwrap();
        let ctx = WardenContext::at_root(temp_dir.path());

        let mut config = Config::default();
        config.phase_timeout_seconds = timeout;
        for (key, command) in actions {
            config.actions.insert(key.to_string(), command.to_string());
        }

        let ledger = RunLedger::new(ctx.clone());
        let record = ledger
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

        (temp_dir, ctx, config, record)
    }

    #[test]
    fn runs_configured_command_and_captures_log() {
        let (_t, ctx, config, record) =
            make_run(&[("tdd.implement", "echo implementing")], 10);

        let runner = CommandPhaseRunner::new(&config);
        let outcome = runner.run_phase(&ctx, &record, &[]).unwrap();

        assert!(outcome.is_success());
        assert_eq!(outcome.exit_code, Some(0));
        assert!(!outcome.timed_out);

        let log = std::fs::read_to_string(&outcome.log_path).unwrap();
        assert!(log.contains("implementing"));
        assert!(outcome.log_path.ends_with("logs/implement.log"));
    }

    #[test]
    fn appends_extra_args_to_argv() {
        let (_t, ctx, config, record) = make_run(&[("tdd.implement", "echo")], 10);

        let runner = CommandPhaseRunner::new(&config);
        let outcome = runner
            .run_phase(&ctx, &record, &["--target".to_string(), "core".to_string()])
            .unwrap();

        let log = std::fs::read_to_string(&outcome.log_path).unwrap();
        assert!(log.contains("--target core"));
    }

    #[test]
    fn nonzero_exit_is_reported_not_raised() {
        let (_t, ctx, config, record) = make_run(&[("tdd.implement", "sh -c \"exit 3\"")], 10);

        let runner = CommandPhaseRunner::new(&config);
        let outcome = runner.run_phase(&ctx, &record, &[]).unwrap();

        assert!(!outcome.is_success());
        assert_eq!(outcome.exit_code, Some(3));
    }

    #[test]
    fn timeout_kills_the_phase() {
        let (_t, ctx, config, record) = make_run(&[("tdd.implement", "sleep 10")], 1);

        let runner = CommandPhaseRunner::new(&config);
        let outcome = runner.run_phase(&ctx, &record, &[]).unwrap();

        assert!(outcome.timed_out);
        assert!(outcome.exit_code.is_none());
        assert!(!outcome.is_success());
    }

    #[test]
    fn unconfigured_action_is_a_user_error() {
        let (_t, ctx, config, record) = make_run(&[], 10);

        let runner = CommandPhaseRunner::new(&config);
        let result = runner.run_phase(&ctx, &record, &[]);
        assert!(result.is_err());
        let message = result.unwrap_err().to_string();
        assert!(message.contains("tdd.implement"));
        assert!(message.contains("warden.yaml"));
    }

    #[test]
    fn guard_env_reaches_the_phase() {
        let temp_dir = TempDir::new().unwrap();
        let ctx = WardenContext::at_root(temp_dir.path());

        let mut config = Config::default();
        config.actions.insert(
            "tdd.implement".to_string(),
            "sh -c \"echo key=$WARDEN_RUN_KEY phase=$WARDEN_PHASE files=$WARDEN_READ_MAX_FILES\""
                .to_string(),
        );

        let ledger = RunLedger::new(ctx.clone());
        let record = ledger
            .create(
                "tdd",
                "implement",
                None,
                CreateOptions {
                    agent_runtime: "cli".to_string(),
                    read_budget: Some(crate::budget::BudgetLimits {
                        max_bytes_per_read: 0,
                        max_files: 7,
                        max_total_bytes: 0,
                    }),
                    ..Default::default()
                },
            )
            .unwrap();

        let runner = CommandPhaseRunner::new(&config);
        let outcome = runner.run_phase(&ctx, &record, &[]).unwrap();

        let log = std::fs::read_to_string(&outcome.log_path).unwrap();
        assert!(log.contains(&format!("key={}", record.run_id)));
        assert!(log.contains("phase=implement"));
        assert!(log.contains("files=7"));
    }

    #[test]
    fn malformed_action_template_is_rejected() {
        let (_t, ctx, config, record) =
            make_run(&[("tdd.implement", "echo \"unmatched")], 10);

        let runner = CommandPhaseRunner::new(&config);
        let result = runner.run_phase(&ctx, &record, &[]);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("failed to parse"));
    }
}
