//! The `log` command: bounded queries over raw logs.
//!
//! Logs are write-only for the phase that produces them and read through
//! bounded queries only: tail the last N lines or grep for a pattern, with
//! the output capped at a configured byte ceiling. The full log stays on
//! disk.

use crate::cli::LogArgs;
use crate::config::Config;
use crate::context::WardenContext;
use crate::error::{Result, WardenError};
use regex::Regex;

pub fn cmd_log(args: LogArgs) -> Result<()> {
    let ctx = WardenContext::resolve()?;
    let config = Config::load(ctx.config_path())?;

    let target = ctx.resolve_inside_root(&args.path)?;
    let content = std::fs::read_to_string(&target).map_err(|e| {
        WardenError::UserError(format!(
            "failed to read log '{}': {}",
            target.display(),
            e
        ))
    })?;

    let snippet = match &args.grep {
        Some(pattern) => {
            let regex = Regex::new(pattern).map_err(|e| {
                WardenError::UserError(format!("invalid grep pattern '{}': {}", pattern, e))
            })?;
            grep_lines(&content, &regex)
        }
        None => tail_lines(&content, args.tail),
    };

    print!("{}", cap_text_bytes(&snippet, config.log_query_max_bytes));
    eprintln!("(bounded query; full log remains at {})", args.path);
    Ok(())
}

/// Last `n` lines of the content.
fn tail_lines(content: &str, n: usize) -> String {
    let lines: Vec<&str> = content.lines().collect();
    let start = lines.len().saturating_sub(n.max(1));
    let mut out = lines[start..].join("\n");
    if !out.is_empty() {
        out.push('\n');
    }
    out
}

/// Lines matching the pattern.
fn grep_lines(content: &str, regex: &Regex) -> String {
    let mut out = String::new();
    for line in content.lines() {
        if regex.is_match(line) {
            out.push_str(line);
            out.push('\n');
        }
    }
    out
}

/// Clip text to a byte limit on a UTF-8 boundary.
fn cap_text_bytes(text: &str, limit: usize) -> String {
    if text.len() <= limit {
        return text.to_string();
    }
    let mut end = limit;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
}
