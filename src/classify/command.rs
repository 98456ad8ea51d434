//! Shell-command text heuristics.
//!
//! Shell commands are opaque strings, so write protection over them is
//! pattern matching on the command text. This is a best-effort layer, not a
//! security boundary: it can over-block (a benign command containing a
//! forbidden substring) and under-block (a mutating command phrased
//! unusually). It is kept behind this narrow interface so a structured
//! command model can replace it without touching the enforcer's control
//! flow.

use regex::Regex;
use std::sync::LazyLock;

static PRIVILEGE_ESCALATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(^|[;&|]\s*|\s)(sudo|doas|pkexec)\s|\bsu\s+(-|-l|-c)\b|\bchmod\s+(u\+s|0?[2467][0-7]{3})\b")
        .expect("privilege escalation pattern must compile")
});

static VCS_REVERT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\bgit\s+(checkout\s+--|checkout\s+[^-]|restore\b|reset\s+--hard|clean\s+-[A-Za-z]*f|stash\s+drop)",
    )
    .expect("vcs revert pattern must compile")
});

static WHOLESALE_REVERT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bgit\s+(reset\s+--hard|clean\s+-[A-Za-z]*f|stash\s+drop)")
        .expect("wholesale revert pattern must compile")
});

static MUTATING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(^|[;&|]\s*|\s)(rm|mv|cp|dd|truncate|tee|unlink|install|rsync|ln)\s|\bsed\s+(-[A-Za-z]*\s+)*-i\b|(^|[^>])>{1,2}\s*\S",
    )
    .expect("mutating command pattern must compile")
});

/// Whether the command text looks like it mutates files.
///
/// Used to decide whether a shell command needs a protected-path check at
/// all; a command that doesn't look mutating is allowed without one.
pub fn looks_like_mutating_command(text: &str) -> bool {
    MUTATING.is_match(text)
}

/// Whether the command text looks like privilege escalation.
pub fn is_privilege_escalation(text: &str) -> bool {
    PRIVILEGE_ESCALATION.is_match(text)
}

/// Whether the command text looks like a version-control revert.
pub fn is_vcs_revert(text: &str) -> bool {
    VCS_REVERT.is_match(text)
}

/// Whether the command text reverts wholesale (no explicit target paths).
pub fn is_wholesale_revert(text: &str) -> bool {
    WHOLESALE_REVERT.is_match(text)
}

/// Extract tokens from the command text that plausibly name file paths.
///
/// Tokens are split with shell-words when possible (falling back to
/// whitespace on malformed quoting); flags and bare words without a path
/// separator or extension are skipped.
pub fn command_path_candidates(text: &str) -> Vec<String> {
    let tokens = match shell_words::split(text) {
        Ok(tokens) => tokens,
        Err(_) => text.split_whitespace().map(|s| s.to_string()).collect(),
    };

    tokens
        .into_iter()
        .filter(|token| !token.starts_with('-'))
        .filter(|token| looks_like_path(token))
        .collect()
}

fn looks_like_path(token: &str) -> bool {
    if token.contains('/') {
        return true;
    }
    // "name.ext" style tokens, but not command separators or numbers
    if let Some((stem, ext)) = token.rsplit_once('.') {
        return !stem.is_empty()
            && !ext.is_empty()
            && ext.chars().all(|c| c.is_ascii_alphanumeric())
            && stem.chars().any(|c| c.is_ascii_alphabetic());
    }
    false
}
