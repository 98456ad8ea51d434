//! Path classification for phase-scoped write protection.
//!
//! Given a file path and the active phase, decide whether the path falls in
//! a protected category (test file, spec file, metrics file, log file, state
//! file) for that phase. Pure function of its inputs; all state is built
//! once at construction.
//!
//! Allow patterns override protection: a path matching the allowlist is
//! never protected, even if it otherwise matches a protected category. The
//! allowlist is the union of every allow source (environment, configured
//! defaults, caller-supplied), built into a single `GlobSet`.
//!
//! Paths are checked in both their original form and their absolutized form,
//! so protection cannot be bypassed through a relative-path alias of an
//! absolutized pattern — and the reverse never produces a false block.

pub mod command;
mod patterns;


pub use patterns::{default_category_patterns, default_phase_policies};

use crate::config::Config;
use crate::error::{Result, WardenError};
use globset::{Glob, GlobSet, GlobSetBuilder};
use regex::Regex;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Artifact categories a phase policy can protect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ProtectedCategory {
    /// Test sources and fixtures.
    TestFile,
    /// Specification and requirement documents.
    SpecFile,
    /// Recorded metrics and result summaries.
    MetricsFile,
    /// Raw log output.
    LogFile,
    /// Engine state records (ledgers, run records, locks).
    StateFile,
}

impl ProtectedCategory {
    /// All categories, in a stable order.
    pub const ALL: [ProtectedCategory; 5] = [
        ProtectedCategory::TestFile,
        ProtectedCategory::SpecFile,
        ProtectedCategory::MetricsFile,
        ProtectedCategory::LogFile,
        ProtectedCategory::StateFile,
    ];

    /// Configuration name of the category.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProtectedCategory::TestFile => "test-file",
            ProtectedCategory::SpecFile => "spec-file",
            ProtectedCategory::MetricsFile => "metrics-file",
            ProtectedCategory::LogFile => "log-file",
            ProtectedCategory::StateFile => "state-file",
        }
    }

    /// Parse a category from its configuration name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.as_str() == name)
    }
}

impl std::fmt::Display for ProtectedCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result of classifying one path for one phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    /// Whether the path is write-protected for the phase.
    pub protected: bool,
    /// The category that matched, when protected.
    pub category: Option<ProtectedCategory>,
}

impl Classification {
    fn clear() -> Self {
        Self {
            protected: false,
            category: None,
        }
    }
}

/// Compiled path classifier.
///
/// Construction compiles the category regexes and the unioned allowlist
/// once; `classify` itself has no side effects.
#[derive(Debug)]
pub struct PathClassifier {
    /// Phase name -> categories protected while that phase is active.
    policies: BTreeMap<String, Vec<ProtectedCategory>>,

    /// Category -> recognition regexes (configuration data).
    patterns: BTreeMap<ProtectedCategory, Vec<Regex>>,

    /// Unioned allow globs; an allowlisted path is never protected.
    allowlist: GlobSet,
}

impl PathClassifier {
    /// Build a classifier from raw configuration maps plus caller-supplied
    /// allow globs.
    ///
    /// `policies` maps phase names to category names; `category_patterns`
    /// maps category names to regex sources. Unknown category names are
    /// rejected so a typo in configuration cannot silently disable
    /// protection.
    pub fn new(
        policies: &BTreeMap<String, Vec<String>>,
        category_patterns: &BTreeMap<String, Vec<String>>,
        allow_globs: &[String],
    ) -> Result<Self> {
        let mut resolved_policies = BTreeMap::new();
        for (phase, names) in policies {
            let mut categories = Vec::new();
            for name in names {
                let category = ProtectedCategory::from_name(name).ok_or_else(|| {
                    WardenError::UserError(format!(
                        "unknown protected category '{}' in policy for phase '{}'",
                        name, phase
                    ))
                })?;
                categories.push(category);
            }
            resolved_policies.insert(phase.clone(), categories);
        }

        let mut resolved_patterns = BTreeMap::new();
        for (name, sources) in category_patterns {
            let category = ProtectedCategory::from_name(name).ok_or_else(|| {
                WardenError::UserError(format!("unknown protected category '{}'", name))
            })?;
            let mut regexes = Vec::new();
            for source in sources {
                let regex = Regex::new(source).map_err(|e| {
                    WardenError::UserError(format!(
                        "invalid pattern for category '{}': '{}' - {}",
                        name, source, e
                    ))
                })?;
                regexes.push(regex);
            }
            resolved_patterns.insert(category, regexes);
        }

        let allowlist = build_globset(allow_globs)?;

        Ok(Self {
            policies: resolved_policies,
            patterns: resolved_patterns,
            allowlist,
        })
    }

    /// Build a classifier from config, unioning the configured allow globs
    /// with caller-supplied ones (e.g. the environment allowlist).
    pub fn from_config(config: &Config, extra_allow: &[String]) -> Result<Self> {
        let mut allow: Vec<String> = config.allow_globs.clone();
        allow.extend(extra_allow.iter().cloned());
        Self::new(&config.phase_policies, &config.category_patterns, &allow)
    }

    /// Classify a path for the given phase.
    ///
    /// A phase with no policy entry protects nothing; universal checks are
    /// the enforcer's concern, not the classifier's.
    pub fn classify(&self, path: &str, phase: &str) -> Classification {
        if self.is_allowlisted(path) {
            return Classification::clear();
        }

        let Some(categories) = self.policies.get(phase) else {
            return Classification::clear();
        };

        for category in categories {
            if self.matches_category(path, *category) {
                return Classification {
                    protected: true,
                    category: Some(*category),
                };
            }
        }
        Classification::clear()
    }

    /// Whether any allow pattern matches the path (in either form).
    pub fn is_allowlisted(&self, path: &str) -> bool {
        path_forms(path)
            .iter()
            .any(|form| self.allowlist.is_match(form))
    }

    /// Phase-independent category lookup across all categories.
    ///
    /// Used by the universal version-control checks, which protect category
    /// members regardless of the active phase.
    pub fn category_of(&self, path: &str) -> Option<ProtectedCategory> {
        if self.is_allowlisted(path) {
            return None;
        }
        ProtectedCategory::ALL
            .iter()
            .copied()
            .find(|category| self.matches_category(path, *category))
    }

    fn matches_category(&self, path: &str, category: ProtectedCategory) -> bool {
        let Some(regexes) = self.patterns.get(&category) else {
            return false;
        };
        let forms = path_forms(path);
        regexes
            .iter()
            .any(|regex| forms.iter().any(|form| regex.is_match(form)))
    }
}

/// The forms a path is checked in: the original (normalized to forward
/// slashes) and the absolutized normalization.
fn path_forms(path: &str) -> Vec<String> {
    let original = path.replace('\\', "/");

    let p = PathBuf::from(&original);
    let absolute = if p.is_absolute() {
        original.clone()
    } else {
        match std::env::current_dir() {
            Ok(cwd) => cwd.join(&p).to_string_lossy().replace('\\', "/"),
            Err(_) => original.clone(),
        }
    };

    if absolute == original {
        vec![original]
    } else {
        vec![original, absolute]
    }
}

/// Build a GlobSet from a list of glob patterns.
fn build_globset(globs: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in globs {
        let normalized = pattern.replace('\\', "/");
        let glob = Glob::new(&normalized).map_err(|e| {
            WardenError::UserError(format!("invalid allow glob '{}': {}", pattern, e))
        })?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| WardenError::UserError(format!("failed to compile allow globs: {}", e)))
}
