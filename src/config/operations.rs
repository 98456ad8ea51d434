//! Config loading and saving.

use super::model::Config;
use crate::error::{Result, WardenError};
use crate::fs::atomic_write_file;
use std::path::Path;

impl Config {
    /// Load configuration from a YAML file.
    ///
    /// A missing file yields the default configuration; a malformed file is
    /// an error (never silently defaulted, so a typo cannot drop
    /// protection).
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            WardenError::UserError(format!(
                "failed to read config '{}': {}",
                path.display(),
                e
            ))
        })?;

        serde_yaml::from_str(&content).map_err(|e| {
            WardenError::UserError(format!(
                "failed to parse config '{}': {}",
                path.display(),
                e
            ))
        })
    }

    /// Save configuration to a YAML file atomically.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = serde_yaml::to_string(self)
            .map_err(|e| WardenError::UserError(format!("failed to serialize config: {}", e)))?;
        atomic_write_file(path, &yaml)
    }
}
