//! Host configuration: where the shared directory lives and what its three
//! well-known files are called.
//!
//! File names are an external contract with the controller and the consumer,
//! so they are configurable but default to the historical layout.

use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const DEFAULT_DATA_DIR:     &str = "simulation_data";
pub const DEFAULT_CONTROL_FILE: &str = "control.json";
pub const DEFAULT_RESET_FILE:   &str = "reset.json";
pub const DEFAULT_STATE_FILE:   &str = "latest.json";

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct HostConfig {
    pub data_dir:      PathBuf,
    pub control_file:  String,
    pub reset_file:    String,
    pub state_file:    String,
    /// Re-parse the control file only when its mtime or length changes.
    pub cache_control: bool,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            data_dir:      PathBuf::from(DEFAULT_DATA_DIR),
            control_file:  DEFAULT_CONTROL_FILE.to_string(),
            reset_file:    DEFAULT_RESET_FILE.to_string(),
            state_file:    DEFAULT_STATE_FILE.to_string(),
            cache_control: true,
        }
    }
}

impl HostConfig {
    /// Load a JSON config file. Missing keys take their defaults.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {}: {e}", path.display()))?;
        let config: HostConfig = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Invalid config {}: {e}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.data_dir = data_dir.into();
        self
    }

    /// The three file names must be distinct bare names inside `data_dir`.
    pub fn validate(&self) -> anyhow::Result<()> {
        let names = [&self.control_file, &self.reset_file, &self.state_file];
        for name in names {
            if name.is_empty() || name.contains('/') || name.contains('\\') {
                anyhow::bail!("File name {name:?} must be a bare, non-empty name");
            }
        }
        if self.control_file == self.reset_file
            || self.control_file == self.state_file
            || self.reset_file == self.state_file
        {
            anyhow::bail!(
                "control, reset and state file names must differ: {:?}",
                names
            );
        }
        Ok(())
    }
}
