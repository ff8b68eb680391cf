//! The shared directory: the only state surface between the daemon, the
//! external controller and the state consumers.
//!
//! Layout (names come from [`HostConfig`]):
//!   control file: written by the controller, read every tick
//!   reset file: dropped by the controller, consumed by the daemon
//!   state file: written by the daemon, read by consumers
//! Anything else found in the directory is stray.

use crate::{config::HostConfig, error::HostResult};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct SharedDirectory {
    root:         PathBuf,
    control_file: String,
    reset_file:   String,
    state_file:   String,
}

impl SharedDirectory {
    pub fn from_config(config: &HostConfig) -> Self {
        Self {
            root:         config.data_dir.clone(),
            control_file: config.control_file.clone(),
            reset_file:   config.reset_file.clone(),
            state_file:   config.state_file.clone(),
        }
    }

    /// Create the directory if needed.
    pub fn open(config: &HostConfig) -> HostResult<Self> {
        std::fs::create_dir_all(&config.data_dir)?;
        Ok(Self::from_config(config))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn control_path(&self) -> PathBuf {
        self.root.join(&self.control_file)
    }

    pub fn reset_path(&self) -> PathBuf {
        self.root.join(&self.reset_file)
    }

    pub fn state_path(&self) -> PathBuf {
        self.root.join(&self.state_file)
    }

    pub fn state_file(&self) -> &str {
        &self.state_file
    }

    /// True for the two names the publisher never deletes.
    pub fn is_retained(&self, name: &OsStr) -> bool {
        name == OsStr::new(&self.control_file) || name == OsStr::new(&self.state_file)
    }
}
