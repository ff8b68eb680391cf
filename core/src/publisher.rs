//! State publisher: the only code that writes into the shared directory.
//!
//! RULE: a consumer reading the state file concurrently sees either the
//! previous snapshot or the new one, never a truncated file. The encoded
//! snapshot goes to a temporary file in the same directory, is flushed to
//! disk, then renamed over the state file.
//!
//! After a successful publish the directory holds only the control file and
//! the state file. Every other entry is deleted on a best-effort basis.

use crate::{
    channel::SharedDirectory,
    error::HostResult,
    snapshot::{to_json_value, SnapshotValue},
};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

pub struct StatePublisher {
    dir: SharedDirectory,
}

impl StatePublisher {
    pub fn new(dir: SharedDirectory) -> Self {
        Self { dir }
    }

    pub fn state_path(&self) -> PathBuf {
        self.dir.state_path()
    }

    /// Encode `snapshot`, replace the state file atomically, then purge
    /// stray files. Returns the number of stray entries removed.
    pub fn publish(&self, snapshot: &SnapshotValue) -> HostResult<usize> {
        let encoded = serde_json::to_vec(&to_json_value(snapshot))?;
        self.replace_state_file(&encoded)?;
        Ok(self.remove_strays())
    }

    fn replace_state_file(&self, bytes: &[u8]) -> HostResult<()> {
        let target = self.dir.state_path();
        let tmp = self.dir.root().join(format!(".{}.tmp", self.dir.state_file()));

        if let Err(e) = write_synced(&tmp, bytes) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        if let Err(e) = fs::rename(&tmp, &target) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(())
    }

    /// Delete everything except the control and state files. Failures are
    /// logged and skipped.
    fn remove_strays(&self) -> usize {
        let entries = match fs::read_dir(self.dir.root()) {
            Ok(entries) => entries,
            Err(e) => {
                log::warn!("Cannot list {}: {e}", self.dir.root().display());
                return 0;
            }
        };

        let mut removed = 0;
        for entry in entries.flatten() {
            let name = entry.file_name();
            if self.dir.is_retained(&name) {
                continue;
            }
            match fs::remove_file(entry.path()) {
                Ok(()) => {
                    log::debug!("Removed stray file {}", entry.path().display());
                    removed += 1;
                }
                Err(e) => log::debug!("Could not remove {}: {e}", entry.path().display()),
            }
        }
        removed
    }
}

fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}
