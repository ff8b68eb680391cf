//! Reset signal: a one-shot marker file whose presence means "rebuild the
//! simulation now".
//!
//! The marker's content is irrelevant. An empty or malformed marker is still
//! a reset request. Observing the marker deletes it, so one request causes
//! one rebuild. If deletion fails the request is seen again next tick;
//! rebuilding is idempotent, so that only costs an extra reset.

use std::io::ErrorKind;
use std::path::Path;

/// Returns `true` iff a reset marker existed at `path`, deleting it.
pub fn check_and_consume_reset(path: &Path) -> bool {
    match std::fs::symlink_metadata(path) {
        Ok(_) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => return false,
        // Present but not inspectable still counts as a request.
        Err(e) => log::warn!("Cannot inspect reset marker {}: {e}", path.display()),
    }

    if let Err(e) = std::fs::remove_file(path) {
        log::warn!("Could not delete reset marker {}: {e}", path.display());
    }
    true
}
