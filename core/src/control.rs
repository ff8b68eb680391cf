//! Control channel: the run-mode the external controller wants.
//!
//! The controller writes `{"play": bool, "speed": number}` to the control
//! file. The daemon re-reads it every tick and never fails on it: a missing,
//! unreadable or malformed file means "playing, 0.5 s per tick".

use serde::Deserialize;
use serde_json::Value;
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

pub const DEFAULT_PLAYING:  bool = true;
pub const DEFAULT_INTERVAL: f64  = 0.5;

/// Desired run-mode for one tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunControl {
    pub playing:          bool,
    /// Seconds to sleep at the end of the tick. Always finite and >= 0.
    pub interval_seconds: f64,
}

impl Default for RunControl {
    fn default() -> Self {
        Self {
            playing:          DEFAULT_PLAYING,
            interval_seconds: DEFAULT_INTERVAL,
        }
    }
}

impl RunControl {
    pub fn interval(&self) -> Duration {
        Duration::try_from_secs_f64(self.interval_seconds).unwrap_or(Duration::MAX)
    }

    /// Interpret the raw control document.
    ///
    /// `play` must be a JSON bool, anything else keeps the default.
    /// `speed` may be a number or a numeric string; negative values clamp
    /// to zero and non-finite or non-numeric values keep the default.
    pub fn from_json(value: &Value) -> Option<Self> {
        if !value.is_object() {
            return None;
        }
        let file = ControlFile::deserialize(value).ok()?;
        Some(Self {
            playing:          file.play.as_ref().and_then(Value::as_bool).unwrap_or(DEFAULT_PLAYING),
            interval_seconds: file.speed.as_ref().map(parse_interval).unwrap_or(DEFAULT_INTERVAL),
        })
    }
}

/// Wire form of the control file. Fields stay untyped so a wrong type in
/// one field does not discard the other.
#[derive(Debug, Deserialize)]
struct ControlFile {
    #[serde(default)]
    play:  Option<Value>,
    #[serde(default)]
    speed: Option<Value>,
}

fn parse_interval(speed: &Value) -> f64 {
    let seconds = match speed {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match seconds {
        Some(s) if s.is_finite() => s.max(0.0),
        _ => DEFAULT_INTERVAL,
    }
}

/// Read the control file once. Never fails; see the module docs.
pub fn read_control(path: &Path) -> RunControl {
    let content = match std::fs::read(path) {
        Ok(c) => c,
        Err(_) => return RunControl::default(),
    };
    match serde_json::from_slice::<Value>(&content) {
        Ok(value) => RunControl::from_json(&value).unwrap_or_else(|| {
            log::debug!("Control file {} is not an object; using defaults", path.display());
            RunControl::default()
        }),
        Err(e) => {
            log::debug!("Malformed control file {}: {e}; using defaults", path.display());
            RunControl::default()
        }
    }
}

/// Polling reader that skips re-parsing while the file is unchanged.
///
/// Change detection uses the file's length, mtime, and on Unix its inode
/// and status-change time. A stamp younger than [`RACY_WINDOW`] is never
/// cached: a same-size rewrite inside one timestamp tick would otherwise go
/// unnoticed. With caching disabled every call goes straight to
/// [`read_control`].
#[derive(Debug)]
pub struct ControlReader {
    path:   PathBuf,
    cache:  bool,
    cached: Option<(FileStamp, RunControl)>,
}

/// Files changed more recently than this are re-read on every poll.
pub const RACY_WINDOW: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileStamp {
    modified: SystemTime,
    /// Latest of mtime and status-change time.
    changed:  SystemTime,
    len:      u64,
    inode:    u64,
}

impl FileStamp {
    fn of(meta: &Metadata) -> Option<Self> {
        let modified = meta.modified().ok()?;
        let changed = status_changed(meta).map_or(modified, |c| c.max(modified));
        Some(Self { modified, changed, len: meta.len(), inode: inode(meta) })
    }

    /// Old enough that any later write moves at least one timestamp.
    fn settled(&self, now: SystemTime) -> bool {
        now.duration_since(self.changed)
            .map(|age| age >= RACY_WINDOW)
            .unwrap_or(false)
    }
}

#[cfg(unix)]
fn status_changed(meta: &Metadata) -> Option<SystemTime> {
    use std::os::unix::fs::MetadataExt;
    let secs = u64::try_from(meta.ctime()).ok()?;
    let nanos = u32::try_from(meta.ctime_nsec()).ok()?;
    SystemTime::UNIX_EPOCH.checked_add(Duration::new(secs, nanos))
}

#[cfg(not(unix))]
fn status_changed(_meta: &Metadata) -> Option<SystemTime> {
    None
}

#[cfg(unix)]
fn inode(meta: &Metadata) -> u64 {
    std::os::unix::fs::MetadataExt::ino(meta)
}

#[cfg(not(unix))]
fn inode(_meta: &Metadata) -> u64 {
    0
}

impl ControlReader {
    pub fn new(path: PathBuf, cache: bool) -> Self {
        Self { path, cache, cached: None }
    }

    pub fn read(&mut self) -> RunControl {
        if !self.cache {
            return read_control(&self.path);
        }
        let stamp = match std::fs::metadata(&self.path) {
            Ok(meta) => FileStamp::of(&meta),
            Err(_) => {
                self.cached = None;
                return RunControl::default();
            }
        };
        // No mtime support on this platform: read every time.
        let Some(stamp) = stamp else {
            return read_control(&self.path);
        };
        if let Some((seen, control)) = self.cached {
            if seen == stamp {
                return control;
            }
        }
        let control = read_control(&self.path);
        self.cached = stamp.settled(SystemTime::now()).then_some((stamp, control));
        control
    }
}
