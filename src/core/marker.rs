//! Progress marker: the start instant of the last successful run of a target
//!
//! The marker is a plain file whose modification time is the only signal.
//! It is read once when a run starts and written once when it succeeds.

use std::fs::{self, FileTimes, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Directory under the workspace that holds the marker files
pub const MARKER_DIR: &str = "packages";

/// Marker file name prefix, followed by the target name
pub const MARKER_PREFIX: &str = ".last_upload_";

/// Persisted progress marker for one target
#[derive(Debug, Clone)]
pub struct ProgressMarker {
    path: PathBuf,
    start_time: SystemTime,
}

impl ProgressMarker {
    /// Open the marker at `path`; the current instant becomes the run's start
    pub fn open<P: Into<PathBuf>>(path: P) -> Self {
        Self::with_start_time(path, SystemTime::now())
    }

    /// Open the marker with an explicit run start instant
    pub fn with_start_time<P: Into<PathBuf>>(path: P, start_time: SystemTime) -> Self {
        Self {
            path: path.into(),
            start_time,
        }
    }

    /// Marker for `target` under `<workspace>/packages/`
    pub fn for_target(workspace: &Path, target: &str) -> Self {
        Self::open(Self::path_for(workspace, target))
    }

    pub fn path_for(workspace: &Path, target: &str) -> PathBuf {
        workspace
            .join(MARKER_DIR)
            .join(format!("{}{}", MARKER_PREFIX, target))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn start_time(&self) -> SystemTime {
        self.start_time
    }

    /// Start instant of the last successful run, `None` if there was none
    ///
    /// An unreadable marker is treated the same as a missing one: every file
    /// becomes a candidate again.
    pub fn last_success(&self) -> Option<SystemTime> {
        fs::metadata(&self.path)
            .and_then(|meta| meta.modified())
            .ok()
    }

    /// Record this run's start instant as the last success
    ///
    /// Failures are logged and swallowed so a read-only workspace only costs a
    /// wider scan next time. Returns whether the marker now holds this run's
    /// start instant (or a later one).
    pub fn advance(&self) -> bool {
        if let Some(previous) = self.last_success()
            && previous > self.start_time
        {
            tracing::debug!(
                marker = %self.path.display(),
                "marker is newer than this run's start, leaving it unchanged"
            );
            return true;
        }

        match self.write() {
            Ok(()) => {
                tracing::debug!(marker = %self.path.display(), "marker advanced");
                true
            }
            Err(e) => {
                tracing::warn!(
                    marker = %self.path.display(),
                    error = %e,
                    "unable to update timestamp file, permission problem?"
                );
                false
            }
        }
    }

    fn write(&self) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        let times = FileTimes::new()
            .set_accessed(SystemTime::now())
            .set_modified(self.start_time);
        file.set_times(times)
    }
}
