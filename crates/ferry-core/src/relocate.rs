//! Moves a finished download from a staging area to its output path.
//!
//! The browser writes the file out-of-band some time after the click, so the
//! relocator cannot simply take "the newest file". Before a session starts the
//! worker captures a [`DirSnapshot`] of its staging area; afterwards only
//! entries missing from that snapshot are candidates. Leftovers from earlier
//! jobs on the same worker are therefore never picked up, whatever their
//! timestamps say.

use std::collections::HashSet;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tokio::time::Instant;

use crate::error::AppError;
use crate::staging::StagingArea;

/// Suffixes browsers use for downloads that are still being written.
const PARTIAL_SUFFIXES: &[&str] = &[".crdownload", ".part", ".partial", ".tmp", ".download"];

/// Entry names present in a directory at one point in time.
#[derive(Debug, Clone, Default)]
pub struct DirSnapshot {
    names: HashSet<OsString>,
}

impl DirSnapshot {
    pub async fn capture(dir: &Path) -> Result<Self, AppError> {
        let mut names = HashSet::new();
        let mut entries = tokio::fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            names.insert(entry.file_name());
        }
        Ok(Self { names })
    }

    pub fn contains(&self, name: &OsString) -> bool {
        self.names.contains(name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// What happened to the job's download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Relocation {
    Moved { from: PathBuf, to: PathBuf },
    /// Nothing new showed up in the staging area. Not an error: the job was
    /// attempted, it just has no artifact.
    NoFileProduced,
}

/// Timing for picking up a download after the click.
#[derive(Debug, Clone)]
pub struct Relocator {
    /// Fixed wait before the first look at the staging area.
    pub settle_delay: Duration,
    /// How long to keep polling for a finished file after settling.
    pub download_timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for Relocator {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_secs(1),
            download_timeout: Duration::from_secs(10),
            poll_interval: Duration::from_millis(250),
        }
    }
}

impl Relocator {
    /// Move the file produced since `before` was captured to `final_path`.
    ///
    /// When several new files exist the most recently modified one wins.
    pub async fn relocate(
        &self,
        area: &StagingArea,
        before: &DirSnapshot,
        final_path: &Path,
    ) -> Result<Relocation, AppError> {
        tokio::time::sleep(self.settle_delay).await;
        let deadline = Instant::now() + self.download_timeout;

        loop {
            if let Some(source) = newest_new_file(area.path(), before).await? {
                move_file(&source, final_path).await?;
                tracing::debug!(
                    worker_id = %area.worker_id(),
                    from = %source.display(),
                    to = %final_path.display(),
                    "Download relocated"
                );
                return Ok(Relocation::Moved {
                    from: source,
                    to: final_path.to_path_buf(),
                });
            }

            if Instant::now() >= deadline {
                return Ok(Relocation::NoFileProduced);
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

fn is_partial(name: &OsString) -> bool {
    let name = name.to_string_lossy();
    PARTIAL_SUFFIXES.iter().any(|suffix| name.ends_with(suffix))
}

/// Newest completed regular file in `dir` that is not in `before`.
async fn newest_new_file(dir: &Path, before: &DirSnapshot) -> Result<Option<PathBuf>, AppError> {
    let mut newest: Option<(SystemTime, OsString, PathBuf)> = None;
    let mut entries = tokio::fs::read_dir(dir).await?;

    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        if before.contains(&name) || is_partial(&name) {
            continue;
        }
        // The browser may rename or remove the entry between listing and stat.
        let Ok(metadata) = entry.metadata().await else {
            continue;
        };
        if !metadata.is_file() {
            continue;
        }
        let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);

        let is_newer = match &newest {
            None => true,
            Some((best_time, best_name, _)) => {
                (modified, &name) > (*best_time, best_name)
            }
        };
        if is_newer {
            newest = Some((modified, name, entry.path()));
        }
    }

    Ok(newest.map(|(_, _, path)| path))
}

/// Rename, falling back to copy + remove when the paths are on different filesystems.
async fn move_file(from: &Path, to: &Path) -> Result<(), AppError> {
    if tokio::fs::rename(from, to).await.is_ok() {
        return Ok(());
    }
    tokio::fs::copy(from, to).await?;
    tokio::fs::remove_file(from).await?;
    Ok(())
}
