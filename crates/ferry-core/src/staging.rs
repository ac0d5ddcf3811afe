//! Per-worker download directories.
//!
//! Every worker gets its own staging directory, used as the browser's download
//! sink. Two downloads running at the same time can then never collide on a
//! file name, and the relocator only ever has to look at files written by the
//! one session its worker is running.
//!
//! ```text
//! <staging_root>/
//!   worker-0/          download sink for worker 0
//!   worker-0.profile/  browser profile for worker 0
//!   worker-1/
//!   worker-1.profile/
//! ```

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::error::AppError;
use crate::job::WorkerId;

/// A directory owned by exactly one worker for the lifetime of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingArea {
    worker_id: WorkerId,
    path: PathBuf,
    profile_dir: PathBuf,
}

impl StagingArea {
    pub fn worker_id(&self) -> WorkerId {
        self.worker_id
    }

    /// Download sink handed to the browser.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Browser profile directory, kept outside the download sink.
    pub fn profile_dir(&self) -> &Path {
        &self.profile_dir
    }
}

/// Table of staging areas indexed by [`WorkerId`].
///
/// Slots are filled lazily: a worker's directory is only created when it
/// first asks for it.
#[derive(Debug)]
pub struct StagingAreas {
    root: PathBuf,
    slots: Vec<OnceLock<StagingArea>>,
}

impl StagingAreas {
    pub fn new(root: impl Into<PathBuf>, workers: usize) -> Self {
        Self {
            root: root.into(),
            slots: (0..workers).map(|_| OnceLock::new()).collect(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where a worker's area lives. Distinct ids always map to distinct paths.
    pub fn path_for(&self, worker_id: WorkerId) -> PathBuf {
        self.root.join(worker_id.to_string())
    }

    /// Return the worker's staging area, creating its directories on first use.
    ///
    /// Existing directories are reused.
    pub fn get_or_create_area(&self, worker_id: WorkerId) -> Result<&StagingArea, AppError> {
        let slot = self.slots.get(worker_id.index()).ok_or_else(|| {
            AppError::Config(format!(
                "{worker_id} has no staging slot (pool has {} workers)",
                self.slots.len()
            ))
        })?;

        if let Some(area) = slot.get() {
            return Ok(area);
        }

        let path = self.path_for(worker_id);
        let profile_dir = self.root.join(format!("{worker_id}.profile"));
        std::fs::create_dir_all(&path)?;
        std::fs::create_dir_all(&profile_dir)?;
        tracing::debug!(%worker_id, path = %path.display(), "Staging area ready");

        let area = StagingArea {
            worker_id,
            path,
            profile_dir,
        };
        Ok(slot.get_or_init(|| area))
    }
}

/// Create the shared output directory. Safe to call from several workers at once.
pub fn ensure_output_dir(path: &Path) -> Result<(), AppError> {
    std::fs::create_dir_all(path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;

    use super::*;

    #[test]
    fn test_areas_are_unique_per_worker() {
        let tmp = tempfile::tempdir().unwrap();
        let areas = StagingAreas::new(tmp.path(), 16);

        let paths: HashSet<PathBuf> = (0..16)
            .map(|i| areas.get_or_create_area(WorkerId(i)).unwrap().path().to_path_buf())
            .collect();
        assert_eq!(paths.len(), 16);

        let profiles: HashSet<PathBuf> = (0..16)
            .map(|i| areas.get_or_create_area(WorkerId(i)).unwrap().profile_dir().to_path_buf())
            .collect();
        assert!(paths.is_disjoint(&profiles));
    }

    #[test]
    fn test_area_creation_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let areas = StagingAreas::new(tmp.path(), 1);

        let first = areas.get_or_create_area(WorkerId(0)).unwrap().clone();
        std::fs::write(first.path().join("leftover.csv"), "x").unwrap();

        let second = areas.get_or_create_area(WorkerId(0)).unwrap();
        assert_eq!(&first, second);
        assert!(second.path().join("leftover.csv").exists());

        // A fresh table over the same root reuses the existing directory too.
        let reopened = StagingAreas::new(tmp.path(), 1);
        let again = reopened.get_or_create_area(WorkerId(0)).unwrap();
        assert_eq!(again.path(), first.path());
        assert!(again.path().join("leftover.csv").exists());
    }

    #[test]
    fn test_unknown_worker_is_config_error() {
        let tmp = tempfile::tempdir().unwrap();
        let areas = StagingAreas::new(tmp.path(), 2);
        let err = areas.get_or_create_area(WorkerId(2)).unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[test]
    fn test_area_layout() {
        let areas = StagingAreas::new("/tmp/ferry", 3);
        assert_eq!(areas.path_for(WorkerId(2)), PathBuf::from("/tmp/ferry/worker-2"));
    }

    #[test]
    fn test_output_dir_created_twice() {
        let tmp = tempfile::tempdir().unwrap();
        let out = tmp.path().join("data");
        ensure_output_dir(&out).unwrap();
        ensure_output_dir(&out).unwrap();
        assert!(out.is_dir());
    }

    #[test]
    fn test_output_dir_concurrent_creation() {
        let tmp = tempfile::tempdir().unwrap();
        let out = Arc::new(tmp.path().join("nested").join("data"));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let out = Arc::clone(&out);
                std::thread::spawn(move || ensure_output_dir(&out))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap().unwrap();
        }

        assert!(out.is_dir());
        let entries = std::fs::read_dir(tmp.path().join("nested")).unwrap().count();
        assert_eq!(entries, 1);
    }
}
