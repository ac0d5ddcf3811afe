//! Worker pool controller.
//!
//! Fills the queue, spawns a fixed number of [`WorkerService`]s on a
//! [`JoinSet`], and waits on the queue's join barrier. Workers are never
//! re-spawned: one that dies on a fatal error simply stops taking jobs, and
//! the others keep draining the queue. If every worker dies, whatever is
//! still queued is reported as undelivered instead of blocking forever.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::config::RunSettings;
use crate::error::AppError;
use crate::job::{Job, WorkerId};
use crate::job_queue::JobQueue;
use crate::staging::{StagingAreas, ensure_output_dir};
use crate::traits::BrowserDriver;
use crate::worker::{WorkerReporter, WorkerService, WorkerStats};

/// End-of-run totals.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub loaded: usize,
    pub downloaded: usize,
    pub no_file: usize,
    pub navigation_timeouts: usize,
    pub elements_not_found: usize,
    pub hung: usize,
    pub relocation_failed: usize,
    /// Workers that stopped on an unrecoverable error.
    pub failed_workers: usize,
    /// Jobs never handed to a worker (all workers died, or the run was cancelled).
    pub undelivered: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub workers: Vec<WorkerStats>,
}

impl RunSummary {
    fn new(loaded: usize, started_at: DateTime<Utc>) -> Self {
        Self {
            loaded,
            downloaded: 0,
            no_file: 0,
            navigation_timeouts: 0,
            elements_not_found: 0,
            hung: 0,
            relocation_failed: 0,
            failed_workers: 0,
            undelivered: 0,
            started_at,
            finished_at: started_at,
            workers: Vec::new(),
        }
    }

    fn absorb(&mut self, stats: WorkerStats) {
        self.downloaded += stats.downloaded;
        self.no_file += stats.no_file;
        self.navigation_timeouts += stats.navigation_timeouts;
        self.elements_not_found += stats.elements_not_found;
        self.hung += stats.hung;
        self.relocation_failed += stats.relocation_failed;
        if stats.fatal_error.is_some() {
            self.failed_workers += 1;
        }
        self.workers.push(stats);
    }

    /// Jobs that did not end with a file in the output directory.
    pub fn failed(&self) -> usize {
        self.loaded - self.downloaded
    }
}

/// Spawns and joins the workers for one run.
pub struct WorkerPool<Q, D, R>
where
    Q: JobQueue,
    D: BrowserDriver,
    R: WorkerReporter + 'static,
{
    queue: Q,
    driver: D,
    reporter: Arc<R>,
    settings: Arc<RunSettings>,
}

impl<Q, D, R> WorkerPool<Q, D, R>
where
    Q: JobQueue,
    D: BrowserDriver,
    R: WorkerReporter + 'static,
{
    pub fn new(queue: Q, driver: D, reporter: R, settings: RunSettings) -> Self {
        Self {
            queue,
            driver,
            reporter: Arc::new(reporter),
            settings: Arc::new(settings),
        }
    }

    pub fn settings(&self) -> &RunSettings {
        &self.settings
    }

    /// Enqueue `jobs`, run them to completion, and return the totals.
    ///
    /// Errors only for problems found before any worker starts.
    pub async fn run(
        &self,
        jobs: Vec<Job>,
        cancel_token: CancellationToken,
    ) -> Result<RunSummary, AppError> {
        self.settings.validate()?;
        ensure_output_dir(&self.settings.output.dir)?;

        let mut summary = RunSummary::new(jobs.len(), Utc::now());
        for job in jobs {
            self.queue.enqueue(job);
        }
        tracing::info!(queued = self.queue.pending(), "Queue ready");

        let workers = self.settings.workers.min(summary.loaded).max(1);
        let staging = Arc::new(StagingAreas::new(&self.settings.staging_root, workers));

        let mut set = JoinSet::new();
        for index in 0..workers {
            let worker = WorkerService::new(
                WorkerId(index),
                self.queue.clone(),
                self.driver.clone(),
                Arc::clone(&staging),
                Arc::clone(&self.settings),
            );
            let reporter = Arc::clone(&self.reporter);
            let token = cancel_token.clone();
            set.spawn(async move { worker.run(token, reporter.as_ref()).await });
        }
        tracing::info!(workers, "Workers started");

        let mut finished = Vec::with_capacity(workers);
        tokio::select! {
            () = self.queue.wait_until_drained() => {}
            () = join_all(&mut set, &mut finished) => {}
        }
        join_all(&mut set, &mut finished).await;

        for stats in finished {
            summary.absorb(stats);
        }
        summary.workers.sort_by_key(|s| s.worker_id);

        // Anything still queued was never picked up.
        while self.queue.dequeue().is_some() {
            summary.undelivered += 1;
            self.queue.mark_done();
        }
        if summary.undelivered > 0 {
            tracing::warn!(
                undelivered = summary.undelivered,
                "Jobs left in the queue with no worker to run them"
            );
        }

        summary.finished_at = Utc::now();
        Ok(summary)
    }
}

/// Join every remaining worker. A panicked worker is logged and counted as failed.
async fn join_all(set: &mut JoinSet<WorkerStats>, finished: &mut Vec<WorkerStats>) {
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(stats) => finished.push(stats),
            Err(e) => {
                tracing::error!(error = %e, "Worker task panicked");
                finished.push(WorkerStats {
                    worker_id: usize::MAX,
                    fatal_error: Some(e.to_string()),
                    ..WorkerStats::default()
                });
            }
        }
    }
}
