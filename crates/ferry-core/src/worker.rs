use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::config::RunSettings;
use crate::error::AppError;
use crate::job::{Job, SelectorSpec, WorkerId};
use crate::job_queue::{DoneGuard, JobQueue};
use crate::relocate::{DirSnapshot, Relocation};
use crate::staging::{StagingArea, StagingAreas};
use crate::traits::{BrowserDriver, BrowserSession};

/// Result of the navigate → locate → click step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    Success,
    NavigationTimeout(String),
    ElementNotFound(String),
}

/// Final state of one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Downloaded(PathBuf),
    NoFileProduced,
    NavigationTimeout(String),
    ElementNotFound(String),
    /// The session ran past the hard job timeout and was torn down.
    Hung(Duration),
    RelocationFailed(String),
}

/// Per-worker tallies, folded into the run summary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WorkerStats {
    pub worker_id: usize,
    pub downloaded: usize,
    pub no_file: usize,
    pub navigation_timeouts: usize,
    pub elements_not_found: usize,
    pub hung: usize,
    pub relocation_failed: usize,
    /// Set when the worker stopped early on an unrecoverable error.
    pub fatal_error: Option<String>,
}

impl WorkerStats {
    fn new(worker_id: WorkerId) -> Self {
        Self {
            worker_id: worker_id.index(),
            ..Self::default()
        }
    }

    pub fn record(&mut self, outcome: &JobOutcome) {
        match outcome {
            JobOutcome::Downloaded(_) => self.downloaded += 1,
            JobOutcome::NoFileProduced => self.no_file += 1,
            JobOutcome::NavigationTimeout(_) => self.navigation_timeouts += 1,
            JobOutcome::ElementNotFound(_) => self.elements_not_found += 1,
            JobOutcome::Hung(_) => self.hung += 1,
            JobOutcome::RelocationFailed(_) => self.relocation_failed += 1,
        }
    }

    pub fn jobs_handled(&self) -> usize {
        self.downloaded
            + self.no_file
            + self.navigation_timeouts
            + self.elements_not_found
            + self.hung
            + self.relocation_failed
    }
}

/// Events emitted by the worker for monitoring/logging.
#[derive(Debug, Clone)]
pub enum WorkerEvent<'a> {
    Started {
        worker_id: WorkerId,
    },
    JobClaimed {
        worker_id: WorkerId,
        job: &'a Job,
    },
    JobFinished {
        worker_id: WorkerId,
        job: &'a Job,
        outcome: &'a JobOutcome,
    },
    Crashed {
        worker_id: WorkerId,
        error: &'a AppError,
    },
    Stopped {
        worker_id: WorkerId,
        stats: &'a WorkerStats,
    },
}

/// Trait for receiving worker events (decoupled logging).
pub trait WorkerReporter: Send + Sync {
    fn report(&self, event: WorkerEvent<'_>) {
        let _ = event;
    }
}

/// Reporter that uses the `tracing` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingWorkerReporter;

impl WorkerReporter for TracingWorkerReporter {
    fn report(&self, event: WorkerEvent<'_>) {
        match event {
            WorkerEvent::Started { worker_id } => {
                tracing::debug!(%worker_id, "Worker started");
            }
            WorkerEvent::JobClaimed { worker_id, job } => {
                tracing::info!(%worker_id, row = job.row(), url = %job.locator(), "Job claimed");
            }
            WorkerEvent::JobFinished {
                worker_id,
                job,
                outcome,
            } => match outcome {
                JobOutcome::Downloaded(path) => {
                    tracing::info!(%worker_id, output = %path.display(), "Downloaded");
                }
                JobOutcome::NoFileProduced => {
                    tracing::warn!(%worker_id, url = %job.locator(), "No file produced");
                }
                JobOutcome::NavigationTimeout(error)
                | JobOutcome::ElementNotFound(error)
                | JobOutcome::RelocationFailed(error) => {
                    tracing::warn!(%worker_id, row = job.row(), url = %job.locator(), %error, "Job failed");
                }
                JobOutcome::Hung(after) => {
                    tracing::warn!(
                        %worker_id,
                        url = %job.locator(),
                        after_secs = after.as_secs(),
                        "Session hung; browser killed"
                    );
                }
            },
            WorkerEvent::Crashed { worker_id, error } => {
                tracing::error!(%worker_id, %error, "Worker stopped on unrecoverable error");
            }
            WorkerEvent::Stopped { worker_id, stats } => {
                tracing::debug!(%worker_id, jobs = stats.jobs_handled(), "Worker stopped");
            }
        }
    }
}

/// Run navigate → locate → click on an open session.
///
/// Page-load timeouts and selector misses become [`SessionOutcome`] variants;
/// every other error is returned as is.
pub async fn drive_session<S: BrowserSession>(
    session: &mut S,
    url: &url::Url,
    selector: &SelectorSpec,
    page_load_timeout: Duration,
) -> Result<SessionOutcome, AppError> {
    let clicked = async {
        session.navigate(url, page_load_timeout).await?;
        let element = session.locate_element(selector).await?;
        session.click(&element).await
    }
    .await;

    match clicked {
        Ok(()) => Ok(SessionOutcome::Success),
        Err(e @ AppError::NavigationTimeout { .. }) => {
            Ok(SessionOutcome::NavigationTimeout(e.to_string()))
        }
        Err(e @ AppError::ElementNotFound(_)) => Ok(SessionOutcome::ElementNotFound(e.to_string())),
        Err(e) => Err(e),
    }
}

/// One member of the pool: pulls jobs until the queue is empty.
pub struct WorkerService<Q, D>
where
    Q: JobQueue,
    D: BrowserDriver,
{
    id: WorkerId,
    queue: Q,
    driver: D,
    staging: Arc<StagingAreas>,
    settings: Arc<RunSettings>,
}

impl<Q, D> WorkerService<Q, D>
where
    Q: JobQueue,
    D: BrowserDriver,
{
    pub fn new(
        id: WorkerId,
        queue: Q,
        driver: D,
        staging: Arc<StagingAreas>,
        settings: Arc<RunSettings>,
    ) -> Self {
        Self {
            id,
            queue,
            driver,
            staging,
            settings,
        }
    }

    /// Run the worker loop until the queue is empty or `cancel_token` fires.
    ///
    /// Never returns an error: a fatal error ends the loop and is recorded in
    /// [`WorkerStats::fatal_error`].
    pub async fn run<WR: WorkerReporter>(
        &self,
        cancel_token: CancellationToken,
        reporter: &WR,
    ) -> WorkerStats {
        reporter.report(WorkerEvent::Started { worker_id: self.id });

        let mut stats = WorkerStats::new(self.id);
        if let Err(error) = self.run_loop(&cancel_token, reporter, &mut stats).await {
            reporter.report(WorkerEvent::Crashed {
                worker_id: self.id,
                error: &error,
            });
            stats.fatal_error = Some(error.to_string());
        }

        reporter.report(WorkerEvent::Stopped {
            worker_id: self.id,
            stats: &stats,
        });
        stats
    }

    async fn run_loop<WR: WorkerReporter>(
        &self,
        cancel_token: &CancellationToken,
        reporter: &WR,
        stats: &mut WorkerStats,
    ) -> Result<(), AppError> {
        loop {
            if cancel_token.is_cancelled() {
                break;
            }
            let Some(job) = self.queue.dequeue() else {
                break;
            };
            // Dropped at the end of the iteration, on every path.
            let _done = DoneGuard::new(&self.queue);

            reporter.report(WorkerEvent::JobClaimed {
                worker_id: self.id,
                job: &job,
            });

            let area = self.staging.get_or_create_area(self.id)?;
            let outcome = self.process_job(&job, area).await?;

            stats.record(&outcome);
            reporter.report(WorkerEvent::JobFinished {
                worker_id: self.id,
                job: &job,
                outcome: &outcome,
            });
        }
        Ok(())
    }

    /// Run one job under the hard job timeout.
    async fn process_job(&self, job: &Job, area: &StagingArea) -> Result<JobOutcome, AppError> {
        let before = DirSnapshot::capture(area.path()).await?;
        let limit = self.settings.timeouts.job;

        match tokio::time::timeout(limit, self.run_session(job, area, &before)).await {
            Ok(result) => result,
            // The session future has been dropped, which tears the browser down.
            Err(_) => Ok(JobOutcome::Hung(limit)),
        }
    }

    async fn run_session(
        &self,
        job: &Job,
        area: &StagingArea,
        before: &DirSnapshot,
    ) -> Result<JobOutcome, AppError> {
        let settings = &self.settings;
        let config = settings
            .browser
            .session_config(area, settings.timeouts.page_load);

        let mut session = self.driver.open_session(&config).await?;

        let result = match drive_session(
            &mut session,
            job.locator(),
            &settings.selector,
            settings.timeouts.page_load,
        )
        .await
        {
            // Collected while the browser is still open: closing it would
            // cancel a download that is still being written.
            Ok(SessionOutcome::Success) => {
                let final_path = settings.output.path_for(job.output_name());
                Ok(self.collect_download(area, before, &final_path).await)
            }
            Ok(SessionOutcome::NavigationTimeout(msg)) => Ok(JobOutcome::NavigationTimeout(msg)),
            Ok(SessionOutcome::ElementNotFound(msg)) => Ok(JobOutcome::ElementNotFound(msg)),
            Err(e) => Err(e),
        };

        if let Err(e) = session.close().await {
            tracing::warn!(worker_id = %self.id, error = %e, "Failed to close browser session");
        }

        result
    }

    async fn collect_download(
        &self,
        area: &StagingArea,
        before: &DirSnapshot,
        final_path: &Path,
    ) -> JobOutcome {
        match self.settings.relocator().relocate(area, before, final_path).await {
            Ok(Relocation::Moved { to, .. }) => JobOutcome::Downloaded(to),
            Ok(Relocation::NoFileProduced) => JobOutcome::NoFileProduced,
            Err(e) => JobOutcome::RelocationFailed(e.to_string()),
        }
    }
}
