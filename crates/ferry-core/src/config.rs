use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::AppError;
use crate::job::SelectorSpec;
use crate::relocate::Relocator;
use crate::staging::StagingArea;

/// Desktop Chrome user agent sent by every session unless overridden.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/70.0.3538.77 Safari/537.36";

/// Launch options for one browser session, pointed at one staging area.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub download_dir: PathBuf,
    pub headless: bool,
    pub user_agent: String,
    pub profile_dir: Option<PathBuf>,
    pub window_size: (u32, u32),
    pub executable: Option<PathBuf>,
    pub page_load_timeout: Duration,
}

impl SessionConfig {
    pub fn configure(download_dir: &Path, headless: bool, user_agent: &str) -> Self {
        Self {
            download_dir: download_dir.to_path_buf(),
            headless,
            user_agent: user_agent.to_string(),
            profile_dir: None,
            window_size: (1920, 1080),
            executable: None,
            page_load_timeout: Duration::from_secs(10),
        }
    }
}

/// Browser settings shared by every worker.
#[derive(Debug, Clone)]
pub struct BrowserOptions {
    pub headless: bool,
    pub user_agent: String,
    pub window_size: (u32, u32),
    /// Explicit browser binary; `None` lets the driver search for one.
    pub executable: Option<PathBuf>,
}

impl Default for BrowserOptions {
    fn default() -> Self {
        Self {
            headless: true,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            window_size: (1920, 1080),
            executable: None,
        }
    }
}

impl BrowserOptions {
    /// Session options for a worker, downloading into its staging area.
    pub fn session_config(&self, area: &StagingArea, page_load_timeout: Duration) -> SessionConfig {
        let mut config = SessionConfig::configure(area.path(), self.headless, &self.user_agent);
        config.profile_dir = Some(area.profile_dir().to_path_buf());
        config.window_size = self.window_size;
        config.executable = self.executable.clone();
        config.page_load_timeout = page_load_timeout;
        config
    }
}

/// Where finished downloads go and how they are named.
#[derive(Debug, Clone)]
pub struct OutputLayout {
    pub dir: PathBuf,
    pub extension: String,
}

impl Default for OutputLayout {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("data"),
            extension: "csv".to_string(),
        }
    }
}

impl OutputLayout {
    /// `<dir>/<output_name>.<extension>`
    pub fn path_for(&self, output_name: &str) -> PathBuf {
        let extension = self.extension.trim_start_matches('.');
        if extension.is_empty() {
            self.dir.join(output_name)
        } else {
            self.dir.join(format!("{output_name}.{extension}"))
        }
    }
}

/// Per-job time limits.
#[derive(Debug, Clone)]
pub struct Timeouts {
    /// Limit on a single page load.
    pub page_load: Duration,
    /// Wait after the click before looking for the download.
    pub settle: Duration,
    /// Further polling for the download after settling.
    pub download: Duration,
    /// Hard cap on a whole session, from launch to close.
    pub job: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            page_load: Duration::from_secs(10),
            settle: Duration::from_secs(1),
            download: Duration::from_secs(10),
            job: Duration::from_secs(120),
        }
    }
}

/// Immutable run configuration, built once and shared by all workers.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub selector: SelectorSpec,
    pub browser: BrowserOptions,
    pub output: OutputLayout,
    pub staging_root: PathBuf,
    pub workers: usize,
    pub timeouts: Timeouts,
}

impl RunSettings {
    pub fn new(selector: SelectorSpec) -> Self {
        Self {
            selector,
            browser: BrowserOptions::default(),
            output: OutputLayout::default(),
            staging_root: PathBuf::from(".ferry-staging"),
            workers: 10,
            timeouts: Timeouts::default(),
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output.dir = dir.into();
        self
    }

    pub fn with_staging_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.staging_root = root.into();
        self
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Reject settings that would make the pool misbehave.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.workers == 0 {
            return Err(AppError::Config("thread count must be at least 1".into()));
        }
        if self.timeouts.page_load.is_zero() {
            return Err(AppError::Config("page load timeout must be positive".into()));
        }
        if self.timeouts.job < self.timeouts.page_load {
            return Err(AppError::Config(format!(
                "job timeout ({}s) must not be shorter than the page load timeout ({}s)",
                self.timeouts.job.as_secs(),
                self.timeouts.page_load.as_secs()
            )));
        }
        if self.output.extension.contains(['/', '\\']) {
            return Err(AppError::Config(format!(
                "invalid output extension '{}'",
                self.output.extension
            )));
        }
        Ok(())
    }

    pub fn relocator(&self) -> Relocator {
        Relocator {
            settle_delay: self.timeouts.settle,
            download_timeout: self.timeouts.download,
            ..Relocator::default()
        }
    }
}
