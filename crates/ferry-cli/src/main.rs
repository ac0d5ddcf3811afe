mod input;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{ArgGroup, Parser};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use ferry_client::ChromeDriver;
use ferry_core::config::{BrowserOptions, DEFAULT_USER_AGENT, OutputLayout, Timeouts};
use ferry_core::{
    MemoryJobQueue, RunSettings, RunSummary, SelectorSpec, TracingWorkerReporter, WorkerPool,
};

use crate::input::Columns;

#[derive(Parser)]
#[command(
    name = "ferry",
    version,
    about = "Click-to-download runner: opens each page in a headless browser, clicks the download trigger, and files the result"
)]
#[command(group(
    ArgGroup::new("selector")
        .required(true)
        .args(["name", "xpath", "id", "tag", "class_name", "css_selector"]),
))]
struct Cli {
    /// CSV file listing the pages to visit
    csv_path: PathBuf,

    /// Locate the download trigger by its name attribute
    #[arg(short, long)]
    name: Option<String>,

    /// Locate the download trigger by XPath
    #[arg(short = 'x', long)]
    xpath: Option<String>,

    /// Locate the download trigger by its id attribute
    #[arg(short, long)]
    id: Option<String>,

    /// Locate the download trigger by tag name
    #[arg(short, long)]
    tag: Option<String>,

    /// Locate the download trigger by class name
    #[arg(short, long)]
    class_name: Option<String>,

    /// Locate the download trigger by CSS selector
    #[arg(short = 's', long)]
    css_selector: Option<String>,

    /// Number of concurrent workers
    #[arg(short = 'm', long = "threads", env = "FERRY_THREADS", default_value_t = 10)]
    threads: usize,

    /// Directory receiving the downloaded files
    #[arg(short, long, env = "FERRY_OUTPUT_DIR", default_value = "data")]
    output_dir: PathBuf,

    /// Root of the per-worker download directories
    #[arg(long, env = "FERRY_STAGING_DIR", default_value = ".ferry-staging")]
    staging_dir: PathBuf,

    /// Extension given to every output file
    #[arg(long, default_value = "csv")]
    extension: String,

    /// Column holding the page URL
    #[arg(long, default_value = "url")]
    url_column: String,

    /// Column holding the output file name
    #[arg(long, default_value = "file_name")]
    name_column: String,

    /// Seconds to wait for a page to load
    #[arg(long, default_value_t = 10)]
    page_load_timeout: u64,

    /// Milliseconds to wait after the click before looking for the download
    #[arg(long, default_value_t = 1000)]
    settle_ms: u64,

    /// Seconds to keep polling for the download after settling
    #[arg(long, default_value_t = 10)]
    download_timeout: u64,

    /// Hard limit in seconds on one job; the browser is killed when it expires
    #[arg(long, default_value_t = 120)]
    job_timeout: u64,

    /// Show the browser window instead of running headless
    #[arg(long, default_value_t = false)]
    headful: bool,

    /// User agent sent by the browser
    #[arg(long, default_value = DEFAULT_USER_AGENT)]
    user_agent: String,

    /// Chrome/Chromium executable (searched for when omitted)
    #[arg(long, env = "CHROME_BIN")]
    chrome: Option<PathBuf>,

    /// Write the run summary as JSON to this path
    #[arg(long)]
    report: Option<PathBuf>,
}

impl Cli {
    fn selector(&self) -> Result<SelectorSpec> {
        let chosen = [
            ("name", &self.name),
            ("xpath", &self.xpath),
            ("id", &self.id),
            ("tag", &self.tag),
            ("class", &self.class_name),
            ("css", &self.css_selector),
        ]
        .into_iter()
        .find_map(|(strategy, value)| value.as_ref().map(|v| (strategy, v.clone())));

        let (strategy, value) = chosen.context("Please specify the type of element")?;
        Ok(SelectorSpec::new(strategy, value)?)
    }

    fn settings(&self) -> Result<RunSettings> {
        let settings = RunSettings {
            selector: self.selector()?,
            browser: BrowserOptions {
                headless: !self.headful,
                user_agent: self.user_agent.clone(),
                executable: ChromeDriver::locate_browser(self.chrome.as_deref())?,
                ..BrowserOptions::default()
            },
            output: OutputLayout {
                dir: self.output_dir.clone(),
                extension: self.extension.clone(),
            },
            staging_root: self.staging_dir.clone(),
            workers: self.threads,
            timeouts: Timeouts {
                page_load: Duration::from_secs(self.page_load_timeout),
                settle: Duration::from_millis(self.settle_ms),
                download: Duration::from_secs(self.download_timeout),
                job: Duration::from_secs(self.job_timeout),
            },
        };
        settings.validate()?;
        Ok(settings)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Setup tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("ferry=info".parse()?))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = cli.settings()?;

    let columns = Columns {
        url: cli.url_column.clone(),
        name: cli.name_column.clone(),
    };
    let jobs = input::load_jobs(&cli.csv_path, &columns)?;
    tracing::info!("{} websites are loaded", jobs.len());

    match &settings.browser.executable {
        Some(bin) => tracing::info!("Using Chrome binary: {}", bin.display()),
        None => tracing::info!("No Chrome binary configured; relying on chromiumoxide lookup"),
    }
    tracing::info!(selector = %settings.selector, workers = settings.workers, "Starting run");

    let cancel_token = CancellationToken::new();
    tokio::spawn(shutdown_signal(cancel_token.clone()));

    let pool = WorkerPool::new(
        MemoryJobQueue::new(),
        ChromeDriver::new(),
        TracingWorkerReporter,
        settings,
    );
    let summary = pool.run(jobs, cancel_token).await?;

    log_summary(&summary);
    if let Some(path) = &cli.report {
        write_report(path, &summary)?;
    }

    if summary.failed_workers > 0 {
        anyhow::bail!(
            "{} worker(s) stopped on unrecoverable errors",
            summary.failed_workers
        );
    }
    Ok(())
}

/// Stop handing out jobs on Ctrl-C; jobs already running finish normally.
async fn shutdown_signal(cancel_token: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to install CTRL+C handler");
        return;
    }
    tracing::info!("Shutdown signal received; finishing in-flight jobs");
    cancel_token.cancel();
}

fn log_summary(summary: &RunSummary) {
    let elapsed = summary.finished_at - summary.started_at;
    tracing::info!(
        loaded = summary.loaded,
        downloaded = summary.downloaded,
        no_file = summary.no_file,
        navigation_timeouts = summary.navigation_timeouts,
        elements_not_found = summary.elements_not_found,
        hung = summary.hung,
        relocation_failed = summary.relocation_failed,
        undelivered = summary.undelivered,
        elapsed_secs = elapsed.num_seconds(),
        "Run finished"
    );
}

fn write_report(path: &Path, summary: &RunSummary) -> Result<()> {
    let json = serde_json::to_string_pretty(summary)?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write report: {}", path.display()))?;
    tracing::info!(report = %path.display(), "Report written");
    Ok(())
}
