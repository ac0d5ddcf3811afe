//! Test utilities: scripted browser driver and recording reporter.
//!
//! Handwritten mocks for dependency injection in unit tests.
//! All mocks use `Arc<Mutex<_>>` for interior mutability, allowing
//! test assertions on recorded calls.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use url::Url;

use crate::config::SessionConfig;
use crate::error::AppError;
use crate::job::SelectorSpec;
use crate::traits::{BrowserDriver, BrowserSession};
use crate::worker::{WorkerEvent, WorkerReporter};

// ---------------------------------------------------------------------------
// Script
// ---------------------------------------------------------------------------

/// What a mock session does for a given URL.
#[derive(Debug, Clone)]
pub enum Script {
    /// Click succeeds and a file lands in the download dir shortly after.
    Download { file_name: String, contents: String },
    /// Click succeeds but nothing is downloaded.
    Click,
    NavigationTimeout,
    ElementNotFound,
    /// Click fails with a non-recoverable driver error.
    ClickError,
    /// Navigation never completes.
    Hang,
}

impl Script {
    pub fn download(file_name: &str, contents: &str) -> Self {
        Script::Download {
            file_name: file_name.to_string(),
            contents: contents.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// MockDriver
// ---------------------------------------------------------------------------

#[derive(Default)]
struct DriverLog {
    opened: usize,
    closed: usize,
    dropped: usize,
    selectors: Vec<SelectorSpec>,
    active_dirs: HashSet<PathBuf>,
    max_active: usize,
    /// Times a session opened on a download dir another live session was using.
    shared_dir_opens: usize,
}

/// Mock driver that plays back a [`Script`] per URL.
///
/// Unscripted URLs behave like [`Script::Click`].
#[derive(Clone, Default)]
pub struct MockDriver {
    scripts: Arc<Mutex<HashMap<String, Script>>>,
    fail_start: bool,
    log: Arc<Mutex<DriverLog>>,
}

impl MockDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Driver whose sessions never start.
    pub fn failing_start() -> Self {
        Self {
            fail_start: true,
            ..Self::default()
        }
    }

    pub fn script(self, url: &str, script: Script) -> Self {
        self.scripts.lock().unwrap().insert(url.to_string(), script);
        self
    }

    pub fn sessions_opened(&self) -> usize {
        self.log.lock().unwrap().opened
    }

    pub fn sessions_closed(&self) -> usize {
        self.log.lock().unwrap().closed
    }

    /// Sessions released by drop without `close` being called.
    pub fn sessions_dropped(&self) -> usize {
        self.log.lock().unwrap().dropped
    }

    pub fn selectors_seen(&self) -> Vec<SelectorSpec> {
        self.log.lock().unwrap().selectors.clone()
    }

    pub fn max_concurrent_sessions(&self) -> usize {
        self.log.lock().unwrap().max_active
    }

    pub fn shared_dir_opens(&self) -> usize {
        self.log.lock().unwrap().shared_dir_opens
    }
}

impl BrowserDriver for MockDriver {
    type Session = MockSession;

    async fn open_session(&self, config: &SessionConfig) -> Result<MockSession, AppError> {
        if self.fail_start {
            return Err(AppError::SessionStart("no browser binary found".into()));
        }

        let mut log = self.log.lock().unwrap();
        log.opened += 1;
        if !log.active_dirs.insert(config.download_dir.clone()) {
            log.shared_dir_opens += 1;
        }
        log.max_active = log.max_active.max(log.active_dirs.len());
        drop(log);

        Ok(MockSession {
            scripts: Arc::clone(&self.scripts),
            log: Arc::clone(&self.log),
            download_dir: config.download_dir.clone(),
            script: None,
            closed: false,
        })
    }
}

// ---------------------------------------------------------------------------
// MockSession
// ---------------------------------------------------------------------------

pub struct MockSession {
    scripts: Arc<Mutex<HashMap<String, Script>>>,
    log: Arc<Mutex<DriverLog>>,
    download_dir: PathBuf,
    script: Option<Script>,
    closed: bool,
}

impl MockSession {
    /// Standalone session that plays `script` regardless of URL.
    pub fn scripted(script: Script) -> Self {
        Self {
            scripts: Arc::new(Mutex::new(HashMap::new())),
            log: Arc::new(Mutex::new(DriverLog::default())),
            download_dir: std::env::temp_dir(),
            script: Some(script),
            closed: false,
        }
    }

    fn release(&self) {
        let mut log = self.log.lock().unwrap();
        log.active_dirs.remove(&self.download_dir);
    }
}

impl BrowserSession for MockSession {
    type Element = String;

    async fn navigate(&mut self, url: &Url, timeout: Duration) -> Result<(), AppError> {
        if self.script.is_none() {
            let scripted = self.scripts.lock().unwrap().get(url.as_str()).cloned();
            self.script = Some(scripted.unwrap_or(Script::Click));
        }
        match self.script {
            Some(Script::NavigationTimeout) => Err(AppError::NavigationTimeout {
                url: url.to_string(),
                secs: timeout.as_secs(),
            }),
            Some(Script::Hang) => std::future::pending().await,
            _ => Ok(()),
        }
    }

    async fn locate_element(&mut self, selector: &SelectorSpec) -> Result<String, AppError> {
        self.log.lock().unwrap().selectors.push(selector.clone());
        match self.script {
            Some(Script::ElementNotFound) => Err(AppError::ElementNotFound(selector.to_string())),
            _ => Ok(selector.value().to_string()),
        }
    }

    async fn click(&mut self, _element: &String) -> Result<(), AppError> {
        match &self.script {
            Some(Script::ClickError) => Err(AppError::Driver("target crashed".into())),
            Some(Script::Download {
                file_name,
                contents,
            }) => {
                // Written out of band, the way a browser finishes a download
                // after the click has returned.
                let partial = self.download_dir.join(format!("{file_name}.crdownload"));
                let done = self.download_dir.join(file_name);
                let contents = contents.clone();
                tokio::spawn(async move {
                    tokio::fs::write(&partial, contents).await.unwrap();
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    tokio::fs::rename(&partial, &done).await.unwrap();
                });
                Ok(())
            }
            _ => Ok(()),
        }
    }

    async fn close(mut self) -> Result<(), AppError> {
        self.closed = true;
        self.release();
        self.log.lock().unwrap().closed += 1;
        Ok(())
    }
}

impl Drop for MockSession {
    fn drop(&mut self) {
        if !self.closed {
            self.release();
            self.log.lock().unwrap().dropped += 1;
        }
    }
}

// ---------------------------------------------------------------------------
// MockReporter
// ---------------------------------------------------------------------------

/// Mock worker reporter that records events.
#[derive(Default)]
pub struct MockReporter {
    pub events: Arc<Mutex<Vec<String>>>,
}

impl MockReporter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl WorkerReporter for MockReporter {
    fn report(&self, event: WorkerEvent<'_>) {
        let label = match &event {
            WorkerEvent::Started { .. } => "Started",
            WorkerEvent::JobClaimed { .. } => "JobClaimed",
            WorkerEvent::JobFinished { .. } => "JobFinished",
            WorkerEvent::Crashed { .. } => "Crashed",
            WorkerEvent::Stopped { .. } => "Stopped",
        };
        self.events.lock().unwrap().push(label.to_string());
    }
}
