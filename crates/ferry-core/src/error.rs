use thiserror::Error;

/// Application-wide error types for ferry.
#[derive(Error, Debug)]
pub enum AppError {
    /// Invalid run configuration (pool size, staging table, selector).
    #[error("Configuration error: {0}")]
    Config(String),

    /// A job row could not be turned into a [`crate::job::Job`].
    #[error("Input error: {0}")]
    Input(String),

    /// The browser could not be launched or attached to.
    #[error("Failed to start browser session: {0}")]
    SessionStart(String),

    /// The page did not finish loading in time.
    #[error("Navigation to {url} timed out after {secs} seconds")]
    NavigationTimeout { url: String, secs: u64 },

    /// No element on the page matched the selector.
    #[error("Element not found: {0}")]
    ElementNotFound(String),

    /// Any other fault reported by the browser driver.
    #[error("Browser driver error: {0}")]
    Driver(String),

    /// The whole session exceeded the hard per-job limit.
    #[error("Job exceeded hard timeout of {0} seconds")]
    JobTimeout(u64),

    /// Filesystem operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AppError {
    /// Returns true if this error only fails the current job.
    ///
    /// Everything else ends the worker loop that hit it.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            AppError::NavigationTimeout { .. } | AppError::ElementNotFound(_) | AppError::JobTimeout(_)
        )
    }
}
