pub mod config;
pub mod error;
pub mod job;
pub mod job_queue;
pub mod pool;
pub mod relocate;
pub mod staging;
pub mod traits;
pub mod worker;

#[cfg(test)]
pub mod testutil;

pub use config::{BrowserOptions, OutputLayout, RunSettings, SessionConfig, Timeouts};
pub use error::AppError;
pub use job::{Job, Locator, SelectorSpec, WorkerId};
pub use job_queue::{JobQueue, MemoryJobQueue};
pub use pool::{RunSummary, WorkerPool};
pub use traits::{BrowserDriver, BrowserSession};
pub use worker::{TracingWorkerReporter, WorkerReporter};
