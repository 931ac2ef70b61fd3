//! In-process job scheduling: a pool of named worker threads claims jobs from
//! a shared queue by channel mask, executes them, and hands them back to a
//! coordinator that tracks every job's lifecycle in a history table.

pub mod config;
pub mod error;
pub mod history;
pub mod job;
pub mod metrics;
pub mod system;
pub mod worker;

pub use config::{JobSystemConfig, WorkerConfig, load_dotenv};
pub use error::{JobSystemError, Result};
pub use history::{JobHistoryEntry, JobStatus};
pub use job::{FnJob, Job, JobChannels, JobId, JobType};
pub use metrics::JobSystemMetrics;
pub use system::{ClaimedJob, JobSystem};
pub use worker::{JobWorkerThread, WorkerInfo, WorkerState};
