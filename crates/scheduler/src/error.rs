use std::time::Duration;

use thiserror::Error;

use crate::job::JobId;

/// Errors surfaced by the job system.
#[derive(Error, Debug)]
pub enum JobSystemError {
    #[error("job {0} was never queued")]
    UnknownJob(JobId),

    #[error("job {0} has already been retired")]
    AlreadyRetired(JobId),

    /// A broken scheduler invariant: lost update, double claim or a reap race.
    #[error("internal consistency violation: {0}")]
    Inconsistency(String),

    #[error("timed out after {waited:?} waiting for job {job}")]
    Timeout { job: JobId, waited: Duration },

    #[error("worker not found: {0}")]
    UnknownWorker(String),

    #[error("worker already registered: {0}")]
    DuplicateWorker(String),

    #[error("job system is shut down")]
    ShutDown,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, JobSystemError>;
