use std::fmt;
use std::ops::{BitAnd, BitOr};

use serde::{Deserialize, Serialize};

/// Identity of a submitted job. Assigned by the job system at submission and
/// equal to the job's index in the history table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub u64);

impl JobId {
    /// History slot for this id, `None` if it cannot be addressed on this platform.
    pub(crate) fn index(self) -> Option<usize> {
        usize::try_from(self.0).ok()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Routing bitset. A worker may claim a job when their channel sets intersect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobChannels(pub u64);

impl JobChannels {
    /// Every channel. Jobs with this mask run anywhere; workers with it take anything.
    pub const ALL: JobChannels = JobChannels(u64::MAX);
    pub const NONE: JobChannels = JobChannels(0);

    /// Mask with only channel `n` set. Channels past 63 don't exist, so those
    /// yield an empty mask.
    pub const fn channel(n: u32) -> JobChannels {
        match 1u64.checked_shl(n) {
            Some(bit) => JobChannels(bit),
            None => JobChannels::NONE,
        }
    }

    pub fn intersects(self, other: JobChannels) -> bool {
        self.0 & other.0 != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl Default for JobChannels {
    fn default() -> Self {
        Self::ALL
    }
}

impl From<u64> for JobChannels {
    fn from(bits: u64) -> Self {
        Self(bits)
    }
}

impl BitOr for JobChannels {
    type Output = JobChannels;

    fn bitor(self, rhs: Self) -> Self::Output {
        JobChannels(self.0 | rhs.0)
    }
}

impl BitAnd for JobChannels {
    type Output = JobChannels;

    fn bitand(self, rhs: Self) -> Self::Output {
        JobChannels(self.0 & rhs.0)
    }
}

impl fmt::Display for JobChannels {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Caller-defined job kind, recorded in history and used to bucket metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobType(pub i32);

impl JobType {
    pub const UNTYPED: JobType = JobType(-1);
}

impl Default for JobType {
    fn default() -> Self {
        Self::UNTYPED
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::UNTYPED {
            f.write_str("untyped")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// A unit of work the job system can run.
///
/// `execute` runs once on a worker thread. `complete` runs once afterwards on
/// whichever thread retires the job (a `finish_completed_jobs` pump or a
/// `finish_job` waiter), never concurrently with `execute`. The box is
/// consumed by `complete`, so the job is dropped right after its callback.
pub trait Job: Send + 'static {
    /// Channels this job may be routed to. Read once at submission.
    fn channels(&self) -> JobChannels {
        JobChannels::ALL
    }

    /// Kind tag recorded in history. Read once at submission.
    fn job_type(&self) -> JobType {
        JobType::UNTYPED
    }

    /// Perform the work synchronously to completion.
    fn execute(&mut self);

    /// Publish results back to whoever queued the job.
    fn complete(self: Box<Self>) {}
}

type ExecuteFn = Box<dyn FnOnce() + Send + 'static>;
type CompleteFn = Box<dyn FnOnce() + Send + 'static>;

/// Closure-backed job for callers that don't want to declare a type.
///
/// ```ignore
/// let id = system.queue_job(
///     FnJob::new(move || work())
///         .with_channels(JobChannels::channel(2))
///         .on_complete(move || publish()),
/// );
/// ```
pub struct FnJob {
    channels: JobChannels,
    job_type: JobType,
    execute: Option<ExecuteFn>,
    complete: Option<CompleteFn>,
}

impl FnJob {
    pub fn new(execute: impl FnOnce() + Send + 'static) -> Self {
        Self {
            channels: JobChannels::ALL,
            job_type: JobType::UNTYPED,
            execute: Some(Box::new(execute)),
            complete: None,
        }
    }

    pub fn with_channels(mut self, channels: JobChannels) -> Self {
        self.channels = channels;
        self
    }

    pub fn with_type(mut self, job_type: JobType) -> Self {
        self.job_type = job_type;
        self
    }

    pub fn on_complete(mut self, complete: impl FnOnce() + Send + 'static) -> Self {
        self.complete = Some(Box::new(complete));
        self
    }
}

impl fmt::Debug for FnJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnJob")
            .field("channels", &self.channels)
            .field("job_type", &self.job_type)
            .field("executed", &self.execute.is_none())
            .finish()
    }
}

impl Job for FnJob {
    fn channels(&self) -> JobChannels {
        self.channels
    }

    fn job_type(&self) -> JobType {
        self.job_type
    }

    fn execute(&mut self) {
        if let Some(execute) = self.execute.take() {
            execute();
        }
    }

    fn complete(mut self: Box<Self>) {
        if let Some(complete) = self.complete.take() {
            complete();
        }
    }
}
