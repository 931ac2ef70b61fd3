//! Shared job state touched by both the coordinator and the worker threads.
//!
//! Lock order: queued → running → completed → history. Every path that holds
//! more than one of these takes them in that order. The metrics lock is only
//! taken with none of them held, and the worker registry lives outside the
//! board entirely.

use std::any::Any;
use std::collections::VecDeque;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use tracing::{debug, error};

use crate::error::{JobSystemError, Result};
use crate::history::{JobHistory, JobHistoryEntry, JobStatus};
use crate::job::{Job, JobChannels, JobId, JobType};
use crate::metrics::JobSystemMetrics;

// Jobs never run while a board lock is held, so a poisoned lock still guards
// consistent data.
pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

fn read<T>(l: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    l.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(l: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    l.write().unwrap_or_else(PoisonError::into_inner)
}

/// Log an invariant violation loudly and pass it on.
pub(crate) fn report(err: JobSystemError) -> JobSystemError {
    error!(error = %err, "job system invariant violated");
    err
}

/// A job waiting in the queued collection.
struct QueuedJob {
    id: JobId,
    channels: JobChannels,
    job_type: JobType,
    job: Box<dyn Job>,
}

/// Running-set handle. The payload itself is owned by the claiming worker.
struct RunningJob {
    worker: String,
}

/// A finished job waiting to be retired.
pub(crate) struct CompletedJob {
    job: Box<dyn Job>,
}

/// A job taken off the queue by [`crate::JobSystem::claim_job`].
///
/// Run it with [`ClaimedJob::execute`] and hand it back through
/// [`crate::JobSystem::on_job_completed`].
pub struct ClaimedJob {
    id: JobId,
    job_type: JobType,
    job: Box<dyn Job>,
    elapsed: Duration,
    panicked: bool,
}

impl ClaimedJob {
    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn job_type(&self) -> JobType {
        self.job_type
    }

    /// Run the job to completion on the current thread. A panic inside the
    /// job is caught and recorded rather than unwinding into the caller.
    pub fn execute(&mut self) {
        let start = Instant::now();
        let job = &mut self.job;
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| job.execute())) {
            self.panicked = true;
            error!(job = %self.id, panic = %panic_message(payload.as_ref()), "job panicked during execute");
        }
        self.elapsed = start.elapsed();
    }

    pub fn panicked(&self) -> bool {
        self.panicked
    }
}

impl fmt::Debug for ClaimedJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClaimedJob")
            .field("id", &self.id)
            .field("job_type", &self.job_type)
            .field("panicked", &self.panicked)
            .finish_non_exhaustive()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Queued, running and completed collections plus the history table.
pub(crate) struct JobBoard {
    queued: Mutex<VecDeque<QueuedJob>>,
    running: Mutex<IndexMap<JobId, RunningJob>>,
    completed: Mutex<IndexMap<JobId, CompletedJob>>,
    history: RwLock<JobHistory>,
    metrics: Mutex<JobSystemMetrics>,
    /// Set once shutdown begins; no claims succeed afterwards.
    closed: AtomicBool,
}

impl JobBoard {
    pub(crate) fn new(history_capacity: usize) -> Self {
        Self {
            queued: Mutex::new(VecDeque::new()),
            running: Mutex::new(IndexMap::new()),
            completed: Mutex::new(IndexMap::new()),
            history: RwLock::new(JobHistory::with_capacity(history_capacity)),
            metrics: Mutex::new(JobSystemMetrics::default()),
            closed: AtomicBool::new(false),
        }
    }

    /// Record a Queued history entry and make the job claimable, as one step.
    pub(crate) fn queue_job(&self, job: Box<dyn Job>) -> JobId {
        let channels = job.channels();
        let job_type = job.job_type();

        let id = {
            let mut queued = lock(&self.queued);
            let mut history = write(&self.history);
            let id = history.append(job_type);
            queued.push_back(QueuedJob {
                id,
                channels,
                job_type,
                job,
            });
            id
        };

        lock(&self.metrics).record_queued();
        debug!(job = %id, %channels, %job_type, "job queued");
        id
    }

    /// Take the first queued job, in arrival order, routable to `channels`.
    pub(crate) fn claim_job(&self, channels: JobChannels, worker: &str) -> Result<Option<ClaimedJob>> {
        let claimed = {
            let mut queued = lock(&self.queued);
            if self.closed.load(Ordering::Acquire) {
                return Ok(None);
            }
            let Some(pos) = queued.iter().position(|j| j.channels.intersects(channels)) else {
                return Ok(None);
            };
            let mut running = lock(&self.running);
            let mut history = write(&self.history);

            let Some(next) = queued.remove(pos) else {
                return Ok(None);
            };
            let entry = history.advance(next.id, JobStatus::Running).map_err(report)?;
            entry.executed_by = Some(worker.to_string());
            running.insert(
                next.id,
                RunningJob {
                    worker: worker.to_string(),
                },
            );

            ClaimedJob {
                id: next.id,
                job_type: next.job_type,
                job: next.job,
                elapsed: Duration::ZERO,
                panicked: false,
            }
        };

        lock(&self.metrics).record_claimed();
        debug!(job = %claimed.id, worker, "job claimed");
        Ok(Some(claimed))
    }

    /// Move an executed job from running to completed.
    pub(crate) fn on_job_completed(&self, claimed: ClaimedJob) -> Result<()> {
        let ClaimedJob {
            id,
            job_type,
            job,
            elapsed,
            panicked,
        } = claimed;

        let worker = {
            let mut running = lock(&self.running);
            let Some(run) = running.shift_remove(&id) else {
                return Err(report(JobSystemError::Inconsistency(format!(
                    "job {id} reported complete but is not in the running set"
                ))));
            };
            let mut completed = lock(&self.completed);
            let mut history = write(&self.history);

            let entry = history.advance(id, JobStatus::Completed).map_err(report)?;
            entry.panicked = panicked;
            completed.insert(id, CompletedJob { job });
            run.worker
        };

        lock(&self.metrics).record_execution(job_type, &worker, elapsed, panicked);
        debug!(job = %id, worker = %worker, ?elapsed, "job completed");
        Ok(())
    }

    /// Swap out every completed job, then retire each outside the lock.
    /// Returns how many reached Retired.
    pub(crate) fn finish_completed_jobs(&self) -> usize {
        let drained = std::mem::take(&mut *lock(&self.completed));

        // An invariant failure is logged by `retire`; the job is already out
        // of every collection, so there is nothing to undo.
        let mut retired = 0;
        for (id, done) in drained {
            if self.retire(id, done).is_ok() {
                retired += 1;
            }
        }

        lock(&self.metrics).record_retired(retired);
        retired
    }

    /// Remove one specific job from the completed set.
    pub(crate) fn take_completed(&self, id: JobId) -> Option<CompletedJob> {
        lock(&self.completed).shift_remove(&id)
    }

    /// Invoke the completion callback, drop the job and mark it Retired.
    /// A panicking callback is contained and the job still retires.
    pub(crate) fn retire(&self, id: JobId, done: CompletedJob) -> Result<()> {
        let job = done.job;
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(move || job.complete())) {
            error!(job = %id, panic = %panic_message(payload.as_ref()), "job panicked during complete");
        }
        write(&self.history)
            .advance(id, JobStatus::Retired)
            .map_err(report)?;
        debug!(job = %id, "job retired");
        Ok(())
    }

    pub(crate) fn record_retired(&self, count: usize) {
        lock(&self.metrics).record_retired(count);
    }

    pub(crate) fn status(&self, id: JobId) -> JobStatus {
        read(&self.history).status(id)
    }

    pub(crate) fn record(&self, id: JobId) -> Option<JobHistoryEntry> {
        read(&self.history).entry(id).cloned()
    }

    pub(crate) fn history_len(&self) -> usize {
        read(&self.history).len()
    }

    pub(crate) fn queued_len(&self) -> usize {
        lock(&self.queued).len()
    }

    pub(crate) fn running_len(&self) -> usize {
        lock(&self.running).len()
    }

    pub(crate) fn completed_len(&self) -> usize {
        lock(&self.completed).len()
    }

    pub(crate) fn metrics(&self) -> JobSystemMetrics {
        let mut snapshot = lock(&self.metrics).clone();
        snapshot.queued_depth = self.queued_len();
        snapshot.running_depth = self.running_len();
        snapshot.completed_depth = self.completed_len();
        snapshot
    }

    /// Refuse all further claims.
    pub(crate) fn close(&self) {
        let _queued = lock(&self.queued);
        self.closed.store(true, Ordering::Release);
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Drop every job still waiting to be claimed, without running it.
    pub(crate) fn abandon_queued(&self) -> usize {
        let abandoned = std::mem::take(&mut *lock(&self.queued));
        abandoned.len()
    }
}
