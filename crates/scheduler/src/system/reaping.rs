use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::error::{JobSystemError, Result};
use crate::history::JobStatus;
use crate::job::JobId;

use super::board::report;
use super::JobSystem;

impl JobSystem {
    /// Retire every job that has completed so far, invoking each completion
    /// callback on the calling thread. Returns how many jobs were retired.
    ///
    /// Meant to be pumped from the owning application's update loop.
    pub fn finish_completed_jobs(&self) -> usize {
        let retired = self.board.finish_completed_jobs();
        if retired > 0 {
            debug!(retired, "retired completed jobs");
        }
        retired
    }

    /// Block until job `id` completes, then retire it on the calling thread.
    ///
    /// Fails immediately for ids that were never queued or are already
    /// retired, and with [`JobSystemError::ShutDown`] for queued jobs the
    /// system will never run because it has shut down. If the job completes but a concurrent
    /// [`JobSystem::finish_completed_jobs`] drained it first, this returns an
    /// [`JobSystemError::Inconsistency`].
    pub fn finish_job(&self, id: JobId) -> Result<()> {
        self.wait_for_completion(id, None)?;
        self.retire_completed(id)
    }

    /// [`JobSystem::finish_job`] with an upper bound on the wait. On timeout
    /// the job stays with the system and can still be finished later.
    pub fn finish_job_timeout(&self, id: JobId, timeout: Duration) -> Result<()> {
        self.wait_for_completion(id, Some(Instant::now() + timeout))?;
        self.retire_completed(id)
    }

    fn retire_completed(&self, id: JobId) -> Result<()> {
        let Some(done) = self.board.take_completed(id) else {
            return Err(report(JobSystemError::Inconsistency(format!(
                "job {id} has status completed but is not in the completed set"
            ))));
        };
        self.board.retire(id, done)?;
        self.board.record_retired(1);
        Ok(())
    }

    /// Poll the history until the job is Completed. Spins with yields for the
    /// first few polls, then sleeps between them.
    fn wait_for_completion(&self, id: JobId, deadline: Option<Instant>) -> Result<()> {
        let start = Instant::now();
        let mut polls = 0u32;

        loop {
            // Read before the status: once closed, a Queued job can never be claimed.
            let closed = self.board.is_closed();
            match self.board.status(id) {
                JobStatus::Completed => return Ok(()),
                JobStatus::Queued if closed => {
                    warn!(job = %id, "waiting on a job abandoned by shutdown");
                    return Err(JobSystemError::ShutDown);
                }
                JobStatus::NeverSeen => {
                    warn!(job = %id, "waiting on a job the system has never seen");
                    return Err(JobSystemError::UnknownJob(id));
                }
                JobStatus::Retired => {
                    warn!(job = %id, "waiting on a job that is already retired");
                    return Err(JobSystemError::AlreadyRetired(id));
                }
                JobStatus::Queued | JobStatus::Running => {}
            }

            if deadline.is_some_and(|d| Instant::now() >= d) {
                return Err(JobSystemError::Timeout {
                    job: id,
                    waited: start.elapsed(),
                });
            }

            if polls < self.config.finish_spin_polls {
                polls += 1;
                thread::yield_now();
            } else {
                thread::sleep(self.config.finish_poll_interval());
            }
        }
    }
}
