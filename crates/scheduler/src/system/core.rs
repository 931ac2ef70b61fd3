use std::sync::{Arc, Mutex};

use indexmap::IndexMap;
use tracing::info;

use crate::config::JobSystemConfig;
use crate::error::Result;
use crate::history::{JobHistoryEntry, JobStatus};
use crate::job::{Job, JobChannels, JobId};
use crate::metrics::JobSystemMetrics;
use crate::worker::JobWorkerThread;

use super::board::{lock, ClaimedJob, JobBoard};

/// The job system. Owns the job board and a registry of worker threads.
///
/// Construct one explicitly and share it with `Arc<JobSystem>`. Dropping the
/// last handle performs [`JobSystem::shutdown`].
pub struct JobSystem {
    pub(super) config: JobSystemConfig,
    /// Job state shared with every worker thread.
    pub(super) board: Arc<JobBoard>,
    /// Live workers keyed by unique name. Never locked while a board lock is held.
    pub(super) workers: Mutex<IndexMap<String, JobWorkerThread>>,
}

impl JobSystem {
    /// Create a job system with default tuning and no workers.
    pub fn new() -> Self {
        Self::build(JobSystemConfig::default())
    }

    /// Create a job system and start the workers listed in `config`.
    pub fn with_config(config: JobSystemConfig) -> Result<Self> {
        config.validate()?;
        let workers = config.workers.clone();
        let system = Self::build(config);
        for worker in workers {
            system.create_worker_thread(worker.name, worker.channels)?;
        }
        Ok(system)
    }

    fn build(config: JobSystemConfig) -> Self {
        Self {
            board: Arc::new(JobBoard::new(config.history_capacity)),
            workers: Mutex::new(IndexMap::new()),
            config,
        }
    }

    pub fn config(&self) -> &JobSystemConfig {
        &self.config
    }

    /// Submit a job. It becomes claimable, with a Queued history entry, before this returns.
    pub fn queue_job(&self, job: impl Job) -> JobId {
        self.board.queue_job(Box::new(job))
    }

    /// Submit an already boxed job.
    pub fn queue_boxed(&self, job: Box<dyn Job>) -> JobId {
        self.board.queue_job(job)
    }

    /// Claim the oldest queued job routable to `channels` on behalf of `claimant`.
    ///
    /// Worker threads do this themselves; it is public so callers can drive
    /// jobs by hand. A claimed job must be executed and handed back through
    /// [`JobSystem::on_job_completed`].
    pub fn claim_job(&self, channels: JobChannels, claimant: &str) -> Result<Option<ClaimedJob>> {
        self.board.claim_job(channels, claimant)
    }

    /// Hand an executed job back, moving it from running to completed.
    pub fn on_job_completed(&self, job: ClaimedJob) -> Result<()> {
        self.board.on_job_completed(job)
    }

    /// Current status. Ids the system never issued report `NeverSeen`.
    pub fn job_status(&self, id: JobId) -> JobStatus {
        self.board.status(id)
    }

    pub fn is_job_complete(&self, id: JobId) -> bool {
        self.job_status(id) == JobStatus::Completed
    }

    /// Full history record for a job, if it was ever queued.
    pub fn job_record(&self, id: JobId) -> Option<JobHistoryEntry> {
        self.board.record(id)
    }

    /// Number of jobs ever queued.
    pub fn jobs_seen(&self) -> usize {
        self.board.history_len()
    }

    pub fn queued_len(&self) -> usize {
        self.board.queued_len()
    }

    pub fn running_len(&self) -> usize {
        self.board.running_len()
    }

    pub fn completed_len(&self) -> usize {
        self.board.completed_len()
    }

    /// Get a snapshot of the current job system metrics.
    pub fn metrics(&self) -> JobSystemMetrics {
        self.board.metrics()
    }

    pub fn is_shut_down(&self) -> bool {
        self.board.is_closed()
    }

    /// Stop every worker and abandon the queue.
    ///
    /// No job is claimed once this begins. Workers finish their in-flight job,
    /// then are joined. Jobs still queued are dropped without being executed
    /// and keep their Queued history entry. Completed jobs stay reapable.
    /// Calling it again is a no-op.
    pub fn shutdown(&self) {
        let mut stopping: Vec<JobWorkerThread> = {
            let mut registry = lock(&self.workers);
            if self.board.is_closed() {
                return;
            }
            self.board.close();
            registry.drain(..).map(|(_, worker)| worker).collect()
        };

        info!(workers = stopping.len(), "job system shutdown requested");

        // Signal everyone first so workers wind down in parallel.
        for worker in &mut stopping {
            worker.shut_down();
        }
        for worker in &mut stopping {
            worker.join();
        }

        let abandoned = self.board.abandon_queued();
        info!(
            workers = stopping.len(),
            abandoned,
            awaiting_retirement = self.board.completed_len(),
            "job system stopped"
        );
    }
}

impl Default for JobSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for JobSystem {
    fn drop(&mut self) {
        self.shutdown();
    }
}
