use std::sync::Arc;

use tracing::{info, warn};

use crate::error::{JobSystemError, Result};
use crate::job::JobChannels;
use crate::worker::{JobWorkerThread, WorkerInfo};

use super::board::lock;
use super::JobSystem;

impl JobSystem {
    /// Start a worker thread that claims jobs on `channels`.
    ///
    /// Names are unique within the system. Fails after shutdown.
    pub fn create_worker_thread(&self, name: impl Into<String>, channels: JobChannels) -> Result<()> {
        let name = name.into();
        let mut registry = lock(&self.workers);
        if self.board.is_closed() {
            return Err(JobSystemError::ShutDown);
        }
        if registry.contains_key(&name) {
            return Err(JobSystemError::DuplicateWorker(name));
        }

        let mut worker = JobWorkerThread::new(name.clone(), channels);
        worker.start_up(Arc::clone(&self.board), self.config.worker_idle_sleep())?;
        registry.insert(name.clone(), worker);
        info!(worker = %name, %channels, "worker thread created");
        Ok(())
    }

    /// Stop and join one worker. Blocks until its in-flight job, if any, finishes.
    ///
    /// The worker leaves the registry before the registry lock is released;
    /// the join happens outside the lock.
    pub fn destroy_worker_thread(&self, name: &str) -> Result<()> {
        let removed = lock(&self.workers).shift_remove(name);
        let Some(mut worker) = removed else {
            warn!(worker = %name, "destroy requested for unknown worker");
            return Err(JobSystemError::UnknownWorker(name.to_string()));
        };

        worker.shut_down();
        worker.join();
        info!(worker = %name, jobs_executed = worker.jobs_executed(), "worker thread destroyed");
        Ok(())
    }

    /// Change which channels a worker claims from.
    pub fn set_worker_channels(&self, name: &str, channels: JobChannels) -> Result<()> {
        let registry = lock(&self.workers);
        let worker = registry
            .get(name)
            .ok_or_else(|| JobSystemError::UnknownWorker(name.to_string()))?;
        worker.set_channels(channels);
        info!(worker = %name, %channels, "worker channels updated");
        Ok(())
    }

    /// Names of live workers, in creation order.
    pub fn worker_names(&self) -> Vec<String> {
        lock(&self.workers).keys().cloned().collect()
    }

    pub fn workers(&self) -> Vec<WorkerInfo> {
        lock(&self.workers).values().map(JobWorkerThread::info).collect()
    }

    pub fn worker_count(&self) -> usize {
        lock(&self.workers).len()
    }
}
