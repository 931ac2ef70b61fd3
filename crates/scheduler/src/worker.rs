//! Worker threads that claim and execute jobs.
//!
//! Each [`JobWorkerThread`] owns one OS thread running a cooperative poll
//! loop: claim a job on its channels, execute it, report completion, or sleep
//! briefly when nothing is routable. Stopping is advisory. A worker finishes
//! its in-flight job before it observes the stop flag.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, error, info};

use crate::error::Result;
use crate::job::JobChannels;
use crate::system::board::JobBoard;

/// Lifecycle of a worker thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WorkerState {
    /// Constructed, thread not spawned yet.
    Created,
    Running,
    /// Stop requested; the thread may still be finishing a job.
    Stopping,
    /// Thread joined.
    Stopped,
}

/// Point-in-time view of a registered worker.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerInfo {
    pub name: String,
    pub channels: JobChannels,
    pub state: WorkerState,
    pub jobs_executed: u64,
}

/// State shared between a worker's owner and its thread.
#[derive(Debug)]
struct WorkerControl {
    channels: AtomicU64,
    stopping: AtomicBool,
    jobs_executed: AtomicU64,
}

impl WorkerControl {
    fn channels(&self) -> JobChannels {
        JobChannels(self.channels.load(Ordering::Acquire))
    }

    fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::Acquire)
    }
}

/// One named worker thread.
#[derive(Debug)]
pub struct JobWorkerThread {
    name: String,
    control: Arc<WorkerControl>,
    state: WorkerState,
    thread: Option<JoinHandle<()>>,
}

impl JobWorkerThread {
    pub(crate) fn new(name: impl Into<String>, channels: JobChannels) -> Self {
        Self {
            name: name.into(),
            control: Arc::new(WorkerControl {
                channels: AtomicU64::new(channels.0),
                stopping: AtomicBool::new(false),
                jobs_executed: AtomicU64::new(0),
            }),
            state: WorkerState::Created,
            thread: None,
        }
    }

    /// Spawn the OS thread and enter the poll loop.
    pub(crate) fn start_up(&mut self, board: Arc<JobBoard>, idle_sleep: Duration) -> Result<()> {
        let name = self.name.clone();
        let control = Arc::clone(&self.control);
        let handle = thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || work(&name, &control, &board, idle_sleep))?;
        self.thread = Some(handle);
        self.state = WorkerState::Running;
        Ok(())
    }

    /// Ask the thread to exit after its current job, if any.
    pub(crate) fn shut_down(&mut self) {
        self.control.stopping.store(true, Ordering::Release);
        if self.state == WorkerState::Running {
            self.state = WorkerState::Stopping;
        }
    }

    /// Block until the thread has exited.
    pub(crate) fn join(&mut self) {
        if let Some(handle) = self.thread.take() {
            if handle.join().is_err() {
                error!(worker = %self.name, "worker thread panicked");
            }
        }
        self.state = WorkerState::Stopped;
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn channels(&self) -> JobChannels {
        self.control.channels()
    }

    /// Change which channels this worker claims from. Takes effect on its next claim.
    pub fn set_channels(&self, channels: JobChannels) {
        self.control.channels.store(channels.0, Ordering::Release);
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    pub fn jobs_executed(&self) -> u64 {
        self.control.jobs_executed.load(Ordering::Relaxed)
    }

    pub fn info(&self) -> WorkerInfo {
        WorkerInfo {
            name: self.name.clone(),
            channels: self.channels(),
            state: self.state,
            jobs_executed: self.jobs_executed(),
        }
    }
}

impl Drop for JobWorkerThread {
    fn drop(&mut self) {
        self.shut_down();
        self.join();
    }
}

fn work(name: &str, control: &WorkerControl, board: &JobBoard, idle_sleep: Duration) {
    info!(worker = %name, channels = %control.channels(), "worker started");

    while !control.is_stopping() {
        let claimed = match board.claim_job(control.channels(), name) {
            Ok(claimed) => claimed,
            Err(e) => {
                // Already logged by the board; keep polling.
                debug!(worker = %name, error = %e, "claim failed");
                None
            }
        };

        match claimed {
            Some(mut job) => {
                job.execute();
                control.jobs_executed.fetch_add(1, Ordering::Relaxed);
                if let Err(e) = board.on_job_completed(job) {
                    debug!(worker = %name, error = %e, "completion rejected");
                }
            }
            None => thread::sleep(idle_sleep),
        }
    }

    info!(
        worker = %name,
        jobs_executed = control.jobs_executed.load(Ordering::Relaxed),
        "worker stopped"
    );
}
