//! Identity-indexed record of every job the system has seen.
//!
//! Entries are appended once at submission and mutated in place at each
//! lifecycle transition. They are never removed, so status queries keep
//! working after the job object itself has been dropped.

use serde::{Deserialize, Serialize};

use crate::error::{JobSystemError, Result};
use crate::job::{JobId, JobType};

/// Lifecycle of a job. Transitions only ever move one step forward:
/// `Queued → Running → Completed → Retired`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobStatus {
    /// No history entry exists for this id.
    NeverSeen,
    Queued,
    Running,
    Completed,
    Retired,
}

impl JobStatus {
    /// The only status this one may legally advance to.
    pub fn next(self) -> Option<JobStatus> {
        match self {
            JobStatus::NeverSeen => Some(JobStatus::Queued),
            JobStatus::Queued => Some(JobStatus::Running),
            JobStatus::Running => Some(JobStatus::Completed),
            JobStatus::Completed => Some(JobStatus::Retired),
            JobStatus::Retired => None,
        }
    }
}

/// History record for one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobHistoryEntry {
    pub job_type: JobType,
    pub status: JobStatus,
    /// Worker that claimed the job, once claimed.
    pub executed_by: Option<String>,
    /// Set when `execute` panicked on the worker.
    pub panicked: bool,
}

impl JobHistoryEntry {
    fn queued(job_type: JobType) -> Self {
        Self {
            job_type,
            status: JobStatus::Queued,
            executed_by: None,
            panicked: false,
        }
    }
}

/// Append-only history table. Pre-sized from config, grows without bound past that.
#[derive(Debug, Default)]
pub(crate) struct JobHistory {
    entries: Vec<JobHistoryEntry>,
}

impl JobHistory {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    /// Record a newly queued job and hand out its identity.
    pub(crate) fn append(&mut self, job_type: JobType) -> JobId {
        let id = JobId(self.entries.len() as u64);
        self.entries.push(JobHistoryEntry::queued(job_type));
        id
    }

    pub(crate) fn entry(&self, id: JobId) -> Option<&JobHistoryEntry> {
        id.index().and_then(|i| self.entries.get(i))
    }

    pub(crate) fn status(&self, id: JobId) -> JobStatus {
        self.entry(id)
            .map(|e| e.status)
            .unwrap_or(JobStatus::NeverSeen)
    }

    /// Move a job one step forward to `to`, rejecting any other transition.
    pub(crate) fn advance(&mut self, id: JobId, to: JobStatus) -> Result<&mut JobHistoryEntry> {
        let entry = id
            .index()
            .and_then(|i| self.entries.get_mut(i))
            .ok_or_else(|| {
                JobSystemError::Inconsistency(format!("job {id} has no history entry"))
            })?;

        if entry.status.next() != Some(to) {
            return Err(JobSystemError::Inconsistency(format!(
                "job {id} cannot move from {:?} to {:?}",
                entry.status, to
            )));
        }
        entry.status = to;
        Ok(entry)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}
