use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::job::JobType;

/// Job system counters, snapshotted by [`crate::JobSystem::metrics`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct JobSystemMetrics {
    pub jobs_queued: u64,
    pub jobs_claimed: u64,
    pub jobs_completed: u64,
    pub jobs_retired: u64,
    /// Jobs whose `execute` panicked (they still complete and retire).
    pub jobs_panicked: u64,
    /// Jobs executed, by worker name.
    pub executed_by_worker: HashMap<String, u64>,
    /// Jobs executed, by job type.
    pub executed_by_type: HashMap<String, u64>,
    /// Mean `execute` duration by job type.
    pub avg_execute_duration: HashMap<String, Duration>,
    pub last_retired_at: Option<DateTime<Utc>>,
    /// Collection depths at snapshot time.
    pub queued_depth: usize,
    pub running_depth: usize,
    pub completed_depth: usize,
}

impl JobSystemMetrics {
    pub(crate) fn record_queued(&mut self) {
        self.jobs_queued += 1;
    }

    pub(crate) fn record_claimed(&mut self) {
        self.jobs_claimed += 1;
    }

    /// Record one finished `execute` call.
    pub(crate) fn record_execution(
        &mut self,
        job_type: JobType,
        worker: &str,
        duration: Duration,
        panicked: bool,
    ) {
        self.jobs_completed += 1;
        if panicked {
            self.jobs_panicked += 1;
        }
        *self.executed_by_worker.entry(worker.to_string()).or_default() += 1;

        let key = job_type.to_string();
        let count = {
            let count = self.executed_by_type.entry(key.clone()).or_default();
            *count += 1;
            *count
        };
        let prev_avg = self
            .avg_execute_duration
            .get(&key)
            .copied()
            .unwrap_or_default();

        // Incremental mean: new_avg = prev_avg + (duration - prev_avg) / count
        let new_avg = if count == 1 {
            duration
        } else {
            let prev_nanos = prev_avg.as_nanos() as f64;
            let cur_nanos = duration.as_nanos() as f64;
            let avg_nanos = prev_nanos + (cur_nanos - prev_nanos) / count as f64;
            Duration::from_nanos(avg_nanos as u64)
        };
        self.avg_execute_duration.insert(key, new_avg);
    }

    pub(crate) fn record_retired(&mut self, count: usize) {
        if count == 0 {
            return;
        }
        self.jobs_retired += count as u64;
        self.last_retired_at = Some(Utc::now());
    }

    /// Jobs queued but not yet retired.
    pub fn outstanding(&self) -> u64 {
        self.jobs_queued.saturating_sub(self.jobs_retired)
    }
}
