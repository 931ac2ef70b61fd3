use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::config::{JobSystemConfig, WorkerConfig};
use crate::error::JobSystemError;
use crate::history::JobStatus;
use crate::job::{FnJob, Job, JobChannels, JobId, JobType};
use crate::system::JobSystem;
use crate::worker::WorkerState;

/// Mock job counting how often each half of the contract runs.
struct MockJob {
    channels: JobChannels,
    job_type: JobType,
    executed: Arc<AtomicUsize>,
    completed: Arc<AtomicUsize>,
}

impl MockJob {
    fn new(channels: JobChannels) -> Self {
        Self {
            channels,
            job_type: JobType::UNTYPED,
            executed: Arc::new(AtomicUsize::new(0)),
            completed: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn with_type(mut self, job_type: JobType) -> Self {
        self.job_type = job_type;
        self
    }

    fn counters(&self) -> (Arc<AtomicUsize>, Arc<AtomicUsize>) {
        (self.executed.clone(), self.completed.clone())
    }
}

impl Job for MockJob {
    fn channels(&self) -> JobChannels {
        self.channels
    }

    fn job_type(&self) -> JobType {
        self.job_type
    }

    fn execute(&mut self) {
        self.executed.fetch_add(1, Ordering::SeqCst);
    }

    fn complete(self: Box<Self>) {
        self.completed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Claim, execute and complete one job on the calling thread.
fn drive_one(system: &JobSystem, channels: JobChannels) -> Option<JobId> {
    let mut claimed = system.claim_job(channels, "test-thread").unwrap()?;
    let id = claimed.id();
    claimed.execute();
    system.on_job_completed(claimed).unwrap();
    Some(id)
}

#[test]
fn unsubmitted_ids_are_never_seen() {
    let system = JobSystem::new();
    assert_eq!(system.job_status(JobId(0)), JobStatus::NeverSeen);
    assert_eq!(system.job_status(JobId(42)), JobStatus::NeverSeen);

    system.queue_job(MockJob::new(JobChannels::ALL));
    assert_eq!(system.job_status(JobId(1)), JobStatus::NeverSeen);
    assert!(system.job_record(JobId(1)).is_none());
    assert!(!system.is_job_complete(JobId(1)));
}

#[test]
fn queue_assigns_sequential_ids_and_records_history() {
    let system = JobSystem::new();
    let a = system.queue_job(MockJob::new(JobChannels::ALL).with_type(JobType(7)));
    let b = system.queue_job(MockJob::new(JobChannels::ALL));

    assert_eq!(a, JobId(0));
    assert_eq!(b, JobId(1));
    assert_eq!(system.job_status(a), JobStatus::Queued);
    assert_eq!(system.job_record(a).unwrap().job_type, JobType(7));
    assert_eq!(system.queued_len(), 2);
    assert_eq!(system.jobs_seen(), 2);
}

#[test]
fn claim_respects_channel_mask() {
    let system = JobSystem::new();
    let id = system.queue_job(MockJob::new(JobChannels(0x2)));

    assert!(system.claim_job(JobChannels(0x1), "w").unwrap().is_none());
    assert_eq!(system.job_status(id), JobStatus::Queued);

    let claimed = system.claim_job(JobChannels(0x3), "w").unwrap().unwrap();
    assert_eq!(claimed.id(), id);
    assert_eq!(system.job_status(id), JobStatus::Running);
    assert_eq!(system.queued_len(), 0);
    assert_eq!(system.running_len(), 1);
    system.on_job_completed(claimed).unwrap();
}

#[test]
fn claim_takes_first_match_in_arrival_order() {
    let system = JobSystem::new();
    let _a = system.queue_job(MockJob::new(JobChannels(0x1)));
    let b = system.queue_job(MockJob::new(JobChannels(0x2)));
    let c = system.queue_job(MockJob::new(JobChannels(0x2)));

    assert_eq!(drive_one(&system, JobChannels(0x2)), Some(b));
    assert_eq!(drive_one(&system, JobChannels(0x2)), Some(c));
    assert_eq!(drive_one(&system, JobChannels(0x2)), None);
    assert_eq!(system.queued_len(), 1);
}

#[test]
fn a_job_is_claimed_only_once() {
    let system = JobSystem::new();
    system.queue_job(MockJob::new(JobChannels::ALL));

    let first = system.claim_job(JobChannels::ALL, "a").unwrap();
    let second = system.claim_job(JobChannels::ALL, "b").unwrap();
    assert!(first.is_some());
    assert!(second.is_none());
    system.on_job_completed(first.unwrap()).unwrap();
}

#[test]
fn claimant_is_recorded() {
    let system = JobSystem::new();
    let id = system.queue_job(MockJob::new(JobChannels::ALL));
    let claimed = system.claim_job(JobChannels::ALL, "render-3").unwrap().unwrap();
    assert_eq!(system.job_record(id).unwrap().executed_by.as_deref(), Some("render-3"));
    system.on_job_completed(claimed).unwrap();
}

#[test]
fn completing_a_job_that_is_not_running_is_an_inconsistency() {
    let owner = JobSystem::new();
    let stranger = JobSystem::new();
    owner.queue_job(MockJob::new(JobChannels::ALL));
    stranger.queue_job(MockJob::new(JobChannels::ALL));

    let claimed = owner.claim_job(JobChannels::ALL, "w").unwrap().unwrap();
    let err = stranger.on_job_completed(claimed).unwrap_err();
    assert!(matches!(err, JobSystemError::Inconsistency(_)));
    assert_eq!(stranger.job_status(JobId(0)), JobStatus::Queued);
}

#[test]
fn finish_completed_jobs_retires_each_job_once() {
    let system = JobSystem::new();
    let jobs: Vec<MockJob> = (0..5).map(|_| MockJob::new(JobChannels::ALL)).collect();
    let counters: Vec<_> = jobs.iter().map(MockJob::counters).collect();
    let ids: Vec<JobId> = jobs.into_iter().map(|j| system.queue_job(j)).collect();

    for _ in 0..3 {
        drive_one(&system, JobChannels::ALL);
    }
    assert_eq!(system.finish_completed_jobs(), 3);
    assert_eq!(system.finish_completed_jobs(), 0);

    while drive_one(&system, JobChannels::ALL).is_some() {}
    assert_eq!(system.finish_completed_jobs(), 2);

    for (id, (executed, completed)) in ids.iter().zip(&counters) {
        assert_eq!(system.job_status(*id), JobStatus::Retired);
        assert_eq!(executed.load(Ordering::SeqCst), 1);
        assert_eq!(completed.load(Ordering::SeqCst), 1);
    }
    assert_eq!(system.completed_len(), 0);
    assert_eq!(system.metrics().jobs_retired, 5);
}

#[test]
fn panicking_completion_does_not_strand_the_rest_of_the_batch() {
    let system = JobSystem::new();
    let bad = system.queue_job(FnJob::new(|| {}).on_complete(|| panic!("callback failed")));
    let good = MockJob::new(JobChannels::ALL);
    let (_, completed) = good.counters();
    let good = system.queue_job(good);

    drive_one(&system, JobChannels::ALL);
    drive_one(&system, JobChannels::ALL);
    assert_eq!(system.finish_completed_jobs(), 2);

    assert_eq!(completed.load(Ordering::SeqCst), 1);
    assert_eq!(system.job_status(bad), JobStatus::Retired);
    assert_eq!(system.job_status(good), JobStatus::Retired);
    assert_eq!(system.completed_len(), 0);
    assert_eq!(system.metrics().jobs_retired, 2);
}

#[test]
fn finish_job_contains_a_panicking_completion() {
    let system = JobSystem::new();
    let id = system.queue_job(FnJob::new(|| {}).on_complete(|| panic!("callback failed")));
    drive_one(&system, JobChannels::ALL);

    system.finish_job(id).unwrap();
    assert_eq!(system.job_status(id), JobStatus::Retired);
}

#[test]
fn finish_job_retires_a_completed_job() {
    let system = JobSystem::new();
    let job = MockJob::new(JobChannels::ALL);
    let (executed, completed) = job.counters();
    let id = system.queue_job(job);
    drive_one(&system, JobChannels::ALL);
    assert!(system.is_job_complete(id));

    system.finish_job(id).unwrap();
    assert_eq!(system.job_status(id), JobStatus::Retired);
    assert_eq!(executed.load(Ordering::SeqCst), 1);
    assert_eq!(completed.load(Ordering::SeqCst), 1);
}

#[test]
fn finish_job_fails_fast_on_invalid_ids() {
    let system = JobSystem::new();
    let start = Instant::now();
    assert!(matches!(
        system.finish_job(JobId(9)).unwrap_err(),
        JobSystemError::UnknownJob(JobId(9))
    ));

    let id = system.queue_job(MockJob::new(JobChannels::ALL));
    drive_one(&system, JobChannels::ALL);
    system.finish_job(id).unwrap();
    assert!(matches!(
        system.finish_job(id).unwrap_err(),
        JobSystemError::AlreadyRetired(_)
    ));
    assert!(start.elapsed() < Duration::from_secs(1));
}

#[test]
fn finish_job_timeout_leaves_job_queued() {
    let system = JobSystem::new();
    let id = system.queue_job(MockJob::new(JobChannels::ALL));

    let err = system.finish_job_timeout(id, Duration::from_millis(20)).unwrap_err();
    assert!(matches!(err, JobSystemError::Timeout { job, .. } if job == id));
    assert_eq!(system.job_status(id), JobStatus::Queued);

    drive_one(&system, JobChannels::ALL);
    system.finish_job_timeout(id, Duration::from_secs(1)).unwrap();
    assert_eq!(system.job_status(id), JobStatus::Retired);
}

#[test]
fn finishing_a_job_the_pump_already_drained_is_an_inconsistency() {
    let system = Arc::new(JobSystem::new());
    let target = Arc::new(AtomicU64::new(u64::MAX));
    let observed = Arc::new(Mutex::new(None));

    let (s, t, o) = (system.clone(), target.clone(), observed.clone());
    let id = system.queue_job(FnJob::new(|| {}).on_complete(move || {
        let id = JobId(t.load(Ordering::SeqCst));
        *o.lock().unwrap() = Some(s.finish_job(id));
    }));
    target.store(id.0, Ordering::SeqCst);

    drive_one(&system, JobChannels::ALL);
    assert_eq!(system.finish_completed_jobs(), 1);

    let result = observed.lock().unwrap().take().unwrap();
    assert!(matches!(result, Err(JobSystemError::Inconsistency(_))));
    assert_eq!(system.job_status(id), JobStatus::Retired);
}

#[test]
fn panicking_job_still_completes() {
    let system = JobSystem::new();
    let completed = Arc::new(AtomicUsize::new(0));
    let c = completed.clone();
    let id = system.queue_job(FnJob::new(|| panic!("boom")).on_complete(move || {
        c.fetch_add(1, Ordering::SeqCst);
    }));

    let mut claimed = system.claim_job(JobChannels::ALL, "w").unwrap().unwrap();
    claimed.execute();
    assert!(claimed.panicked());
    system.on_job_completed(claimed).unwrap();

    assert!(system.job_record(id).unwrap().panicked);
    system.finish_job(id).unwrap();
    assert_eq!(completed.load(Ordering::SeqCst), 1);
    assert_eq!(system.metrics().jobs_panicked, 1);
}

#[test]
fn shutdown_abandons_queued_jobs() {
    let system = JobSystem::new();
    let jobs: Vec<MockJob> = (0..3).map(|_| MockJob::new(JobChannels::ALL)).collect();
    let counters: Vec<_> = jobs.iter().map(MockJob::counters).collect();
    let ids: Vec<JobId> = jobs.into_iter().map(|j| system.queue_job(j)).collect();

    system.shutdown();
    assert!(system.is_shut_down());
    assert_eq!(system.queued_len(), 0);
    for (id, (executed, completed)) in ids.iter().zip(&counters) {
        assert_eq!(system.job_status(*id), JobStatus::Queued);
        assert_eq!(executed.load(Ordering::SeqCst), 0);
        assert_eq!(completed.load(Ordering::SeqCst), 0);
    }

    system.queue_job(MockJob::new(JobChannels::ALL));
    assert!(system.claim_job(JobChannels::ALL, "late").unwrap().is_none());
    assert!(matches!(
        system.create_worker_thread("late", JobChannels::ALL),
        Err(JobSystemError::ShutDown)
    ));

    // Second call is a no-op.
    system.shutdown();
}

#[test]
fn finish_job_on_an_abandoned_job_fails_fast() {
    let system = JobSystem::new();
    let abandoned = system.queue_job(MockJob::new(JobChannels::ALL));
    system.shutdown();
    let late = system.queue_job(MockJob::new(JobChannels::ALL));

    let start = Instant::now();
    assert!(matches!(system.finish_job(abandoned), Err(JobSystemError::ShutDown)));
    assert!(matches!(
        system.finish_job_timeout(late, Duration::from_secs(5)),
        Err(JobSystemError::ShutDown)
    ));
    assert!(start.elapsed() < Duration::from_secs(1));
    assert_eq!(system.job_status(abandoned), JobStatus::Queued);
}

#[test]
fn completed_jobs_stay_reapable_after_shutdown() {
    let system = JobSystem::new();
    let job = MockJob::new(JobChannels::ALL);
    let (_, completed) = job.counters();
    let id = system.queue_job(job);
    drive_one(&system, JobChannels::ALL);

    system.shutdown();
    system.finish_job(id).unwrap();
    assert_eq!(completed.load(Ordering::SeqCst), 1);
}

#[test]
fn worker_registry_management() {
    let system = JobSystem::new();
    system.create_worker_thread("a", JobChannels::ALL).unwrap();
    system.create_worker_thread("b", JobChannels(0x1)).unwrap();

    assert!(matches!(
        system.create_worker_thread("a", JobChannels::ALL),
        Err(JobSystemError::DuplicateWorker(_))
    ));
    assert_eq!(system.worker_names(), vec!["a".to_string(), "b".to_string()]);

    system.set_worker_channels("b", JobChannels(0x4)).unwrap();
    let info = system.workers();
    assert_eq!(info[1].channels, JobChannels(0x4));
    assert_eq!(info[0].state, WorkerState::Running);

    system.destroy_worker_thread("a").unwrap();
    assert_eq!(system.worker_names(), vec!["b".to_string()]);
    assert!(matches!(
        system.destroy_worker_thread("a"),
        Err(JobSystemError::UnknownWorker(_))
    ));
    assert!(matches!(
        system.set_worker_channels("zzz", JobChannels::ALL),
        Err(JobSystemError::UnknownWorker(_))
    ));

    system.shutdown();
    assert_eq!(system.worker_count(), 0);
}

#[test]
fn with_config_starts_configured_workers() {
    let mut config = JobSystemConfig::default();
    config.history_capacity = 8;
    config.workers.push(WorkerConfig::new("general", JobChannels::ALL));
    config.workers.push(WorkerConfig::new("render", JobChannels(0x2)));

    let system = JobSystem::with_config(config).unwrap();
    assert_eq!(system.worker_count(), 2);
    assert_eq!(system.workers()[1].channels, JobChannels(0x2));
}

#[test]
fn metrics_track_the_lifecycle() {
    let system = JobSystem::new();
    system.queue_job(MockJob::new(JobChannels::ALL).with_type(JobType(1)));
    system.queue_job(MockJob::new(JobChannels::ALL).with_type(JobType(1)));
    drive_one(&system, JobChannels::ALL);

    let m = system.metrics();
    assert_eq!(m.jobs_queued, 2);
    assert_eq!(m.jobs_claimed, 1);
    assert_eq!(m.jobs_completed, 1);
    assert_eq!(m.executed_by_worker["test-thread"], 1);
    assert_eq!(m.executed_by_type["1"], 1);
    assert_eq!(m.queued_depth, 1);
    assert_eq!(m.completed_depth, 1);

    system.finish_completed_jobs();
    let m = system.metrics();
    assert_eq!(m.jobs_retired, 1);
    assert_eq!(m.outstanding(), 1);
    assert!(m.last_retired_at.is_some());
}
