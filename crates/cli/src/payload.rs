//! Concrete job payloads used by the demo frame loop.

use std::sync::mpsc::Sender;

use jobsys_scheduler::{Job, JobChannels, JobType};

/// General work may run on any worker.
pub const GENERAL_CHANNEL: JobChannels = JobChannels::channel(0);
/// Render work is routed to render-capable workers.
pub const RENDER_CHANNEL: JobChannels = JobChannels::channel(1);

pub const RENDER_JOB: JobType = JobType(1);
pub const COMPUTE_JOB: JobType = JobType(2);

/// Result published back to the frame loop by a completion callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutput {
    Rendered { frame: u64, checksum: u64 },
    Computed { limit: u64, primes: u64 },
}

/// Fills a sample buffer for one frame tile and publishes its checksum.
pub struct RenderJob {
    frame: u64,
    samples: usize,
    data: Vec<u32>,
    results: Sender<JobOutput>,
}

impl RenderJob {
    pub fn new(frame: u64, samples: usize, results: Sender<JobOutput>) -> Self {
        Self {
            frame,
            samples,
            data: Vec::new(),
            results,
        }
    }
}

impl Job for RenderJob {
    fn channels(&self) -> JobChannels {
        RENDER_CHANNEL
    }

    fn job_type(&self) -> JobType {
        RENDER_JOB
    }

    fn execute(&mut self) {
        let seed = self.frame.wrapping_mul(0x9E37_79B9) as u32;
        self.data = (0..self.samples as u32)
            .map(|i| (i ^ seed).wrapping_mul(2_654_435_761).rotate_left(7))
            .collect();
    }

    fn complete(self: Box<Self>) {
        let checksum = checksum(&self.data);
        // The receiver only goes away once the frame loop is done collecting.
        let _ = self.results.send(JobOutput::Rendered {
            frame: self.frame,
            checksum,
        });
    }
}

pub fn checksum(data: &[u32]) -> u64 {
    data.iter()
        .fold(0u64, |acc, &v| acc.rotate_left(5) ^ u64::from(v))
}

/// Counts primes below `limit`.
pub struct PrimeCountJob {
    limit: u64,
    primes: u64,
    results: Sender<JobOutput>,
}

impl PrimeCountJob {
    pub fn new(limit: u64, results: Sender<JobOutput>) -> Self {
        Self {
            limit,
            primes: 0,
            results,
        }
    }
}

impl Job for PrimeCountJob {
    fn channels(&self) -> JobChannels {
        GENERAL_CHANNEL
    }

    fn job_type(&self) -> JobType {
        COMPUTE_JOB
    }

    fn execute(&mut self) {
        self.primes = count_primes(self.limit);
    }

    fn complete(self: Box<Self>) {
        let _ = self.results.send(JobOutput::Computed {
            limit: self.limit,
            primes: self.primes,
        });
    }
}

pub fn count_primes(limit: u64) -> u64 {
    if limit < 3 {
        return 0;
    }
    let limit = limit as usize;
    let mut sieve = vec![true; limit];
    sieve[0] = false;
    sieve[1] = false;
    let mut i = 2;
    while i * i < limit {
        if sieve[i] {
            let mut j = i * i;
            while j < limit {
                sieve[j] = false;
                j += i;
            }
        }
        i += 1;
    }
    sieve.iter().filter(|&&p| p).count() as u64
}
