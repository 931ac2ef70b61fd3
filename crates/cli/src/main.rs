mod cli;
mod payload;

use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{debug, info, warn};

use jobsys_scheduler::{load_dotenv, JobChannels, JobId, JobSystem, JobSystemConfig, WorkerConfig};

use crate::cli::CliArgs;
use crate::payload::{JobOutput, PrimeCountJob, RenderJob, RENDER_CHANNEL};

fn main() -> Result<()> {
    // Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    load_dotenv();
    let args = CliArgs::parse();
    info!(?args, "starting jobsys");

    let config = load_config(&args)?;
    let system = JobSystem::with_config(config).context("failed to start job system")?;
    info!(workers = ?system.worker_names(), "job system ready");

    run_frames(&system, &args)?;

    if args.metrics_json {
        println!("{}", serde_json::to_string_pretty(&system.metrics())?);
    }

    system.shutdown();
    Ok(())
}

fn load_config(args: &CliArgs) -> Result<JobSystemConfig> {
    let mut config = match &args.config {
        Some(path) => JobSystemConfig::from_file(path)
            .with_context(|| format!("failed to load config from {path}"))?,
        None => JobSystemConfig::from_env(),
    };

    if config.workers.is_empty() {
        for i in 0..args.workers {
            config
                .workers
                .push(WorkerConfig::new(format!("general-{i}"), JobChannels::ALL));
        }
        for i in 0..args.render_workers {
            config
                .workers
                .push(WorkerConfig::new(format!("render-{i}"), RENDER_CHANNEL));
        }
    }

    if config.workers.is_empty() {
        bail!("no workers configured; nothing would ever run");
    }
    Ok(config)
}

/// Submit a batch per frame, optionally wait on one job, then pump the reaper.
fn run_frames(system: &JobSystem, args: &CliArgs) -> Result<()> {
    let (tx, rx) = mpsc::channel();
    let started = Instant::now();
    let deadline = started + Duration::from_secs(args.timeout_secs);
    let frame_time = Duration::from_millis(args.frame_ms);
    let batch_size = args.batch_size.max(1);

    let mut submitted = 0usize;
    let mut retired = 0usize;
    let mut frame = 0u64;

    while retired < args.jobs {
        if Instant::now() >= deadline {
            bail!(
                "timed out after {:?} with {} of {} jobs retired",
                started.elapsed(),
                retired,
                args.jobs
            );
        }

        let mut first_in_frame: Option<JobId> = None;
        for _ in 0..batch_size {
            if submitted >= args.jobs {
                break;
            }
            let id = if submitted % 2 == 0 {
                system.queue_job(RenderJob::new(frame, args.render_samples, tx.clone()))
            } else {
                let limit = 10_000 + (submitted as u64 % 7) * 5_000;
                system.queue_job(PrimeCountJob::new(limit, tx.clone()))
            };
            first_in_frame.get_or_insert(id);
            submitted += 1;
        }

        // Waiting before pumping: the reaper can't have drained a job queued this frame.
        if args.sync_every > 0 && frame % args.sync_every as u64 == 0 {
            if let Some(id) = first_in_frame {
                system.finish_job_timeout(id, deadline.saturating_duration_since(Instant::now()))?;
                retired += 1;
            }
        }

        retired += system.finish_completed_jobs();
        frame += 1;
        thread::sleep(frame_time);
    }
    drop(tx);

    let mut frames_rendered = 0u64;
    let mut render_checksum = 0u64;
    let mut primes_found = 0u64;
    for output in rx.try_iter() {
        match output {
            JobOutput::Rendered { frame, checksum } => {
                frames_rendered += 1;
                render_checksum ^= checksum.rotate_left((frame % 64) as u32);
            }
            JobOutput::Computed { limit, primes } => {
                debug!(limit, primes, "compute result");
                primes_found += primes;
            }
        }
    }

    let metrics = system.metrics();
    if metrics.jobs_panicked > 0 {
        warn!(panicked = metrics.jobs_panicked, "some jobs panicked");
    }
    info!(
        frames = frame,
        jobs = retired,
        render_jobs = frames_rendered,
        render_checksum = %format!("{render_checksum:#018x}"),
        primes_found,
        elapsed = ?started.elapsed(),
        "run complete"
    );
    for worker in system.workers() {
        info!(
            worker = %worker.name,
            channels = %worker.channels,
            jobs_executed = worker.jobs_executed,
            "worker summary"
        );
    }
    Ok(())
}
