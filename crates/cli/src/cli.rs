use clap::Parser;

/// Drive the job system with a simulated frame loop.
///
/// Starts a general worker pool plus a render-only pool, submits a mix of
/// render and compute jobs a batch per frame, waits on some of them
/// synchronously and pumps the rest through the completed-job reaper.
#[derive(Parser, Debug)]
#[command(name = "jobsys", version, about)]
pub struct CliArgs {
    /// Path to a jobsys.toml config file. Its `[[workers]]` replace the default pools.
    #[arg(long, env = "JOBSYS_CONFIG")]
    pub config: Option<String>,

    /// General-purpose workers (claim every channel).
    #[arg(long, env = "JOBSYS_WORKERS", default_value_t = 4)]
    pub workers: usize,

    /// Render-only workers (claim the render channel only).
    #[arg(long, env = "JOBSYS_RENDER_WORKERS", default_value_t = 2)]
    pub render_workers: usize,

    /// Total jobs to submit.
    #[arg(long, default_value_t = 200)]
    pub jobs: usize,

    /// Jobs submitted per frame.
    #[arg(long, default_value_t = 16)]
    pub batch_size: usize,

    /// Every Nth frame, wait synchronously on that frame's first job (0 = never).
    #[arg(long, default_value_t = 4)]
    pub sync_every: usize,

    /// Simulated frame time in milliseconds.
    #[arg(long, default_value_t = 2)]
    pub frame_ms: u64,

    /// Samples each render job produces.
    #[arg(long, default_value_t = 4096)]
    pub render_samples: usize,

    /// Give up if the run has not drained after this many seconds.
    #[arg(long, default_value_t = 30)]
    pub timeout_secs: u64,

    /// Print the final metrics snapshot as JSON on stdout.
    #[arg(long)]
    pub metrics_json: bool,
}
