use std::collections::HashSet;
use std::env;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{JobSystemError, Result};
use crate::job::JobChannels;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key)
        .ok()
        .filter(|s| !s.is_empty())
        .and_then(|v| v.trim().parse().ok())
}

// ── Job system config ─────────────────────────────────────────

/// Job system configuration, typically parsed from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSystemConfig {
    /// History entries reserved up front. The table grows past this on demand.
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
    /// Worker sleep between empty claim attempts, in microseconds.
    #[serde(default = "default_worker_idle_sleep")]
    pub worker_idle_sleep_us: u64,
    /// Status polls `finish_job` makes (yielding between them) before it starts sleeping.
    #[serde(default = "default_finish_spin_polls")]
    pub finish_spin_polls: u32,
    /// `finish_job` sleep between status polls once spinning is over, in microseconds.
    #[serde(default = "default_finish_poll_interval")]
    pub finish_poll_interval_us: u64,
    /// Workers created by [`crate::JobSystem::with_config`].
    #[serde(default)]
    pub workers: Vec<WorkerConfig>,
}

fn default_history_capacity() -> usize { 256 * 1024 }
fn default_worker_idle_sleep() -> u64 { 1 }
fn default_finish_spin_polls() -> u32 { 64 }
fn default_finish_poll_interval() -> u64 { 50 }

impl Default for JobSystemConfig {
    fn default() -> Self {
        Self {
            history_capacity: default_history_capacity(),
            worker_idle_sleep_us: default_worker_idle_sleep(),
            finish_spin_polls: default_finish_spin_polls(),
            finish_poll_interval_us: default_finish_poll_interval(),
            workers: Vec::new(),
        }
    }
}

/// A worker thread to start with the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    pub name: String,
    #[serde(default)]
    pub channels: JobChannels,
}

impl WorkerConfig {
    pub fn new(name: impl Into<String>, channels: JobChannels) -> Self {
        Self {
            name: name.into(),
            channels,
        }
    }
}

impl JobSystemConfig {
    /// Parse config from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(toml_str)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load config from a file path.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    /// Defaults with environment overrides applied (call `load_dotenv()` first).
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    /// Override tuning knobs from `JOBSYS_*` environment variables.
    pub fn apply_env_overrides(&mut self) {
        if let Some(v) = env_parse("JOBSYS_HISTORY_CAPACITY") {
            self.history_capacity = v;
        }
        if let Some(v) = env_parse("JOBSYS_WORKER_IDLE_SLEEP_US") {
            self.worker_idle_sleep_us = v;
        }
        if let Some(v) = env_parse("JOBSYS_FINISH_SPIN_POLLS") {
            self.finish_spin_polls = v;
        }
        if let Some(v) = env_parse("JOBSYS_FINISH_POLL_INTERVAL_US") {
            self.finish_poll_interval_us = v;
        }
    }

    /// Reject empty or duplicate worker names.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for worker in &self.workers {
            if worker.name.trim().is_empty() {
                return Err(JobSystemError::Config("worker name must not be empty".into()));
            }
            if !seen.insert(worker.name.as_str()) {
                return Err(JobSystemError::Config(format!(
                    "duplicate worker name: {}",
                    worker.name
                )));
            }
            if worker.channels.is_empty() {
                tracing::warn!(worker = %worker.name, "worker has no channels and will never claim a job");
            }
        }
        Ok(())
    }

    pub fn worker_idle_sleep(&self) -> Duration {
        Duration::from_micros(self.worker_idle_sleep_us)
    }

    pub fn finish_poll_interval(&self) -> Duration {
        Duration::from_micros(self.finish_poll_interval_us)
    }
}
