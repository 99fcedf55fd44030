//! Run configuration read from the environment.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::pipeline::{DEFAULT_POLL_INTERVAL_MS, WorkerPoolConfig, default_worker_program};
use crate::{Error, Result, hardware};

pub const ENV_MODE: &str = "RASTER_BATCH_MODE";
pub const ENV_MAX_CONCURRENCY: &str = "RASTER_BATCH_MAX_CONCURRENCY";
pub const ENV_CALL_DELAY_MS: &str = "RASTER_BATCH_CALL_DELAY_MS";
pub const ENV_POLL_INTERVAL_MS: &str = "RASTER_BATCH_POLL_INTERVAL_MS";
pub const ENV_WORKER: &str = "RASTER_BATCH_WORKER";
pub const ENV_TOOLKIT: &str = "RASTER_BATCH_TOOLKIT";
pub const ENV_LOG_DIR: &str = "RASTER_BATCH_LOG_DIR";

/// Default toolkit executable.
pub const DEFAULT_TOOLKIT_PROGRAM: &str = "raster-tool";

/// Where a unit's pipeline runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// One dispatcher thread per unit, pipeline in-process.
    #[default]
    Thread,
    /// One dispatcher thread per unit supervising a child worker process.
    Process,
}

impl FromStr for ExecutionMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "thread" => Ok(ExecutionMode::Thread),
            "process" => Ok(ExecutionMode::Process),
            other => Err(Error::config(format!(
                "{ENV_MODE} must be 'thread' or 'process', got '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchConfig {
    pub mode: ExecutionMode,
    /// Overrides the hardware-derived ceiling when set.
    pub max_concurrency: Option<usize>,
    pub call_delay_ms: u64,
    pub poll_interval_ms: u64,
    pub worker_program: PathBuf,
    pub toolkit_program: PathBuf,
    pub log_dir: PathBuf,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::default(),
            max_concurrency: None,
            call_delay_ms: 500,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            worker_program: default_worker_program(),
            toolkit_program: PathBuf::from(DEFAULT_TOOLKIT_PROGRAM),
            log_dir: PathBuf::from("logs"),
        }
    }
}

impl BatchConfig {
    /// Read the configuration from process environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the configuration through `lookup`, falling back to defaults for
    /// unset or blank keys.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let mode = get(ENV_MODE)
            .map(|v| v.parse())
            .transpose()?
            .unwrap_or(defaults.mode);

        let max_concurrency = get(ENV_MAX_CONCURRENCY)
            .map(|v| parse_number::<usize>(ENV_MAX_CONCURRENCY, &v))
            .transpose()?;
        if max_concurrency == Some(0) {
            return Err(Error::config(format!("{ENV_MAX_CONCURRENCY} must be at least 1")));
        }

        let call_delay_ms = get(ENV_CALL_DELAY_MS)
            .map(|v| parse_number(ENV_CALL_DELAY_MS, &v))
            .transpose()?
            .unwrap_or(defaults.call_delay_ms);

        let poll_interval_ms = get(ENV_POLL_INTERVAL_MS)
            .map(|v| parse_number(ENV_POLL_INTERVAL_MS, &v))
            .transpose()?
            .unwrap_or(defaults.poll_interval_ms);
        if poll_interval_ms == 0 {
            return Err(Error::config(format!("{ENV_POLL_INTERVAL_MS} must be at least 1")));
        }

        Ok(Self {
            mode,
            max_concurrency,
            call_delay_ms,
            poll_interval_ms,
            worker_program: get(ENV_WORKER)
                .map(PathBuf::from)
                .unwrap_or(defaults.worker_program),
            toolkit_program: get(ENV_TOOLKIT)
                .map(PathBuf::from)
                .unwrap_or(defaults.toolkit_program),
            log_dir: get(ENV_LOG_DIR).map(PathBuf::from).unwrap_or(defaults.log_dir),
        })
    }

    pub fn call_delay(&self) -> Duration {
        Duration::from_millis(self.call_delay_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Pool settings, detecting the core count unless overridden.
    pub fn pool_config(&self) -> WorkerPoolConfig {
        WorkerPoolConfig {
            max_concurrency: self
                .max_concurrency
                .unwrap_or_else(hardware::detect_max_concurrency),
            poll_interval_ms: self.poll_interval_ms,
        }
    }
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| Error::config(format!("{key}: invalid value '{value}': {e}")))
}
