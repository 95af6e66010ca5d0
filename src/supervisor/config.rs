/*!
 * Run Configuration
 * Validated settings for a multi-cycle run
 */

use crate::core::errors::ValidationError;
use crate::core::limits::{
    CAPACITY, DEFAULT_MAX_CONCURRENT, DEFAULT_PROGRESS_INTERVAL, DEFAULT_REGION_NAME,
    MAX_POOL_THREADS,
};
use crate::core::types::{Dims, RegionName};
use crate::process::SchedulerConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How worker processes are created
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpawnMode {
    /// Copy-on-write duplication of the launcher
    #[default]
    Fork,
    /// Re-executing the binary's worker entry point
    Exec,
}

/// Execution strategy for one cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Strategy {
    /// One OS process per output cell
    Processes { spawn: SpawnMode },
    /// Scoped threads pulling cells from a bounded queue
    Threads,
    /// Single-threaded triple loop
    Serial,
}

impl Default for Strategy {
    fn default() -> Self {
        Strategy::Processes {
            spawn: SpawnMode::Fork,
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Processes { spawn: SpawnMode::Fork } => f.write_str("processes (fork)"),
            Strategy::Processes { spawn: SpawnMode::Exec } => f.write_str("processes (exec)"),
            Strategy::Threads => f.write_str("threads"),
            Strategy::Serial => f.write_str("serial"),
        }
    }
}

/// Settings for one Supervisor run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RunConfig {
    /// Output side; B is `rows x inner`
    pub rows: usize,
    /// Inner dimension; A is `inner x rows`
    pub inner: usize,
    pub cycles: usize,
    pub max_concurrent: usize,
    pub progress_interval: usize,
    pub strategy: Strategy,
    /// Pool size for `Strategy::Threads`; CPU count when unset
    pub threads: Option<usize>,
    pub region_name: String,
    /// Seed for reproducible inputs; entropy when unset
    pub seed: Option<u64>,
    /// Compare each cycle's output against the serial product
    pub verify: bool,
}

impl RunConfig {
    pub fn new(rows: usize, inner: usize, cycles: usize) -> Self {
        Self {
            rows,
            inner,
            cycles,
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            strategy: Strategy::default(),
            threads: None,
            region_name: DEFAULT_REGION_NAME.to_string(),
            seed: None,
            verify: false,
        }
    }

    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent;
        self
    }

    pub fn with_progress_interval(mut self, interval: usize) -> Self {
        self.progress_interval = interval;
        self
    }

    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = Some(threads);
        self
    }

    pub fn with_region_name(mut self, name: impl Into<String>) -> Self {
        self.region_name = name.into();
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    pub fn dims(&self) -> Dims {
        Dims::new(self.rows, self.inner)
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig::new(self.max_concurrent).with_progress_interval(self.progress_interval)
    }

    /// Pool size actually used by the thread strategy
    pub fn pool_threads(&self) -> usize {
        self.threads
            .unwrap_or_else(|| num_cpus::get().min(MAX_POOL_THREADS))
    }

    /// Check every bound against a region of capacity `N`
    pub fn validate<const N: usize>(&self) -> Result<RegionName, ValidationError> {
        if self.rows == 0 || self.rows > N {
            return Err(ValidationError::RowsOutOfRange {
                value: self.rows,
                max: N,
            });
        }
        if self.inner == 0 || self.inner > N {
            return Err(ValidationError::InnerOutOfRange {
                value: self.inner,
                max: N,
            });
        }
        if self.cycles == 0 {
            return Err(ValidationError::ZeroCycles);
        }
        if self.max_concurrent == 0 {
            return Err(ValidationError::ZeroConcurrency);
        }
        if self.progress_interval == 0 {
            return Err(ValidationError::ZeroProgressInterval);
        }
        if self.threads == Some(0) {
            return Err(ValidationError::ZeroThreads);
        }
        let exec = matches!(
            self.strategy,
            Strategy::Processes {
                spawn: SpawnMode::Exec
            }
        );
        if exec && N != CAPACITY {
            return Err(ValidationError::ExecCapacity {
                expected: CAPACITY,
                actual: N,
            });
        }

        RegionName::new(&self.region_name)
    }
}

/// Parse a strictly positive integer, as typed by a user
pub fn parse_positive(text: &str) -> Result<usize, ValidationError> {
    match usize::from_str(text.trim()) {
        Ok(value) if value > 0 => Ok(value),
        _ => Err(ValidationError::NotANumber(text.trim().to_string())),
    }
}
