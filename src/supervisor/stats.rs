/*!
 * Run Statistics
 * Per-cycle timings and their aggregate
 */

use super::config::Strategy;
use crate::core::types::Dims;
use nix::sys::resource::{getrusage, UsageWho};
use nix::sys::time::TimeVal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};

/// Mean, population standard deviation and total of a sample set
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TimingStats {
    pub mean: f64,
    pub std_dev: f64,
    pub total: f64,
}

impl TimingStats {
    pub fn from_samples(samples: &[f64]) -> Self {
        if samples.is_empty() {
            return Self::default();
        }

        let count = samples.len() as f64;
        let total: f64 = samples.iter().sum();
        let mean = total / count;
        let variance = samples.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / count;

        Self {
            mean,
            std_dev: variance.sqrt(),
            total,
        }
    }
}

/// Timing of one cycle, in seconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CycleTiming {
    pub cycle: usize,
    pub wall_secs: f64,
    /// Launcher plus reaped-children CPU time
    pub cpu_secs: f64,
}

/// Wall and CPU clocks started together
pub struct CycleClock {
    wall: Instant,
    cpu: Duration,
}

impl CycleClock {
    pub fn start() -> Self {
        Self {
            wall: Instant::now(),
            cpu: cpu_time(),
        }
    }

    pub fn stop(&self, cycle: usize) -> CycleTiming {
        CycleTiming {
            cycle,
            wall_secs: self.wall.elapsed().as_secs_f64(),
            cpu_secs: cpu_time().saturating_sub(self.cpu).as_secs_f64(),
        }
    }
}

fn timeval(tv: TimeVal) -> Duration {
    Duration::from_secs(tv.tv_sec().max(0) as u64)
        + Duration::from_micros(tv.tv_usec().max(0) as u64)
}

/// CPU time consumed by this process and its reaped children
fn cpu_time() -> Duration {
    [UsageWho::RUSAGE_SELF, UsageWho::RUSAGE_CHILDREN]
        .into_iter()
        .filter_map(|who| getrusage(who).ok())
        .map(|usage| timeval(usage.user_time()) + timeval(usage.system_time()))
        .sum()
}

/// End-of-run summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RunSummary {
    pub dims: Dims,
    pub cycles: usize,
    pub strategy: Strategy,
    pub timings: Vec<CycleTiming>,
    pub wall: TimingStats,
    pub cpu: TimingStats,
    /// Throughput from the mean wall time
    pub gflops: f64,
}

impl RunSummary {
    pub fn new(dims: Dims, strategy: Strategy, timings: Vec<CycleTiming>) -> Self {
        let wall_samples: Vec<f64> = timings.iter().map(|t| t.wall_secs).collect();
        let cpu_samples: Vec<f64> = timings.iter().map(|t| t.cpu_secs).collect();
        let wall = TimingStats::from_samples(&wall_samples);
        let cpu = TimingStats::from_samples(&cpu_samples);
        let gflops = if wall.mean > 0.0 {
            dims.flops() / (wall.mean * 1e9)
        } else {
            0.0
        };

        Self {
            dims,
            cycles: timings.len(),
            strategy,
            timings,
            wall,
            cpu,
            gflops,
        }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- Results after {} cycles ({}) ---", self.cycles, self.strategy)?;
        writeln!(f, "Matrix:             {}", self.dims)?;
        writeln!(f, "Mean wall time:     {:.4} s", self.wall.mean)?;
        writeln!(f, "Wall std deviation: {:.4} s", self.wall.std_dev)?;
        writeln!(f, "Total wall time:    {:.4} s", self.wall.total)?;
        writeln!(f, "Mean CPU time:      {:.4} s", self.cpu.mean)?;
        writeln!(f, "CPU std deviation:  {:.4} s", self.cpu.std_dev)?;
        write!(f, "Throughput:         {:.4} GFLOP/s", self.gflops)
    }
}
