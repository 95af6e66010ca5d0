/*!
 * Supervisor
 *
 * Orchestrates timed cycles: reinitialize the region, draw fresh inputs,
 * run the selected strategy to completion, record timings, aggregate.
 * The region is created once per run and torn down on every exit path.
 */

use super::config::{RunConfig, SpawnMode, Strategy};
use super::stats::{CycleClock, CycleTiming, RunSummary};
use crate::core::errors::{MatmulError, MatmulResult};
use crate::core::limits::CYCLE_LOG_INTERVAL;
use crate::core::matrix::Matrix;
use crate::core::types::{Cell, RegionName};
use crate::monitoring::span_cycle;
use crate::pool::ThreadPoolExecutor;
use crate::process::{CellWorker, ExecSpawner, ForkSpawner, ProcessScheduler, Spawner};
use crate::shm::{SharedRegion, ShmError};
use crate::signals::CancellationToken;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, error, info};

/// Strategy bound to its runtime state
enum CycleExecutor<const N: usize> {
    Processes(ProcessScheduler<Box<dyn Spawner>>),
    Threads(ThreadPoolExecutor),
    Serial,
}

impl<const N: usize> CycleExecutor<N> {
    fn execute(&mut self, region: &SharedRegion<N>) -> MatmulResult<()> {
        match self {
            CycleExecutor::Processes(scheduler) => {
                scheduler.dispatch(region)?;
            }
            CycleExecutor::Threads(pool) => {
                pool.run(region)?;
            }
            CycleExecutor::Serial => {
                for cell in region.dims()?.cells_row_major() {
                    CellWorker::new(region, cell).run()?;
                }
            }
        }
        Ok(())
    }
}

/// Runs `cycles` timed multiplications on a region of capacity `N`
pub struct Supervisor<const N: usize> {
    config: RunConfig,
    region_name: RegionName,
    cancel: CancellationToken,
    rng: StdRng,
}

impl<const N: usize> Supervisor<N> {
    /// Validate the configuration; no resource is created yet
    pub fn new(config: RunConfig) -> MatmulResult<Self> {
        let region_name = config.validate::<N>()?;
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Ok(Self {
            config,
            region_name,
            cancel: CancellationToken::new(),
            rng,
        })
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn region_name(&self) -> &RegionName {
        &self.region_name
    }

    /// Run every cycle and aggregate timings
    pub fn run(&mut self) -> MatmulResult<RunSummary> {
        self.run_with(|_, _| Ok(()))
    }

    /// As `run`, calling `inspect` with each completed cycle's region
    pub fn run_with<F>(&mut self, inspect: F) -> MatmulResult<RunSummary>
    where
        F: FnMut(usize, &SharedRegion<N>) -> MatmulResult<()>,
    {
        let mut region = SharedRegion::<N>::create(&self.region_name)?;
        let result = self.run_cycles(&mut region, inspect);

        match (result, region.destroy()) {
            (Ok(summary), Ok(())) => Ok(summary),
            (Ok(_), Err(teardown)) => Err(teardown.into()),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(teardown)) => {
                error!(error = %teardown, "Shared region teardown failed after error");
                Err(e)
            }
        }
    }

    fn run_cycles<F>(
        &mut self,
        region: &mut SharedRegion<N>,
        mut inspect: F,
    ) -> MatmulResult<RunSummary>
    where
        F: FnMut(usize, &SharedRegion<N>) -> MatmulResult<()>,
    {
        let dims = self.config.dims();
        let cycles = self.config.cycles;
        let mut executor = self.build_executor()?;
        let mut timings: Vec<CycleTiming> = Vec::with_capacity(cycles);

        info!(
            dims = %dims,
            cycles,
            strategy = %self.config.strategy,
            "Starting run"
        );

        for cycle in 0..cycles {
            if self.cancel.is_cancelled() {
                return Err(MatmulError::Cancelled);
            }
            if cycle % CYCLE_LOG_INTERVAL == 0 {
                info!("Cycle {}/{}...", cycle + 1, cycles);
            }

            let span = span_cycle(cycle, dims);
            let _entered = span.enter();
            let clock = CycleClock::start();
            region.begin_cycle(dims)?;
            region.fill_random(&mut self.rng)?;
            executor.execute(&*region)?;
            let timing = clock.stop(cycle);

            if self.config.verify {
                verify_output(&*region)?;
            }
            inspect(cycle, &*region)?;

            debug!(
                cycle,
                wall_secs = timing.wall_secs,
                cpu_secs = timing.cpu_secs,
                "Cycle complete"
            );
            timings.push(timing);
        }

        let summary = RunSummary::new(dims, self.config.strategy, timings);
        info!(
            mean_secs = summary.wall.mean,
            std_dev_secs = summary.wall.std_dev,
            gflops = summary.gflops,
            "Run complete"
        );
        Ok(summary)
    }

    fn build_executor(&self) -> MatmulResult<CycleExecutor<N>> {
        Ok(match self.config.strategy {
            Strategy::Processes { spawn } => {
                let spawner: Box<dyn Spawner> = match spawn {
                    SpawnMode::Fork => Box::new(ForkSpawner::<N>::new()),
                    SpawnMode::Exec => Box::new(ExecSpawner::current_exe()?),
                };
                CycleExecutor::Processes(
                    ProcessScheduler::new(spawner, self.config.scheduler_config())
                        .with_cancellation(self.cancel.clone()),
                )
            }
            Strategy::Threads => CycleExecutor::Threads(
                ThreadPoolExecutor::new(self.config.pool_threads())
                    .with_cancellation(self.cancel.clone()),
            ),
            Strategy::Serial => CycleExecutor::Serial,
        })
    }
}

/// Compare the region's output against the serial product of its inputs
pub fn verify_output<const N: usize>(region: &SharedRegion<N>) -> MatmulResult<()> {
    let (a, b) = region.inputs()?;
    let actual = region.output()?;
    let Some(expected) = Matrix::product(&b, &a) else {
        return Err(ShmError::LayoutMismatch {
            name: region.name().to_string(),
            reason: "input shapes disagree".to_string(),
        }
        .into());
    };

    for row in 0..expected.rows() {
        for col in 0..expected.cols() {
            if expected.get(row, col) != actual.get(row, col) {
                return Err(MatmulError::VerificationFailed {
                    cell: Cell::new(row, col),
                    expected: expected.get(row, col),
                    actual: actual.get(row, col),
                });
            }
        }
    }
    Ok(())
}
