/*!
 * matmul - Main Entry Point
 *
 * `matmul run` multiplies random matrices through the shared region for a
 * number of timed cycles. `matmul worker` is the exec-based worker process.
 */

use clap::{Args, Parser, Subcommand, ValueEnum};
use miette::{IntoDiagnostic, Result};
use std::io::{self, Write};
use tracing::{info, warn};

use shm_matmul::core::limits::{
    DEFAULT_MAX_CONCURRENT, DEFAULT_PROGRESS_INTERVAL, DEFAULT_REGION_NAME,
    WORKER_EXIT_ATTACH_FAILED,
};
use shm_matmul::signals::termination_signal;
use shm_matmul::supervisor::prompt_missing;
use shm_matmul::{
    init_tracing, install_termination_handlers, Cell, CellWorker, RegionName, RunConfig, SpawnMode,
    Strategy, Supervisor, CAPACITY,
};

#[derive(Parser, Debug)]
#[command(name = "matmul")]
#[command(about = "One process per output cell over POSIX shared memory", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run timed multiplication cycles
    Run(RunArgs),
    /// Compute a single cell of an existing region (used by exec-based workers)
    #[command(hide = true)]
    Worker(WorkerArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Rows of B and side of the result (prompted when omitted)
    #[arg(long, env = "MATMUL_ROWS")]
    rows: Option<usize>,

    /// Inner dimension: columns of B, rows of A (prompted when omitted)
    #[arg(long, env = "MATMUL_INNER")]
    inner: Option<usize>,

    /// Number of timed cycles (prompted when omitted)
    #[arg(long, env = "MATMUL_CYCLES")]
    cycles: Option<usize>,

    /// Maximum simultaneously running worker processes
    #[arg(long, env = "MATMUL_MAX_CONCURRENT", default_value_t = DEFAULT_MAX_CONCURRENT)]
    max_concurrent: usize,

    /// Execution strategy
    #[arg(long, env = "MATMUL_STRATEGY", value_enum, default_value_t = StrategyArg::Processes)]
    strategy: StrategyArg,

    /// Worker creation for the processes strategy
    #[arg(long, env = "MATMUL_SPAWN", value_enum, default_value_t = SpawnArg::Fork)]
    spawn: SpawnArg,

    /// Pool size for the threads strategy (defaults to number of CPU cores)
    #[arg(short = 'j', long, env = "MATMUL_THREADS")]
    threads: Option<usize>,

    /// Seed for reproducible inputs
    #[arg(long, env = "MATMUL_SEED")]
    seed: Option<u64>,

    /// Check every cycle against a serial product
    #[arg(long, env = "MATMUL_VERIFY")]
    verify: bool,

    /// Print the summary as JSON
    #[arg(long, env = "MATMUL_JSON")]
    json: bool,

    /// Name of the shared memory object
    #[arg(long, env = "MATMUL_REGION_NAME", default_value = DEFAULT_REGION_NAME)]
    region_name: String,

    /// Log progress every this many reaped workers
    #[arg(long, env = "MATMUL_PROGRESS_INTERVAL", default_value_t = DEFAULT_PROGRESS_INTERVAL)]
    progress_interval: usize,
}

#[derive(Args, Debug)]
struct WorkerArgs {
    #[arg(long)]
    region: String,
    #[arg(long)]
    row: usize,
    #[arg(long)]
    col: usize,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum StrategyArg {
    Processes,
    Threads,
    Serial,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum SpawnArg {
    Fork,
    Exec,
}

impl RunArgs {
    fn strategy(&self) -> Strategy {
        match self.strategy {
            StrategyArg::Processes => Strategy::Processes {
                spawn: match self.spawn {
                    SpawnArg::Fork => SpawnMode::Fork,
                    SpawnArg::Exec => SpawnMode::Exec,
                },
            },
            StrategyArg::Threads => Strategy::Threads,
            StrategyArg::Serial => Strategy::Serial,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Run(args) => run(args),
        Command::Worker(args) => {
            // Never returns; the exit code is the whole result
            let cell = Cell::new(args.row, args.col);
            let code = match RegionName::new(&args.region) {
                Ok(name) => CellWorker::<CAPACITY>::attach_and_run(&name, cell),
                Err(_) => WORKER_EXIT_ATTACH_FAILED,
            };
            std::process::exit(code)
        }
    }
}

fn run(args: RunArgs) -> Result<()> {
    init_tracing();
    let cancel = install_termination_handlers().into_diagnostic()?;

    let dims = {
        let stdin = io::stdin();
        let mut input = stdin.lock();
        let mut output = io::stdout();
        prompt_missing(&mut input, &mut output, args.rows, args.inner, args.cycles)?
    };

    let mut config = RunConfig::new(dims.rows, dims.inner, dims.cycles)
        .with_max_concurrent(args.max_concurrent)
        .with_progress_interval(args.progress_interval)
        .with_strategy(args.strategy())
        .with_region_name(args.region_name.as_str())
        .with_verify(args.verify);
    if let Some(threads) = args.threads {
        config = config.with_threads(threads);
    }
    if let Some(seed) = args.seed {
        config = config.with_seed(seed);
    }

    let mut supervisor = Supervisor::<CAPACITY>::new(config)?.with_cancellation(cancel);
    info!(region = %supervisor.region_name(), "Shared region configured");

    let summary = match supervisor.run() {
        Ok(summary) => summary,
        Err(e) => {
            if e.is_cancelled() {
                warn!(signal = ?termination_signal(), "Run interrupted, shared region removed");
            }
            return Err(e.into());
        }
    };

    let mut stdout = io::stdout().lock();
    if args.json {
        let text = serde_json::to_string_pretty(&summary).into_diagnostic()?;
        writeln!(stdout, "{}", text).into_diagnostic()?;
    } else {
        writeln!(stdout, "{}", summary).into_diagnostic()?;
    }
    Ok(())
}
