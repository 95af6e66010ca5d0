/*!
 * Process Scheduler Tests
 * One process per cell, bounded concurrency, failure and abort paths
 *
 * Every test forks or waits for children; wait-for-any-child is
 * process-global, so they all run serially.
 */

use nix::errno::Errno;
use nix::sys::mman::{mmap_anonymous, MapFlags, ProtFlags};
use nix::sys::wait::{waitpid, WaitPidFlag};
use nix::unistd::{fork, ForkResult, Pid};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use proptest::test_runner::TestRunner;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serial_test::serial;
use shm_matmul::core::limits::{WORKER_EXIT_ATTACH_FAILED, WORKER_EXIT_COMPUTE_FAILED};
use shm_matmul::process::{ProcessResult, SchedulerConfig, WorkerExit};
use shm_matmul::{
    CancellationToken, Cell, CellWorker, Dims, ForkSpawner, Matrix, ProcessError, ProcessScheduler,
    RegionName, SharedRegion, Spawner,
};
use std::num::NonZeroUsize;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

static NEXT_REGION: AtomicUsize = AtomicUsize::new(0);

fn unique_name(tag: &str) -> RegionName {
    let n = NEXT_REGION.fetch_add(1, Ordering::Relaxed);
    RegionName::new(&format!("/shm-matmul-sched-{}-{}-{}", std::process::id(), tag, n)).unwrap()
}

fn region_with(tag: &str, a: &Matrix, b: &Matrix) -> SharedRegion<4> {
    let mut region = SharedRegion::<4>::create(&unique_name(tag)).unwrap();
    region.begin_cycle(Dims::new(b.rows(), b.cols())).unwrap();
    region.load_inputs(a, b).unwrap();
    region
}

fn scheduler(max_concurrent: usize) -> ProcessScheduler<ForkSpawner<4>> {
    ProcessScheduler::new(ForkSpawner::<4>::new(), SchedulerConfig::new(max_concurrent))
}

fn assert_no_children() {
    assert_eq!(
        waitpid(Pid::from_raw(-1), Some(WaitPidFlag::WNOHANG)),
        Err(Errno::ECHILD)
    );
}

fn square(rows: usize, cols: usize, offset: i64) -> Matrix {
    let data: Vec<Vec<i64>> = (0..rows)
        .map(|r| (0..cols).map(|c| (r * cols + c) as i64 % 5 + offset).collect())
        .collect();
    Matrix::from_rows(&data).unwrap()
}

/// Forks a child that exits with `code` for one cell, normal workers otherwise
struct FailingCell {
    fail: Cell,
    code: i32,
}

impl Spawner for FailingCell {
    fn spawn(&mut self, cell: Cell, region: &RegionName) -> ProcessResult<Pid> {
        if cell != self.fail {
            return ForkSpawner::<4>::new().spawn(cell, region);
        }
        match unsafe { fork() } {
            Ok(ForkResult::Parent { child }) => Ok(child),
            Ok(ForkResult::Child) => unsafe { libc::_exit(self.code) },
            Err(e) => Err(ProcessError::SpawnFailed {
                cell,
                reason: e.to_string(),
            }),
        }
    }

    fn kind(&self) -> &'static str {
        "failing-cell"
    }
}

/// Fails the `fail_at`-th spawn request
struct FaultInjecting {
    inner: ForkSpawner<4>,
    calls: usize,
    fail_at: usize,
}

impl Spawner for FaultInjecting {
    fn spawn(&mut self, cell: Cell, region: &RegionName) -> ProcessResult<Pid> {
        self.calls += 1;
        if self.calls == self.fail_at {
            return Err(ProcessError::SpawnFailed {
                cell,
                reason: "injected".to_string(),
            });
        }
        self.inner.spawn(cell, region)
    }

    fn kind(&self) -> &'static str {
        "fault-injecting"
    }
}

/// Live/peak worker counters in an anonymous shared mapping
struct LiveCounter {
    counters: NonNull<[AtomicUsize; 2]>,
}

impl LiveCounter {
    fn new() -> Self {
        let len = NonZeroUsize::new(std::mem::size_of::<[AtomicUsize; 2]>()).unwrap();
        let ptr = unsafe {
            mmap_anonymous(
                None,
                len,
                ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
                MapFlags::MAP_SHARED,
            )
        }
        .unwrap();
        Self {
            counters: ptr.cast(),
        }
    }

    fn live(&self) -> &AtomicUsize {
        unsafe { &self.counters.as_ref()[0] }
    }

    fn peak(&self) -> &AtomicUsize {
        unsafe { &self.counters.as_ref()[1] }
    }
}

/// Workers that record how many of them are alive at once
struct Observed {
    counter: LiveCounter,
}

impl Spawner for Observed {
    fn spawn(&mut self, cell: Cell, region: &RegionName) -> ProcessResult<Pid> {
        match unsafe { fork() } {
            Ok(ForkResult::Parent { child }) => Ok(child),
            Ok(ForkResult::Child) => {
                let live = self.counter.live().fetch_add(1, Ordering::SeqCst) + 1;
                self.counter.peak().fetch_max(live, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(5));
                let code = CellWorker::<4>::attach_and_run(region, cell);
                self.counter.live().fetch_sub(1, Ordering::SeqCst);
                unsafe { libc::_exit(code) }
            }
            Err(e) => Err(ProcessError::SpawnFailed {
                cell,
                reason: e.to_string(),
            }),
        }
    }

    fn kind(&self) -> &'static str {
        "observed"
    }
}

/// Workers that sleep before computing; cancels the token on the `cancel_at`-th spawn
struct CancelMidDispatch {
    token: CancellationToken,
    calls: usize,
    cancel_at: usize,
    sleep: Duration,
}

impl Spawner for CancelMidDispatch {
    fn spawn(&mut self, cell: Cell, region: &RegionName) -> ProcessResult<Pid> {
        self.calls += 1;
        if self.calls == self.cancel_at {
            self.token.cancel();
        }
        match unsafe { fork() } {
            Ok(ForkResult::Parent { child }) => Ok(child),
            Ok(ForkResult::Child) => {
                std::thread::sleep(self.sleep);
                let code = CellWorker::<4>::attach_and_run(region, cell);
                unsafe { libc::_exit(code) }
            }
            Err(e) => Err(ProcessError::SpawnFailed {
                cell,
                reason: e.to_string(),
            }),
        }
    }

    fn kind(&self) -> &'static str {
        "cancel-mid-dispatch"
    }
}

#[test]
#[serial]
fn test_two_by_two_product() {
    let a = Matrix::from_rows(&[vec![1, 2], vec![3, 4]]).unwrap();
    let b = Matrix::from_rows(&[vec![5, 6], vec![7, 8]]).unwrap();
    let region = region_with("2x2", &a, &b);

    let report = scheduler(100).dispatch(&region).unwrap();

    assert_eq!(report.spawned, 4);
    assert_eq!(report.reaped, 4);
    assert!(report.failures.is_empty());
    assert_eq!(
        region.output().unwrap(),
        Matrix::from_rows(&[vec![23, 34], vec![31, 46]]).unwrap()
    );
    assert_eq!(region.completed_cells().unwrap(), 4);
    assert_no_children();
}

#[test]
#[serial]
fn test_concurrency_bound_respected() {
    let a = square(3, 3, 1);
    let b = square(3, 3, 2);
    let region = region_with("bound", &a, &b);

    let mut scheduler = ProcessScheduler::new(
        Observed {
            counter: LiveCounter::new(),
        },
        SchedulerConfig::new(2),
    );
    let report = scheduler.dispatch(&region).unwrap();

    assert_eq!(report.spawned, 9);
    assert_eq!(report.reaped, 9);
    assert!(report.peak_active <= 2);
    let observed_peak = scheduler.spawner().counter.peak().load(Ordering::SeqCst);
    assert!(observed_peak >= 1 && observed_peak <= 2);
    assert_eq!(region.output().unwrap(), Matrix::product(&b, &a).unwrap());
    assert_no_children();
}

#[test]
#[serial]
fn test_single_slot_is_sequential() {
    // rows = 2, inner = 3: A is 3x2, B is 2x3
    let a = Matrix::from_rows(&[vec![1, 2], vec![3, 4], vec![5, 1]]).unwrap();
    let b = Matrix::from_rows(&[vec![2, 0, 1], vec![1, 3, 2]]).unwrap();
    let region = region_with("single", &a, &b);

    let report = scheduler(1).dispatch(&region).unwrap();

    assert_eq!(report.peak_active, 1);
    assert_eq!(region.output().unwrap(), Matrix::product(&b, &a).unwrap());
}

#[test]
#[serial]
fn test_spawn_failure_aborts_without_zombies() {
    let a = square(3, 3, 1);
    let b = square(3, 3, 1);
    let mut region = region_with("spawn-failure", &a, &b);
    let name = region.name().clone();

    let mut scheduler = ProcessScheduler::new(
        FaultInjecting {
            inner: ForkSpawner::<4>::new(),
            calls: 0,
            fail_at: 5,
        },
        SchedulerConfig::new(2),
    );
    let result = scheduler.dispatch(&region);

    assert!(matches!(result, Err(ProcessError::SpawnFailed { .. })));
    assert_eq!(scheduler.spawner().calls, 5);
    assert_no_children();

    region.destroy().unwrap();
    assert!(!SharedRegion::<4>::exists(&name));
}

#[test]
#[serial]
fn test_failed_worker_is_fatal() {
    let a = square(2, 2, 1);
    let b = square(2, 2, 3);
    let region = region_with("worker-failure", &a, &b);

    let mut scheduler = ProcessScheduler::new(
        FailingCell {
            fail: Cell::new(1, 0),
            code: WORKER_EXIT_COMPUTE_FAILED,
        },
        SchedulerConfig::new(4),
    );

    match scheduler.dispatch(&region) {
        Err(ProcessError::WorkerFailed { cell, exit, failed }) => {
            assert_eq!(cell, Cell::new(1, 0));
            assert_eq!(exit, WorkerExit::Exited(WORKER_EXIT_COMPUTE_FAILED));
            assert_eq!(failed, 1);
        }
        other => panic!("expected WorkerFailed, got {:?}", other),
    }
    assert!(!region.is_complete(Cell::new(1, 0)).unwrap());
    assert_no_children();
}

#[test]
#[serial]
fn test_attach_failure_reported() {
    let a = square(2, 2, 1);
    let b = square(2, 2, 1);
    let region = region_with("attach-failure", &a, &b);

    struct WrongName(RegionName);
    impl Spawner for WrongName {
        fn spawn(&mut self, cell: Cell, _region: &RegionName) -> ProcessResult<Pid> {
            ForkSpawner::<4>::new().spawn(cell, &self.0)
        }
        fn kind(&self) -> &'static str {
            "wrong-name"
        }
    }

    let mut scheduler = ProcessScheduler::new(
        WrongName(unique_name("absent")),
        SchedulerConfig::new(4),
    );

    match scheduler.dispatch(&region) {
        Err(ProcessError::WorkerFailed { exit, failed, .. }) => {
            assert_eq!(exit, WorkerExit::Exited(WORKER_EXIT_ATTACH_FAILED));
            assert_eq!(failed, 4);
        }
        other => panic!("expected WorkerFailed, got {:?}", other),
    }
    assert_eq!(region.completed_cells().unwrap(), 0);
}

#[test]
#[serial]
fn test_cancelled_before_dispatch() {
    let a = square(2, 2, 1);
    let b = square(2, 2, 1);
    let region = region_with("cancelled", &a, &b);

    let token = CancellationToken::new();
    token.cancel();
    let mut scheduler = scheduler(4).with_cancellation(token);

    assert!(matches!(
        scheduler.dispatch(&region),
        Err(ProcessError::Cancelled)
    ));
    assert_eq!(region.completed_cells().unwrap(), 0);
    assert_no_children();
}

#[test]
#[serial]
fn test_cancel_kills_outstanding_workers() {
    let a = square(3, 3, 1);
    let b = square(3, 3, 2);
    let mut region = region_with("cancel-mid", &a, &b);
    let name = region.name().clone();

    let token = CancellationToken::new();
    let mut scheduler = ProcessScheduler::new(
        CancelMidDispatch {
            token: token.clone(),
            calls: 0,
            cancel_at: 4,
            sleep: Duration::from_secs(5),
        },
        SchedulerConfig::new(8),
    )
    .with_cancellation(token);

    let started = Instant::now();
    let result = scheduler.dispatch(&region);

    assert!(matches!(result, Err(ProcessError::Cancelled)));
    assert_eq!(scheduler.spawner().calls, 4);
    // Sleeping workers were killed, not waited out
    assert!(started.elapsed() < Duration::from_secs(4));
    assert_no_children();
    assert_eq!(region.completed_cells().unwrap(), 0);

    region.destroy().unwrap();
    assert!(!SharedRegion::<4>::exists(&name));
}

#[test]
#[serial]
fn test_stale_values_overwritten_between_cycles() {
    let mut region = SharedRegion::<4>::create(&unique_name("stale")).unwrap();
    let mut scheduler = scheduler(3);

    let first_a = square(3, 3, 4);
    let first_b = square(3, 3, 4);
    region.begin_cycle(Dims::new(3, 3)).unwrap();
    region.load_inputs(&first_a, &first_b).unwrap();
    scheduler.dispatch(&region).unwrap();
    assert_eq!(region.output().unwrap(), Matrix::product(&first_b, &first_a).unwrap());

    let second_a = Matrix::from_rows(&[vec![1, 1], vec![1, 1]]).unwrap();
    let second_b = Matrix::from_rows(&[vec![1, 0], vec![0, 1]]).unwrap();
    region.begin_cycle(Dims::new(2, 2)).unwrap();
    region.load_inputs(&second_a, &second_b).unwrap();
    scheduler.dispatch(&region).unwrap();

    assert_eq!(region.output().unwrap(), second_a);
    assert_eq!(region.cycle().unwrap(), 2);
}

#[test]
#[serial]
fn prop_dispatch_matches_triple_loop() {
    let mut runner = TestRunner::new(ProptestConfig::with_cases(8));
    runner
        .run(&(1usize..=3, 1usize..=4, any::<u64>(), 1usize..=4), |(rows, inner, seed, max)| {
            let mut region = SharedRegion::<4>::create(&unique_name("prop")).unwrap();
            region.begin_cycle(Dims::new(rows, inner)).unwrap();
            region.fill_random(&mut StdRng::seed_from_u64(seed)).unwrap();

            scheduler(max).dispatch(&region).unwrap();

            let (a, b) = region.inputs().unwrap();
            prop_assert_eq!(region.output().unwrap(), Matrix::product(&b, &a).unwrap());
            Ok(())
        })
        .unwrap();
}
