/*!
 * Worker Spawning
 *
 * "Spawn worker with parameters {cell, region name}" behind one trait so the
 * scheduler is identical for copy-on-write duplication and exec-based
 * process creation.
 */

use super::types::{ProcessError, ProcessResult};
use super::worker::CellWorker;
use crate::core::types::{Cell, RegionName};
use nix::unistd::{fork, ForkResult, Pid};
use std::path::PathBuf;
use std::process::{Command, Stdio};

/// Launches one worker process for one cell
///
/// The returned pid must be a direct child of the calling process so it can
/// be collected with wait-for-any-child.
pub trait Spawner {
    fn spawn(&mut self, cell: Cell, region: &RegionName) -> ProcessResult<Pid>;

    /// Short name for logs
    fn kind(&self) -> &'static str;
}

impl<S: Spawner + ?Sized> Spawner for Box<S> {
    fn spawn(&mut self, cell: Cell, region: &RegionName) -> ProcessResult<Pid> {
        (**self).spawn(cell, region)
    }

    fn kind(&self) -> &'static str {
        (**self).kind()
    }
}

/// Copy-on-write duplication of the launching process
///
/// The child attaches to the region by name rather than relying on the
/// inherited mapping, then leaves through `_exit` so none of the parent's
/// destructors (notably the owner's unlink) run in the child.
#[derive(Debug, Default, Clone, Copy)]
pub struct ForkSpawner<const N: usize>;

impl<const N: usize> ForkSpawner<N> {
    pub fn new() -> Self {
        Self
    }
}

impl<const N: usize> Spawner for ForkSpawner<N> {
    fn spawn(&mut self, cell: Cell, region: &RegionName) -> ProcessResult<Pid> {
        // SAFETY: the child only runs the worker (attach, compute, store) and
        // terminates with `_exit`; it never returns into the caller's frames.
        match unsafe { fork() } {
            Ok(ForkResult::Parent { child }) => Ok(child),
            Ok(ForkResult::Child) => {
                let code = CellWorker::<N>::attach_and_run(region, cell);
                // SAFETY: terminating the child without running atexit hooks
                // or destructors copied from the parent.
                unsafe { libc::_exit(code) }
            }
            Err(errno) => Err(ProcessError::SpawnFailed {
                cell,
                reason: format!("fork: {}", errno),
            }),
        }
    }

    fn kind(&self) -> &'static str {
        "fork"
    }
}

/// Exec-based creation: runs `<program> worker --region NAME --row R --col C`
#[derive(Debug, Clone)]
pub struct ExecSpawner {
    program: PathBuf,
}

impl ExecSpawner {
    pub fn new(program: PathBuf) -> Self {
        Self { program }
    }

    /// Re-run the current executable as the worker
    pub fn current_exe() -> std::io::Result<Self> {
        Ok(Self::new(std::env::current_exe()?))
    }

    pub fn program(&self) -> &PathBuf {
        &self.program
    }
}

impl Spawner for ExecSpawner {
    fn spawn(&mut self, cell: Cell, region: &RegionName) -> ProcessResult<Pid> {
        let child = Command::new(&self.program)
            .arg("worker")
            .arg("--region")
            .arg(region.as_str())
            .arg("--row")
            .arg(cell.row.to_string())
            .arg("--col")
            .arg(cell.col.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| ProcessError::SpawnFailed {
                cell,
                reason: format!("{}: {}", self.program.display(), e),
            })?;

        // Dropping `Child` neither waits nor kills; the reaper collects it
        Ok(Pid::from_raw(child.id() as i32))
    }

    fn kind(&self) -> &'static str {
        "exec"
    }
}
