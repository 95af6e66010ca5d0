/*!
 * Shared Region
 *
 * Named POSIX shared memory object holding both multiplicands, the output
 * grid, the active dimensions and the per-cell completion flags.
 *
 * The launching process `create`s the region and owns its name: dropping or
 * `destroy`ing the owner unmaps and unlinks it. Worker processes `attach` by
 * name and only unmap on drop.
 */

use super::layout::{RegionHeader, RegionLayout};
use super::types::{ShmError, ShmResult};
use crate::core::limits::{INPUT_MAX, INPUT_MIN, REGION_MAGIC, REGION_MODE};
use crate::core::matrix::Matrix;
use crate::core::types::{Cell, Dims, Element, RegionName};
use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::sys::mman::{mmap, munmap, shm_open, shm_unlink, MapFlags, ProtFlags};
use nix::sys::stat::Mode;
use nix::unistd::ftruncate;
use rand::Rng;
use std::ffi::c_void;
use std::fs::File;
use std::num::NonZeroUsize;
use std::os::fd::OwnedFd;
use std::ptr::NonNull;
use std::sync::atomic::Ordering;
use tracing::{debug, error, info, warn};

/// How this process holds the region
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionRole {
    /// Created the object; unlinks it on destroy
    Owner,
    /// Attached to an existing object; only unmaps
    Attached,
}

/// Scoped handle to the mapped region
pub struct SharedRegion<const N: usize> {
    name: RegionName,
    role: RegionRole,
    mapping: Option<NonNull<RegionLayout<N>>>,
    unlinked: bool,
}

// SAFETY: fields mutated concurrently by several processes or threads are
// atomics; everything else is mutated only through `&mut self`.
unsafe impl<const N: usize> Send for SharedRegion<N> {}
unsafe impl<const N: usize> Sync for SharedRegion<N> {}

impl<const N: usize> SharedRegion<N> {
    pub const CAPACITY: usize = N;

    fn region_len(name: &RegionName) -> ShmResult<NonZeroUsize> {
        NonZeroUsize::new(RegionLayout::<N>::SIZE).ok_or_else(|| ShmError::LayoutMismatch {
            name: name.to_string(),
            reason: "zero-sized layout".to_string(),
        })
    }

    /// Create, size and map a fresh named object
    ///
    /// Any partial allocation is unlinked before an error is returned.
    pub fn create(name: &RegionName) -> ShmResult<Self> {
        let len = Self::region_len(name)?;
        let fd = Self::open_exclusive(name)?;

        if let Err(source) = ftruncate(&fd, len.get() as libc::off_t) {
            let _ = shm_unlink(name.as_c_str());
            return Err(ShmError::Size {
                name: name.to_string(),
                size: len.get(),
                source,
            });
        }

        let mapping = match Self::map(&fd, len) {
            Ok(mapping) => mapping,
            Err(source) => {
                let _ = shm_unlink(name.as_c_str());
                return Err(ShmError::Map {
                    name: name.to_string(),
                    source,
                });
            }
        };
        drop(fd);

        let mut region = Self {
            name: name.clone(),
            role: RegionRole::Owner,
            mapping: Some(mapping),
            unlinked: false,
        };

        if let Some(layout) = region.layout_mut() {
            layout.header = RegionHeader {
                magic: REGION_MAGIC,
                capacity: N as u64,
                rows: 0,
                cols: 0,
                cycle: 0,
            };
        }

        info!(
            name = %name,
            capacity = N,
            bytes = len.get(),
            "Shared region created"
        );
        Ok(region)
    }

    /// Open the named object created by the launching process and map it
    pub fn attach(name: &RegionName) -> ShmResult<Self> {
        let fd = match shm_open(name.as_c_str(), OFlag::O_RDWR, Mode::empty()) {
            Ok(fd) => fd,
            Err(Errno::ENOENT) => return Err(ShmError::NotFound(name.to_string())),
            Err(source) => {
                return Err(ShmError::Open {
                    name: name.to_string(),
                    source,
                })
            }
        };

        let file = File::from(fd);
        let actual = file
            .metadata()
            .map_err(|source| ShmError::Inspect {
                name: name.to_string(),
                source,
            })?
            .len() as usize;

        let len = Self::region_len(name)?;
        if actual != len.get() {
            return Err(ShmError::LayoutMismatch {
                name: name.to_string(),
                reason: format!("object is {} bytes, expected {}", actual, len.get()),
            });
        }

        let mapping = Self::map(&file, len).map_err(|source| ShmError::Map {
            name: name.to_string(),
            source,
        })?;

        let region = Self {
            name: name.clone(),
            role: RegionRole::Attached,
            mapping: Some(mapping),
            unlinked: false,
        };

        let header = &region.layout()?.header;
        if header.magic != REGION_MAGIC || header.capacity != N as u64 {
            let reason = format!(
                "header magic {:#x} capacity {}, expected capacity {}",
                header.magic, header.capacity, N
            );
            return Err(ShmError::LayoutMismatch {
                name: name.to_string(),
                reason,
            });
        }

        Ok(region)
    }

    /// Whether a shared memory object with this name currently exists
    pub fn exists(name: &RegionName) -> bool {
        match shm_open(name.as_c_str(), OFlag::O_RDONLY, Mode::empty()) {
            Ok(_) => true,
            Err(Errno::ENOENT) => false,
            Err(_) => true,
        }
    }

    /// Unmap, and unlink when owner. Calling again is a no-op.
    pub fn destroy(&mut self) -> ShmResult<()> {
        if let Some(mapping) = self.mapping.take() {
            let len = Self::region_len(&self.name)?;
            // SAFETY: mapping came from mmap with exactly this length and is
            // taken out of `self`, so no reference into it outlives this call.
            unsafe { munmap(mapping.cast::<c_void>(), len.get()) }.map_err(|source| {
                ShmError::Unmap {
                    name: self.name.to_string(),
                    source,
                }
            })?;
        }

        if self.role == RegionRole::Owner && !self.unlinked {
            self.unlinked = true;
            match shm_unlink(self.name.as_c_str()) {
                Ok(()) | Err(Errno::ENOENT) => {
                    info!(name = %self.name, "Shared region destroyed");
                }
                Err(source) => {
                    return Err(ShmError::Unlink {
                        name: self.name.to_string(),
                        source,
                    })
                }
            }
        }

        Ok(())
    }

    pub fn name(&self) -> &RegionName {
        &self.name
    }

    pub fn role(&self) -> RegionRole {
        self.role
    }

    pub fn is_mapped(&self) -> bool {
        self.mapping.is_some()
    }

    /// Active dimensions of the current cycle
    pub fn dims(&self) -> ShmResult<Dims> {
        let header = &self.layout()?.header;
        Ok(Dims::new(header.rows as usize, header.cols as usize))
    }

    /// Number of cycles begun on this region
    pub fn cycle(&self) -> ShmResult<u64> {
        Ok(self.layout()?.header.cycle)
    }

    /// Reinitialize for a new cycle: set dimensions, clear flags and outputs
    ///
    /// Must run before any worker of the cycle is dispatched; `&mut self`
    /// guarantees no dispatch is in progress.
    pub fn begin_cycle(&mut self, dims: Dims) -> ShmResult<()> {
        if dims.rows == 0 || dims.cols == 0 || !dims.fits(N) {
            return Err(ShmError::DimensionsExceedCapacity { dims, capacity: N });
        }

        let name = self.name.to_string();
        let layout = self.layout_mut().ok_or(ShmError::Detached(name))?;
        layout.header.rows = dims.rows as u64;
        layout.header.cols = dims.cols as u64;
        layout.header.cycle += 1;

        for flag in layout.flags_mut() {
            *flag.get_mut() = 0;
        }
        for value in layout.outputs_mut() {
            *value.get_mut() = 0;
        }

        debug!(cycle = layout.header.cycle, dims = %dims, "Cycle initialized");
        Ok(())
    }

    /// Fill the active part of A and B with uniform values in the input range
    pub fn fill_random<R: Rng>(&mut self, rng: &mut R) -> ShmResult<()> {
        let dims = self.dims()?;
        let name = self.name.to_string();
        let layout = self.layout_mut().ok_or(ShmError::Detached(name))?;

        for k in 0..dims.cols {
            for col in 0..dims.rows {
                layout.a[k][col] = rng.gen_range(INPUT_MIN..=INPUT_MAX);
            }
        }
        for row in 0..dims.rows {
            for k in 0..dims.cols {
                layout.b[row][k] = rng.gen_range(INPUT_MIN..=INPUT_MAX);
            }
        }
        Ok(())
    }

    /// Copy explicit inputs into the region
    ///
    /// `a` must be `cols x rows` and `b` must be `rows x cols` for the
    /// current cycle's dimensions.
    pub fn load_inputs(&mut self, a: &Matrix, b: &Matrix) -> ShmResult<()> {
        let dims = self.dims()?;
        if a.rows() != dims.cols || a.cols() != dims.rows {
            return Err(self.shape_mismatch("A", a, dims.cols, dims.rows));
        }
        if b.rows() != dims.rows || b.cols() != dims.cols {
            return Err(self.shape_mismatch("B", b, dims.rows, dims.cols));
        }

        let name = self.name.to_string();
        let layout = self.layout_mut().ok_or(ShmError::Detached(name))?;
        for k in 0..dims.cols {
            layout.a[k][..dims.rows].copy_from_slice(a.row(k));
        }
        for row in 0..dims.rows {
            layout.b[row][..dims.cols].copy_from_slice(b.row(row));
        }
        Ok(())
    }

    fn shape_mismatch(&self, which: &str, m: &Matrix, rows: usize, cols: usize) -> ShmError {
        ShmError::LayoutMismatch {
            name: self.name.to_string(),
            reason: format!(
                "input {} is {}x{}, cycle expects {}x{}",
                which,
                m.rows(),
                m.cols(),
                rows,
                cols
            ),
        }
    }

    /// Dot product of B's row and A's column for one output cell
    ///
    /// Wraps on overflow; `load_inputs` accepts the full `i64` range.
    pub fn compute_cell(&self, cell: Cell) -> ShmResult<Element> {
        let layout = self.layout()?;
        let dims = self.dims()?;
        if !cell.within(dims.rows) {
            return Err(ShmError::CellOutOfRange {
                cell,
                rows: dims.rows,
            });
        }

        let b_row = &layout.b[cell.row];
        Ok((0..dims.cols).fold(0, |sum: Element, k| {
            b_row[k].wrapping_mul(layout.a[k][cell.col]).wrapping_add(sum)
        }))
    }

    /// Publish one output cell and mark it complete
    pub fn store_cell(&self, cell: Cell, value: Element) -> ShmResult<()> {
        let layout = self.layout()?;
        let rows = layout.header.rows as usize;
        if !cell.within(rows) {
            return Err(ShmError::CellOutOfRange { cell, rows });
        }

        layout.c[cell.row][cell.col].store(value, Ordering::Relaxed);
        layout.flags()[cell.index(rows)].store(1, Ordering::Release);
        Ok(())
    }

    pub fn is_complete(&self, cell: Cell) -> ShmResult<bool> {
        let layout = self.layout()?;
        let rows = layout.header.rows as usize;
        if !cell.within(rows) {
            return Err(ShmError::CellOutOfRange { cell, rows });
        }
        Ok(layout.flags()[cell.index(rows)].load(Ordering::Acquire) != 0)
    }

    /// Count of set completion flags among the active `rows * rows`
    pub fn completed_cells(&self) -> ShmResult<usize> {
        let layout = self.layout()?;
        let total = self.dims()?.cells();
        Ok(layout.flags()[..total]
            .iter()
            .filter(|flag| flag.load(Ordering::Acquire) != 0)
            .count())
    }

    /// Cells whose completion flag is still clear, in row-major order
    pub fn missing_cells(&self) -> ShmResult<Vec<Cell>> {
        let dims = self.dims()?;
        let layout = self.layout()?;
        Ok(dims
            .cells_row_major()
            .filter(|cell| layout.flags()[cell.index(dims.rows)].load(Ordering::Acquire) == 0)
            .collect())
    }

    /// Snapshot of the active `rows x rows` output
    pub fn output(&self) -> ShmResult<Matrix> {
        let layout = self.layout()?;
        let dims = self.dims()?;
        let mut out = Matrix::zeros(dims.rows, dims.rows);
        for row in 0..dims.rows {
            for col in 0..dims.rows {
                out.set(row, col, layout.c[row][col].load(Ordering::Acquire));
            }
        }
        Ok(out)
    }

    /// Snapshot of the active inputs as `(A, B)`
    pub fn inputs(&self) -> ShmResult<(Matrix, Matrix)> {
        let layout = self.layout()?;
        let dims = self.dims()?;

        let mut a = Matrix::zeros(dims.cols, dims.rows);
        for k in 0..dims.cols {
            for col in 0..dims.rows {
                a.set(k, col, layout.a[k][col]);
            }
        }

        let mut b = Matrix::zeros(dims.rows, dims.cols);
        for row in 0..dims.rows {
            for k in 0..dims.cols {
                b.set(row, k, layout.b[row][k]);
            }
        }
        Ok((a, b))
    }

    pub(crate) fn layout(&self) -> ShmResult<&RegionLayout<N>> {
        match self.mapping {
            // SAFETY: the mapping is live for as long as it is held in `self`
            // and spans exactly `RegionLayout::<N>::SIZE` bytes.
            Some(ptr) => Ok(unsafe { ptr.as_ref() }),
            None => Err(ShmError::Detached(self.name.to_string())),
        }
    }

    fn layout_mut(&mut self) -> Option<&mut RegionLayout<N>> {
        // SAFETY: as `layout`, and `&mut self` excludes other users in this
        // process; no worker is outstanding while `&mut self` is held.
        self.mapping.map(|mut ptr| unsafe { ptr.as_mut() })
    }

    fn open_exclusive(name: &RegionName) -> ShmResult<OwnedFd> {
        let flags = OFlag::O_CREAT | OFlag::O_EXCL | OFlag::O_RDWR;
        let mode = Mode::from_bits_truncate(REGION_MODE as _);

        match shm_open(name.as_c_str(), flags, mode) {
            Ok(fd) => Ok(fd),
            Err(Errno::EEXIST) => {
                warn!(name = %name, "Removing stale shared region left by an earlier run");
                let _ = shm_unlink(name.as_c_str());
                shm_open(name.as_c_str(), flags, mode).map_err(|source| ShmError::Create {
                    name: name.to_string(),
                    source,
                })
            }
            Err(source) => Err(ShmError::Create {
                name: name.to_string(),
                source,
            }),
        }
    }

    fn map<F: std::os::fd::AsFd>(
        fd: F,
        len: NonZeroUsize,
    ) -> nix::Result<NonNull<RegionLayout<N>>> {
        // SAFETY: a fresh MAP_SHARED mapping of a sized object; the returned
        // address is page aligned, which satisfies the layout's alignment.
        let ptr = unsafe {
            mmap(
                None,
                len,
                ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
                MapFlags::MAP_SHARED,
                fd,
                0,
            )
        }?;
        Ok(ptr.cast::<RegionLayout<N>>())
    }
}

impl<const N: usize> Drop for SharedRegion<N> {
    fn drop(&mut self) {
        if let Err(e) = self.destroy() {
            error!(name = %self.name, error = %e, "Shared region teardown failed");
        }
    }
}

impl<const N: usize> std::fmt::Debug for SharedRegion<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedRegion")
            .field("name", &self.name)
            .field("capacity", &N)
            .field("role", &self.role)
            .field("mapped", &self.mapping.is_some())
            .finish()
    }
}
