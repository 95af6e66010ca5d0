/*!
 * Shared Region Layout
 *
 * `#[repr(C)]` structure mapped identically into the launcher and every
 * worker process. A zero-filled object (fresh ftruncate) is a valid value.
 *
 * ## Access rules
 * - Header and inputs are written only through `&mut SharedRegion`, i.e. while
 *   no worker is outstanding.
 * - Output cells and completion flags are atomics: each is written by the one
 *   worker that owns the cell and read by the launcher after reaping.
 */

use crate::core::types::Element;
use std::sync::atomic::{AtomicI64, AtomicU32};

/// Region header
#[repr(C)]
#[derive(Debug)]
pub struct RegionHeader {
    pub magic: u64,
    pub capacity: u64,
    pub rows: u64,
    pub cols: u64,
    pub cycle: u64,
}

/// Full shared structure for capacity `N`
#[repr(C)]
pub struct RegionLayout<const N: usize> {
    pub header: RegionHeader,
    /// Multiplicand A, `cols x rows` active
    pub a: [[Element; N]; N],
    /// Multiplicand B, `rows x cols` active
    pub b: [[Element; N]; N],
    /// Output C = B x A, `rows x rows` active
    pub c: [[AtomicI64; N]; N],
    /// Completion flags; viewed flat and indexed by `row * rows + col`
    pub done: [[AtomicU32; N]; N],
}

impl<const N: usize> RegionLayout<N> {
    /// Exact byte size of the shared object
    pub const SIZE: usize = std::mem::size_of::<Self>();

    /// Completion flags as one flat array of `N * N` entries
    #[inline]
    pub fn flags(&self) -> &[AtomicU32] {
        self.done.as_flattened()
    }

    #[inline]
    pub fn flags_mut(&mut self) -> &mut [AtomicU32] {
        self.done.as_flattened_mut()
    }

    #[inline]
    pub fn outputs(&self) -> &[AtomicI64] {
        self.c.as_flattened()
    }

    #[inline]
    pub fn outputs_mut(&mut self) -> &mut [AtomicI64] {
        self.c.as_flattened_mut()
    }
}
