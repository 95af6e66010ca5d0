/*!
 * Core Types
 * Common types used across the engine
 */

use serde::{Deserialize, Serialize};
use std::ffi::{CStr, CString};
use std::fmt;

/// Matrix element type
pub type Element = i64;

/// A single output coordinate, the unit of parallel work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cell {
    pub row: usize,
    pub col: usize,
}

impl Cell {
    #[inline]
    pub const fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }

    /// Cell addressed by a row-major index over a `rows x rows` output
    #[inline]
    pub const fn from_index(index: usize, rows: usize) -> Self {
        Self {
            row: index / rows,
            col: index % rows,
        }
    }

    /// Flat completion-flag index (`row * rows + col`)
    #[inline]
    pub const fn index(&self, rows: usize) -> usize {
        self.row * rows + self.col
    }

    #[inline]
    pub const fn within(&self, rows: usize) -> bool {
        self.row < rows && self.col < rows
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.row, self.col)
    }
}

/// Active dimensions for one cycle
///
/// `rows` is the side of the square output, `cols` the inner dimension:
/// B is `rows x cols`, A is `cols x rows`, C = B x A is `rows x rows`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dims {
    pub rows: usize,
    pub cols: usize,
}

impl Dims {
    #[inline]
    pub const fn new(rows: usize, cols: usize) -> Self {
        Self { rows, cols }
    }

    /// Number of output cells (one worker each)
    #[inline]
    pub const fn cells(&self) -> usize {
        self.rows * self.rows
    }

    #[inline]
    pub const fn fits(&self, capacity: usize) -> bool {
        self.rows <= capacity && self.cols <= capacity
    }

    /// Multiply-add operations in one full product
    pub fn flops(&self) -> f64 {
        2.0 * self.rows as f64 * self.rows as f64 * self.cols as f64
    }

    /// Iterate every output cell in row-major order
    pub fn cells_row_major(&self) -> impl Iterator<Item = Cell> {
        let rows = self.rows;
        (0..self.cells()).map(move |index| Cell::from_index(index, rows))
    }
}

impl fmt::Display for Dims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{} (inner {})", self.rows, self.rows, self.cols)
    }
}

/// Name of a POSIX shared memory object
///
/// Kept as a `CString` so a forked child can reopen the object without
/// allocating.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionName {
    c_name: CString,
}

impl RegionName {
    /// Build a region name, adding the leading slash POSIX expects
    pub fn new(name: &str) -> Result<Self, super::errors::ValidationError> {
        let normalized = if name.starts_with('/') {
            name.to_string()
        } else {
            format!("/{}", name)
        };

        if normalized.len() < 2 || normalized[1..].contains('/') {
            return Err(super::errors::ValidationError::InvalidRegionName(
                name.to_string(),
            ));
        }

        let c_name = CString::new(normalized)
            .map_err(|_| super::errors::ValidationError::InvalidRegionName(name.to_string()))?;
        Ok(Self { c_name })
    }

    #[inline]
    pub fn as_c_str(&self) -> &CStr {
        &self.c_name
    }

    pub fn as_str(&self) -> &str {
        // Constructed from a &str, so always valid UTF-8
        self.c_name.to_str().unwrap_or("")
    }
}

impl fmt::Display for RegionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
