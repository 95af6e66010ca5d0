/*!
 * Dense Matrix
 * Owned row-major matrix used for inputs, snapshots and the reference product
 */

use super::types::Element;
use serde::{Deserialize, Serialize};

/// Row-major dense matrix
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<Element>,
}

impl Matrix {
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0; rows * cols],
        }
    }

    /// Build from nested rows; returns `None` when rows are ragged
    pub fn from_rows(rows: &[Vec<Element>]) -> Option<Self> {
        let cols = rows.first().map(Vec::len).unwrap_or(0);
        if rows.iter().any(|row| row.len() != cols) {
            return None;
        }

        Some(Self {
            rows: rows.len(),
            cols,
            data: rows.iter().flatten().copied().collect(),
        })
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> Element {
        self.data[row * self.cols + col]
    }

    #[inline]
    pub fn set(&mut self, row: usize, col: usize, value: Element) {
        self.data[row * self.cols + col] = value;
    }

    pub fn row(&self, row: usize) -> &[Element] {
        &self.data[row * self.cols..(row + 1) * self.cols]
    }

    /// Straightforward triple-loop product `lhs x rhs`
    ///
    /// Arithmetic wraps on overflow, matching the workers' cell math.
    /// Returns `None` when the inner dimensions disagree.
    pub fn product(lhs: &Matrix, rhs: &Matrix) -> Option<Matrix> {
        if lhs.cols != rhs.rows {
            return None;
        }

        let mut out = Matrix::zeros(lhs.rows, rhs.cols);
        for i in 0..lhs.rows {
            for j in 0..rhs.cols {
                let mut sum = 0;
                for k in 0..lhs.cols {
                    sum = lhs.get(i, k).wrapping_mul(rhs.get(k, j)).wrapping_add(sum);
                }
                out.set(i, j, sum);
            }
        }
        Some(out)
    }
}
