//! Column-restricted views of a Jacobian.

use ndarray::{s, ArrayViewMut2};

/// A window onto a block of columns of a full `n_data x n_params` Jacobian.
///
/// A child function writes its derivatives with local column indices; the
/// composite hands it a view starting at the child's parameter offset, so the
/// child never needs to know the size of the enclosing parameter space.
pub struct PartialJacobian<'a> {
    view: ArrayViewMut2<'a, f64>,
    column_offset: usize,
}

impl<'a> PartialJacobian<'a> {
    /// View over a whole Jacobian.
    pub fn new(full: ArrayViewMut2<'a, f64>) -> Self {
        Self {
            view: full,
            column_offset: 0,
        }
    }

    /// Number of data points (rows).
    pub fn n_data(&self) -> usize {
        self.view.nrows()
    }

    /// Number of parameter columns visible through this view.
    pub fn n_params(&self) -> usize {
        self.view.ncols()
    }

    /// Column of the full Jacobian that local column 0 maps to.
    pub fn column_offset(&self) -> usize {
        self.column_offset
    }

    /// Set `d f(x_i) / d p_j` for local parameter `j`.
    pub fn set(&mut self, i: usize, j: usize, value: f64) {
        self.view[[i, j]] = value;
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.view[[i, j]]
    }

    /// Narrow the view to `n` columns starting at local column `offset`.
    pub fn partial(&mut self, offset: usize, n: usize) -> PartialJacobian<'_> {
        PartialJacobian {
            view: self.view.slice_mut(s![.., offset..offset + n]),
            column_offset: self.column_offset + offset,
        }
    }

    /// Multiply every row `i` by `factors[i]`.
    pub fn scale_rows(&mut self, factors: &[f64]) {
        for (mut row, factor) in self.view.rows_mut().into_iter().zip(factors) {
            row.mapv_inplace(|v| v * factor);
        }
    }
}
