//! Dense (row × layer) storage for one tracer.
//!
//! Rows are mesh nodes for concentrations and element centres for
//! velocities. Storage is a column-major `faer::Mat<f64>`, so one layer
//! is contiguous in memory.

use faer::Mat;

use crate::error::{EngineError, Result};

/// Numeric array keyed by (row, layer).
#[derive(Clone, Debug)]
pub struct Field {
    data: Mat<f64>,
}

impl Field {
    /// Zero-initialized field.
    pub fn zeros(n_rows: usize, n_layers: usize) -> Self {
        Self {
            data: Mat::zeros(n_rows, n_layers),
        }
    }

    /// Field filled with a constant.
    pub fn constant(n_rows: usize, n_layers: usize, value: f64) -> Self {
        let mut field = Self::zeros(n_rows, n_layers);
        field.fill(value);
        field
    }

    /// Field from a generator `f(row, layer)`.
    pub fn from_fn(n_rows: usize, n_layers: usize, mut f: impl FnMut(usize, usize) -> f64) -> Self {
        let mut field = Self::zeros(n_rows, n_layers);
        for k in 0..n_layers {
            for i in 0..n_rows {
                field.data[(i, k)] = f(i, k);
            }
        }
        field
    }

    /// Field where every layer of row `i` equals `values[i]`.
    pub fn from_rows(values: &[f64], n_layers: usize) -> Self {
        Self::from_fn(values.len(), n_layers, |i, _| values[i])
    }

    /// Number of rows (nodes or elements).
    #[inline]
    pub fn n_rows(&self) -> usize {
        self.data.nrows()
    }

    /// Number of layers.
    #[inline]
    pub fn n_layers(&self) -> usize {
        self.data.ncols()
    }

    /// Check that the shape matches, naming the field in the error.
    pub fn check_shape(&self, what: &str, n_rows: usize, n_layers: usize) -> Result<()> {
        if self.n_rows() != n_rows || self.n_layers() != n_layers {
            return Err(EngineError::dimension_mismatch(
                what,
                format!("{n_rows}×{n_layers}"),
                format!("{}×{}", self.n_rows(), self.n_layers()),
            ));
        }
        Ok(())
    }

    /// Value at (row, layer).
    #[inline]
    pub fn get(&self, row: usize, layer: usize) -> f64 {
        self.data[(row, layer)]
    }

    /// Set value at (row, layer).
    #[inline]
    pub fn set(&mut self, row: usize, layer: usize, value: f64) {
        self.data[(row, layer)] = value;
    }

    /// Add to value at (row, layer).
    #[inline]
    pub fn add(&mut self, row: usize, layer: usize, value: f64) {
        self.data[(row, layer)] += value;
    }

    /// Values of one row from surface to bed.
    pub fn column(&self, row: usize) -> Vec<f64> {
        (0..self.n_layers()).map(|k| self.data[(row, k)]).collect()
    }

    /// Overwrite one row from surface to bed.
    pub fn set_column(&mut self, row: usize, values: &[f64]) {
        for (k, &v) in values.iter().enumerate() {
            self.data[(row, k)] = v;
        }
    }

    /// Values of one layer for every row.
    pub fn layer(&self, layer: usize) -> Vec<f64> {
        (0..self.n_rows()).map(|i| self.data[(i, layer)]).collect()
    }

    /// Underlying matrix.
    pub fn as_mat(&self) -> &Mat<f64> {
        &self.data
    }

    /// Fill with a constant.
    pub fn fill(&mut self, value: f64) {
        self.map_inplace(|_| value);
    }

    /// Apply `f` to every value.
    pub fn map_inplace(&mut self, mut f: impl FnMut(f64) -> f64) {
        for k in 0..self.n_layers() {
            for i in 0..self.n_rows() {
                self.data[(i, k)] = f(self.data[(i, k)]);
            }
        }
    }

    /// Elementwise `self <- f(self, other)`.
    pub fn zip_apply(&mut self, other: &Field, mut f: impl FnMut(f64, f64) -> f64) {
        debug_assert_eq!(self.n_rows(), other.n_rows());
        debug_assert_eq!(self.n_layers(), other.n_layers());
        for k in 0..self.n_layers() {
            for i in 0..self.n_rows() {
                self.data[(i, k)] = f(self.data[(i, k)], other.data[(i, k)]);
            }
        }
    }

    /// Iterate over (row, layer, value).
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, f64)> + '_ {
        (0..self.n_layers())
            .flat_map(move |k| (0..self.n_rows()).map(move |i| (i, k, self.data[(i, k)])))
    }

    /// Minimum value.
    pub fn min(&self) -> f64 {
        self.iter().map(|(_, _, v)| v).fold(f64::INFINITY, f64::min)
    }

    /// Maximum value.
    pub fn max(&self) -> f64 {
        self.iter().map(|(_, _, v)| v).fold(f64::NEG_INFINITY, f64::max)
    }

    /// Sum of all values.
    pub fn sum(&self) -> f64 {
        self.iter().map(|(_, _, v)| v).sum()
    }

    /// Location of the first NaN or infinite value.
    pub fn first_non_finite(&self) -> Option<(usize, usize)> {
        self.iter()
            .find(|(_, _, v)| !v.is_finite())
            .map(|(i, k, _)| (i, k))
    }

    /// Clip negative values to zero, returning (count, most negative value).
    pub fn clip_negative(&mut self) -> (usize, f64) {
        let mut count = 0;
        let mut min = 0.0_f64;
        self.map_inplace(|v| {
            if v < 0.0 {
                count += 1;
                min = min.min(v);
                0.0
            } else {
                v
            }
        });
        (count, min)
    }

    /// Scale all values: self <- c * self
    pub fn scale(&mut self, c: f64) {
        self.map_inplace(|v| c * v);
    }

    /// Add a scaled field: self <- self + c * other
    pub fn axpy(&mut self, c: f64, other: &Field) {
        self.zip_apply(other, |a, b| a + c * b);
    }
}

impl std::ops::Index<(usize, usize)> for Field {
    type Output = f64;

    #[inline]
    fn index(&self, (row, layer): (usize, usize)) -> &f64 {
        &self.data[(row, layer)]
    }
}

impl std::ops::IndexMut<(usize, usize)> for Field {
    #[inline]
    fn index_mut(&mut self, (row, layer): (usize, usize)) -> &mut f64 {
        &mut self.data[(row, layer)]
    }
}
