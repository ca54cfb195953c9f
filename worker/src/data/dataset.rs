use std::ops::Range;

use ml_core::{Batch, MlError, Result};
use ndarray::{Array1, Array2, Axis, s};

/// A minimal in-memory dataset: one row of `x` per sample and one target each.
#[derive(Debug, Clone, PartialEq)]
pub struct InMemoryDataset {
    x: Array2<f64>,
    y: Array1<f64>,
}

impl InMemoryDataset {
    /// Creates a new dataset from owned buffers.
    ///
    /// # Errors
    /// `MlError::ShapeMismatch` if the row and target counts differ and
    /// `MlError::InvalidInput` if the dataset is empty.
    pub fn new(x: Array2<f64>, y: Array1<f64>) -> Result<Self> {
        if x.nrows() != y.len() {
            return Err(MlError::ShapeMismatch {
                what: "dataset targets",
                got: y.len(),
                expected: x.nrows(),
            });
        }
        if x.nrows() == 0 || x.ncols() == 0 {
            return Err(MlError::InvalidInput("dataset must be non-empty"));
        }
        Ok(Self { x, y })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.y.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.y.is_empty()
    }

    #[inline]
    pub fn features(&self) -> usize {
        self.x.ncols()
    }

    #[inline]
    pub fn x(&self) -> &Array2<f64> {
        &self.x
    }

    #[inline]
    pub fn y(&self) -> &Array1<f64> {
        &self.y
    }

    /// Copies the contiguous `range` of samples into a new dataset.
    ///
    /// # Errors
    /// `MlError::InvalidInput` if the range is empty or out of bounds.
    pub fn slice(&self, range: Range<usize>) -> Result<Self> {
        if range.start >= range.end || range.end > self.len() {
            return Err(MlError::InvalidInput("dataset slice out of bounds"));
        }
        Self::new(
            self.x.slice(s![range.clone(), ..]).to_owned(),
            self.y.slice(s![range]).to_owned(),
        )
    }

    /// Gathers the samples at `indices` into a batch.
    ///
    /// # Errors
    /// `MlError::InvalidInput` if `indices` is empty.
    ///
    /// # Panics
    /// If any index is out of bounds.
    pub fn batch(&self, indices: &[usize]) -> Result<Batch> {
        Batch::new(
            self.x.select(Axis(0), indices),
            self.y.select(Axis(0), indices),
        )
    }

    /// The whole dataset as a single batch.
    pub fn to_batch(&self) -> Result<Batch> {
        Batch::new(self.x.clone(), self.y.clone())
    }
}
