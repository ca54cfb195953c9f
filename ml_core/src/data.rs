use ndarray::{Array1, Array2};

use crate::{MlError, Result};

/// A supervised mini-batch: one row of `x` per sample and one target per row of `y`.
///
/// Targets are scalars: regression values, binary labels in `[0, 1]` or class
/// indices stored as `f64`, depending on the loss that consumes them.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    x: Array2<f64>,
    y: Array1<f64>,
}

impl Batch {
    /// Creates a new `Batch`.
    ///
    /// # Errors
    /// `MlError::InvalidInput` if the batch is empty, `MlError::ShapeMismatch`
    /// if `x` and `y` disagree on the number of samples.
    pub fn new(x: Array2<f64>, y: Array1<f64>) -> Result<Self> {
        if x.nrows() != y.len() {
            return Err(MlError::ShapeMismatch {
                what: "batch targets",
                got: y.len(),
                expected: x.nrows(),
            });
        }
        if x.nrows() == 0 {
            return Err(MlError::InvalidInput("batch must be non-empty"));
        }

        Ok(Self { x, y })
    }

    #[inline]
    pub fn x(&self) -> &Array2<f64> {
        &self.x
    }

    #[inline]
    pub fn y(&self) -> &Array1<f64> {
        &self.y
    }

    /// Number of samples in the batch.
    #[inline]
    pub fn len(&self) -> usize {
        self.y.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.y.is_empty()
    }

    /// Number of input features per sample.
    #[inline]
    pub fn features(&self) -> usize {
        self.x.ncols()
    }
}

/// A source of training batches for a single client.
///
/// It decides how samples are ordered and grouped; consumers only ask for the
/// next batch or for one full pass over the local data.
pub trait BatchSource: Send {
    /// Returns the next mini-batch, starting a new pass when the current one is exhausted.
    ///
    /// # Errors
    /// Returns `MlError` when no batch can be produced.
    fn next_batch(&mut self) -> Result<Batch>;

    /// Returns every local sample exactly once, grouped in batches.
    ///
    /// # Errors
    /// Returns `MlError` when no batch can be produced.
    fn full_batches(&self) -> Result<Vec<Batch>>;
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    #[test]
    fn batch_checks_sizes() {
        let b = Batch::new(array![[1.0, 2.0], [3.0, 4.0]], array![0.0, 1.0]).unwrap();
        assert_eq!(b.len(), 2);
        assert_eq!(b.features(), 2);

        assert!(matches!(
            Batch::new(array![[1.0, 2.0]], array![0.0, 1.0]),
            Err(MlError::ShapeMismatch { .. })
        ));
        assert!(matches!(
            Batch::new(Array2::zeros((0, 3)), Array1::zeros(0)),
            Err(MlError::InvalidInput(_))
        ));
    }
}
