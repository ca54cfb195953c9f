use ml_core::{ParameterLayout, ParameterSet, Result};
use ndarray::{Array1, ArrayD, ArrayView1};

/// Per-tensor shadow of the model parameters holding the latest committed
/// Newton direction.
///
/// The store is only ever written as a whole: a commit either replaces every
/// tensor or leaves the previous direction in place.
#[derive(Debug, Clone, PartialEq)]
pub struct DirectionStore {
    direction: ParameterSet,
}

impl DirectionStore {
    /// Creates a zero direction shaped like `layout`.
    pub fn new(layout: &ParameterLayout) -> Self {
        Self {
            direction: ParameterSet::zeros(layout),
        }
    }

    #[inline]
    pub fn layout(&self) -> &ParameterLayout {
        self.direction.layout()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.direction.num_params()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The stored direction as one flat vector, in layout order.
    pub fn flatten(&self) -> Array1<f64> {
        self.direction.flatten()
    }

    /// Replaces the stored direction with `flat`.
    ///
    /// # Errors
    /// `MlError::ShapeMismatch` if `flat` does not have one entry per
    /// parameter, in which case the store is left untouched.
    pub fn commit(&mut self, flat: ArrayView1<'_, f64>) -> Result<()> {
        self.direction.unflatten(flat)
    }

    /// A per-tensor copy of the direction, ready to hand to the federation.
    pub fn snapshot(&self) -> Vec<ArrayD<f64>> {
        self.direction.tensors().to_vec()
    }

    #[inline]
    pub fn tensors(&self) -> &[ArrayD<f64>] {
        self.direction.tensors()
    }
}
