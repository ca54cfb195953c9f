use log::debug;
use ml_core::{GradientSource, MlError, ParameterLayout, ParameterSet, Result};
use ndarray::{Array1, ArrayD};

/// Per-tensor shadow holding the gradient-tracking estimate supplied by the
/// federation.
///
/// Until something is injected the worker falls back to its own batch
/// gradient. Every injection replaces the previous one.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedGradientStore {
    gradient: ParameterSet,
    injected: bool,
}

impl TrackedGradientStore {
    /// Creates an empty store shaped like `layout`.
    pub fn new(layout: &ParameterLayout) -> Self {
        Self {
            gradient: ParameterSet::zeros(layout),
            injected: false,
        }
    }

    #[inline]
    pub fn is_injected(&self) -> bool {
        self.injected
    }

    /// Replaces the tracked gradient with `source`.
    ///
    /// # Args
    /// * `source` - Either one flat vector over all parameters or one tensor per
    ///   parameter tensor.
    ///
    /// # Errors
    /// `MlError::ShapeMismatch` if the sizes do not match the layout and
    /// `MlError::NonFinite` for NaN or infinite entries. The store keeps its
    /// previous contents on error.
    pub fn set_gradients(&mut self, source: GradientSource) -> Result<()> {
        source.ensure_finite()?;

        match source {
            GradientSource::Flat(flat) => self.gradient.unflatten(flat.view())?,
            GradientSource::PerTensor(tensors) => self.gradient.assign(&tensors)?,
        }
        self.injected = true;

        debug!(params = self.gradient.num_params(); "tracked gradient replaced");
        Ok(())
    }

    /// The gradient the next solve should use: the tracked one once it was
    /// injected, `local` otherwise.
    ///
    /// # Errors
    /// `MlError::ShapeMismatch` if `local` does not have one entry per parameter.
    pub fn resolve(&self, local: Array1<f64>) -> Result<Array1<f64>> {
        let expected = self.gradient.num_params();
        if local.len() != expected {
            return Err(MlError::ShapeMismatch {
                what: "local gradient",
                got: local.len(),
                expected,
            });
        }

        if self.injected {
            Ok(self.gradient.flatten())
        } else {
            Ok(local)
        }
    }

    /// Drops the injected gradient, the next round uses the local one again.
    pub fn clear(&mut self) {
        self.gradient.fill(0.0);
        self.injected = false;
    }

    #[inline]
    pub fn tensors(&self) -> &[ArrayD<f64>] {
        self.gradient.tensors()
    }
}
