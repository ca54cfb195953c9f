use ndarray::{Array1, ArrayD};

use crate::{Result, RoundStats};

/// A gradient handed to a client by the federation.
#[derive(Debug, Clone, PartialEq)]
pub enum GradientSource {
    /// One aggregated flat gradient, split over the tensors in flatten order.
    Flat(Array1<f64>),
    /// One tensor per parameter tensor, in flatten order.
    PerTensor(Vec<ArrayD<f64>>),
}

/// The surface a gradient-tracking client exposes to the federation layer.
///
/// The federation drives rounds, reads directions and injects tracked
/// gradients; how the direction is computed lives behind this trait.
pub trait FederatedClient: Send {
    /// Executes one local round and refreshes the direction.
    ///
    /// # Errors
    /// Returns `MlError` when the round fails; the previous direction is kept.
    fn train_round(&mut self) -> Result<RoundStats>;

    /// Per-tensor snapshot of the current direction.
    fn direction(&self) -> Vec<ArrayD<f64>>;

    /// Replaces the tracked gradient used by the next round.
    ///
    /// # Errors
    /// Returns `MlError` if `source` does not match the parameter layout.
    fn set_tracked_gradient(&mut self, source: GradientSource) -> Result<()>;
}

impl GradientSource {
    /// Checks the values are all finite.
    ///
    /// # Errors
    /// `MlError::NonFinite` with the flat index of the first bad value.
    pub fn ensure_finite(&self) -> Result<()> {
        match self {
            GradientSource::Flat(flat) => crate::ensure_finite("tracked gradient", flat),
            GradientSource::PerTensor(tensors) => crate::ensure_finite(
                "tracked gradient",
                tensors.iter().flat_map(|t| t.iter()),
            ),
        }
    }
}
