use ndarray::{Array1, Array2, ArrayView1};

use crate::{params::ParameterSet, Batch, Result};

/// A differentiation engine that can evaluate a loss and keep what it needs
/// for first and second derivatives.
///
/// The returned [`LossGraph`] plays the role of a retained autodiff graph: it
/// stays alive for the whole local round, so the gradient, the dense Hessian
/// and any number of Hessian-vector products all reuse one forward pass.
pub trait DifferentiationOracle: Send {
    /// The retained computation produced by [`Self::compute_loss`].
    type Graph: LossGraph;

    /// Evaluates the loss of `params` on `batch`, additive regularization included.
    ///
    /// # Errors
    /// Returns `MlError` if the batch does not fit the model or the targets
    /// are invalid for the loss.
    fn compute_loss(&self, params: &ParameterSet, batch: &Batch) -> Result<Self::Graph>;
}

/// A loss value together with the recorded information needed to differentiate it.
///
/// All vectors and matrices are expressed over the flattened parameter vector
/// of the `ParameterSet` the graph was recorded with.
pub trait LossGraph {
    /// The scalar loss.
    fn loss(&self) -> f64;

    /// Number of parameters `d` the derivatives are taken with respect to.
    fn dim(&self) -> usize;

    /// First derivative of the loss, length `d`.
    ///
    /// # Errors
    /// Returns `MlError` when the derivative cannot be evaluated.
    fn gradient(&mut self) -> Result<Array1<f64>>;

    /// Dense `d×d` matrix of second derivatives.
    ///
    /// # Errors
    /// Returns `MlError` when the derivative cannot be evaluated.
    fn hessian(&mut self) -> Result<Array2<f64>>;

    /// Hessian-vector product `H·v`.
    ///
    /// The default forms the dense Hessian; graphs that can do better should
    /// override it.
    ///
    /// # Errors
    /// Returns `MlError` when the product cannot be evaluated.
    fn hvp(&mut self, v: ArrayView1<'_, f64>) -> Result<Array1<f64>> {
        Ok(self.hessian()?.dot(&v))
    }
}
