mod bce;
mod loss_fn;
mod mse;
mod nll;

pub use bce::BinaryCrossEntropy;
pub use loss_fn::LossFn;
pub use mse::Mse;
pub use nll::NegLogLikelihood;

pub(crate) use bce::sigmoid;
pub(crate) use nll::softmax;

use ml_core::{MlError, Result};
use ndarray::{Array2, Array3, ArrayView1, ArrayView2};

/// The losses a `GeneralizedLinear` model can be trained with.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Loss {
    Mse(Mse),
    Bce(BinaryCrossEntropy),
    Nll(NegLogLikelihood),
}

impl Loss {
    pub fn mse() -> Self {
        Self::Mse(Mse::new())
    }

    pub fn bce() -> Self {
        Self::Bce(BinaryCrossEntropy::new())
    }

    pub fn nll() -> Self {
        Self::Nll(NegLogLikelihood::new())
    }

    /// Number of model outputs this loss expects for a problem with `classes` classes.
    pub fn outputs(&self, classes: usize) -> usize {
        match self {
            Loss::Mse(_) | Loss::Bce(_) => 1,
            Loss::Nll(_) => classes,
        }
    }

    /// Checks that every target is admissible for this loss given `outputs` columns.
    ///
    /// # Errors
    /// `MlError::NonFinite` for non-finite targets and `MlError::InvalidInput`
    /// for labels outside the loss's domain.
    pub fn check_targets(&self, y: ArrayView1<f64>, outputs: usize) -> Result<()> {
        ml_core::ensure_finite("targets", &y)?;

        match self {
            Loss::Mse(_) => Ok(()),
            Loss::Bce(_) => {
                if y.iter().all(|&t| (0.0..=1.0).contains(&t)) {
                    Ok(())
                } else {
                    Err(MlError::InvalidInput("binary targets must lie in [0, 1]"))
                }
            }
            Loss::Nll(_) => {
                let valid = |t: f64| t >= 0.0 && t.fract() == 0.0 && (t as usize) < outputs;
                if y.iter().all(|&t| valid(t)) {
                    Ok(())
                } else {
                    Err(MlError::InvalidInput("class targets must be indices below the output count"))
                }
            }
        }
    }

    pub fn loss(&self, z: ArrayView2<f64>, y: ArrayView1<f64>) -> f64 {
        match self {
            Loss::Mse(l) => l.loss(z, y),
            Loss::Bce(l) => l.loss(z, y),
            Loss::Nll(l) => l.loss(z, y),
        }
    }

    pub fn loss_prime(&self, z: ArrayView2<f64>, y: ArrayView1<f64>) -> Array2<f64> {
        match self {
            Loss::Mse(l) => l.loss_prime(z, y),
            Loss::Bce(l) => l.loss_prime(z, y),
            Loss::Nll(l) => l.loss_prime(z, y),
        }
    }

    pub fn loss_second(&self, z: ArrayView2<f64>, y: ArrayView1<f64>) -> Array3<f64> {
        match self {
            Loss::Mse(l) => l.loss_second(z, y),
            Loss::Bce(l) => l.loss_second(z, y),
            Loss::Nll(l) => l.loss_second(z, y),
        }
    }
}
