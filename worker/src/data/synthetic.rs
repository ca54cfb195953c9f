use ml_core::{MlError, Result};
use ndarray::{Array1, Array2};
use rand::Rng;
use rand_distr::{Distribution, Normal, StandardNormal};

use crate::config::ModelKind;

use super::InMemoryDataset;

/// Draws a dataset from a randomly drawn ground-truth linear model.
///
/// Inputs are standard normal. Targets follow the model kind: a noisy linear
/// response for regression, a thresholded noisy logit for the binary case and
/// the arg max of noisy per-class scores for the multiclass case.
///
/// # Args
/// * `rng` - Source of randomness.
/// * `kind` - Which kind of targets to produce.
/// * `samples` - Rows in the dataset.
/// * `features` - Columns of `x`.
/// * `classes` - Number of classes for softmax regression.
/// * `noise` - Standard deviation of the additive noise.
///
/// # Errors
/// `MlError::InvalidInput` for a negative or non-finite noise level or an
/// empty shape.
pub fn generate<R: Rng + ?Sized>(
    rng: &mut R,
    kind: ModelKind,
    samples: usize,
    features: usize,
    classes: usize,
    noise: f64,
) -> Result<InMemoryDataset> {
    if !noise.is_finite() || noise < 0.0 {
        return Err(MlError::InvalidInput("noise must be finite and non-negative"));
    }
    let noise = Normal::new(0.0, noise)
        .map_err(|_| MlError::InvalidInput("noise must be finite and non-negative"))?;

    let x: Array2<f64> =
        Array2::from_shape_simple_fn((samples, features), || StandardNormal.sample(&mut *rng));
    let outputs = match kind {
        ModelKind::SoftmaxRegression => classes.max(2),
        _ => 1,
    };
    let w: Array2<f64> =
        Array2::from_shape_simple_fn((outputs, features), || StandardNormal.sample(&mut *rng));
    let scores = x.dot(&w.t());

    let y: Array1<f64> = scores
        .rows()
        .into_iter()
        .map(|row| match kind {
            ModelKind::LinearRegression => row[0] + noise.sample(&mut *rng),
            ModelKind::LogisticRegression => {
                if row[0] + noise.sample(&mut *rng) > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            ModelKind::SoftmaxRegression => {
                let noisy = row.mapv(|v| v + noise.sample(&mut *rng));
                noisy
                    .iter()
                    .enumerate()
                    .fold((0, f64::NEG_INFINITY), |best, (i, &v)| {
                        if v > best.1 { (i, v) } else { best }
                    })
                    .0 as f64
            }
        })
        .collect();

    InMemoryDataset::new(x, y)
}
