use log::{debug, warn};
use ml_core::{LossGraph, MlError, Result, ensure_finite};
use ndarray::{Array2, Zip};

/// Relative symmetry defect above which a Hessian is reported as suspicious.
const SYMMETRY_TOLERANCE: f64 = 1e-8;

/// Multiple of the symmetry tolerance above which a Hessian is rejected.
const GROSS_ASYMMETRY_FACTOR: f64 = 1e3;

/// Forms the dense, regularized Hessian `H + αI` of a retained loss graph.
///
/// Dense formation costs `O(d²)` memory, so this is meant for models with a
/// small number of parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HessianBuilder {
    alpha: f64,
}

impl HessianBuilder {
    /// Creates a new `HessianBuilder`.
    ///
    /// # Args
    /// * `alpha` - The diagonal regularization, must be finite and strictly positive.
    ///
    /// # Returns
    /// A new `HessianBuilder` or `MlError::InvalidInput` for a bad `alpha`.
    pub fn new(alpha: f64) -> Result<Self> {
        if !alpha.is_finite() || alpha <= 0.0 {
            return Err(MlError::InvalidInput("alpha must be finite and positive"));
        }
        Ok(Self { alpha })
    }

    #[inline]
    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    /// Pulls the Hessian out of `graph`, validates it and returns `H + αI`.
    ///
    /// The result is exactly symmetric: small floating-point asymmetry coming
    /// from the graph is averaged out after being checked.
    ///
    /// # Errors
    /// * `MlError::ShapeMismatch` if the graph's Hessian is not `d×d`.
    /// * `MlError::NonFinite` if any entry is NaN or infinite.
    /// * `MlError::InvalidInput` if the asymmetry is far beyond rounding noise.
    pub fn build<G: LossGraph + ?Sized>(&self, graph: &mut G) -> Result<Array2<f64>> {
        let d = graph.dim();
        let mut h = graph.hessian()?;

        if h.nrows() != d {
            return Err(MlError::ShapeMismatch {
                what: "hessian rows",
                got: h.nrows(),
                expected: d,
            });
        }
        if h.ncols() != d {
            return Err(MlError::ShapeMismatch {
                what: "hessian columns",
                got: h.ncols(),
                expected: d,
            });
        }
        ensure_finite("hessian", &h)?;

        let defect = symmetry_defect(&h);
        let scale = h.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
        let threshold = SYMMETRY_TOLERANCE * (1.0 + scale);
        if defect > GROSS_ASYMMETRY_FACTOR * threshold {
            return Err(MlError::InvalidInput("hessian is far from symmetric"));
        }
        if defect > threshold {
            warn!(defect = defect, scale = scale; "hessian is not symmetric, symmetrizing");
        }
        symmetrize(&mut h);

        self.regularize(&mut h);
        debug!(dim = d, alpha = self.alpha, defect = defect; "built regularized hessian");

        Ok(h)
    }

    /// Adds `α` to every diagonal entry of `h`.
    pub fn regularize(&self, h: &mut Array2<f64>) {
        h.diag_mut().mapv_inplace(|v| v + self.alpha);
    }
}

/// Largest absolute difference between `h` and its transpose.
pub fn symmetry_defect(h: &Array2<f64>) -> f64 {
    let mut defect = 0.0_f64;
    Zip::from(h).and(h.t()).for_each(|&a, &b| {
        defect = defect.max((a - b).abs());
    });
    defect
}

fn symmetrize(h: &mut Array2<f64>) {
    let n = h.nrows();
    for i in 0..n {
        for j in (i + 1)..n {
            let mean = 0.5 * (h[[i, j]] + h[[j, i]]);
            h[[i, j]] = mean;
            h[[j, i]] = mean;
        }
    }
}
