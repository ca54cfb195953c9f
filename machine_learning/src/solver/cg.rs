use log::trace;
use ml_core::{MlError, Result, Termination};
use ndarray::{Array1, ArrayView1};

use super::LinearOperator;

/// Budget and stopping rule for [`conjugate_gradient`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CgConfig {
    /// Maximum number of iterations `K`. The solve stops here even if it has
    /// not converged.
    pub max_iter: usize,
    /// Stop as soon as the residual norm drops below this value (default: 1e-8).
    pub tolerance: f64,
}

impl Default for CgConfig {
    fn default() -> Self {
        Self {
            max_iter: 100,
            tolerance: 1e-8,
        }
    }
}

/// The result of a conjugate gradient solve.
#[derive(Debug, Clone, PartialEq)]
pub struct CgOutcome {
    /// The final iterate.
    pub solution: Array1<f64>,
    /// Number of iterations performed.
    pub iterations: usize,
    /// Norm of the residual `g − A·d` at the final iterate.
    pub residual_norm: f64,
    /// Why the solve stopped.
    pub termination: Termination,
}

/// Solves `A·d = g` with conjugate gradient, starting from `d0`.
///
/// `A` must be symmetric positive definite. The solver is budget limited: it
/// performs at most `config.max_iter` iterations and returns its best iterate
/// when the budget runs out, which is not an error. With a budget of zero it
/// returns `d0` untouched.
///
/// # Args
/// * `op` - The operator `A`.
/// * `g` - The right-hand side.
/// * `d0` - The initial guess.
/// * `config` - Iteration budget and tolerance.
///
/// # Returns
/// The final iterate with iteration count, residual norm and termination reason.
///
/// # Errors
/// * `MlError::ShapeMismatch` if `g` or `d0` do not match `op.dim()`.
/// * `MlError::NonPositiveCurvature` if `p·Ap ≤ 0` at some iteration, meaning
///   `A` is not positive definite.
/// * `MlError::NonFinite` if the curvature or the residual stop being finite.
pub fn conjugate_gradient<A>(
    op: &mut A,
    g: ArrayView1<'_, f64>,
    d0: ArrayView1<'_, f64>,
    config: &CgConfig,
) -> Result<CgOutcome>
where
    A: LinearOperator + ?Sized,
{
    let n = op.dim();
    if g.len() != n {
        return Err(MlError::ShapeMismatch {
            what: "right-hand side",
            got: g.len(),
            expected: n,
        });
    }
    if d0.len() != n {
        return Err(MlError::ShapeMismatch {
            what: "initial guess",
            got: d0.len(),
            expected: n,
        });
    }

    let mut d = d0.to_owned();

    // r0 = g - A·d0
    let mut r = &g - &op.apply(d.view())?;
    let mut p = r.clone();
    let mut rsold = r.dot(&r);
    if !rsold.is_finite() {
        return Err(MlError::NonFinite {
            what: "initial residual",
            index: 0,
            value: rsold,
        });
    }

    if rsold.sqrt() < config.tolerance {
        return Ok(CgOutcome {
            solution: d,
            iterations: 0,
            residual_norm: rsold.sqrt(),
            termination: Termination::Converged,
        });
    }

    for iteration in 1..=config.max_iter {
        let hp = op.apply(p.view())?;
        let curvature = p.dot(&hp);

        if !curvature.is_finite() {
            return Err(MlError::NonFinite {
                what: "curvature",
                index: iteration,
                value: curvature,
            });
        }
        if curvature <= 0.0 {
            return Err(MlError::NonPositiveCurvature {
                iteration,
                curvature,
            });
        }

        let step = rsold / curvature;
        d.scaled_add(step, &p);
        r.scaled_add(-step, &hp);

        let rsnew = r.dot(&r);
        if !rsnew.is_finite() {
            return Err(MlError::NonFinite {
                what: "residual",
                index: iteration,
                value: rsnew,
            });
        }

        trace!(iteration = iteration, residual = rsnew.sqrt(), step = step; "cg iteration");

        if rsnew.sqrt() < config.tolerance {
            return Ok(CgOutcome {
                solution: d,
                iterations: iteration,
                residual_norm: rsnew.sqrt(),
                termination: Termination::Converged,
            });
        }

        // p = r + (rsnew / rsold)·p
        p *= rsnew / rsold;
        p += &r;
        rsold = rsnew;
    }

    Ok(CgOutcome {
        solution: d,
        iterations: config.max_iter,
        residual_norm: rsold.sqrt(),
        termination: Termination::MaxIterations,
    })
}
