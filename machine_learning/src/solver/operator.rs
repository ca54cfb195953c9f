use ml_core::{LossGraph, MlError, Result, ensure_finite};
use ndarray::{Array1, Array2, ArrayView1};

/// A symmetric linear map the conjugate gradient solver can apply.
pub trait LinearOperator {
    /// Size of the (square) operator.
    fn dim(&self) -> usize;

    /// Computes `A·v`.
    ///
    /// # Errors
    /// Returns `MlError` if `v` has the wrong length or the product cannot be evaluated.
    fn apply(&mut self, v: ArrayView1<'_, f64>) -> Result<Array1<f64>>;
}

/// An explicit dense matrix, e.g. a regularized Hessian `H + αI`.
#[derive(Debug, Clone, PartialEq)]
pub struct DenseOperator {
    matrix: Array2<f64>,
}

impl DenseOperator {
    /// Creates a new `DenseOperator`.
    ///
    /// # Errors
    /// `MlError::ShapeMismatch` if `matrix` is not square.
    pub fn new(matrix: Array2<f64>) -> Result<Self> {
        if matrix.nrows() != matrix.ncols() {
            return Err(MlError::ShapeMismatch {
                what: "operator columns",
                got: matrix.ncols(),
                expected: matrix.nrows(),
            });
        }
        Ok(Self { matrix })
    }
}

impl LinearOperator for DenseOperator {
    fn dim(&self) -> usize {
        self.matrix.nrows()
    }

    fn apply(&mut self, v: ArrayView1<'_, f64>) -> Result<Array1<f64>> {
        check_len(v.len(), self.dim())?;
        Ok(self.matrix.dot(&v))
    }
}

/// Applies `v ↦ H·v + shift·v` through a retained loss graph, without ever
/// forming `H`.
pub struct HvpOperator<'g, G: LossGraph> {
    graph: &'g mut G,
    shift: f64,
}

impl<'g, G: LossGraph> HvpOperator<'g, G> {
    /// Creates a new `HvpOperator`.
    ///
    /// # Args
    /// * `graph` - The retained graph the products are taken from.
    /// * `shift` - Diagonal shift added to every product, the `α` of `H + αI`.
    pub fn new(graph: &'g mut G, shift: f64) -> Self {
        Self { graph, shift }
    }
}

impl<G: LossGraph> LinearOperator for HvpOperator<'_, G> {
    fn dim(&self) -> usize {
        self.graph.dim()
    }

    fn apply(&mut self, v: ArrayView1<'_, f64>) -> Result<Array1<f64>> {
        check_len(v.len(), self.dim())?;

        let mut hv = self.graph.hvp(v)?;
        check_len(hv.len(), self.dim())?;
        ensure_finite("hessian-vector product", &hv)?;

        hv.scaled_add(self.shift, &v);
        Ok(hv)
    }
}

fn check_len(got: usize, expected: usize) -> Result<()> {
    if got != expected {
        return Err(MlError::ShapeMismatch {
            what: "operator input",
            got,
            expected,
        });
    }
    Ok(())
}
