use std::fmt;

/// The result type used across the core crates.
pub type Result<T> = std::result::Result<T, MlError>;

/// Errors produced while building or solving a local second-order step.
#[derive(Debug, Clone, PartialEq)]
pub enum MlError {
    /// An input is invalid for semantic or domain reasons.
    InvalidInput(&'static str),

    /// A shape invariant was violated (e.g. mismatched lengths).
    ShapeMismatch {
        /// Human-readable context for the mismatch (e.g. "flat vector", "gradient").
        what: &'static str,
        /// Observed value.
        got: usize,
        /// Expected value.
        expected: usize,
    },

    /// A loss, gradient, Hessian or solver quantity stopped being finite.
    NonFinite {
        /// Which quantity was being checked.
        what: &'static str,
        /// Flat index (or iteration) where the value was found.
        index: usize,
        /// The offending value.
        value: f64,
    },

    /// The curvature `p·Hp` was not strictly positive during a CG iteration,
    /// so the regularized system is not positive definite.
    NonPositiveCurvature { iteration: usize, curvature: f64 },
}

impl MlError {
    /// Whether this error comes from the numbers themselves rather than from
    /// mismatched inputs.
    pub fn is_numerical(&self) -> bool {
        matches!(
            self,
            MlError::NonFinite { .. } | MlError::NonPositiveCurvature { .. }
        )
    }
}

impl fmt::Display for MlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MlError::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            MlError::ShapeMismatch { what, got, expected } => {
                write!(f, "shape mismatch for {what}: got {got}, expected {expected}")
            }
            MlError::NonFinite { what, index, value } => {
                write!(f, "non-finite {what} at index {index}: {value}")
            }
            MlError::NonPositiveCurvature {
                iteration,
                curvature,
            } => write!(
                f,
                "non-positive curvature p·Hp = {curvature} at cg iteration {iteration}"
            ),
        }
    }
}

impl std::error::Error for MlError {}

/// Fails with `MlError::NonFinite` on the first NaN or infinity in `values`.
///
/// # Args
/// * `what` - Name of the quantity, reported in the error.
/// * `values` - The values to scan, in flat order.
///
/// # Errors
/// Returns `MlError::NonFinite` carrying the flat index of the first bad value.
pub fn ensure_finite<'a, I>(what: &'static str, values: I) -> Result<()>
where
    I: IntoIterator<Item = &'a f64>,
{
    match values
        .into_iter()
        .enumerate()
        .find(|(_, value)| !value.is_finite())
    {
        Some((index, &value)) => Err(MlError::NonFinite { what, index, value }),
        None => Ok(()),
    }
}
