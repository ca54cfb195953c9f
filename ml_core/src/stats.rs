use std::fmt;

/// Why a conjugate gradient solve stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The residual norm fell below the tolerance.
    Converged,
    /// The iteration budget ran out first.
    MaxIterations,
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Termination::Converged => write!(f, "converged"),
            Termination::MaxIterations => write!(f, "iteration cap reached"),
        }
    }
}

/// Statistics produced by a single local round.
///
/// This type keeps fields private to allow evolving the internal counters
/// without breaking the public API.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoundStats {
    round: usize,
    samples: usize,
    loss: f64,
    iterations: usize,
    residual_norm: f64,
    termination: Termination,
    tracked: bool,
}

impl RoundStats {
    /// Creates a new `RoundStats`.
    ///
    /// # Args
    /// * `round` - Index of the round these stats belong to.
    /// * `samples` - Number of samples in the batch the round used.
    /// * `loss` - Batch loss at the start of the round.
    /// * `iterations` - Conjugate gradient iterations performed.
    /// * `residual_norm` - Final residual norm of the solve.
    /// * `termination` - Why the solve stopped.
    /// * `tracked` - Whether an injected tracked gradient was solved against.
    pub fn new(
        round: usize,
        samples: usize,
        loss: f64,
        iterations: usize,
        residual_norm: f64,
        termination: Termination,
        tracked: bool,
    ) -> Self {
        Self {
            round,
            samples,
            loss,
            iterations,
            residual_norm,
            termination,
            tracked,
        }
    }

    pub fn round(&self) -> usize {
        self.round
    }

    pub fn samples(&self) -> usize {
        self.samples
    }

    pub fn loss(&self) -> f64 {
        self.loss
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    pub fn residual_norm(&self) -> f64 {
        self.residual_norm
    }

    pub fn termination(&self) -> Termination {
        self.termination
    }

    /// Returns `true` if the round solved against an injected tracked gradient.
    pub fn used_tracked_gradient(&self) -> bool {
        self.tracked
    }
}
