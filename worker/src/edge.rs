use log::{debug, error, info, warn};
use machine_learning::{
    HessianBuilder,
    solver::{CgConfig, CgOutcome, DenseOperator, HvpOperator, conjugate_gradient},
};
use ml_core::{
    Batch, BatchSource, DifferentiationOracle, FederatedClient, GradientSource, LossGraph,
    MlError, ParameterSet, RoundStats,
};
use ndarray::{Array1, ArrayD};

use crate::{
    Result, WorkerErr,
    config::{Curvature, WorkerConfig},
    store::{DirectionStore, TrackedGradientStore},
};

/// A federated client that computes a regularized Newton direction each round.
///
/// Every round samples a batch, takes the local gradient (or the tracked one,
/// once the federation injected it) and solves `(H + αI)·d = g` with
/// conjugate gradient. The resulting `d` is kept in the direction store until
/// the federation reads it.
pub struct EdgeWorker<O, S> {
    id: usize,
    config: WorkerConfig,
    oracle: O,
    source: S,
    params: ParameterSet,
    direction: DirectionStore,
    tracked: TrackedGradientStore,
    hessian: HessianBuilder,
    rounds: usize,
}

impl<O, S> EdgeWorker<O, S>
where
    O: DifferentiationOracle,
    S: BatchSource,
{
    /// Creates a new `EdgeWorker`.
    ///
    /// # Args
    /// * `id` - Identifier used for observability.
    /// * `config` - Local training configuration, validated here.
    /// * `oracle` - Evaluates the loss and its derivatives.
    /// * `source` - Supplies this worker's batches.
    /// * `params` - Initial local model.
    ///
    /// # Returns
    /// A new worker with zero direction and no tracked gradient.
    ///
    /// # Errors
    /// `WorkerErr::InvalidConfig` if `config` does not validate.
    pub fn new(
        id: usize,
        config: WorkerConfig,
        oracle: O,
        source: S,
        params: ParameterSet,
    ) -> Result<Self> {
        config.validate()?;
        let hessian = HessianBuilder::new(config.alpha)?;

        Ok(Self {
            id,
            direction: DirectionStore::new(params.layout()),
            tracked: TrackedGradientStore::new(params.layout()),
            config,
            oracle,
            source,
            params,
            hessian,
            rounds: 0,
        })
    }

    #[inline]
    pub fn id(&self) -> usize {
        self.id
    }

    #[inline]
    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Number of successfully completed rounds.
    #[inline]
    pub fn rounds(&self) -> usize {
        self.rounds
    }

    #[inline]
    pub fn parameters(&self) -> &ParameterSet {
        &self.params
    }

    #[inline]
    pub fn source(&self) -> &S {
        &self.source
    }

    #[inline]
    pub fn oracle(&self) -> &O {
        &self.oracle
    }

    #[inline]
    pub fn direction_store(&self) -> &DirectionStore {
        &self.direction
    }

    #[inline]
    pub fn tracked_store(&self) -> &TrackedGradientStore {
        &self.tracked
    }

    /// Replaces the local model.
    ///
    /// # Errors
    /// Fails without writing anything if `tensors` do not match the layout.
    pub fn set_parameters(&mut self, tensors: &[ArrayD<f64>]) -> Result<()> {
        self.params.assign(tensors)?;
        Ok(())
    }

    /// Forgets the injected tracked gradient.
    pub fn clear_tracked_gradient(&mut self) {
        self.tracked.clear();
    }

    /// Runs one local round and commits the new direction.
    ///
    /// # Returns
    /// The round's statistics. Hitting the iteration cap is not an error.
    ///
    /// # Errors
    /// `WorkerErr::Training` wrapping the cause. The direction store, the
    /// tracked gradient and the round counter are left as they were.
    pub fn train_round(&mut self) -> Result<RoundStats> {
        self.run_round().map_err(|source| {
            if source.is_numerical() {
                warn!(worker = self.id, round = self.rounds; "round failed: {source}");
            } else {
                error!(worker = self.id, round = self.rounds; "round failed: {source}");
            }
            WorkerErr::Training {
                worker: self.id,
                round: self.rounds,
                source,
            }
        })
    }

    fn run_round(&mut self) -> ml_core::Result<RoundStats> {
        let batch = self.source.next_batch()?;
        let mut graph = self.oracle.compute_loss(&self.params, &batch)?;

        let loss = graph.loss();
        if !loss.is_finite() {
            return Err(MlError::NonFinite {
                what: "loss",
                index: 0,
                value: loss,
            });
        }

        let local = self.checked_gradient(&mut graph)?;
        let expected = local.len();

        let tracked = self.tracked.is_injected();
        let g = self.tracked.resolve(local)?;
        let d0 = Array1::zeros(expected);

        let cg = CgConfig {
            max_iter: self.config.local_iterations.get(),
            tolerance: self.config.tolerance,
        };
        let outcome = self.solve(&mut graph, &g, &d0, &cg)?;

        self.direction.commit(outcome.solution.view())?;
        let stats = RoundStats::new(
            self.rounds,
            batch.len(),
            loss,
            outcome.iterations,
            outcome.residual_norm,
            outcome.termination,
            tracked,
        );
        self.rounds += 1;

        info!(
            worker = self.id,
            round = stats.round(),
            loss = loss,
            iterations = outcome.iterations,
            residual = outcome.residual_norm,
            tracked = tracked;
            "round finished, {}",
            outcome.termination
        );

        Ok(stats)
    }

    /// Pulls the gradient out of `graph`, which must be finite and have one
    /// entry per parameter.
    fn checked_gradient(&self, graph: &mut O::Graph) -> ml_core::Result<Array1<f64>> {
        let g = graph.gradient()?;
        let expected = self.params.num_params();
        if g.len() != expected {
            return Err(MlError::ShapeMismatch {
                what: "gradient",
                got: g.len(),
                expected,
            });
        }
        ml_core::ensure_finite("gradient", &g)?;
        Ok(g)
    }

    fn solve(
        &self,
        graph: &mut O::Graph,
        g: &Array1<f64>,
        d0: &Array1<f64>,
        cg: &CgConfig,
    ) -> ml_core::Result<CgOutcome> {
        match self.config.curvature {
            Curvature::Dense => {
                let h = self.hessian.build(graph)?;
                debug!(worker = self.id, dim = h.nrows(); "solving with dense hessian");
                let mut op = DenseOperator::new(h)?;
                conjugate_gradient(&mut op, g.view(), d0.view(), cg)
            }
            Curvature::Operator => {
                debug!(worker = self.id, dim = graph.dim(); "solving with hessian-vector products");
                let mut op = HvpOperator::new(graph, self.hessian.alpha());
                conjugate_gradient(&mut op, g.view(), d0.view(), cg)
            }
        }
    }

    /// Average gradient over the whole local dataset, each batch weighted by
    /// its size.
    ///
    /// # Errors
    /// Propagates oracle failures and rejects an empty dataset.
    pub fn full_gradient(&self) -> Result<Array1<f64>> {
        let batches = self.source.full_batches()?;
        let mut total = Array1::zeros(self.params.num_params());
        let mut samples = 0;

        for batch in &batches {
            let mut graph = self.oracle.compute_loss(&self.params, batch)?;
            let g = self.checked_gradient(&mut graph)?;
            total.scaled_add(batch.len() as f64, &g);
            samples += batch.len();
        }

        if samples == 0 {
            return Err(MlError::InvalidInput("the local dataset is empty").into());
        }
        total /= samples as f64;
        Ok(total)
    }

    /// Sample-weighted average loss of the local model over `batches`.
    ///
    /// # Errors
    /// Propagates oracle failures and rejects an empty batch list.
    pub fn evaluate(&self, batches: &[Batch]) -> Result<f64> {
        let mut total = 0.0;
        let mut samples = 0;

        for batch in batches {
            let graph = self.oracle.compute_loss(&self.params, batch)?;
            total += graph.loss() * batch.len() as f64;
            samples += batch.len();
        }

        if samples == 0 {
            return Err(MlError::InvalidInput("nothing to evaluate").into());
        }
        Ok(total / samples as f64)
    }
}

impl<O, S> FederatedClient for EdgeWorker<O, S>
where
    O: DifferentiationOracle,
    S: BatchSource,
{
    fn train_round(&mut self) -> ml_core::Result<RoundStats> {
        EdgeWorker::train_round(self).map_err(|e| match e {
            WorkerErr::Training { source, .. } | WorkerErr::Ml(source) => source,
            _ => MlError::InvalidInput("round failed outside the numerical core"),
        })
    }

    fn direction(&self) -> Vec<ArrayD<f64>> {
        self.direction.snapshot()
    }

    fn set_tracked_gradient(&mut self, source: GradientSource) -> ml_core::Result<()> {
        self.tracked.set_gradients(source)
    }
}
