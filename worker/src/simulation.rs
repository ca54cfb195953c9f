use log::{debug, info};
use machine_learning::arch::GeneralizedLinear;
use ml_core::{
    Batch, DifferentiationOracle, FederatedClient, GradientSource, LossGraph, ParameterSet,
    RoundStats,
};
use ndarray::Array1;
use rand::{SeedableRng, rngs::StdRng};
use rayon::prelude::*;

use crate::{
    Result, WorkerErr,
    builder::{LinearEdgeWorker, WorkerBuilder},
    config::SimulationConfig,
    data::synthetic,
};

/// Standard deviation of the initial weights.
const INIT_STD_DEV: f64 = 0.01;

/// What a single simulated round produced.
#[derive(Debug, Clone, PartialEq)]
pub struct RoundSummary {
    pub round: usize,
    /// Global loss over the full dataset after the step.
    pub loss: f64,
    /// Accuracy over the full dataset after the step, for classifiers.
    pub accuracy: Option<f64>,
    /// Norm of the averaged direction that was applied.
    pub direction_norm: f64,
    pub mean_iterations: f64,
}

/// Drives several edge workers through synchronous gradient-tracking rounds.
///
/// Every round broadcasts the global model, injects the average of the
/// workers' full local gradients as the tracked gradient, runs the local
/// rounds in parallel and steps the global model along the averaged
/// direction, `θ ← θ − lr·d`.
pub struct Simulation {
    config: SimulationConfig,
    model: GeneralizedLinear,
    workers: Vec<LinearEdgeWorker>,
    global: ParameterSet,
    dataset: Batch,
    round: usize,
}

impl Simulation {
    /// Creates a new `Simulation` over freshly generated synthetic data.
    ///
    /// # Errors
    /// Fails if the configuration does not validate.
    pub fn new(config: SimulationConfig) -> Result<Self> {
        let builder = WorkerBuilder::new(config)?;
        let config = builder.config().clone();

        let mut rng = match config.worker.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let dataset = synthetic::generate(
            &mut rng,
            config.model,
            config.samples.get(),
            config.features.get(),
            config.classes,
            config.noise,
        )?;

        let model = builder.model().clone();
        let global = model.init_params(&mut rng, INIT_STD_DEV)?;
        let workers = builder.build_all(&dataset, &global)?;

        info!(
            workers = workers.len(),
            samples = dataset.len(),
            params = global.num_params();
            "simulation ready"
        );

        Ok(Self {
            config,
            model,
            workers,
            global,
            dataset: dataset.to_batch()?,
            round: 0,
        })
    }

    #[inline]
    pub fn parameters(&self) -> &ParameterSet {
        &self.global
    }

    #[inline]
    pub fn workers(&self) -> &[LinearEdgeWorker] {
        &self.workers
    }

    /// Loss of the global model over the full dataset.
    pub fn global_loss(&self) -> Result<f64> {
        let graph = self.model.compute_loss(&self.global, &self.dataset)?;
        Ok(graph.loss())
    }

    /// Runs every configured round.
    pub fn run(&mut self) -> Result<Vec<RoundSummary>> {
        (0..self.config.rounds.get()).map(|_| self.step()).collect()
    }

    /// Runs a single synchronous round across all workers.
    ///
    /// # Errors
    /// The first worker failure aborts the round, the global model is only
    /// updated once every worker succeeded.
    pub fn step(&mut self) -> Result<RoundSummary> {
        let tensors = self.global.tensors().to_vec();
        for worker in &mut self.workers {
            worker.set_parameters(&tensors)?;
        }

        let tracked = self.average_gradient()?;
        for worker in &mut self.workers {
            worker.set_tracked_gradient(GradientSource::Flat(tracked.clone()))?;
        }

        let stats = self
            .workers
            .par_iter_mut()
            .map(|worker| worker.train_round())
            .collect::<Result<Vec<RoundStats>>>()?;

        let mut direction = Array1::<f64>::zeros(self.global.num_params());
        for worker in &self.workers {
            direction += &worker.direction_store().flatten();
        }
        direction /= self.workers.len() as f64;

        let mut theta = self.global.flatten();
        theta.scaled_add(-self.config.worker.learning_rate, &direction);
        self.global.unflatten(theta.view())?;

        let summary = RoundSummary {
            round: self.round,
            loss: self.global_loss()?,
            accuracy: self.model.accuracy(&self.global, &self.dataset)?,
            direction_norm: direction.dot(&direction).sqrt(),
            mean_iterations: stats.iter().map(|s| s.iterations() as f64).sum::<f64>()
                / stats.len() as f64,
        };
        self.round += 1;

        info!(
            round = summary.round,
            loss = summary.loss,
            direction_norm = summary.direction_norm,
            mean_iterations = summary.mean_iterations;
            "global step"
        );
        Ok(summary)
    }

    /// Sample-weighted average of every worker's full local gradient.
    fn average_gradient(&self) -> Result<Array1<f64>> {
        let partials = self
            .workers
            .par_iter()
            .map(|worker| {
                Ok((worker.full_gradient()?, worker.source().len()))
            })
            .collect::<Result<Vec<(Array1<f64>, usize)>>>()?;

        let total: usize = partials.iter().map(|(_, n)| n).sum();
        if total == 0 {
            return Err(WorkerErr::InvalidConfig("no samples to average over".into()));
        }

        let mut avg = Array1::<f64>::zeros(self.global.num_params());
        for (g, n) in &partials {
            avg.scaled_add(*n as f64 / total as f64, g);
        }
        debug!(norm = avg.dot(&avg).sqrt(); "tracked gradient");

        Ok(avg)
    }
}
