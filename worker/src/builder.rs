use machine_learning::arch::{GeneralizedLinear, loss::Loss};
use ml_core::ParameterSet;

use crate::{
    EdgeWorker, Result,
    config::{ModelKind, SimulationConfig},
    data::{DataLoader, InMemoryDataset, ShardSpec},
};

/// An edge worker training one of the reference linear models.
pub type LinearEdgeWorker = EdgeWorker<GeneralizedLinear, DataLoader>;

/// Builds the reference model and its workers out of a `SimulationConfig`.
pub struct WorkerBuilder {
    config: SimulationConfig,
    model: GeneralizedLinear,
}

impl WorkerBuilder {
    /// Creates a new `WorkerBuilder`.
    ///
    /// # Errors
    /// Fails if the configuration does not validate or describes an impossible model.
    pub fn new(config: SimulationConfig) -> Result<Self> {
        config.validate()?;
        let model = GeneralizedLinear::new(
            config.features.get(),
            config.classes,
            loss_for(config.model),
            config.worker.weight_decay,
        )?;

        Ok(Self { config, model })
    }

    #[inline]
    pub fn model(&self) -> &GeneralizedLinear {
        &self.model
    }

    #[inline]
    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Builds the worker owning shard `worker_id` of `dataset`.
    ///
    /// # Args
    /// * `worker_id` - Which shard the worker trains on.
    /// * `dataset` - The full dataset shared by every worker.
    /// * `params` - The worker's initial model.
    ///
    /// # Returns
    /// A fully initialized worker.
    pub fn build(
        &self,
        worker_id: usize,
        dataset: &InMemoryDataset,
        params: ParameterSet,
    ) -> Result<LinearEdgeWorker> {
        let shard = ShardSpec::new(worker_id, self.config.workers)?;
        let seed = self
            .config
            .worker
            .seed
            .map(|seed| seed.wrapping_add(worker_id as u64));
        let loader = DataLoader::new(dataset, shard, self.config.worker.batch_size, seed)?;

        EdgeWorker::new(
            worker_id,
            self.config.worker.clone(),
            self.model.clone(),
            loader,
            params,
        )
    }

    /// Builds one worker per shard, all starting from `params`.
    pub fn build_all(
        &self,
        dataset: &InMemoryDataset,
        params: &ParameterSet,
    ) -> Result<Vec<LinearEdgeWorker>> {
        (0..self.config.workers.get())
            .map(|id| self.build(id, dataset, params.clone()))
            .collect()
    }
}

/// The loss each reference model is trained with.
pub fn loss_for(kind: ModelKind) -> Loss {
    match kind {
        ModelKind::LinearRegression => Loss::mse(),
        ModelKind::LogisticRegression => Loss::bce(),
        ModelKind::SoftmaxRegression => Loss::nll(),
    }
}
