use std::{fs, num::NonZeroUsize, path::Path};

use serde::{Deserialize, Serialize};

use crate::{Result, WorkerErr};

/// How the curvature system `(H + αI)·d = g` is handed to the solver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Curvature {
    /// Form the dense regularized Hessian explicitly.
    #[default]
    Dense,
    /// Apply Hessian-vector products through the retained graph.
    Operator,
}

/// Local training configuration of an edge worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerConfig {
    pub alpha: f64,
    pub local_iterations: NonZeroUsize,
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    #[serde(default = "default_one")]
    pub eta: f64,
    #[serde(default = "default_one")]
    pub lipschitz_bound: f64,
    #[serde(default = "default_batch_size")]
    pub batch_size: NonZeroUsize,
    #[serde(default)]
    pub weight_decay: f64,
    #[serde(default)]
    pub curvature: Curvature,
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_tolerance() -> f64 {
    1e-8
}

fn default_learning_rate() -> f64 {
    0.01
}

fn default_one() -> f64 {
    1.0
}

fn default_batch_size() -> NonZeroUsize {
    NonZeroUsize::new(32).unwrap_or(NonZeroUsize::MIN)
}

impl WorkerConfig {
    /// Creates a new worker configuration with every optional key at its default.
    ///
    /// # Args
    /// * `alpha` - Diagonal regularization of the Hessian.
    /// * `local_iterations` - Conjugate gradient iteration cap.
    ///
    /// # Returns
    /// A `WorkerConfig` instance, not yet validated.
    pub fn new(alpha: f64, local_iterations: NonZeroUsize) -> Self {
        Self {
            alpha,
            local_iterations,
            tolerance: default_tolerance(),
            learning_rate: default_learning_rate(),
            eta: default_one(),
            lipschitz_bound: default_one(),
            batch_size: default_batch_size(),
            weight_decay: 0.0,
            curvature: Curvature::default(),
            seed: None,
        }
    }

    /// Checks the numeric constraints serde cannot express.
    ///
    /// # Errors
    /// Returns `WorkerErr::InvalidConfig` naming the first offending key.
    pub fn validate(&self) -> Result<()> {
        positive("alpha", self.alpha)?;
        positive("tolerance", self.tolerance)?;
        finite("learning_rate", self.learning_rate)?;
        finite("eta", self.eta)?;
        finite("lipschitz_bound", self.lipschitz_bound)?;
        if !self.weight_decay.is_finite() || self.weight_decay < 0.0 {
            return Err(WorkerErr::InvalidConfig(format!(
                "weight_decay must be finite and non-negative, got {}",
                self.weight_decay
            )));
        }
        Ok(())
    }

    /// Parses and validates a configuration from a JSON string.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }
}

/// The reference model trained by the simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    LinearRegression,
    LogisticRegression,
    SoftmaxRegression,
}

/// Configuration of an in-process gradient-tracking run over synthetic data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub workers: NonZeroUsize,
    pub rounds: NonZeroUsize,
    pub samples: NonZeroUsize,
    pub features: NonZeroUsize,
    #[serde(default = "default_classes")]
    pub classes: usize,
    #[serde(default = "default_noise")]
    pub noise: f64,
    pub model: ModelKind,
    pub worker: WorkerConfig,
}

fn default_classes() -> usize {
    2
}

fn default_noise() -> f64 {
    0.1
}

impl SimulationConfig {
    /// Checks the embedded worker block and the simulation's own keys.
    ///
    /// # Errors
    /// Returns `WorkerErr::InvalidConfig` naming the first offending key.
    pub fn validate(&self) -> Result<()> {
        self.worker.validate()?;

        if self.samples.get() < self.workers.get() {
            return Err(WorkerErr::InvalidConfig(format!(
                "samples ({}) must be at least the number of workers ({})",
                self.samples, self.workers
            )));
        }
        if self.model == ModelKind::SoftmaxRegression && self.classes < 2 {
            return Err(WorkerErr::InvalidConfig(
                "softmax_regression needs at least 2 classes".into(),
            ));
        }
        if !self.noise.is_finite() || self.noise < 0.0 {
            return Err(WorkerErr::InvalidConfig(format!(
                "noise must be finite and non-negative, got {}",
                self.noise
            )));
        }
        Ok(())
    }

    /// Parses and validates a configuration from a JSON string.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a configuration file.
    ///
    /// # Errors
    /// Returns `WorkerErr::Io` if the file cannot be read, `WorkerErr::Parse`
    /// for malformed JSON and `WorkerErr::InvalidConfig` for bad values.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }
}

fn positive(key: &str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(WorkerErr::InvalidConfig(format!(
            "{key} must be finite and positive, got {value}"
        )))
    }
}

fn finite(key: &str, value: f64) -> Result<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(WorkerErr::InvalidConfig(format!("{key} must be finite, got {value}")))
    }
}
