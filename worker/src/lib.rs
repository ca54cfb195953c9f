pub mod builder;
pub mod config;
pub mod data;
mod edge;
pub mod error;
pub mod simulation;
pub mod store;

pub use builder::{LinearEdgeWorker, WorkerBuilder};
pub use config::{Curvature, ModelKind, SimulationConfig, WorkerConfig};
pub use edge::EdgeWorker;
pub use error::{Result, WorkerErr};
pub use simulation::{RoundSummary, Simulation};
pub use store::{DirectionStore, TrackedGradientStore};
