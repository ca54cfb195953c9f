mod client;
mod data;
mod error;
mod oracle;
pub mod params;
mod stats;

pub use client::{FederatedClient, GradientSource};
pub use data::{Batch, BatchSource};
pub use error::{ensure_finite, MlError, Result};
pub use oracle::{DifferentiationOracle, LossGraph};
pub use params::{ParameterLayout, ParameterSet};
pub use stats::{RoundStats, Termination};
