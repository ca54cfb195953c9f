//! Second-order building blocks for a federated client's local step: dense
//! regularized Hessians, a conjugate gradient solver and reference linear
//! models with analytic curvature.

pub mod arch;
mod hessian;
pub mod solver;

pub use hessian::{HessianBuilder, symmetry_defect};
