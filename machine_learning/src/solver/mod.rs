mod cg;
mod operator;

pub use cg::{conjugate_gradient, CgConfig, CgOutcome};
pub use operator::{DenseOperator, HvpOperator, LinearOperator};
