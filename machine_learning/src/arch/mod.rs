mod linear;
pub mod loss;

pub use linear::{GeneralizedLinear, GlmGraph};
