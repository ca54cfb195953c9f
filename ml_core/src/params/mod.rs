mod layout;
mod set;

pub use layout::{ParameterLayout, TensorSlot};
pub use set::ParameterSet;
