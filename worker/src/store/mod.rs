mod direction;
mod tracked;

pub use direction::DirectionStore;
pub use tracked::TrackedGradientStore;
