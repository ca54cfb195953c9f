pub mod dataloader;
pub mod dataset;
pub mod shard;
pub mod synthetic;

pub use dataloader::DataLoader;
pub use dataset::InMemoryDataset;
pub use shard::{ShardSpec, shard_range};
