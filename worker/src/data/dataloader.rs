use std::{num::NonZeroUsize, ops::Range};

use log::trace;
use ml_core::{Batch, BatchSource, Result};
use rand::{SeedableRng, rngs::StdRng, seq::SliceRandom};

use super::dataset::InMemoryDataset;
use super::shard::ShardSpec;

/// Shard-aware loader that reshuffles and starts over once its shard is exhausted.
///
/// `next_batch` never runs dry: the last batch of a pass may be short, after
/// which the order is reshuffled and a new pass begins.
#[derive(Debug, Clone)]
pub struct DataLoader {
    dataset: InMemoryDataset,
    shard: ShardSpec,
    shard_range: Range<usize>,
    batch_size: NonZeroUsize,
    order: Vec<usize>,
    cursor: usize,
    passes: usize,
    rng: StdRng,
}

impl DataLoader {
    /// Creates a new `DataLoader` over this worker's shard of `dataset`.
    ///
    /// # Args
    /// * `dataset` - The full dataset, only the shard's rows are kept.
    /// * `shard` - Which slice of the dataset this worker owns.
    /// * `batch_size` - Samples per batch.
    /// * `seed` - Seed of the shuffling, `None` draws one from the OS.
    ///
    /// # Errors
    /// `MlError::InvalidInput` if the shard is empty.
    pub fn new(
        dataset: &InMemoryDataset,
        shard: ShardSpec,
        batch_size: NonZeroUsize,
        seed: Option<u64>,
    ) -> Result<Self> {
        let shard_range = shard.range(dataset.len());
        let dataset = dataset.slice(shard_range.clone())?;

        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let mut order: Vec<usize> = (0..dataset.len()).collect();
        order.shuffle(&mut rng);

        Ok(Self {
            dataset,
            shard,
            shard_range,
            batch_size,
            order,
            cursor: 0,
            passes: 0,
            rng,
        })
    }

    #[inline]
    pub fn shard(&self) -> ShardSpec {
        self.shard
    }

    #[inline]
    pub fn shard_range(&self) -> Range<usize> {
        self.shard_range.clone()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.dataset.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.dataset.is_empty()
    }

    /// Number of completed passes over the shard.
    #[inline]
    pub fn passes(&self) -> usize {
        self.passes
    }

    #[inline]
    pub fn dataset(&self) -> &InMemoryDataset {
        &self.dataset
    }

    fn start_pass(&mut self) {
        self.order.shuffle(&mut self.rng);
        self.cursor = 0;
        self.passes += 1;
        trace!(worker = self.shard.worker_id(), passes = self.passes; "reshuffled shard");
    }
}

impl BatchSource for DataLoader {
    fn next_batch(&mut self) -> Result<Batch> {
        if self.cursor >= self.order.len() {
            self.start_pass();
        }

        let end = (self.cursor + self.batch_size.get()).min(self.order.len());
        let batch = self.dataset.batch(&self.order[self.cursor..end])?;
        self.cursor = end;

        Ok(batch)
    }

    fn full_batches(&self) -> Result<Vec<Batch>> {
        let indices: Vec<usize> = (0..self.dataset.len()).collect();
        indices
            .chunks(self.batch_size.get())
            .map(|chunk| self.dataset.batch(chunk))
            .collect()
    }
}
