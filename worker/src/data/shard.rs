use std::num::NonZeroUsize;
use std::ops::Range;

use ml_core::{MlError, Result};

/// Splits `total` samples among `num_workers` and returns the shard for `worker_id`.
///
/// Properties:
/// - Ranges are contiguous, disjoint and cover `[0..total)`.
/// - Sizes differ by at most 1 (balanced partition).
pub fn shard_range(total: usize, worker_id: usize, num_workers: NonZeroUsize) -> Range<usize> {
    let num_workers = num_workers.get();
    let base = total / num_workers;
    let rem = total % num_workers;

    let start = worker_id * base + worker_id.min(rem);
    let extra = if worker_id < rem { 1 } else { 0 };
    let end = start + base + extra;

    start..end
}

/// Shard specification for a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShardSpec {
    worker_id: usize,
    num_workers: NonZeroUsize,
}

impl ShardSpec {
    /// Creates a new `ShardSpec`.
    ///
    /// # Errors
    /// `MlError::InvalidInput` if `worker_id` is not below `num_workers`.
    pub fn new(worker_id: usize, num_workers: NonZeroUsize) -> Result<Self> {
        if worker_id >= num_workers.get() {
            return Err(MlError::InvalidInput("worker id out of range"));
        }
        Ok(Self {
            worker_id,
            num_workers,
        })
    }

    #[inline]
    pub fn worker_id(self) -> usize {
        self.worker_id
    }

    #[inline]
    pub fn num_workers(self) -> usize {
        self.num_workers.get()
    }

    #[inline]
    pub fn range(self, total: usize) -> Range<usize> {
        shard_range(total, self.worker_id, self.num_workers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nz(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    #[test]
    fn shard_range_balanced() {
        // total 10, workers 3 => sizes 4,3,3
        assert_eq!(shard_range(10, 0, nz(3)), 0..4);
        assert_eq!(shard_range(10, 1, nz(3)), 4..7);
        assert_eq!(shard_range(10, 2, nz(3)), 7..10);
    }

    #[test]
    fn shards_cover_everything_once() {
        let total = 23;
        let mut covered = vec![0; total];
        for id in 0..5 {
            for i in shard_range(total, id, nz(5)) {
                covered[i] += 1;
            }
        }
        assert!(covered.iter().all(|&c| c == 1));
    }

    #[test]
    fn out_of_range_worker_is_rejected() {
        assert!(ShardSpec::new(3, nz(3)).is_err());
        assert_eq!(ShardSpec::new(2, nz(3)).unwrap().range(9), 6..9);
    }
}
