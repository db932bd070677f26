//! Static partitioning of a linear index range into contiguous per-worker blocks.

use std::{ops::Range, thread};

/// Splits `0..count` into at most `workers` contiguous, non-empty blocks whose sizes
/// differ by at most one.
///
/// Each block takes the ceiling of the remaining indices divided by the remaining
/// workers, so larger blocks come first:
///
/// ```
/// use fanout::block_partition::BlockPartition;
///
/// let blocks = BlockPartition::new(10, 3).collect::<Vec<_>>();
/// assert_eq!(blocks, [0..4, 4..7, 7..10]);
/// ```
#[derive(Debug, Clone)]
pub struct BlockPartition {
    count: usize,
    workers: usize,
    assigned: usize,
    worker: usize,
}

impl BlockPartition {
    pub fn new(count: usize, workers: usize) -> BlockPartition {
        BlockPartition {
            count,
            workers,
            assigned: 0,
            worker: 0,
        }
    }

    /// Total number of blocks the partition yields.
    pub fn block_count(&self) -> usize {
        self.count.min(self.workers)
    }
}

impl Iterator for BlockPartition {
    type Item = Range<usize>;

    fn next(&mut self) -> Option<Range<usize>> {
        if self.assigned >= self.count || self.worker >= self.workers {
            return None;
        }
        let left = self.count - self.assigned;
        let remaining = self.workers - self.worker;
        let size = left.div_ceil(remaining);
        let block = self.assigned..self.assigned + size;
        self.assigned = block.end;
        self.worker += 1;
        Some(block)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.block_count() - self.worker.min(self.block_count());
        (left, Some(left))
    }
}

impl ExactSizeIterator for BlockPartition {}

/// Partitions `0..count` into blocks of near-equal size, one per worker, and calls
/// `task(block)` for each on its own scoped thread. Blocks until every worker returns.
///
/// Nothing is dispatched for an empty range or zero workers. When the partition has a
/// single block, it runs inline on the caller's thread.
pub fn for_each_block<F>(count: usize, workers: usize, task: F)
where
    F: Fn(Range<usize>) + Sync,
{
    let mut blocks = BlockPartition::new(count, workers);
    match blocks.len() {
        0 => (),
        1 => task(0..count),
        n => {
            log::debug!("for_each_block: {count} indices in {n} blocks");
            let task = &task;
            thread::scope(|scope| {
                for (worker, block) in blocks.by_ref().enumerate() {
                    thread::Builder::new()
                        .name(format!("fanout-block-{worker}"))
                        .spawn_scoped(scope, move || task(block))
                        .expect("spawn thread");
                }
            });
        }
    }
}
