use std::ops::Range;

/// Halo depth, in neighbor hops, needed by the update rule.
///
/// A cell's update reads its neighbors and the freeze state of each
/// neighbor, which in turn reads the neighbor's neighbors.
pub const UPDATE_HOPS: usize = 2;

/// One worker's share of the flat cell index space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Partition {
    pub rank: usize,
    /// First owned cell.
    pub start: usize,
    /// Number of owned cells.
    pub count: usize,
    /// Read-only cells before `start` included in the worker's view.
    pub halo_before: usize,
    /// Read-only cells after the owned span included in the worker's view.
    pub halo_after: usize,
}

impl Partition {
    pub fn end(&self) -> usize {
        self.start + self.count
    }

    /// Cells this worker writes.
    pub fn owned_range(&self) -> Range<usize> {
        self.start..self.end()
    }

    /// Global id of the first cell in the padded view.
    pub fn view_start(&self) -> usize {
        self.start - self.halo_before
    }

    pub fn view_len(&self) -> usize {
        self.halo_before + self.count + self.halo_after
    }

    /// Cells this worker reads.
    pub fn view_range(&self) -> Range<usize> {
        self.view_start()..self.view_start() + self.view_len()
    }
}

/// Splits `total_cells` into `num_workers` contiguous blocks of
/// `ceil(total_cells / num_workers)` cells, the last block truncated.
///
/// Each view is padded by up to `width + 1` cells on either side, clipped to
/// the grid. Trailing workers own nothing when there are more workers than
/// blocks.
///
/// # Panics
///
/// Panics if `num_workers` is zero.
pub fn plan(total_cells: usize, num_workers: usize, width: usize) -> Vec<Partition> {
    assert!(num_workers > 0, "partition plan needs at least one worker");

    let block_size = total_cells.div_ceil(num_workers);
    let reach = width + 1;

    let mut partitions = Vec::with_capacity(num_workers);
    let mut assigned = 0;
    for rank in 0..num_workers {
        let count = block_size.min(total_cells - assigned);
        let start = assigned;
        assigned += count;

        partitions.push(Partition {
            rank,
            start,
            count,
            halo_before: reach.min(start),
            halo_after: reach.min(total_cells - start - count),
        });
    }
    partitions
}

/// Same blocks as [`plan`], with halos widened to `hops * (width + 1)` cells.
pub fn plan_with_hops(total_cells: usize, num_workers: usize, width: usize, hops: usize) -> Vec<Partition> {
    let reach = hops * (width + 1);
    plan(total_cells, num_workers, width)
        .into_iter()
        .map(|part| Partition {
            halo_before: reach.min(part.start),
            halo_after: reach.min(total_cells - part.end()),
            ..part
        })
        .collect()
}
