use anyhow::Result;

use crate::field_state::FieldView;
use crate::partition::Partition;
use crate::update::UpdateRule;

/// Per-iteration scatter/gather buffers, owned by the engine.
///
/// Holds the partition plan plus, for every worker, a padded view buffer
/// (owned cells and halo) and an output buffer for the owned span. Buffers
/// are sized once from the plan and reused every iteration. A strategy may
/// lend them to its workers during a pass but must return them by the end
/// of [`gather`](crate::strategy::ConcurrencyStrategy::gather).
#[derive(Debug)]
pub struct Exchange {
    pub(crate) partitions: Vec<Partition>,
    pub(crate) views: Vec<Vec<f32>>,
    pub(crate) outputs: Vec<Vec<f32>>,
}

impl Exchange {
    pub fn new(partitions: Vec<Partition>) -> Self {
        let views = partitions.iter().map(|p| vec![0.0; p.view_len()]).collect();
        let outputs = partitions.iter().map(|p| vec![0.0; p.count]).collect();
        Exchange { partitions, views, outputs }
    }

    pub fn num_workers(&self) -> usize {
        self.partitions.len()
    }

    /// Checks that a lent buffer came back with the size the plan demands.
    pub(crate) fn check_sizes(&self) -> Result<()> {
        for (part, (view, output)) in self.partitions.iter().zip(self.views.iter().zip(&self.outputs)) {
            if view.len() != part.view_len() || output.len() != part.count {
                anyhow::bail!(
                    "Exchange buffers for worker {} have sizes {}/{} but the plan needs {}/{}.",
                    part.rank,
                    view.len(),
                    output.len(),
                    part.view_len(),
                    part.count
                );
            }
        }
        Ok(())
    }
}

/// Copies a worker's padded slice out of the global field.
#[inline]
pub fn scatter_view(part: &Partition, global: &[f32], view: &mut [f32]) {
    view.copy_from_slice(&global[part.view_range()]);
}

/// Runs the update rule over a worker's owned span only. Halo cells are read, never written.
#[inline]
pub fn update_owned(rule: &UpdateRule, part: &Partition, view: &[f32], output: &mut [f32]) {
    let previous = FieldView::new(view, part.view_start());
    rule.apply(&previous, part.start, output);
}

/// Copies a worker's owned results into the global field.
#[inline]
pub fn gather_owned(part: &Partition, output: &[f32], global: &mut [f32]) {
    global[part.owned_range()].copy_from_slice(output);
}

/// Copies owned results into a chunk already split off by [`owned_chunks_mut`].
#[inline]
pub fn gather_owned_chunk(output: &[f32], chunk: &mut [f32]) {
    chunk.copy_from_slice(output);
}

/// Splits `global` into the disjoint owned chunks of each partition, in order.
pub fn owned_chunks_mut<'a>(partitions: &[Partition], global: &'a mut [f32]) -> Vec<&'a mut [f32]> {
    let mut chunks = Vec::with_capacity(partitions.len());
    let mut rest = global;
    for part in partitions {
        let (head, tail) = std::mem::take(&mut rest).split_at_mut(part.count);
        chunks.push(head);
        rest = tail;
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::{plan_with_hops, UPDATE_HOPS};
    use reiter_common::SimParams;

    #[test]
    fn buffers_match_plan() {
        let exchange = Exchange::new(plan_with_hops(100, 3, 10, UPDATE_HOPS));
        assert_eq!(exchange.num_workers(), 3);
        for (part, view) in exchange.partitions.iter().zip(&exchange.views) {
            assert_eq!(view.len(), part.view_len());
        }
        exchange.check_sizes().unwrap();
    }

    #[test]
    fn scatter_update_gather_reproduces_full_pass() {
        let params = SimParams { width: 11, height: 9, alpha: 1.0, beta: 0.4, gamma: 0.05 };
        let rule = UpdateRule::new(&params);
        let grid = rule.grid;

        // Grow a few passes so the structure reaches partition boundaries.
        let mut previous = grid.create_field(params.beta);
        let mut expected = vec![0.0; grid.total_cells()];
        for _ in 0..6 {
            rule.apply(&FieldView::whole(&previous), 0, &mut expected);
            std::mem::swap(&mut previous, &mut expected);
        }
        rule.apply(&FieldView::whole(&previous), 0, &mut expected);

        let mut exchange = Exchange::new(plan_with_hops(grid.total_cells(), 5, params.width, UPDATE_HOPS));
        let mut current = vec![0.0; grid.total_cells()];
        for w in 0..exchange.num_workers() {
            let part = exchange.partitions[w];
            scatter_view(&part, &previous, &mut exchange.views[w]);
            update_owned(&rule, &part, &exchange.views[w], &mut exchange.outputs[w]);
            gather_owned(&part, &exchange.outputs[w], &mut current);
        }
        assert_eq!(current, expected);
    }

    #[test]
    fn owned_chunks_are_disjoint_and_ordered() {
        let parts = plan_with_hops(10, 4, 2, 1);
        let mut global: Vec<f32> = (0..10).map(|v| v as f32).collect();
        let chunks = owned_chunks_mut(&parts, &mut global);
        let lens: Vec<usize> = chunks.iter().map(|c| c.len()).collect();
        assert_eq!(lens, vec![3, 3, 3, 1]);
        assert_eq!(chunks[3][0], 9.0);
    }
}
