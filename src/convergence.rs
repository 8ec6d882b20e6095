use serde::Serialize;

use crate::field_state::FieldView;
use crate::freeze::is_receptive;
use crate::grid::HexGrid;

/// Why a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StopReason {
    /// The receptive set stayed unchanged for the configured number of passes.
    Stable,
    /// The iteration ceiling was passed.
    IterationCeiling,
}

/// Decides when the update loop stops.
///
/// The loop runs while the field is not stable and the number of completed
/// passes does not exceed `max_iterations`, so at most `max_iterations + 1`
/// passes happen.
#[derive(Debug, Clone)]
pub struct ConvergenceTest {
    max_iterations: usize,
    patience: usize,
    stable_streak: usize,
}

impl ConvergenceTest {
    pub fn new(max_iterations: usize, patience: usize) -> Self {
        ConvergenceTest {
            max_iterations,
            patience: patience.max(1),
            stable_streak: 0,
        }
    }

    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    /// True iff every interior cell kept its frozen/fluid classification.
    pub fn is_stable(grid: &HexGrid, previous: &[f32], current: &[f32]) -> bool {
        let before = FieldView::whole(previous);
        let after = FieldView::whole(current);
        grid.interior_cells()
            .all(|id| is_receptive(grid, &before, id) == is_receptive(grid, &after, id))
    }

    /// Records the outcome of a pass and returns the stop reason, if any.
    ///
    /// `iterations` is the number of passes completed so far.
    pub fn observe(&mut self, iterations: usize, stable: bool) -> Option<StopReason> {
        self.stable_streak = if stable { self.stable_streak + 1 } else { 0 };
        if self.stable_streak >= self.patience {
            Some(StopReason::Stable)
        } else if iterations > self.max_iterations {
            Some(StopReason::IterationCeiling)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ceiling_allows_one_extra_pass() {
        let mut test = ConvergenceTest::new(3, 1);
        let mut passes = 0;
        let reason = loop {
            passes += 1;
            if let Some(reason) = test.observe(passes, false) {
                break reason;
            }
        };
        assert_eq!(reason, StopReason::IterationCeiling);
        assert_eq!(passes, 4);
    }

    #[test]
    fn patience_requires_consecutive_stable_passes() {
        let mut test = ConvergenceTest::new(100, 3);
        assert_eq!(test.observe(1, true), None);
        assert_eq!(test.observe(2, true), None);
        assert_eq!(test.observe(3, false), None);
        assert_eq!(test.observe(4, true), None);
        assert_eq!(test.observe(5, true), None);
        assert_eq!(test.observe(6, true), Some(StopReason::Stable));
    }

    #[test]
    fn stability_compares_receptive_sets() {
        let grid = HexGrid::new(7, 7);
        let before = grid.create_field(0.5);
        let mut after = before.clone();
        // Raising a fluid value without freezing keeps the classification.
        after[grid.cell_id(1, 1)] = 0.9;
        assert!(ConvergenceTest::is_stable(&grid, &before, &after));

        // Freezing a ring cell extends the receptive set.
        let ring = grid.in_bounds_neighbors(grid.center()).next().unwrap();
        after[ring] = 1.0;
        assert!(!ConvergenceTest::is_stable(&grid, &before, &after));
    }
}
