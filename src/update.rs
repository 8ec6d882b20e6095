use reiter_common::SimParams;

use crate::field_state::FieldView;
use crate::freeze::is_receptive;
use crate::grid::HexGrid;

/// One synchronous relaxation pass of the freezing automaton.
///
/// Every backend funnels through [`UpdateRule::update_cell`], which keeps the
/// floating-point operation order identical regardless of how the grid is
/// split across workers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UpdateRule {
    pub grid: HexGrid,
    pub alpha: f32,
    pub beta: f32,
    pub gamma: f32,
}

impl UpdateRule {
    pub fn new(params: &SimParams) -> Self {
        UpdateRule {
            grid: HexGrid::from_params(params),
            alpha: params.alpha,
            beta: params.beta,
            gamma: params.gamma,
        }
    }

    /// Next value of an interior cell, computed from the pre-pass snapshot.
    ///
    /// All arithmetic is `f32`, so results agree with a double-precision
    /// evaluation only to float tolerance, not bit for bit.
    #[inline(always)]
    pub fn update_cell(&self, previous: &FieldView<'_>, cell_id: usize) -> f32 {
        let grid = &self.grid;

        // Only fluid neighbors diffuse in; neighbors touching structure are being consumed.
        let sum: f32 = grid
            .in_bounds_neighbors(cell_id)
            .filter(|&n| !is_receptive(grid, previous, n))
            .map(|n| previous.get(n))
            .sum();

        let value = previous.get(cell_id);
        let cell_r = if is_receptive(grid, previous, cell_id) { 1.0 } else { 0.0 };
        let cell_u = if cell_r == 0.0 { value } else { 0.0 };

        value + (self.alpha / 2.0) * ((sum / 6.0) - cell_u) + self.gamma * cell_r
    }

    /// Writes the next values of cells `first..first + out.len()` into `out`.
    ///
    /// Border cells keep their previous value.
    pub fn apply(&self, previous: &FieldView<'_>, first: usize, out: &mut [f32]) {
        for (i, slot) in out.iter_mut().enumerate() {
            let cell_id = first + i;
            *slot = if self.grid.is_border(cell_id) {
                previous.get(cell_id)
            } else {
                self.update_cell(previous, cell_id)
            };
        }
    }
}
