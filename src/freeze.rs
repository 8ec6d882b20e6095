use crate::field_state::FieldView;
use crate::grid::{HexGrid, FREEZE_THRESHOLD};

/// Whether a cell is frozen structure or touches it.
///
/// A cell is receptive when its own value, or the value of any in-grid
/// neighbor, has reached [`FREEZE_THRESHOLD`]. Neighbors outside the grid
/// are skipped by coordinate, so edge cells never read out of range.
#[inline(always)]
pub fn is_receptive(grid: &HexGrid, field: &FieldView<'_>, cell_id: usize) -> bool {
    if is_frozen(field.get(cell_id)) {
        return true;
    }
    grid.in_bounds_neighbors(cell_id)
        .any(|n| is_frozen(field.get(n)))
}

#[inline(always)]
pub fn is_frozen(value: f32) -> bool {
    value >= FREEZE_THRESHOLD
}

/// Number of interior cells that are receptive in `field`.
pub fn count_receptive(grid: &HexGrid, field: &[f32]) -> usize {
    let view = FieldView::whole(field);
    grid.interior_cells()
        .filter(|&id| is_receptive(grid, &view, id))
        .count()
}

/// Number of cells at or above the freezing threshold.
pub fn count_frozen(field: &[f32]) -> usize {
    field.iter().filter(|&&v| is_frozen(v)).count()
}
