use crate::grid::HexGrid;

/// Read-only window onto a contiguous run of field values.
///
/// `offset` is the global cell id of `data[0]`, so callers always address
/// cells by their global id whether the window is the whole field or a
/// worker's padded slice.
#[derive(Debug, Clone, Copy)]
pub struct FieldView<'a> {
    data: &'a [f32],
    offset: usize,
}

impl<'a> FieldView<'a> {
    pub fn new(data: &'a [f32], offset: usize) -> Self {
        FieldView { data, offset }
    }

    /// A view over a complete field.
    pub fn whole(data: &'a [f32]) -> Self {
        Self::new(data, 0)
    }

    /// Value of the cell with global id `cell_id`.
    ///
    /// Panics if the cell lies outside the window; halo sizing guarantees
    /// every read made by the update rule is covered.
    #[inline(always)]
    pub fn get(&self, cell_id: usize) -> f32 {
        debug_assert!(self.covers(cell_id), "cell {} outside view", cell_id);
        self.data[cell_id - self.offset]
    }

    pub fn covers(&self, cell_id: usize) -> bool {
        cell_id >= self.offset && cell_id - self.offset < self.data.len()
    }
}

/// The double-buffered scalar field.
///
/// Each pass reads from `previous` and writes into `current`, then the two
/// are swapped so `previous` always holds the newest completed state.
#[derive(Debug)] // Large buffers shouldn't be cloned casually
pub struct FieldState {
    pub grid: HexGrid,

    // --- Ping-Pong Buffers ---
    // Snapshot read by the pass in progress (and the latest state between passes)
    pub previous: Vec<f32>,
    // Target of the pass in progress
    pub current: Vec<f32>,
}

impl FieldState {
    /// Allocates both buffers seeded identically.
    pub fn new(grid: HexGrid, beta: f32) -> Self {
        Self {
            grid,
            previous: grid.create_field(beta),
            current: grid.create_field(beta),
        }
    }

    /// Swaps the input and output buffers after a completed pass.
    pub fn swap_buffers(&mut self) {
        std::mem::swap(&mut self.previous, &mut self.current);
    }

    /// The newest completed state.
    pub fn latest(&self) -> &[f32] {
        &self.previous
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn view_addresses_by_global_id() {
        let data = [1.0, 2.0, 3.0];
        let view = FieldView::new(&data, 10);
        assert_eq!(view.get(11), 2.0);
        assert!(view.covers(12));
        assert!(!view.covers(9));
        assert!(!view.covers(13));
    }

    #[test]
    fn swap_exposes_written_buffer_as_latest() {
        let mut state = FieldState::new(HexGrid::new(3, 3), 0.5);
        state.current[0] = 0.25;
        state.swap_buffers();
        assert_eq!(state.latest()[0], 0.25);
        assert_eq!(state.current[0], 0.5);
    }
}
