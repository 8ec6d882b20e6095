use reiter_common::SimParams;

/// Value at or above which a cell is frozen structure.
pub const FREEZE_THRESHOLD: f32 = 1.0;

/// Neighbor order used everywhere: N, NW, SW, NE, SE, S.
///
/// Offsets are `(row, col)` deltas for an odd column. Even columns shift the
/// four diagonal neighbors up one row (see [`HexGrid::neighbor_coords`]).
const HEX_OFFSETS: [(isize, isize); 6] = [
    (-1, 0), // N
    (0, -1), // NW
    (1, -1), // SW
    (0, 1),  // NE
    (1, 1),  // SE
    (1, 0),  // S
];

/// Geometry of a row-major grid whose cells form a flat-topped hexagonal
/// lattice by shearing alternate columns.
///
/// A cell is addressed either by `(row, col)` or by its flat id
/// `row * width + col`. The outermost ring of cells is a fixed border that
/// is never updated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HexGrid {
    width: usize,
    height: usize,
}

impl HexGrid {
    pub fn new(width: usize, height: usize) -> Self {
        HexGrid { width, height }
    }

    pub fn from_params(params: &SimParams) -> Self {
        Self::new(params.width, params.height)
    }

    pub fn total_cells(&self) -> usize {
        self.width * self.height
    }

    #[inline(always)]
    pub fn cell_id(&self, row: usize, col: usize) -> usize {
        row * self.width + col
    }

    #[inline(always)]
    pub fn row_col(&self, cell_id: usize) -> (usize, usize) {
        let col = cell_id % self.width;
        let row = (cell_id - col) / self.width;
        (row, col)
    }

    /// The nucleation site.
    pub fn center(&self) -> usize {
        self.cell_id(self.height / 2, self.width / 2)
    }

    /// Whether the cell lies on the fixed outer ring.
    #[inline(always)]
    pub fn is_border(&self, cell_id: usize) -> bool {
        let (row, col) = self.row_col(cell_id);
        row == 0 || col == 0 || row + 1 == self.height || col + 1 == self.width
    }

    pub fn interior_cells(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.total_cells()).filter(move |&id| !self.is_border(id))
    }

    /// Allocates a field with every cell at `beta` and the center seeded at 1.0.
    pub fn create_field(&self, beta: f32) -> Vec<f32> {
        let mut data = vec![beta; self.total_cells()];
        if let Some(center) = data.get_mut(self.center()) {
            *center = FREEZE_THRESHOLD;
        }
        data
    }

    /// Signed `(row, col)` of the six neighbors. Entries may fall outside the grid.
    #[inline(always)]
    pub fn neighbor_coords(&self, cell_id: usize) -> [(isize, isize); 6] {
        let (row, col) = self.row_col(cell_id);
        let (row, col) = (row as isize, col as isize);
        let row_offset = if col % 2 == 0 { -1 } else { 0 };

        let mut coords = [(0, 0); 6];
        for (slot, &(dr, dc)) in coords.iter_mut().zip(HEX_OFFSETS.iter()) {
            let shear = if dc != 0 { row_offset } else { 0 };
            *slot = (row + dr + shear, col + dc);
        }
        coords
    }

    /// Raw flat ids of the six neighbors, without any bounds check.
    ///
    /// Ids at the grid edge can be negative, exceed the cell count, or wrap
    /// into the adjacent row. Use [`HexGrid::in_bounds_neighbors`] before
    /// dereferencing field data.
    pub fn neighbors(&self, cell_id: usize) -> [isize; 6] {
        let width = self.width as isize;
        self.neighbor_coords(cell_id).map(|(row, col)| row * width + col)
    }

    /// Flat ids of the neighbors that lie inside the grid, in canonical order.
    ///
    /// Filters the raw ids from [`HexGrid::neighbors`]. The neighbor's column
    /// must be in range, which rejects ids that wrapped into an adjacent row;
    /// with the column in range, the id is in range exactly when the row is.
    #[inline(always)]
    pub fn in_bounds_neighbors(&self, cell_id: usize) -> impl Iterator<Item = usize> {
        let (_, col) = self.row_col(cell_id);
        let (col, width) = (col as isize, self.width as isize);
        let total = self.total_cells() as isize;
        self.neighbors(cell_id)
            .into_iter()
            .zip(HEX_OFFSETS)
            .filter(move |&(id, (_, dc))| (0..width).contains(&(col + dc)) && (0..total).contains(&id))
            .map(|(id, _)| id as usize)
    }
}
