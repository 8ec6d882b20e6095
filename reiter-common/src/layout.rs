use anyhow::Result;

/// Staggered placement of hex cells on a raster image.
///
/// Each cell occupies a tile `pixels_per_cell` wide and `2 * pixels_per_cell`
/// tall. Odd columns are shifted down by half a tile, which matches the
/// neighbor rule where even columns reach up one row and odd columns down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileLayout {
    pub width: usize,
    pub height: usize,
    pub pixels_per_cell: u32,
}

impl TileLayout {
    pub fn new(width: usize, height: usize, pixels_per_cell: u32) -> Self {
        TileLayout { width, height, pixels_per_cell }
    }

    /// Like [`TileLayout::new`], but rejects grids whose image would not fit `u32` pixels.
    pub fn try_new(width: usize, height: usize, pixels_per_cell: u32) -> Result<Self> {
        let image_width = u32::try_from(width).ok().and_then(|w| w.checked_mul(pixels_per_cell));
        let image_height = u32::try_from(height)
            .ok()
            .and_then(|h| h.checked_mul(2))
            .and_then(|h| h.checked_mul(pixels_per_cell))
            .and_then(|h| h.checked_add(pixels_per_cell));
        if image_width.is_none() || image_height.is_none() {
            anyhow::bail!(
                "A {}x{} grid at {} pixels per cell is too large for an image.",
                width,
                height,
                pixels_per_cell
            );
        }
        Ok(Self::new(width, height, pixels_per_cell))
    }

    pub fn image_width(&self) -> u32 {
        self.pixels_per_cell * self.width as u32
    }

    pub fn image_height(&self) -> u32 {
        2 * self.pixels_per_cell * self.height as u32 + self.pixels_per_cell
    }

    /// Tile size in pixels as `(width, height)`.
    pub fn tile_size(&self) -> (u32, u32) {
        (self.pixels_per_cell, 2 * self.pixels_per_cell)
    }

    /// Top-left pixel of the tile for `(row, col)`.
    pub fn tile_origin(&self, row: usize, col: usize) -> (u32, u32) {
        let stagger = if col % 2 == 0 { 0 } else { self.pixels_per_cell };
        let x = col as u32 * self.pixels_per_cell;
        let y = stagger + row as u32 * 2 * self.pixels_per_cell;
        (x, y)
    }
}
