//! Tile boundary arithmetic.
//!
//! Tiles are addressed by grid coordinates `(x, y)` covering the pixel window
//! `[x*T, y*T, x*T + width, y*T + height]`. Only tiles in the last column or
//! row can be smaller than `T`.

/// Pixel dimensions of one tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileExtent {
    pub width: u32,
    pub height: u32,
}

impl TileExtent {
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

/// Size of tile `(x, y)` of a `width`x`height` image cut into `tile_size`
/// squares.
///
/// The tile at `x == floor(width / tile_size)` is `width % tile_size` wide,
/// except when that remainder is 0, in which case it is a full tile. Heights
/// follow the same rule.
pub fn tile_extent(width: u32, height: u32, tile_size: u32, x: u32, y: u32) -> TileExtent {
    let tile_size = tile_size.max(1);
    TileExtent {
        width: edge_length(width, tile_size, x),
        height: edge_length(height, tile_size, y),
    }
}

fn edge_length(length: u32, tile_size: u32, index: u32) -> u32 {
    let last = length / tile_size;
    let remainder = length % tile_size;
    if index == last && remainder != 0 {
        remainder
    } else {
        tile_size
    }
}

/// Number of tile columns and rows needed to cover the image.
pub fn tile_count(width: u32, height: u32, tile_size: u32) -> (u32, u32) {
    let tile_size = tile_size.max(1);
    (width.div_ceil(tile_size), height.div_ceil(tile_size))
}

/// The tiles of one image level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileGrid {
    pub width: u32,
    pub height: u32,
    pub tile_size: u32,
    pub tiles_x: u32,
    pub tiles_y: u32,
}

impl TileGrid {
    pub fn new(width: u32, height: u32, tile_size: u32) -> Self {
        let (tiles_x, tiles_y) = tile_count(width, height, tile_size);
        Self {
            width,
            height,
            tile_size: tile_size.max(1),
            tiles_x,
            tiles_y,
        }
    }

    /// True when tile `(x, y)` covers at least one pixel.
    pub fn contains(&self, x: u32, y: u32) -> bool {
        x < self.tiles_x && y < self.tiles_y
    }

    /// Extent of tile `(x, y)`, or `None` outside the grid.
    pub fn extent(&self, x: u32, y: u32) -> Option<TileExtent> {
        if !self.contains(x, y) {
            return None;
        }
        Some(tile_extent(self.width, self.height, self.tile_size, x, y))
    }

    /// Pixel origin of tile `(x, y)`.
    pub fn origin(&self, x: u32, y: u32) -> (u64, u64) {
        (
            x as u64 * self.tile_size as u64,
            y as u64 * self.tile_size as u64,
        )
    }

    pub fn tile_count(&self) -> u64 {
        self.tiles_x as u64 * self.tiles_y as u64
    }
}

/// Largest power of two not greater than `n` (0 for 0).
pub fn prev_power_of_two(n: u32) -> u32 {
    if n == 0 {
        0
    } else {
        1 << (31 - n.leading_zeros())
    }
}
