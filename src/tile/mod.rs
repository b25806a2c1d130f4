//! Tile grid arithmetic.
//!
//! - [`tile_extent`]: true size of one tile, clipped at the image edge
//! - [`TileGrid`]: which tiles of a level cover at least one pixel

mod extent;

pub use extent::{prev_power_of_two, tile_count, tile_extent, TileExtent, TileGrid};
