//! # ome-pixels
//!
//! Tile-granular reading of large multi-dimensional, multi-resolution
//! microscopy images.
//!
//! Supported layouts:
//!
//! - **OME-TIFF**: legacy pyramids (levels stored one after another in the
//!   IFD chain) and SubIFD pyramids, multi-series files included
//! - **Multi-file TIFF**: one single-plane TIFF per `(t, c, z)`
//! - **OME-Zarr**: Zarr v2 arrays grouped by NGFF `multiscales` metadata
//!
//! Bytes come from local files or S3-compatible object storage through range
//! reads; only the blocks or chunks a request touches are fetched and
//! decoded.
//!
//! ## Architecture
//!
//! - [`axes`] - axis labels and selections
//! - [`tile`] - tile grid arithmetic
//! - [`io`] - range readers and the block cache
//! - [`mod@format`] - TIFF, OME-XML and Zarr metadata
//! - [`indexer`] - selection to page or chunk mapping
//! - [`decode`] - codecs and the decode worker pool
//! - [`source`] - the [`PixelSource`] trait and its implementations
//! - [`loader`] - building one source per pyramid level
//! - [`stats`] - channel statistics
//! - [`config`] - CLI and reader configuration
//!
//! ## Example
//!
//! ```rust,no_run
//! use ome_pixels::{open_image, LoadOptions, ReaderConfig, Selection, TileRequest};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ReaderConfig::default();
//! let image = open_image("s3://plates/a1.ome.tif", &[], &config, LoadOptions::default()).await?;
//!
//! let level = &image.levels[0];
//! let request = TileRequest::new(0, 0, Selection::new().with("c", 1));
//! if let Some(tile) = level.get_tile(&request).await? {
//!     println!("{}x{} {}", tile.width, tile.height, level.dtype());
//! }
//! # Ok(())
//! # }
//! ```

pub mod axes;
pub mod config;
pub mod decode;
pub mod dtype;
pub mod error;
pub mod format;
pub mod indexer;
pub mod io;
pub mod loader;
pub mod signal;
pub mod source;
pub mod stats;
pub mod tile;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types
pub use axes::{resolve_selection, AxisLabels, DimensionOrder, PlaneKey, Selection};
pub use config::{Cli, Command, ReaderConfig};
pub use decode::{default_pool_size, Codec, DecodePool, DecodeTask};
pub use dtype::{DataType, PixelBuffer};
pub use error::{
    DecodeError, IndexError, IoError, LoadError, MetadataError, PixelSourceError, TiffError,
};
pub use format::tiff::{ByteOrder, OffsetPages, PageSource, TiffFile, TiffPage};
pub use format::zarr::{ChunkStore, FileSystemStore, MemoryStore, S3Store, ZarrArray};
pub use format::{OmeMetadata, OmePixels};
pub use indexer::{ChunkIndexer, PlaneCounts, PlaneIndexer};
pub use io::{
    create_s3_client, BlockCache, FileRangeReader, MemoryRangeReader, RangeReader, S3Location,
    S3RangeReader,
};
pub use loader::{
    load_multi_tiff, load_ome_tiff, load_ome_zarr, open_image, parse_offsets, ImageLocation,
    ImageMetadata, LoadOptions, MultiscaleImage,
};
pub use signal::AbortSignal;
pub use source::{
    default_tile_error_handler, PhysicalSize, PhysicalSizes, PixelMeta, PixelSource, RasterResult,
    TileBatch, TileErrorHandler, TileRequest, TileResult, TiffPixelSource, ZarrPixelSource,
};
pub use stats::{buffer_stats, compute_stats, ChannelStats};
pub use tile::{tile_count, tile_extent, TileExtent, TileGrid};
