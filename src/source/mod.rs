//! Pixel sources: one per pyramid level, serving tiles and whole planes.
//!
//! A source is built once when an image is opened and is immutable
//! afterwards. Every request walks the same steps:
//!
//! ```text
//! Requested -> LocationResolving -> Reading -> Decoding -> Delivered
//!                     |                |           |
//!                     +----------------+-----------+--> Aborted | Failed
//! ```
//!
//! Nothing is retried. A tile outside the grid resolves to `None` before any
//! lookup happens.

mod tiff;
mod window;
mod zarr;

pub use tiff::TiffPixelSource;
pub use zarr::ZarrPixelSource;

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::axes::{AxisLabels, Selection};
use crate::dtype::{DataType, PixelBuffer};
use crate::error::{IndexError, PixelSourceError};
use crate::signal::AbortSignal;

// =============================================================================
// Results and requests
// =============================================================================

/// Pixels of one plane or tile. Interleaved sources hold every sample of a
/// pixel next to each other, so `data.len() == width * height * samples`.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterResult {
    pub data: PixelBuffer,
    pub width: u32,
    pub height: u32,
}

/// A single tile.
pub type TileResult = RasterResult;

/// The same tile read for several selections, buffers in request order.
#[derive(Debug, Clone, PartialEq)]
pub struct TileBatch {
    pub data: Vec<PixelBuffer>,
    pub width: u32,
    pub height: u32,
}

/// Address of one tile.
#[derive(Debug, Clone, Default)]
pub struct TileRequest {
    pub x: u32,
    pub y: u32,
    pub selection: Selection,
    pub signal: Option<AbortSignal>,
}

impl TileRequest {
    pub fn new(x: u32, y: u32, selection: Selection) -> Self {
        Self {
            x,
            y,
            selection,
            signal: None,
        }
    }

    pub fn with_signal(mut self, signal: AbortSignal) -> Self {
        self.signal = Some(signal);
        self
    }
}

// =============================================================================
// Metadata
// =============================================================================

/// A physical pixel size.
#[derive(Debug, Clone, PartialEq)]
pub struct PhysicalSize {
    pub size: f64,
    pub unit: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PhysicalSizes {
    pub x: Option<PhysicalSize>,
    pub y: Option<PhysicalSize>,
    pub z: Option<PhysicalSize>,
}

impl PhysicalSizes {
    pub fn is_empty(&self) -> bool {
        self.x.is_none() && self.y.is_none() && self.z.is_none()
    }
}

/// Optional descriptive metadata carried by a source.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PixelMeta {
    pub physical_sizes: Option<PhysicalSizes>,
    pub photometric_interpretation: Option<u16>,
}

// =============================================================================
// Tile errors
// =============================================================================

/// Decides what happens to a failed tile: `Ok(())` drops the tile,
/// `Err` passes the error on.
pub type TileErrorHandler =
    Arc<dyn Fn(PixelSourceError) -> Result<(), PixelSourceError> + Send + Sync>;

/// Log and drop bounds-check failures, pass on everything else.
pub fn default_tile_error_handler(err: PixelSourceError) -> Result<(), PixelSourceError> {
    match err {
        PixelSourceError::BoundsCheck(message) => {
            warn!(%message, "tile outside array bounds ignored");
            Ok(())
        }
        other => Err(other),
    }
}

// =============================================================================
// Trait
// =============================================================================

/// One pyramid level of an image.
#[async_trait]
pub trait PixelSource: Send + Sync {
    /// The full plane at `selection`.
    async fn get_raster(
        &self,
        selection: &Selection,
        signal: Option<&AbortSignal>,
    ) -> Result<RasterResult, PixelSourceError>;

    /// One tile, `None` when `(x, y)` lies outside the tile grid.
    async fn get_tile(&self, request: &TileRequest) -> Result<Option<TileResult>, PixelSourceError>;

    fn shape(&self) -> &[usize];

    fn labels(&self) -> &AxisLabels;

    fn dtype(&self) -> DataType;

    fn tile_size(&self) -> u32;

    fn meta(&self) -> Option<&PixelMeta>;

    /// Called for tile failures other than aborts.
    fn on_tile_error(&self, err: PixelSourceError) -> Result<(), PixelSourceError> {
        default_tile_error_handler(err)
    }

    /// The same tile for several selections. `None` when the tile is outside
    /// the grid; the first failing selection fails the batch.
    async fn get_tiles(
        &self,
        x: u32,
        y: u32,
        selections: &[Selection],
        signal: Option<&AbortSignal>,
    ) -> Result<Option<TileBatch>, PixelSourceError> {
        let mut data = Vec::with_capacity(selections.len());
        let mut size = None;
        for selection in selections {
            let request = TileRequest {
                x,
                y,
                selection: selection.clone(),
                signal: signal.cloned(),
            };
            match self.get_tile(&request).await? {
                Some(tile) => {
                    size = Some((tile.width, tile.height));
                    data.push(tile.data);
                }
                None => return Ok(None),
            }
        }
        Ok(size.map(|(width, height)| TileBatch {
            data,
            width,
            height,
        }))
    }

    /// [`get_tile`](Self::get_tile) with failures passed through
    /// [`on_tile_error`](Self::on_tile_error). A dropped failure reads as
    /// `None`; aborts are always returned.
    async fn fetch_tile(&self, request: &TileRequest) -> Result<Option<TileResult>, PixelSourceError> {
        match self.get_tile(request).await {
            Err(err) if !err.is_aborted() => {
                self.on_tile_error(err)?;
                Ok(None)
            }
            other => other,
        }
    }

    /// Image width at this level.
    fn width(&self) -> usize {
        self.labels()
            .position("x")
            .and_then(|i| self.shape().get(i).copied())
            .unwrap_or(0)
    }

    /// Image height at this level.
    fn height(&self) -> usize {
        self.labels()
            .position("y")
            .and_then(|i| self.shape().get(i).copied())
            .unwrap_or(0)
    }
}

// =============================================================================
// Shared helpers
// =============================================================================

/// Run `fut` unless `signal` fires first. An already-aborted signal wins
/// without polling `fut`.
pub(crate) async fn abortable<F: Future>(
    signal: Option<&AbortSignal>,
    fut: F,
) -> Result<F::Output, PixelSourceError> {
    match signal {
        None => Ok(fut.await),
        Some(signal) => tokio::select! {
            biased;
            _ = signal.aborted() => Err(PixelSourceError::Aborted),
            out = fut => Ok(out),
        },
    }
}

pub(crate) fn check_aborted(signal: Option<&AbortSignal>) -> Result<(), PixelSourceError> {
    match signal {
        Some(signal) if signal.is_aborted() => Err(PixelSourceError::Aborted),
        _ => Ok(()),
    }
}

/// Validate a selection; an index past the end of its axis is a bounds-check
/// failure, anything else an index error.
pub(crate) fn check_selection(
    selection: &Selection,
    labels: &AxisLabels,
    shape: &[usize],
) -> Result<(), PixelSourceError> {
    selection.validate(labels, shape).map_err(|err| match err {
        IndexError::SelectionOutOfRange { .. } => PixelSourceError::BoundsCheck(err.to_string()),
        other => other.into(),
    })
}
