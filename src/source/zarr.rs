use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::trace;

use super::{
    abortable, check_aborted, check_selection, PixelMeta, PixelSource, RasterResult,
    TileErrorHandler, TileRequest, TileResult,
};
use crate::axes::{resolve_selection, AxisLabels, Selection};
use crate::decode::{DecodeHandle, DecodePool, DecodeTask};
use crate::dtype::{DataType, PixelBuffer};
use crate::error::{IndexError, LoadError, MetadataError, PixelSourceError};
use crate::format::zarr::{ChunkStore, ZarrArray};
use crate::indexer::{ChunkIndexer, ChunkLocation};
use crate::signal::AbortSignal;
use crate::tile::{TileExtent, TileGrid};

/// A fetched chunk on its way through the pool.
enum PendingChunk {
    /// Never written; every element is the fill value
    Fill,
    Decoding(DecodeHandle),
}

/// One pyramid level of an OME-Zarr image: a single Zarr array whose chunks
/// are the tiles.
pub struct ZarrPixelSource {
    store: Arc<dyn ChunkStore>,
    array: ZarrArray,
    indexer: ChunkIndexer,
    labels: AxisLabels,
    grid: TileGrid,
    /// Interleaved samples per pixel, 1 otherwise
    samples: usize,
    meta: Option<PixelMeta>,
    pool: Arc<DecodePool>,
    tile_error_handler: Option<TileErrorHandler>,
    lookups: AtomicUsize,
}

impl ZarrPixelSource {
    /// Chunks must be square in `y` and `x`, and span the whole `_c` axis of
    /// interleaved arrays.
    pub fn new(
        store: Arc<dyn ChunkStore>,
        array: ZarrArray,
        labels: AxisLabels,
        pool: Arc<DecodePool>,
    ) -> Result<Self, LoadError> {
        if labels.len() != array.shape.len() {
            return Err(IndexError::RankMismatch {
                expected: array.shape.len(),
                actual: labels.len(),
            }
            .into());
        }
        let indexer = ChunkIndexer::new(&labels, array.chunks.clone())?;
        let (y, x) = indexer.spatial_positions();
        if array.chunks[y] != array.chunks[x] {
            return Err(MetadataError::Unsupported(format!(
                "non-square chunks {}x{} in '{}'",
                array.chunks[x], array.chunks[y], array.path
            ))
            .into());
        }
        let samples = if labels.is_interleaved() {
            let last = array.shape.len() - 1;
            if array.chunks[last] != array.shape[last] {
                return Err(MetadataError::Unsupported(format!(
                    "sample axis split across chunks in '{}'",
                    array.path
                ))
                .into());
            }
            array.shape[last]
        } else {
            1
        };
        let grid = TileGrid::new(
            array.shape[x] as u32,
            array.shape[y] as u32,
            array.chunks[x] as u32,
        );

        Ok(Self {
            store,
            array,
            indexer,
            labels,
            grid,
            samples,
            meta: None,
            pool,
            tile_error_handler: None,
            lookups: AtomicUsize::new(0),
        })
    }

    pub fn with_meta(mut self, meta: PixelMeta) -> Self {
        self.meta = Some(meta);
        self
    }

    /// Replace the default tile error policy.
    pub fn with_tile_error_handler(mut self, handler: TileErrorHandler) -> Self {
        self.tile_error_handler = Some(handler);
        self
    }

    pub fn array(&self) -> &ZarrArray {
        &self.array
    }

    pub fn grid(&self) -> &TileGrid {
        &self.grid
    }

    /// Number of chunk lookups made so far.
    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    fn resolve(&self, selection: &Selection) -> Result<Vec<usize>, PixelSourceError> {
        check_selection(selection, &self.labels, &self.array.shape)?;
        Ok(resolve_selection(&self.labels, selection)?)
    }

    /// Fetch and decode the chunks behind `tiles`, returning each tile's
    /// samples in the array's byte order.
    async fn read_tiles(
        &self,
        resolved: &[usize],
        tiles: &[(u32, u32, TileExtent)],
        signal: Option<&AbortSignal>,
    ) -> Result<Vec<Vec<u8>>, PixelSourceError> {
        let mut pending = Vec::with_capacity(tiles.len());
        for &(x, y, _) in tiles {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            let location = self.indexer.index(resolved, x as usize, y as usize);
            let key = self.array.chunk_key(&location.coords);
            let chunk = match abortable(signal, self.store.get(&key)).await?? {
                Some(payload) => {
                    let task = DecodeTask::new(self.array.codec.clone(), payload)
                        .with_expected_len(self.array.chunk_byte_len());
                    PendingChunk::Decoding(self.pool.submit(task)?)
                }
                None => {
                    trace!(%key, "chunk missing, using fill value");
                    PendingChunk::Fill
                }
            };
            pending.push((location, chunk));
        }

        let mut out = Vec::with_capacity(tiles.len());
        for ((location, chunk), &(_, _, extent)) in pending.into_iter().zip(tiles) {
            let bytes = match chunk {
                PendingChunk::Fill => self.fill_bytes(extent),
                PendingChunk::Decoding(handle) => {
                    let chunk = abortable(signal, handle.wait()).await??;
                    self.extract(&chunk, &location, extent)
                }
            };
            out.push(bytes);
        }
        Ok(out)
    }

    fn fill_bytes(&self, extent: TileExtent) -> Vec<u8> {
        let sample = self
            .array
            .dtype
            .encode_sample(self.array.fill_value, self.array.byte_order);
        sample.repeat(extent.pixel_count() * self.samples)
    }

    /// Copy the `extent` corner of a decoded chunk at the selection's
    /// in-chunk offsets.
    fn extract(&self, chunk: &[u8], location: &ChunkLocation, extent: TileExtent) -> Vec<u8> {
        let strides = self.array.chunk_strides();
        let (y_pos, x_pos) = self.indexer.spatial_positions();
        let bytes = self.array.dtype.bytes_per_sample();
        let base: usize = location
            .offsets
            .iter()
            .zip(&strides)
            .map(|(offset, stride)| offset * stride)
            .sum();
        let sample_stride = strides.last().copied().unwrap_or(1);

        let mut out = Vec::with_capacity(extent.pixel_count() * self.samples * bytes);
        for row in 0..extent.height as usize {
            for col in 0..extent.width as usize {
                let pixel = base + row * strides[y_pos] + col * strides[x_pos];
                for s in 0..self.samples {
                    let at = (pixel + s * sample_stride) * bytes;
                    out.extend_from_slice(&chunk[at..at + bytes]);
                }
            }
        }
        out
    }
}

#[async_trait]
impl PixelSource for ZarrPixelSource {
    async fn get_raster(
        &self,
        selection: &Selection,
        signal: Option<&AbortSignal>,
    ) -> Result<RasterResult, PixelSourceError> {
        check_aborted(signal)?;
        let resolved = self.resolve(selection)?;

        let grid = self.grid;
        let mut tiles = Vec::with_capacity(grid.tile_count() as usize);
        for y in 0..grid.tiles_y {
            for x in 0..grid.tiles_x {
                if let Some(extent) = grid.extent(x, y) {
                    tiles.push((x, y, extent));
                }
            }
        }
        let data = self.read_tiles(&resolved, &tiles, signal).await?;

        let pixel = self.samples * self.array.dtype.bytes_per_sample();
        let row_len = grid.width as usize * pixel;
        let mut out = vec![0u8; row_len * grid.height as usize];
        for ((x, y, extent), bytes) in tiles.iter().zip(data) {
            let (x0, y0) = grid.origin(*x, *y);
            let tile_row = extent.width as usize * pixel;
            for row in 0..extent.height as usize {
                let dst = (y0 as usize + row) * row_len + x0 as usize * pixel;
                out[dst..dst + tile_row].copy_from_slice(&bytes[row * tile_row..(row + 1) * tile_row]);
            }
        }

        Ok(RasterResult {
            data: PixelBuffer::from_bytes(self.array.dtype, &out, self.array.byte_order),
            width: grid.width,
            height: grid.height,
        })
    }

    async fn get_tile(&self, request: &TileRequest) -> Result<Option<TileResult>, PixelSourceError> {
        let Some(extent) = self.grid.extent(request.x, request.y) else {
            return Ok(None);
        };
        let signal = request.signal.as_ref();
        check_aborted(signal)?;

        let resolved = self.resolve(&request.selection)?;
        let mut data = self
            .read_tiles(&resolved, &[(request.x, request.y, extent)], signal)
            .await?;
        let bytes = data.pop().unwrap_or_default();

        Ok(Some(TileResult {
            data: PixelBuffer::from_bytes(self.array.dtype, &bytes, self.array.byte_order),
            width: extent.width,
            height: extent.height,
        }))
    }

    fn shape(&self) -> &[usize] {
        &self.array.shape
    }

    fn labels(&self) -> &AxisLabels {
        &self.labels
    }

    fn dtype(&self) -> DataType {
        self.array.dtype
    }

    fn tile_size(&self) -> u32 {
        self.grid.tile_size
    }

    fn meta(&self) -> Option<&PixelMeta> {
        self.meta.as_ref()
    }

    fn on_tile_error(&self, err: PixelSourceError) -> Result<(), PixelSourceError> {
        match &self.tile_error_handler {
            Some(handler) => handler(err),
            None => super::default_tile_error_handler(err),
        }
    }
}
