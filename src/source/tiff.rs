use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::trace;

use super::window::read_window;
use super::{
    abortable, check_aborted, check_selection, PixelMeta, PixelSource, RasterResult,
    TileErrorHandler, TileRequest, TileResult,
};
use crate::axes::{AxisLabels, Selection};
use crate::decode::DecodePool;
use crate::dtype::DataType;
use crate::error::{IndexError, PixelSourceError};
use crate::format::tiff::{Rect, TiffPage};
use crate::indexer::PlaneIndexer;
use crate::signal::AbortSignal;
use crate::tile::TileGrid;

/// One pyramid level of an OME-TIFF or multi-file TIFF image.
pub struct TiffPixelSource {
    indexer: Arc<PlaneIndexer>,
    level: usize,
    labels: AxisLabels,
    shape: Vec<usize>,
    dtype: DataType,
    grid: TileGrid,
    meta: Option<PixelMeta>,
    pool: Arc<DecodePool>,
    tile_error_handler: Option<TileErrorHandler>,
    lookups: AtomicUsize,
}

impl TiffPixelSource {
    /// `shape` follows `labels`, which must include `y` and `x`.
    pub fn new(
        indexer: Arc<PlaneIndexer>,
        level: usize,
        labels: AxisLabels,
        shape: Vec<usize>,
        dtype: DataType,
        tile_size: u32,
        pool: Arc<DecodePool>,
    ) -> Result<Self, IndexError> {
        if shape.len() != labels.len() {
            return Err(IndexError::RankMismatch {
                expected: labels.len(),
                actual: shape.len(),
            });
        }
        let (y, x) = labels
            .spatial_positions()
            .ok_or_else(|| IndexError::UnknownAxis {
                axis: "x".to_string(),
                labels: labels.as_slice().to_vec(),
            })?;
        let grid = TileGrid::new(shape[x] as u32, shape[y] as u32, tile_size);

        Ok(Self {
            indexer,
            level,
            labels,
            shape,
            dtype,
            grid,
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

    pub fn level(&self) -> usize {
        self.level
    }

    pub fn grid(&self) -> &TileGrid {
        &self.grid
    }

    pub fn indexer(&self) -> &Arc<PlaneIndexer> {
        &self.indexer
    }

    /// Number of indexer lookups made so far.
    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    async fn locate(
        &self,
        selection: &Selection,
        signal: Option<&AbortSignal>,
    ) -> Result<Arc<TiffPage>, PixelSourceError> {
        check_selection(selection, &self.labels, &self.shape)?;
        self.lookups.fetch_add(1, Ordering::SeqCst);
        let page = abortable(signal, self.indexer.index(selection, self.level)).await??;
        check_aborted(signal)?;
        Ok(page)
    }
}

#[async_trait]
impl PixelSource for TiffPixelSource {
    async fn get_raster(
        &self,
        selection: &Selection,
        signal: Option<&AbortSignal>,
    ) -> Result<RasterResult, PixelSourceError> {
        check_aborted(signal)?;
        let page = self.locate(selection, signal).await?;
        let window = Rect::new(0, 0, page.width, page.height);
        let data = read_window(&page, window, &self.pool, signal).await?;
        Ok(RasterResult {
            data,
            width: page.width,
            height: page.height,
        })
    }

    async fn get_tile(&self, request: &TileRequest) -> Result<Option<TileResult>, PixelSourceError> {
        let Some(extent) = self.grid.extent(request.x, request.y) else {
            return Ok(None);
        };
        let signal = request.signal.as_ref();
        check_aborted(signal)?;

        let page = self.locate(&request.selection, signal).await?;
        let (x0, y0) = self.grid.origin(request.x, request.y);
        let window = Rect::new(x0 as u32, y0 as u32, extent.width, extent.height);
        trace!(
            x = request.x,
            y = request.y,
            level = self.level,
            "reading tile"
        );
        let data = read_window(&page, window, &self.pool, signal).await?;

        Ok(Some(TileResult {
            data,
            width: extent.width,
            height: extent.height,
        }))
    }

    fn shape(&self) -> &[usize] {
        &self.shape
    }

    fn labels(&self) -> &AxisLabels {
        &self.labels
    }

    fn dtype(&self) -> DataType {
        self.dtype
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::axes::DimensionOrder;
    use crate::dtype::PixelBuffer;
    use crate::format::tiff::TiffFile;
    use crate::indexer::{PlaneCounts, SubIfdIndexer};
    use crate::io::MemoryRangeReader;
    use crate::testing::{build_tiff, memory_reader, TestPage};

    /// 2 channels of 40x24 u8, SubIFD level of 20x12.
    async fn source(level: usize) -> (Arc<MemoryRangeReader>, TiffPixelSource) {
        let plane = |c: u64| {
            TestPage::tiled(40, 24, 16, 8, 1, move |x, y, _| c * 100 + (y + x) as u64)
                .with_sub_ifds(vec![TestPage::tiled(20, 12, 16, 8, 1, move |_, _, _| c * 100 + 1)])
        };
        let (mem, reader) = memory_reader(build_tiff(&[plane(0), plane(1)]));
        let file = Arc::new(TiffFile::open(reader).await.unwrap());
        let indexer = PlaneIndexer::SubIfd(SubIfdIndexer::new(
            file,
            DimensionOrder::Xyzct,
            PlaneCounts::new(1, 2, 1),
        ));
        let labels = AxisLabels::from_dimension_order("XYZCT").unwrap();
        let shape = if level == 0 {
            vec![1, 2, 1, 24, 40]
        } else {
            vec![1, 2, 1, 12, 20]
        };
        let pool = Arc::new(DecodePool::new(2).unwrap());
        let source = TiffPixelSource::new(
            Arc::new(indexer),
            level,
            labels,
            shape,
            DataType::Uint8,
            16,
            pool,
        )
        .unwrap();
        (mem, source)
    }

    #[tokio::test]
    async fn test_edge_tile_is_clipped() {
        let (_, source) = source(0).await;
        let tile = source
            .get_tile(&TileRequest::new(2, 1, Selection::new().with("c", 1)))
            .await
            .unwrap()
            .unwrap();
        assert_eq!((tile.width, tile.height), (8, 8));
        let PixelBuffer::Uint8(values) = tile.data else {
            panic!("expected u8 samples");
        };
        assert_eq!(values.len(), 64);
        // Pixel (32, 16) of channel 1
        assert_eq!(values[0], 148);
    }

    #[tokio::test]
    async fn test_reduced_level_raster() {
        let (_, source) = source(1).await;
        let raster = source.get_raster(&Selection::new().with("c", 1), None).await.unwrap();
        assert_eq!((raster.width, raster.height), (20, 12));
        assert_eq!(raster.data, PixelBuffer::Uint8(vec![101; 240]));
        assert_eq!(source.width(), 20);
        assert_eq!(source.height(), 12);
    }

    #[tokio::test]
    async fn test_tile_outside_grid_skips_indexer() {
        let (mem, source) = source(0).await;
        let reads = mem.read_count();
        let tile = source
            .get_tile(&TileRequest::new(3, 0, Selection::new()))
            .await
            .unwrap();
        assert!(tile.is_none());
        assert!(source.get_tile(&TileRequest::new(0, 2, Selection::new())).await.unwrap().is_none());
        assert_eq!(source.lookup_count(), 0);
        assert_eq!(mem.read_count(), reads);
    }

    #[tokio::test]
    async fn test_aborted_tile_reads_nothing() {
        let (mem, source) = source(0).await;
        let reads = mem.read_count();
        let request = TileRequest::new(0, 0, Selection::new()).with_signal(AbortSignal::aborted_signal());
        let err = source.get_tile(&request).await.unwrap_err();
        assert!(err.is_aborted());
        assert_eq!(mem.read_count(), reads);
        assert_eq!(source.lookup_count(), 0);
    }

    #[tokio::test]
    async fn test_selection_out_of_range() {
        let (_, source) = source(0).await;
        let request = TileRequest::new(0, 0, Selection::new().with("c", 2));
        assert!(matches!(
            source.get_tile(&request).await,
            Err(PixelSourceError::BoundsCheck(_))
        ));
        // Default policy drops bounds-check failures
        assert!(source.fetch_tile(&request).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_custom_error_handler() {
        let (_, source) = source(0).await;
        let source = source.with_tile_error_handler(Arc::new(
            |err: PixelSourceError| -> Result<(), PixelSourceError> { Err(err) },
        ));
        let request = TileRequest::new(0, 0, Selection::new().with("c", 5));
        assert!(source.fetch_tile(&request).await.is_err());
    }

    #[tokio::test]
    async fn test_batched_tiles_keep_request_order() {
        let (_, source) = source(1).await;
        let selections = [Selection::new().with("c", 1), Selection::new().with("c", 0)];
        let batch = source.get_tiles(0, 0, &selections, None).await.unwrap().unwrap();
        assert_eq!((batch.width, batch.height), (16, 12));
        assert_eq!(batch.data[0], PixelBuffer::Uint8(vec![101; 192]));
        assert_eq!(batch.data[1], PixelBuffer::Uint8(vec![1; 192]));
    }
}
