//! Opening images: reading format metadata once and building one pixel
//! source per pyramid level.
//!
//! - [`load_ome_tiff`]: a single OME-TIFF, legacy or SubIFD pyramid
//! - [`load_multi_tiff`]: one TIFF per `(t, c, z)` plane
//! - [`load_ome_zarr`]: an OME-NGFF group of Zarr v2 arrays
//! - [`open_image`]: pick one of the above for a local path or `s3://` URL

mod open;
mod tiff;
mod zarr;

pub use open::{open_image, ImageLocation};
pub use tiff::{load_multi_tiff, load_ome_tiff};
pub use zarr::load_ome_zarr;

use std::sync::Arc;

use crate::axes::AxisLabels;
use crate::decode::DecodePool;
use crate::dtype::DataType;
use crate::error::{DecodeError, MetadataError};
use crate::format::zarr::Multiscales;
use crate::format::OmeImage;
use crate::indexer::PlaneCounts;
use crate::source::{PixelSource, TileErrorHandler};

/// Options shared by every loader.
#[derive(Clone, Default)]
pub struct LoadOptions {
    /// Pool used for decoding; a default-sized pool is created when unset
    pub pool: Option<Arc<DecodePool>>,
    /// IFD offsets of the main chain, e.g. from an `offsets.json` sidecar
    pub offsets: Option<Vec<u64>>,
    /// OME `Image` (series) to open
    pub image: usize,
    /// Installed on every level's source
    pub tile_error_handler: Option<TileErrorHandler>,
}

impl std::fmt::Debug for LoadOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadOptions")
            .field("pool", &self.pool.as_ref().map(|p| p.size()))
            .field("offsets", &self.offsets.as_ref().map(Vec::len))
            .field("image", &self.image)
            .field("tile_error_handler", &self.tile_error_handler.is_some())
            .finish()
    }
}

impl LoadOptions {
    pub fn with_pool(mut self, pool: Arc<DecodePool>) -> Self {
        self.pool = Some(pool);
        self
    }

    pub fn with_offsets(mut self, offsets: Vec<u64>) -> Self {
        self.offsets = Some(offsets);
        self
    }

    pub fn with_image(mut self, image: usize) -> Self {
        self.image = image;
        self
    }

    pub fn with_tile_error_handler(mut self, handler: TileErrorHandler) -> Self {
        self.tile_error_handler = Some(handler);
        self
    }

    fn pool(&self) -> Result<Arc<DecodePool>, DecodeError> {
        match &self.pool {
            Some(pool) => Ok(pool.clone()),
            None => Ok(Arc::new(DecodePool::with_default_size()?)),
        }
    }
}

/// Parse an offsets sidecar: a JSON array of IFD offsets, one per page of the
/// main chain.
pub fn parse_offsets(document: &[u8]) -> Result<Vec<u64>, MetadataError> {
    serde_json::from_slice(document).map_err(|e| MetadataError::Json {
        key: "offsets.json".to_string(),
        message: e.to_string(),
    })
}

/// Format metadata an image was opened from.
#[derive(Debug, Clone)]
pub enum ImageMetadata {
    Ome(OmeImage),
    MultiFile { counts: PlaneCounts },
    Zarr(Multiscales),
}

impl ImageMetadata {
    pub fn name(&self) -> Option<&str> {
        match self {
            ImageMetadata::Ome(image) => image.name.as_deref(),
            ImageMetadata::MultiFile { .. } => None,
            ImageMetadata::Zarr(multiscales) => multiscales.name.as_deref(),
        }
    }

    pub fn channel_names(&self) -> Vec<String> {
        match self {
            ImageMetadata::Ome(image) => image.pixels.channel_names.clone(),
            ImageMetadata::MultiFile { counts } => {
                (0..counts.size_c).map(|c| format!("Channel {}", c)).collect()
            }
            ImageMetadata::Zarr(multiscales) => multiscales.channel_names.clone(),
        }
    }

    pub fn format(&self) -> &'static str {
        match self {
            ImageMetadata::Ome(_) => "OME-TIFF",
            ImageMetadata::MultiFile { .. } => "multi-file TIFF",
            ImageMetadata::Zarr(_) => "OME-Zarr",
        }
    }
}

/// An opened image: one source per level, finest first.
pub struct MultiscaleImage {
    pub levels: Vec<Arc<dyn PixelSource>>,
    pub metadata: ImageMetadata,
}

impl std::fmt::Debug for MultiscaleImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiscaleImage")
            .field("levels", &self.levels.len())
            .field("metadata", &self.metadata)
            .finish()
    }
}

impl MultiscaleImage {
    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    pub fn level(&self, level: usize) -> Option<&Arc<dyn PixelSource>> {
        self.levels.get(level)
    }

    /// Axis labels of the full-resolution level.
    pub fn labels(&self) -> Option<&AxisLabels> {
        self.levels.first().map(|source| source.labels())
    }

    pub fn dtype(&self) -> Option<DataType> {
        self.levels.first().map(|source| source.dtype())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_offsets() {
        assert_eq!(parse_offsets(b"[8, 1024, 4096]").unwrap(), vec![8, 1024, 4096]);
        assert!(matches!(
            parse_offsets(b"{\"offsets\": []}"),
            Err(MetadataError::Json { .. })
        ));
    }

    #[test]
    fn test_multi_file_channel_names() {
        let metadata = ImageMetadata::MultiFile {
            counts: PlaneCounts::new(1, 2, 1),
        };
        assert_eq!(metadata.channel_names(), vec!["Channel 0", "Channel 1"]);
        assert_eq!(metadata.format(), "multi-file TIFF");
        assert!(metadata.name().is_none());
    }
}
