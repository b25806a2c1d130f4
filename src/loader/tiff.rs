use std::sync::Arc;

use tracing::debug;

use super::{ImageMetadata, LoadOptions, MultiscaleImage};
use crate::axes::{AxisLabels, DimensionOrder, PlaneKey, Selection};
use crate::decode::DecodePool;
use crate::dtype::DataType;
use crate::error::{LoadError, MetadataError};
use crate::format::tiff::{OffsetPages, PageSource, TiffFile};
use crate::format::{OmeMetadata, OmePixels};
use crate::indexer::{LegacyIndexer, MultiFileIndexer, PlaneCounts, PlaneIndexer, SubIfdIndexer};
use crate::io::RangeReader;
use crate::source::{PhysicalSize, PhysicalSizes, PixelMeta, PixelSource, TiffPixelSource};

// =============================================================================
// OME-TIFF
// =============================================================================

/// Open one image of an OME-TIFF.
///
/// The pyramid layout is detected from the file:
///
/// - SubIFD pyramid when the image's first page lists SubIFDs, or when the
///   file holds several images (each image's planes are then offset by the
///   planes of the images before it)
/// - legacy pyramid when the main chain holds more pages than one level
///   has planes; levels follow each other in the chain
/// - a single level otherwise
pub async fn load_ome_tiff(
    reader: Arc<dyn RangeReader>,
    options: LoadOptions,
) -> Result<MultiscaleImage, LoadError> {
    let file = Arc::new(TiffFile::open(reader).await?);
    let first = file.page(0).await?;
    let xml = first
        .description()
        .await?
        .ok_or_else(|| MetadataError::MissingField("ImageDescription".to_string()))?;
    let ome = OmeMetadata::parse(&xml)?;
    let image = ome.image(options.image)?.clone();
    let pixels = &image.pixels;
    let counts = pixels.plane_counts();

    let pages: Arc<dyn PageSource> = match options.offsets.clone() {
        Some(offsets) => Arc::new(OffsetPages::new(file.clone(), offsets)),
        None => file.clone(),
    };

    let plane_offset = ome.planes_before(options.image);
    let series_page = pages.page(plane_offset).await?;
    let (indexer, level_count) = if !series_page.sub_ifds.is_empty() || ome.images.len() > 1 {
        let indexer = SubIfdIndexer::new(pages, pixels.dimension_order, counts)
            .with_plane_offset(plane_offset);
        (PlaneIndexer::SubIfd(indexer), 1 + series_page.sub_ifds.len())
    } else {
        let page_count = pages.page_count().await?;
        let planes = counts.plane_count().max(1);
        if page_count > planes {
            let indexer = LegacyIndexer::new(pages, pixels.dimension_order, counts);
            (PlaneIndexer::Legacy(indexer), page_count / planes)
        } else {
            let indexer = SubIfdIndexer::new(pages, pixels.dimension_order, counts);
            (PlaneIndexer::SubIfd(indexer), 1)
        }
    };
    debug!(
        image = options.image,
        indexer = indexer.kind(),
        levels = level_count,
        order = %pixels.dimension_order,
        "opened OME-TIFF"
    );

    let pool = options.pool()?;
    let indexer = Arc::new(indexer);
    let labels = pixels.labels();
    let mut levels: Vec<Arc<dyn PixelSource>> = Vec::with_capacity(level_count);
    for level in 0..level_count {
        let page = indexer.index(&Selection::new(), level).await?;
        let shape = pixels.shape_at(page.width as usize, page.height as usize);
        let meta = PixelMeta {
            physical_sizes: level_physical_sizes(pixels, page.width, page.height),
            photometric_interpretation: page.photometric,
        };
        let source = TiffPixelSource::new(
            indexer.clone(),
            level,
            labels.clone(),
            shape,
            pixels.dtype,
            page.tile_size(),
            pool.clone(),
        )?
        .with_meta(meta);
        levels.push(Arc::new(with_handler(source, &options)));
    }

    Ok(MultiscaleImage {
        levels,
        metadata: ImageMetadata::Ome(image),
    })
}

/// Physical pixel sizes grow as the level shrinks.
fn level_physical_sizes(pixels: &OmePixels, width: u32, height: u32) -> Option<PhysicalSizes> {
    let scale = |size: &Option<PhysicalSize>, full: usize, level: u32| {
        size.as_ref().map(|s| PhysicalSize {
            size: s.size * full as f64 / f64::from(level.max(1)),
            unit: s.unit.clone(),
        })
    };
    let sizes = PhysicalSizes {
        x: scale(&pixels.physical_size_x, pixels.size_x, width),
        y: scale(&pixels.physical_size_y, pixels.size_y, height),
        z: pixels.physical_size_z.clone(),
    };
    (!sizes.is_empty()).then_some(sizes)
}

fn with_handler(source: TiffPixelSource, options: &LoadOptions) -> TiffPixelSource {
    match &options.tile_error_handler {
        Some(handler) => source.with_tile_error_handler(handler.clone()),
        None => source,
    }
}

// =============================================================================
// Multi-file TIFF
// =============================================================================

/// Open an image stored as one TIFF per plane.
///
/// The plane cube is taken from the largest `t`, `c` and `z` among the keys;
/// every plane inside it must have a file. Deeper levels come from the
/// SubIFDs of the files' first pages.
pub async fn load_multi_tiff(
    files: Vec<(PlaneKey, Arc<dyn RangeReader>)>,
    options: LoadOptions,
) -> Result<MultiscaleImage, LoadError> {
    let counts = files.iter().fold(PlaneCounts::new(0, 0, 0), |acc, (key, _)| {
        PlaneCounts::new(
            acc.size_t.max(key.t + 1),
            acc.size_c.max(key.c + 1),
            acc.size_z.max(key.z + 1),
        )
    });
    let counts = PlaneCounts::new(counts.size_t.max(1), counts.size_c.max(1), counts.size_z.max(1));

    let mut sources = Vec::with_capacity(files.len());
    for (key, reader) in files {
        let file: Arc<dyn PageSource> = Arc::new(TiffFile::open(reader).await?);
        sources.push((key, file));
    }
    let indexer = MultiFileIndexer::open(sources, counts).await?;
    let first = indexer.index(PlaneKey::default(), 0).await?;
    let level_count = 1 + first.sub_ifds.len();
    let dtype = first.dtype()?;
    let samples = first.samples_per_pixel as usize;
    debug!(
        planes = counts.plane_count(),
        levels = level_count,
        %dtype,
        "opened multi-file TIFF"
    );

    let labels = if matches!(samples, 3 | 4) {
        DimensionOrder::Xyzct.labels().with_interleaved_samples()
    } else {
        DimensionOrder::Xyzct.labels()
    };
    let pool = options.pool()?;
    let indexer = Arc::new(PlaneIndexer::MultiFile(indexer));
    let mut levels: Vec<Arc<dyn PixelSource>> = Vec::with_capacity(level_count);
    for level in 0..level_count {
        let page = indexer.index(&Selection::new(), level).await?;
        let source = level_source(
            &indexer,
            level,
            &labels,
            counts,
            (page.width, page.height, samples),
            dtype,
            page.tile_size(),
            &pool,
        )?
        .with_meta(PixelMeta {
            physical_sizes: None,
            photometric_interpretation: page.photometric,
        });
        levels.push(Arc::new(with_handler(source, &options)));
    }

    Ok(MultiscaleImage {
        levels,
        metadata: ImageMetadata::MultiFile { counts },
    })
}

#[allow(clippy::too_many_arguments)]
fn level_source(
    indexer: &Arc<PlaneIndexer>,
    level: usize,
    labels: &AxisLabels,
    counts: PlaneCounts,
    (width, height, samples): (u32, u32, usize),
    dtype: DataType,
    tile_size: u32,
    pool: &Arc<DecodePool>,
) -> Result<TiffPixelSource, LoadError> {
    let shape = labels
        .iter()
        .map(|axis| match axis {
            "t" => counts.size_t,
            "c" => counts.size_c,
            "z" => counts.size_z,
            "y" => height as usize,
            "x" => width as usize,
            _ => samples,
        })
        .collect();
    Ok(TiffPixelSource::new(
        indexer.clone(),
        level,
        labels.clone(),
        shape,
        dtype,
        tile_size,
        pool.clone(),
    )?)
}
