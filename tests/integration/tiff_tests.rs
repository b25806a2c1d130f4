//! OME-TIFF and multi-file TIFF integration tests.
//!
//! Tests verify:
//! - SubIFD, legacy and multi-series pyramids open with the right levels
//! - Edge tiles are clipped to the image
//! - Tiles outside the grid and out-of-range selections
//! - The block cache serves repeated reads

use std::sync::Arc;

use ome_pixels::{
    load_multi_tiff, load_ome_tiff, BlockCache, DataType, LoadError, MemoryRangeReader,
    PixelBuffer, PixelSourceError, PlaneKey, RangeReader, Selection, TileRequest,
};

use super::test_utils::{build_tiff, memory_reader, ome_xml, options, Page};

fn gradient(width: u32, height: u32) -> Page {
    Page::new(width, height, 16, 2, |x, y| (x + 100 * y) as u64)
}

// =============================================================================
// SubIFD Pyramids
// =============================================================================

#[tokio::test]
async fn test_subifd_pyramid_levels() {
    let xml = ome_xml(&[("XYZCT", "uint16", 40, 24, 1, 1, 1)]);
    let page = gradient(40, 24)
        .with_sub_ifds(vec![gradient(20, 12), gradient(10, 6)])
        .with_description(xml);
    let (_, reader) = memory_reader(build_tiff(&[page]));

    let image = load_ome_tiff(reader, options()).await.unwrap();
    assert_eq!(image.level_count(), 3);
    assert_eq!(image.dtype(), Some(DataType::Uint16));
    assert_eq!(image.metadata.name(), Some("series 0"));
    assert_eq!(image.metadata.channel_names(), vec!["ch0"]);

    let shapes: Vec<Vec<usize>> = image.levels.iter().map(|l| l.shape().to_vec()).collect();
    assert_eq!(
        shapes,
        vec![
            vec![1, 1, 1, 24, 40],
            vec![1, 1, 1, 12, 20],
            vec![1, 1, 1, 6, 10],
        ]
    );

    let sizes = image.levels[2].meta().unwrap().physical_sizes.clone().unwrap();
    assert_eq!(sizes.x.unwrap().size, 1.0);
    assert_eq!(sizes.y.unwrap().size, 1.0);
}

#[tokio::test]
async fn test_edge_tile_is_clipped() {
    let xml = ome_xml(&[("XYZCT", "uint16", 40, 24, 1, 1, 1)]);
    let (_, reader) = memory_reader(build_tiff(&[gradient(40, 24).with_description(xml)]));
    let image = load_ome_tiff(reader, options()).await.unwrap();

    let tile = image.levels[0]
        .get_tile(&TileRequest::new(2, 1, Selection::new()))
        .await
        .unwrap()
        .unwrap();
    assert_eq!((tile.width, tile.height), (8, 8));
    let PixelBuffer::Uint16(values) = tile.data else {
        panic!("expected uint16 samples");
    };
    assert_eq!(values.len(), 64);
    assert_eq!(values[0], 32 + 1600);
    assert_eq!(values[63], 39 + 2300);
}

#[tokio::test]
async fn test_raster_matches_pixels() {
    let xml = ome_xml(&[("XYZCT", "uint16", 40, 24, 1, 1, 1)]);
    let (_, reader) = memory_reader(build_tiff(&[gradient(40, 24).with_description(xml)]));
    let image = load_ome_tiff(reader, options()).await.unwrap();

    let raster = image.levels[0].get_raster(&Selection::new(), None).await.unwrap();
    assert_eq!((raster.width, raster.height), (40, 24));
    for (x, y) in [(0, 0), (17, 3), (39, 23), (16, 16)] {
        let index = (y * 40 + x) as usize;
        assert_eq!(raster.data.get_f64(index), Some((x + 100 * y) as f64));
    }
}

// =============================================================================
// Legacy Pyramids
// =============================================================================

#[tokio::test]
async fn test_legacy_pyramid_channels() {
    let xml = ome_xml(&[("XYZCT", "uint8", 32, 32, 1, 2, 1)]);
    let pages = vec![
        Page::flat(32, 16, 10).with_description(xml),
        Page::flat(32, 16, 20),
        Page::flat(16, 16, 11),
        Page::flat(16, 16, 21),
    ];
    let (_, reader) = memory_reader(build_tiff(&pages));

    let image = load_ome_tiff(reader, options()).await.unwrap();
    assert_eq!(image.level_count(), 2);

    let selections = [Selection::tcz(0, 0, 0), Selection::tcz(0, 1, 0)];
    let batch = image.levels[1]
        .get_tiles(0, 0, &selections, None)
        .await
        .unwrap()
        .unwrap();
    assert_eq!((batch.width, batch.height), (16, 16));
    assert_eq!(
        batch.data,
        vec![PixelBuffer::Uint8(vec![11; 256]), PixelBuffer::Uint8(vec![21; 256])]
    );
}

// =============================================================================
// Multi-series Files
// =============================================================================

#[tokio::test]
async fn test_second_image_of_multi_series_file() {
    let xml = ome_xml(&[
        ("XYZCT", "uint8", 32, 32, 1, 1, 1),
        ("XYZCT", "uint8", 32, 32, 1, 2, 1),
    ]);
    let pages = vec![
        Page::flat(32, 16, 1)
            .with_sub_ifds(vec![Page::flat(16, 16, 2)])
            .with_description(xml),
        Page::flat(32, 16, 30).with_sub_ifds(vec![Page::flat(16, 16, 31)]),
        Page::flat(32, 16, 40).with_sub_ifds(vec![Page::flat(16, 16, 41)]),
    ];
    let (_, reader) = memory_reader(build_tiff(&pages));

    let image = load_ome_tiff(reader, options().with_image(1)).await.unwrap();
    assert_eq!(image.metadata.name(), Some("series 1"));
    assert_eq!(image.level_count(), 2);
    assert_eq!(image.levels[0].shape(), [1, 2, 1, 32, 32]);

    let tile = image.levels[1]
        .get_tile(&TileRequest::new(0, 0, Selection::tcz(0, 1, 0)))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(tile.data, PixelBuffer::Uint8(vec![41; 256]));
}

#[tokio::test]
async fn test_image_index_out_of_range() {
    let xml = ome_xml(&[("XYZCT", "uint8", 32, 32, 1, 1, 1)]);
    let (_, reader) = memory_reader(build_tiff(&[Page::flat(32, 16, 0).with_description(xml)]));
    assert!(matches!(
        load_ome_tiff(reader, options().with_image(3)).await,
        Err(LoadError::Metadata(_))
    ));
}

// =============================================================================
// Grid and Selection Edge Cases
// =============================================================================

#[tokio::test]
async fn test_tile_outside_grid_reads_nothing() {
    let xml = ome_xml(&[("XYZCT", "uint8", 32, 32, 1, 1, 1)]);
    let (memory, reader) = memory_reader(build_tiff(&[Page::flat(32, 16, 0).with_description(xml)]));
    let image = load_ome_tiff(reader, options()).await.unwrap();

    memory.reset_read_count();
    let result = image.levels[0]
        .get_tile(&TileRequest::new(2, 0, Selection::new()))
        .await
        .unwrap();
    assert!(result.is_none());
    assert_eq!(memory.read_count(), 0);
}

#[tokio::test]
async fn test_selection_out_of_range() {
    let xml = ome_xml(&[("XYZCT", "uint8", 32, 32, 1, 2, 1)]);
    let pages = vec![Page::flat(32, 16, 0).with_description(xml), Page::flat(32, 16, 1)];
    let (_, reader) = memory_reader(build_tiff(&pages));
    let image = load_ome_tiff(reader, options()).await.unwrap();

    let request = TileRequest::new(0, 0, Selection::tcz(0, 5, 0));
    assert!(matches!(
        image.levels[0].get_tile(&request).await,
        Err(PixelSourceError::BoundsCheck(_))
    ));
    // The default handler drops bounds-check failures
    assert!(image.levels[0].fetch_tile(&request).await.unwrap().is_none());
}

// =============================================================================
// Block Cache
// =============================================================================

#[tokio::test]
async fn test_block_cache_serves_repeated_tiles() {
    let xml = ome_xml(&[("XYZCT", "uint16", 40, 24, 1, 1, 1)]);
    let bytes = build_tiff(&[gradient(40, 24).with_description(xml)]);
    let cache = Arc::new(BlockCache::with_capacity(
        MemoryRangeReader::new(bytes, "memory://cached.ome.tif"),
        4096,
        16,
    ));
    let reader: Arc<dyn RangeReader> = cache.clone();
    let image = load_ome_tiff(reader, options()).await.unwrap();

    let request = TileRequest::new(1, 0, Selection::new());
    let first = image.levels[0].get_tile(&request).await.unwrap().unwrap();
    let reads = cache.inner().read_count();
    let second = image.levels[0].get_tile(&request).await.unwrap().unwrap();

    assert_eq!(first, second);
    assert_eq!(cache.inner().read_count(), reads);
}

// =============================================================================
// Multi-file TIFF
// =============================================================================

#[tokio::test]
async fn test_multi_file_planes() {
    let mut files: Vec<(PlaneKey, Arc<dyn RangeReader>)> = Vec::new();
    for z in 0..3 {
        let page = Page::flat(32, 16, 50 + z as u64).with_sub_ifds(vec![Page::flat(16, 16, 60 + z as u64)]);
        let (_, reader) = memory_reader(build_tiff(&[page]));
        files.push((PlaneKey { t: 0, c: 0, z }, reader));
    }

    let image = load_multi_tiff(files, options()).await.unwrap();
    assert_eq!(image.metadata.format(), "multi-file TIFF");
    assert_eq!(image.level_count(), 2);
    assert_eq!(image.levels[0].shape(), [1, 1, 3, 32, 32]);

    let tile = image.levels[1]
        .get_tile(&TileRequest::new(0, 0, Selection::tcz(0, 0, 2)))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(tile.data, PixelBuffer::Uint8(vec![62; 256]));
}
