//! OME-Zarr integration tests against on-disk stores.

use std::sync::Arc;

use ome_pixels::{
    load_ome_zarr, open_image, FileSystemStore, PixelBuffer, ReaderConfig, Selection, TileRequest,
};

use super::test_utils::{options, write_store, zarray};

const ZATTRS: &str = r#"{
    "multiscales": [{
        "version": "0.4",
        "name": "plate A1",
        "axes": [
            {"name": "c", "type": "channel"},
            {"name": "y", "type": "space", "unit": "micrometer"},
            {"name": "x", "type": "space", "unit": "micrometer"}
        ],
        "datasets": [
            {"path": "0", "coordinateTransformations": [{"type": "scale", "scale": [1.0, 0.5, 0.5]}]},
            {"path": "1", "coordinateTransformations": [{"type": "scale", "scale": [1.0, 1.0, 1.0]}]}
        ]
    }],
    "omero": {"channels": [{"label": "DAPI"}, {"label": "GFP"}]}
}"#;

/// `c` big-endian u16 values `1000 * c + 10 * y + x` for a `size` x `size`
/// plane split into 4 x 4 chunks.
fn chunk(c: usize, cy: usize, cx: usize, size: usize) -> Vec<u8> {
    let mut bytes = Vec::new();
    for y in cy * 4..cy * 4 + 4 {
        for x in cx * 4..cx * 4 + 4 {
            let value = if x < size && y < size { 1000 * c + 10 * y + x } else { 0 };
            bytes.extend_from_slice(&(value as u16).to_be_bytes());
        }
    }
    bytes
}

fn write_plate(root: &std::path::Path) {
    let chunks: Vec<(String, Vec<u8>)> = (0..2)
        .flat_map(|c| (0..2).flat_map(move |y| (0..2).map(move |x| (c, y, x))))
        .map(|(c, y, x)| (format!("0/{}.{}.{}", c, y, x), chunk(c, y, x, 6)))
        .collect();
    let mut contents = vec![
        (".zattrs", ZATTRS.as_bytes().to_vec()),
        ("0/.zarray", zarray(&[2, 6, 6], &[1, 4, 4], ">u2", 0)),
        ("1/.zarray", zarray(&[2, 3, 3], &[1, 4, 4], ">u2", 5)),
    ];
    contents.extend(chunks.iter().map(|(key, bytes)| (key.as_str(), bytes.clone())));
    write_store(root, &contents);
}

#[tokio::test]
async fn test_multiscale_levels() {
    let dir = tempfile::tempdir().unwrap();
    write_plate(dir.path());

    let image = load_ome_zarr(Arc::new(FileSystemStore::new(dir.path())), options())
        .await
        .unwrap();
    assert_eq!(image.metadata.format(), "OME-Zarr");
    assert_eq!(image.metadata.name(), Some("plate A1"));
    assert_eq!(image.metadata.channel_names(), vec!["DAPI", "GFP"]);
    assert_eq!(image.level_count(), 2);
    assert_eq!(image.levels[1].shape(), [2, 3, 3]);
    assert_eq!(image.levels[0].tile_size(), 4);

    let sizes = image.levels[1].meta().unwrap().physical_sizes.clone().unwrap();
    assert_eq!(sizes.x.unwrap().size, 1.0);
}

#[tokio::test]
async fn test_edge_chunk_is_clipped() {
    let dir = tempfile::tempdir().unwrap();
    write_plate(dir.path());
    let image = load_ome_zarr(Arc::new(FileSystemStore::new(dir.path())), options())
        .await
        .unwrap();

    let tile = image.levels[0]
        .get_tile(&TileRequest::new(1, 1, Selection::new().with("c", 1)))
        .await
        .unwrap()
        .unwrap();
    assert_eq!((tile.width, tile.height), (2, 2));
    assert_eq!(tile.data, PixelBuffer::Uint16(vec![1044, 1045, 1054, 1055]));
}

#[tokio::test]
async fn test_raster_assembles_chunks() {
    let dir = tempfile::tempdir().unwrap();
    write_plate(dir.path());
    let image = load_ome_zarr(Arc::new(FileSystemStore::new(dir.path())), options())
        .await
        .unwrap();

    let raster = image.levels[0]
        .get_raster(&Selection::new().with("c", 0), None)
        .await
        .unwrap();
    assert_eq!((raster.width, raster.height), (6, 6));
    let expected: Vec<u16> = (0..6)
        .flat_map(|y| (0..6).map(move |x| (10 * y + x) as u16))
        .collect();
    assert_eq!(raster.data, PixelBuffer::Uint16(expected));
}

#[tokio::test]
async fn test_missing_chunks_read_as_fill_value() {
    let dir = tempfile::tempdir().unwrap();
    write_plate(dir.path());
    let image = load_ome_zarr(Arc::new(FileSystemStore::new(dir.path())), options())
        .await
        .unwrap();

    // Level 1 has no chunks on disk
    let raster = image.levels[1]
        .get_raster(&Selection::new().with("c", 1), None)
        .await
        .unwrap();
    assert_eq!(raster.data, PixelBuffer::Uint16(vec![5; 9]));
}

#[tokio::test]
async fn test_open_image_detects_directory() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("plate.zarr");
    write_plate(&root);

    let image = open_image(&root.to_string_lossy(), &[], &ReaderConfig::default(), options())
        .await
        .unwrap();
    assert_eq!(image.metadata.format(), "OME-Zarr");
    assert_eq!(image.labels().unwrap().as_slice(), ["c", "y", "x"]);
}
