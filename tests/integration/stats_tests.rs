//! Channel statistics over planes read from images.

use std::sync::Arc;

use approx::assert_relative_eq;
use ome_pixels::{buffer_stats, compute_stats, load_ome_zarr, MemoryStore, Selection};

use super::test_utils::{options, zarray};

#[test]
fn test_reference_values() {
    let mut values: Vec<u16> = vec![0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11];
    let stats = compute_stats(&mut values).unwrap();
    assert_relative_eq!(stats.mean, 5.5);
    assert_relative_eq!(stats.sd, 3.452052529534663, epsilon = 1e-12);
    assert_eq!(stats.median, 6.0);
    assert_eq!(stats.q1, 3.0);
    assert_eq!(stats.q3, 9.0);
    assert_eq!(stats.domain, [0.0, 11.0]);
    assert_eq!(stats.contrast_limits, [1.0, 11.0]);
}

#[tokio::test]
async fn test_stats_of_zarr_plane() {
    let plane: Vec<u8> = (0..16).collect();
    let store = MemoryStore::new()
        .with(".zarray", zarray(&[2, 4, 4], &[1, 4, 4], "|u1", 0))
        .with("0.0.0", plane)
        .with("1.0.0", vec![9u8; 16]);
    let image = load_ome_zarr(Arc::new(store), options()).await.unwrap();

    let raster = image.levels[0]
        .get_raster(&Selection::new().with("z", 0), None)
        .await
        .unwrap();
    let mut data = raster.data;
    let stats = buffer_stats(&mut data).unwrap();
    assert_relative_eq!(stats.mean, 7.5);
    assert_eq!(stats.domain, [0.0, 15.0]);
    assert_eq!(stats.median, 8.0);
    assert_eq!(stats.contrast_limits, [1.0, 15.0]);

    let raster = image.levels[0]
        .get_raster(&Selection::new().with("z", 1), None)
        .await
        .unwrap();
    let mut data = raster.data;
    let stats = buffer_stats(&mut data).unwrap();
    assert_eq!(stats.sd, 0.0);
    assert_eq!(stats.contrast_limits, [9.0, 9.0]);
}
