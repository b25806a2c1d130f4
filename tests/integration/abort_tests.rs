//! Cancellation of in-flight requests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use ome_pixels::decode::{BlockDecoder, StandardDecoder};
use ome_pixels::{
    load_ome_tiff, load_ome_zarr, AbortSignal, ChunkStore, DecodeError, DecodePool, DecodeTask,
    IoError, LoadOptions, MemoryRangeReader, MemoryStore, PixelBuffer, PixelSourceError,
    RangeReader, Selection, TileRequest,
};
use tokio::sync::Notify;

use super::test_utils::{build_tiff, memory_reader, ome_xml, options, zarray, Page};

// =============================================================================
// Stalling Backends
// =============================================================================

/// Shared switch: once held, every operation announces itself and stalls.
#[derive(Default)]
struct Stall {
    held: AtomicBool,
    started: Notify,
}

impl Stall {
    fn hold(&self) {
        self.held.store(true, Ordering::SeqCst);
    }

    fn release(&self) {
        self.held.store(false, Ordering::SeqCst);
    }

    fn is_held(&self) -> bool {
        self.held.load(Ordering::SeqCst)
    }

    /// Abort `signal` as soon as a stalled operation has started.
    fn abort_when_started(self: &Arc<Self>, signal: &AbortSignal) {
        let stall = self.clone();
        let signal = signal.clone();
        tokio::spawn(async move {
            stall.started.notified().await;
            signal.abort();
        });
    }
}

/// Range reader whose reads never complete while the stall is held.
struct StallingReader {
    inner: MemoryRangeReader,
    stall: Arc<Stall>,
}

#[async_trait]
impl RangeReader for StallingReader {
    async fn read_exact_at(&self, offset: u64, len: usize) -> Result<Bytes, IoError> {
        if self.stall.is_held() {
            self.stall.started.notify_one();
            std::future::pending::<()>().await;
        }
        self.inner.read_exact_at(offset, len).await
    }

    fn size(&self) -> u64 {
        self.inner.size()
    }

    fn identifier(&self) -> &str {
        self.inner.identifier()
    }
}

/// Chunk store whose fetches never complete while the stall is held.
struct StallingStore {
    inner: MemoryStore,
    stall: Arc<Stall>,
}

#[async_trait]
impl ChunkStore for StallingStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, IoError> {
        if self.stall.is_held() {
            self.stall.started.notify_one();
            std::future::pending::<()>().await;
        }
        self.inner.get(key).await
    }

    fn identifier(&self) -> &str {
        self.inner.identifier()
    }
}

/// Decoder that blocks its worker thread while the stall is held.
struct StallingDecoder {
    stall: Arc<Stall>,
}

impl BlockDecoder for StallingDecoder {
    fn decode(&self, task: DecodeTask) -> Result<Vec<u8>, DecodeError> {
        if self.stall.is_held() {
            self.stall.started.notify_one();
            while self.stall.is_held() {
                std::thread::sleep(Duration::from_millis(1));
            }
        }
        StandardDecoder.decode(task)
    }
}

// =============================================================================
// Aborted Before Start
// =============================================================================

#[tokio::test]
async fn test_aborted_tiff_tile_reads_nothing() {
    let xml = ome_xml(&[("XYZCT", "uint8", 32, 32, 1, 1, 1)]);
    let (memory, reader) = memory_reader(build_tiff(&[Page::flat(32, 16, 3).with_description(xml)]));
    let image = load_ome_tiff(reader, options()).await.unwrap();

    memory.reset_read_count();
    let request = TileRequest::new(0, 0, Selection::new()).with_signal(AbortSignal::aborted_signal());
    let err = image.levels[0].get_tile(&request).await.unwrap_err();
    assert!(err.is_aborted());
    assert_eq!(memory.read_count(), 0);

    // Aborts are never handed to the tile error handler
    assert!(matches!(
        image.levels[0].fetch_tile(&request).await,
        Err(PixelSourceError::Aborted)
    ));
}

#[tokio::test]
async fn test_aborted_raster() {
    let xml = ome_xml(&[("XYZCT", "uint8", 32, 32, 1, 1, 1)]);
    let (_, reader) = memory_reader(build_tiff(&[Page::flat(32, 16, 3).with_description(xml)]));
    let image = load_ome_tiff(reader, options()).await.unwrap();

    let signal = AbortSignal::new();
    let clone = signal.clone();
    clone.abort();
    assert!(matches!(
        image.levels[0].get_raster(&Selection::new(), Some(&signal)).await,
        Err(PixelSourceError::Aborted)
    ));
}

#[tokio::test]
async fn test_aborted_zarr_tile_fetches_no_chunk() {
    let store = Arc::new(
        MemoryStore::new()
            .with(".zarray", zarray(&[8, 8], &[4, 4], "|u1", 0))
            .with("0.0", vec![1u8; 16]),
    );
    let image = load_ome_zarr(store.clone(), options()).await.unwrap();
    let before = store.get_count();

    let request = TileRequest::new(0, 0, Selection::new()).with_signal(AbortSignal::aborted_signal());
    let err = image.levels[0].get_tile(&request).await.unwrap_err();
    assert!(err.is_aborted());
    assert_eq!(store.get_count(), before);
}

#[tokio::test]
async fn test_live_signal_delivers_tile() {
    let store = Arc::new(
        MemoryStore::new()
            .with(".zarray", zarray(&[8, 8], &[4, 4], "|u1", 0))
            .with("0.0", vec![1u8; 16]),
    );
    let image = load_ome_zarr(store, options()).await.unwrap();

    let request = TileRequest::new(0, 0, Selection::new()).with_signal(AbortSignal::new());
    let tile = image.levels[0].get_tile(&request).await.unwrap().unwrap();
    assert_eq!((tile.width, tile.height), (4, 4));
}

// =============================================================================
// Aborted Mid-flight
// =============================================================================

#[tokio::test]
async fn test_abort_during_stalled_tiff_read() {
    let xml = ome_xml(&[("XYZCT", "uint8", 32, 32, 1, 1, 1)]);
    let stall = Arc::new(Stall::default());
    let reader = Arc::new(StallingReader {
        inner: MemoryRangeReader::new(
            build_tiff(&[Page::flat(32, 16, 3).with_description(xml)]),
            "memory://stalling.ome.tif",
        ),
        stall: stall.clone(),
    });
    let image = load_ome_tiff(reader, options()).await.unwrap();

    stall.hold();
    let signal = AbortSignal::new();
    stall.abort_when_started(&signal);
    let request = TileRequest::new(0, 0, Selection::new()).with_signal(signal);
    let result = tokio::time::timeout(Duration::from_secs(5), image.levels[0].get_tile(&request))
        .await
        .expect("abort did not interrupt the read");
    assert!(matches!(result, Err(PixelSourceError::Aborted)));

    stall.release();
    let tile = image.levels[0]
        .get_tile(&TileRequest::new(0, 0, Selection::new()))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(tile.data, PixelBuffer::Uint8(vec![3; 256]));
}

#[tokio::test]
async fn test_abort_during_stalled_chunk_fetch() {
    let stall = Arc::new(Stall::default());
    let store = Arc::new(StallingStore {
        inner: MemoryStore::new()
            .with(".zarray", zarray(&[8, 8], &[4, 4], "|u1", 0))
            .with("0.0", vec![1u8; 16]),
        stall: stall.clone(),
    });
    let image = load_ome_zarr(store, options()).await.unwrap();

    stall.hold();
    let signal = AbortSignal::new();
    stall.abort_when_started(&signal);
    let request = TileRequest::new(0, 0, Selection::new()).with_signal(signal);
    let result = tokio::time::timeout(Duration::from_secs(5), image.levels[0].get_tile(&request))
        .await
        .expect("abort did not interrupt the fetch");
    assert!(matches!(result, Err(PixelSourceError::Aborted)));
}

#[tokio::test]
async fn test_abort_during_slow_decode_keeps_pool_serving() {
    let stall = Arc::new(Stall::default());
    let pool = Arc::new(
        DecodePool::with_decoder(
            1,
            Arc::new(StallingDecoder {
                stall: stall.clone(),
            }),
        )
        .unwrap(),
    );
    let xml = ome_xml(&[("XYZCT", "uint8", 32, 32, 1, 1, 1)]);
    let (_, reader) = memory_reader(build_tiff(&[Page::flat(32, 16, 9).with_description(xml)]));
    let image = load_ome_tiff(reader, LoadOptions::default().with_pool(pool.clone()))
        .await
        .unwrap();

    stall.hold();
    let signal = AbortSignal::new();
    stall.abort_when_started(&signal);
    let request = TileRequest::new(1, 1, Selection::new()).with_signal(signal);
    let result = tokio::time::timeout(Duration::from_secs(5), image.levels[0].get_tile(&request))
        .await
        .expect("abort did not interrupt the decode");
    assert!(matches!(result, Err(PixelSourceError::Aborted)));

    // The abandoned decode finishes on its worker, which then takes new work
    stall.release();
    let tile = tokio::time::timeout(
        Duration::from_secs(5),
        image.levels[0].get_tile(&TileRequest::new(0, 0, Selection::new())),
    )
    .await
    .expect("pool stopped serving after an abort")
    .unwrap()
    .unwrap();
    assert_eq!(tile.data, PixelBuffer::Uint8(vec![9; 256]));
    assert_eq!(pool.queued_tasks(), 0);
}
