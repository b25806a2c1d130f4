use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use lru::LruCache;
use tokio::sync::{Mutex, OnceCell};
use tracing::trace;

use super::range_reader::check_range;
use super::RangeReader;
use crate::error::IoError;

/// Default block size: 256KB.
pub const DEFAULT_BLOCK_SIZE: usize = 256 * 1024;

/// Default cache capacity in blocks (64 * 256KB = 16MB per image).
pub const DEFAULT_BLOCK_CACHE_CAPACITY: usize = 64;

type BlockSlot = Arc<OnceCell<Bytes>>;

/// Fixed-size block cache in front of a `RangeReader`.
///
/// OME-TIFF headers are walked with many tiny reads (IFD entry counts,
/// SubIFD arrays, OME-XML) that land close together; aligning them to
/// blocks turns them into a handful of backend requests.
///
/// Concurrent requests for the same uncached block share one fetch: the first
/// caller initializes the block's `OnceCell`, the others await it. A failed
/// fetch leaves the cell empty so the next caller retries.
pub struct BlockCache<R> {
    inner: R,
    block_size: usize,
    blocks: Mutex<LruCache<u64, Bytes>>,
    pending: Mutex<HashMap<u64, BlockSlot>>,
}

impl<R: RangeReader> BlockCache<R> {
    pub fn new(inner: R) -> Self {
        Self::with_capacity(inner, DEFAULT_BLOCK_SIZE, DEFAULT_BLOCK_CACHE_CAPACITY)
    }

    /// A zero capacity is treated as one block.
    pub fn with_capacity(inner: R, block_size: usize, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner,
            block_size: block_size.max(1),
            blocks: Mutex::new(LruCache::new(capacity)),
            pending: Mutex::new(HashMap::new()),
        }
    }

    pub fn inner(&self) -> &R {
        &self.inner
    }

    /// Number of blocks currently held.
    pub async fn cached_blocks(&self) -> usize {
        self.blocks.lock().await.len()
    }

    async fn block(&self, index: u64) -> Result<Bytes, IoError> {
        if let Some(data) = self.blocks.lock().await.get(&index) {
            trace!(block = index, "block cache hit");
            return Ok(data.clone());
        }

        let slot = {
            let mut pending = self.pending.lock().await;
            pending.entry(index).or_default().clone()
        };

        let result = slot
            .get_or_try_init(|| self.fetch_block(index))
            .await
            .cloned();

        if let Ok(ref data) = result {
            self.blocks.lock().await.put(index, data.clone());
            self.pending.lock().await.remove(&index);
        }

        result
    }

    async fn fetch_block(&self, index: u64) -> Result<Bytes, IoError> {
        let start = index * self.block_size as u64;
        let size = self.inner.size();
        let len = size.saturating_sub(start).min(self.block_size as u64) as usize;
        if len == 0 {
            return Err(IoError::RangeOutOfBounds {
                offset: start,
                requested: self.block_size as u64,
                size,
            });
        }
        trace!(block = index, len, "block cache miss");
        self.inner.read_exact_at(start, len).await
    }
}

#[async_trait]
impl<R: RangeReader> RangeReader for BlockCache<R> {
    async fn read_exact_at(&self, offset: u64, len: usize) -> Result<Bytes, IoError> {
        check_range(offset, len, self.inner.size())?;
        if len == 0 {
            return Ok(Bytes::new());
        }

        let block_size = self.block_size as u64;
        let first = offset / block_size;
        let last = (offset + len as u64 - 1) / block_size;

        if first == last {
            let block = self.block(first).await?;
            let start = (offset % block_size) as usize;
            return Ok(block.slice(start..start + len));
        }

        let mut out = BytesMut::with_capacity(len);
        let mut cursor = offset;
        for index in first..=last {
            let block = self.block(index).await?;
            let start = (cursor % block_size) as usize;
            let take = (block.len() - start).min(len - out.len());
            out.extend_from_slice(&block[start..start + take]);
            cursor += take as u64;
        }
        Ok(out.freeze())
    }

    fn size(&self) -> u64 {
        self.inner.size()
    }

    fn identifier(&self) -> &str {
        self.inner.identifier()
    }
}
