//! Lazily walked TIFF files and page sources.

use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use lru::LruCache;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::TiffError;
use crate::io::RangeReader;

use super::page::TiffPage;
use super::parser::{TiffHeader, BIGTIFF_HEADER_SIZE};

/// Default number of parsed pages kept per file.
pub const DEFAULT_PAGE_CACHE_CAPACITY: usize = 256;

/// Safety limit on the IFD chain length.
const MAX_PAGES: usize = 1 << 20;

/// Access to the pages of one TIFF container by chain index or IFD offset.
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Page `index` of the main IFD chain.
    async fn page(&self, index: usize) -> Result<Arc<TiffPage>, TiffError>;

    /// Page whose IFD starts at `offset` (SubIFDs, offset tables).
    async fn page_at(&self, offset: u64) -> Result<Arc<TiffPage>, TiffError>;

    /// Number of pages in the main chain.
    async fn page_count(&self) -> Result<usize, TiffError>;

    fn header(&self) -> &TiffHeader;

    fn identifier(&self) -> &str;
}

#[derive(Default)]
struct IfdChain {
    offsets: Vec<u64>,
    seen: HashSet<u64>,
    /// Offset of the first unvisited IFD, 0 once the chain is exhausted
    next: u64,
}

/// A TIFF file whose IFD chain is walked only as far as requested.
///
/// Walking reads two small ranges per IFD (entry count and next pointer);
/// full pages are parsed on demand and kept in an LRU cache.
pub struct TiffFile {
    reader: Arc<dyn RangeReader>,
    header: TiffHeader,
    chain: Mutex<IfdChain>,
    pages: Option<Mutex<LruCache<u64, Arc<TiffPage>>>>,
    parses: AtomicUsize,
}

impl TiffFile {
    pub async fn open(reader: Arc<dyn RangeReader>) -> Result<Self, TiffError> {
        Self::with_page_cache(reader, DEFAULT_PAGE_CACHE_CAPACITY).await
    }

    /// Open with room for `capacity` parsed pages; 0 disables page caching.
    pub async fn with_page_cache(
        reader: Arc<dyn RangeReader>,
        capacity: usize,
    ) -> Result<Self, TiffError> {
        let size = reader.size();
        let len = (BIGTIFF_HEADER_SIZE as u64).min(size) as usize;
        let bytes = reader.read_exact_at(0, len).await?;
        let header = TiffHeader::parse(&bytes, size)?;
        debug!(
            source = reader.identifier(),
            bigtiff = header.is_bigtiff,
            "opened TIFF"
        );

        Ok(Self {
            header,
            chain: Mutex::new(IfdChain {
                next: header.first_ifd_offset,
                ..IfdChain::default()
            }),
            pages: NonZeroUsize::new(capacity).map(|c| Mutex::new(LruCache::new(c))),
            parses: AtomicUsize::new(0),
            reader,
        })
    }

    pub fn reader(&self) -> &Arc<dyn RangeReader> {
        &self.reader
    }

    /// Number of page parses performed, cache hits excluded.
    pub fn parse_count(&self) -> usize {
        self.parses.load(Ordering::SeqCst)
    }

    /// IFD offset of page `index`, walking the chain as needed.
    pub async fn page_offset(&self, index: usize) -> Result<u64, TiffError> {
        let mut chain = self.chain.lock().await;
        while chain.offsets.len() <= index {
            if chain.next == 0 {
                return Err(TiffError::PageOutOfRange {
                    index,
                    count: chain.offsets.len(),
                });
            }
            self.advance(&mut chain).await?;
        }
        Ok(chain.offsets[index])
    }

    async fn advance(&self, chain: &mut IfdChain) -> Result<(), TiffError> {
        let offset = chain.next;
        if offset >= self.reader.size() || !chain.seen.insert(offset) {
            return Err(TiffError::InvalidIfdOffset(offset));
        }
        if chain.offsets.len() >= MAX_PAGES {
            return Err(TiffError::InvalidIfdOffset(offset));
        }

        let header = &self.header;
        let count_bytes = self
            .reader
            .read_exact_at(offset, header.ifd_count_size())
            .await?;
        let entry_count = header.read_entry_count(&count_bytes);
        let next_at = offset
            + header.ifd_count_size() as u64
            + entry_count * header.ifd_entry_size() as u64;
        let next_bytes = self
            .reader
            .read_exact_at(next_at, header.offset_size())
            .await?;
        let next = if header.is_bigtiff {
            header.byte_order.read_u64(&next_bytes)
        } else {
            header.byte_order.read_u32(&next_bytes) as u64
        };

        chain.offsets.push(offset);
        chain.next = next;
        Ok(())
    }

    async fn parse_page(&self, offset: u64) -> Result<Arc<TiffPage>, TiffError> {
        if let Some(cache) = &self.pages {
            if let Some(page) = cache.lock().await.get(&offset) {
                return Ok(page.clone());
            }
        }

        self.parses.fetch_add(1, Ordering::SeqCst);
        let page = Arc::new(TiffPage::parse(self.reader.clone(), self.header, offset).await?);

        if let Some(cache) = &self.pages {
            cache.lock().await.put(offset, page.clone());
        }
        Ok(page)
    }
}

#[async_trait]
impl PageSource for TiffFile {
    async fn page(&self, index: usize) -> Result<Arc<TiffPage>, TiffError> {
        let offset = self.page_offset(index).await?;
        self.parse_page(offset).await
    }

    async fn page_at(&self, offset: u64) -> Result<Arc<TiffPage>, TiffError> {
        self.parse_page(offset).await
    }

    async fn page_count(&self) -> Result<usize, TiffError> {
        let mut chain = self.chain.lock().await;
        while chain.next != 0 {
            self.advance(&mut chain).await?;
        }
        Ok(chain.offsets.len())
    }

    fn header(&self) -> &TiffHeader {
        &self.header
    }

    fn identifier(&self) -> &str {
        self.reader.identifier()
    }
}

/// Page source with a precomputed IFD offset table.
///
/// Pages covered by the table are parsed straight from their offset; any
/// other index, or a zero entry, falls back to walking the base file's chain.
pub struct OffsetPages {
    base: Arc<TiffFile>,
    offsets: Vec<u64>,
}

impl OffsetPages {
    pub fn new(base: Arc<TiffFile>, offsets: Vec<u64>) -> Self {
        Self { base, offsets }
    }

    pub fn base(&self) -> &Arc<TiffFile> {
        &self.base
    }
}

#[async_trait]
impl PageSource for OffsetPages {
    async fn page(&self, index: usize) -> Result<Arc<TiffPage>, TiffError> {
        match self.offsets.get(index) {
            Some(&offset) if offset != 0 => self.base.page_at(offset).await,
            _ => self.base.page(index).await,
        }
    }

    async fn page_at(&self, offset: u64) -> Result<Arc<TiffPage>, TiffError> {
        self.base.page_at(offset).await
    }

    async fn page_count(&self) -> Result<usize, TiffError> {
        if self.offsets.is_empty() {
            return self.base.page_count().await;
        }
        Ok(self.offsets.len())
    }

    fn header(&self) -> &TiffHeader {
        self.base.header()
    }

    fn identifier(&self) -> &str {
        self.base.identifier()
    }
}
