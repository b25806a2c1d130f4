use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;

use super::range_reader::check_range;
use super::RangeReader;
use crate::error::IoError;

/// In-memory `RangeReader` over an already fetched file.
///
/// Counts reads so callers can verify how much I/O a request performed.
pub struct MemoryRangeReader {
    data: Bytes,
    identifier: String,
    reads: AtomicUsize,
}

impl MemoryRangeReader {
    pub fn new(data: impl Into<Bytes>, identifier: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            identifier: identifier.into(),
            reads: AtomicUsize::new(0),
        }
    }

    /// Number of `read_exact_at` calls served so far.
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn reset_read_count(&self) {
        self.reads.store(0, Ordering::SeqCst);
    }
}

#[async_trait]
impl RangeReader for MemoryRangeReader {
    async fn read_exact_at(&self, offset: u64, len: usize) -> Result<Bytes, IoError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        check_range(offset, len, self.data.len() as u64)?;
        let start = offset as usize;
        Ok(self.data.slice(start..start + len))
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }
}
