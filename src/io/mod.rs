//! Byte transports.
//!
//! Every format reads its bytes through [`RangeReader`] (TIFF containers) or
//! [`crate::format::zarr::ChunkStore`] (chunked arrays). The core never opens
//! files or sockets itself.

mod block_cache;
mod file_reader;
mod memory_reader;
mod range_reader;
mod s3_reader;

pub use block_cache::{BlockCache, DEFAULT_BLOCK_CACHE_CAPACITY, DEFAULT_BLOCK_SIZE};
pub use file_reader::FileRangeReader;
pub use memory_reader::MemoryRangeReader;
pub use range_reader::{
    read_u16_be, read_u16_le, read_u32_be, read_u32_le, read_u64_be, read_u64_le, RangeReader,
};
pub use s3_reader::{create_s3_client, S3Location, S3RangeReader};

pub(crate) use file_reader::file_error;
pub(crate) use s3_reader::{classify_s3_error, collect_body};
