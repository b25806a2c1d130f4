//! Block decoding off the async runtime.
//!
//! - [`codec`]: decompression, predictor undo
//! - [`jpeg`]: JPEG blocks with shared tables
//! - [`pool`]: fixed-size worker pool that runs decode tasks

mod codec;
mod jpeg;
mod pool;

pub use codec::{decode_block, BlockDecoder, Codec, DecodeTask, HorizontalPredictor, StandardDecoder};
pub use jpeg::{decode_jpeg, is_abbreviated_stream, merge_jpeg_tables, DecodedJpeg};
pub use pool::{default_pool_size, DecodeHandle, DecodePool};
