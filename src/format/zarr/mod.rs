//! Zarr v2 arrays grouped as OME-NGFF multiscale images.
//!
//! - [`metadata`]: `.zarray` and `.zattrs` documents
//! - [`store`]: key-value access to metadata and chunks

mod metadata;
mod store;

pub use metadata::{metadata_key, AxisInfo, Multiscales, ZarrArray};
pub use store::{ChunkStore, FileSystemStore, MemoryStore, S3Store};
