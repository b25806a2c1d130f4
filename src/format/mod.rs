//! Container formats.
//!
//! - [`tiff`]: TIFF/BigTIFF IFD chains, shared by OME-TIFF and multi-file TIFF
//! - [`ome`]: OME-XML carried in the first page's `ImageDescription`
//! - [`zarr`]: Zarr v2 arrays and OME-NGFF multiscale attributes

pub mod ome;
pub mod tiff;
pub mod zarr;

pub use ome::{OmeImage, OmeMetadata, OmePixels, DEFAULT_PHYSICAL_UNIT};
