//! TIFF and BigTIFF container parsing.
//!
//! - **Byte order**: declared in the header (II little-endian, MM big-endian);
//!   all multi-byte values follow it.
//! - **Classic vs BigTIFF**: 32-bit vs 64-bit offsets, handled transparently.
//! - **Pages**: each IFD is one page. OME-TIFF stores planes as pages of the
//!   main chain and, for SubIFD pyramids, reduced resolutions as pages
//!   reachable only through the `SubIFDs` tag.
//!
//! The IFD chain is walked lazily ([`TiffFile`]); pages are parsed on
//! demand into [`TiffPage`], which carries block geometry and the block
//! offset table.

mod file;
mod page;
mod parser;
mod tags;
mod values;

pub use file::{OffsetPages, PageSource, TiffFile, DEFAULT_PAGE_CACHE_CAPACITY};
pub use page::{BlockLayout, Rect, TiffPage};
pub use parser::{ByteOrder, Ifd, IfdEntry, TiffHeader, BIGTIFF_HEADER_SIZE, TIFF_HEADER_SIZE};
pub use tags::{
    Compression, FieldType, SampleFormat, TiffTag, PLANAR_SEPARATE, PREDICTOR_HORIZONTAL,
};
pub use values::{parse_u64_array, ValueReader};
