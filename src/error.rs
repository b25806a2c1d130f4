use thiserror::Error;

/// I/O errors raised by byte transports (local files, S3, chunk stores)
#[derive(Debug, Clone, Error)]
pub enum IoError {
    /// Error from S3 or S3-compatible storage
    #[error("S3 error: {0}")]
    S3(String),

    /// Requested range exceeds resource bounds
    #[error("Range out of bounds: requested {requested} bytes at offset {offset}, size is {size}")]
    RangeOutOfBounds {
        offset: u64,
        requested: u64,
        size: u64,
    },

    /// Network or connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Object or file not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Local filesystem error
    #[error("File error for {path}: {message}")]
    File { path: String, message: String },
}

/// Errors that can occur when parsing TIFF containers
#[derive(Debug, Clone, Error)]
pub enum TiffError {
    /// I/O error while reading the file
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// Invalid TIFF magic bytes (not II or MM)
    #[error("Invalid TIFF magic bytes: expected 0x4949 (II) or 0x4D4D (MM), got 0x{0:04X}")]
    InvalidMagic(u16),

    /// Invalid TIFF version number
    #[error("Invalid TIFF version: expected 42 (TIFF) or 43 (BigTIFF), got {0}")]
    InvalidVersion(u16),

    /// Invalid BigTIFF offset byte size (must be 8)
    #[error("Invalid BigTIFF offset byte size: expected 8, got {0}")]
    InvalidBigTiffOffsetSize(u16),

    /// File is too small to contain a valid TIFF header
    #[error("File too small: need at least {required} bytes, got {actual}")]
    FileTooSmall { required: u64, actual: u64 },

    /// Invalid IFD offset (points outside file or to invalid location)
    #[error("Invalid IFD offset: {0}")]
    InvalidIfdOffset(u64),

    /// Page index past the end of the IFD chain
    #[error("Page {index} out of range: file has {count} pages")]
    PageOutOfRange { index: usize, count: usize },

    /// Required tag is missing from IFD
    #[error("Missing required tag: {0}")]
    MissingTag(&'static str),

    /// Tag has unexpected type or count
    #[error("Invalid tag value for {tag}: {message}")]
    InvalidTagValue { tag: &'static str, message: String },

    /// Sample layout this reader cannot convert into a typed buffer
    #[error("Unsupported sample layout: {0}")]
    UnsupportedLayout(String),

    /// Unknown field type in IFD entry
    #[error("Unknown field type: {0}")]
    UnknownFieldType(u16),
}

/// Errors raised while mapping a selection onto a physical location.
///
/// Everything here except `SelectionOutOfRange` is fatal for the image: it
/// means the metadata describes a structure we cannot index.
#[derive(Debug, Clone, Error)]
pub enum IndexError {
    /// Selection names an axis the image does not have
    #[error("Unknown axis '{axis}', image axes are {labels:?}")]
    UnknownAxis { axis: String, labels: Vec<String> },

    /// Selection index is not smaller than the axis size
    #[error("Index {index} out of range for axis '{axis}' of size {size}")]
    SelectionOutOfRange {
        axis: String,
        index: usize,
        size: usize,
    },

    /// Ordered selection has the wrong number of entries
    #[error("Selection has {actual} indices but the image has rank {expected}")]
    RankMismatch { expected: usize, actual: usize },

    /// OME DimensionOrder is not one of the six XY-leading permutations
    #[error("Unsupported dimension order '{0}'")]
    UnsupportedDimensionOrder(String),

    /// Level > 0 requested from a page without SubIFD pointers
    #[error("Page {page} has no sub-resolution for level {level}")]
    MissingSubresolution { page: usize, level: usize },

    /// Multi-file source has no file for this selection
    #[error("No image available for selection {key}")]
    NoImageForSelection { key: String },

    /// Multi-file source is missing a plane of its declared t/c/z cube
    #[error("Incomplete image stack: missing plane {key}")]
    IncompleteStack { key: String },

    /// Multi-file planes disagree on their dimensions
    #[error("Images must share one resolution: expected {expected_width}x{expected_height}, got {width}x{height} for {key}")]
    AssertSameResolution {
        key: String,
        expected_width: u32,
        expected_height: u32,
        width: u32,
        height: u32,
    },

    /// Failure parsing the page a location points at
    #[error("TIFF error: {0}")]
    Tiff(#[from] TiffError),
}

/// Errors from block decompression and the decode worker pool
#[derive(Debug, Clone, Error)]
pub enum DecodeError {
    /// Compression scheme or compressor id we cannot decode
    #[error("Unsupported codec: {0}")]
    UnsupportedCodec(String),

    /// Corrupt or truncated compressed stream
    #[error("{codec} decode failed: {message}")]
    Corrupt { codec: &'static str, message: String },

    /// Decoded block has the wrong size for its declared geometry
    #[error("Decoded block is {actual} bytes, expected {expected}")]
    SizeMismatch { expected: usize, actual: usize },

    /// Predictor value not supported for this sample type
    #[error("Unsupported predictor {predictor} for {bits}-bit samples")]
    UnsupportedPredictor { predictor: u16, bits: u16 },

    /// The pool was shut down before the task completed
    #[error("Decode pool is closed")]
    PoolClosed,

    /// A worker thread could not be started
    #[error("Failed to start decode worker: {0}")]
    WorkerSpawn(String),

    /// A worker thread stopped while the pool was still open
    #[error("Decode worker {worker} has exited")]
    WorkerExited { worker: usize },
}

/// Errors raised while reading format metadata at open time
#[derive(Debug, Clone, Error)]
pub enum MetadataError {
    /// Malformed OME-XML
    #[error("Invalid OME-XML: {0}")]
    Xml(String),

    /// Malformed JSON metadata (.zarray, .zattrs, offsets sidecar)
    #[error("Invalid JSON metadata in {key}: {message}")]
    Json { key: String, message: String },

    /// Required metadata key or attribute is missing
    #[error("Missing metadata field: {0}")]
    MissingField(String),

    /// Pixel type string we do not map to a buffer type
    #[error("Unsupported data type: {0}")]
    UnsupportedDataType(String),

    /// Structurally valid metadata describing something we cannot read
    #[error("Unsupported image structure: {0}")]
    Unsupported(String),
}

/// Per-tile and per-raster errors from a pixel source.
///
/// `Aborted` is not a failure: it means the caller cancelled the request and
/// no result should be delivered. Use [`PixelSourceError::is_aborted`] to
/// tell it apart from real errors.
#[derive(Debug, Clone, Error)]
pub enum PixelSourceError {
    /// The request was cancelled through its abort signal
    #[error("Request aborted")]
    Aborted,

    /// Zero-sized or out-of-range chunk slice
    #[error("Bounds check failed: {0}")]
    BoundsCheck(String),

    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    #[error("TIFF error: {0}")]
    Tiff(#[from] TiffError),

    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Metadata error: {0}")]
    Metadata(#[from] MetadataError),
}

impl PixelSourceError {
    /// True for the cancellation sentinel.
    pub fn is_aborted(&self) -> bool {
        matches!(self, PixelSourceError::Aborted)
    }
}

/// Fatal errors raised while opening an image.
#[derive(Debug, Clone, Error)]
pub enum LoadError {
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    #[error("TIFF error: {0}")]
    Tiff(#[from] TiffError),

    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    #[error("Metadata error: {0}")]
    Metadata(#[from] MetadataError),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),
}
