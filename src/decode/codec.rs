//! Block decompression.
//!
//! Every compressed block, whether a TIFF tile or strip or a Zarr chunk, is
//! turned into raw samples by [`decode_block`]. This runs on the decode pool's
//! worker threads and never touches the async runtime.

use std::io::Read;

use bytes::Bytes;
use flate2::read::{GzDecoder, ZlibDecoder};
use weezl::{decode::Decoder as LzwDecoder, BitOrder};

use super::jpeg::decode_jpeg;
use crate::error::DecodeError;
use crate::format::tiff::{ByteOrder, Compression, PREDICTOR_HORIZONTAL};

/// Compression scheme of one block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Codec {
    None,
    Lzw,
    /// zlib-wrapped deflate (TIFF 8/32946, Zarr `zlib`)
    Deflate,
    Gzip,
    PackBits,
    Zstd,
    /// With the page's shared JPEGTables, if any
    Jpeg { tables: Option<Bytes> },
}

impl Codec {
    /// From a TIFF `Compression` tag value.
    pub fn from_tiff(compression: u16, jpeg_tables: Option<Bytes>) -> Result<Self, DecodeError> {
        let scheme = Compression::from_u16(compression)
            .ok_or_else(|| DecodeError::UnsupportedCodec(format!("TIFF compression {}", compression)))?;
        match scheme {
            Compression::None => Ok(Codec::None),
            Compression::Lzw => Ok(Codec::Lzw),
            Compression::Deflate | Compression::AdobeDeflate => Ok(Codec::Deflate),
            Compression::PackBits => Ok(Codec::PackBits),
            Compression::Zstd => Ok(Codec::Zstd),
            Compression::Jpeg => Ok(Codec::Jpeg {
                tables: jpeg_tables,
            }),
            Compression::OldJpeg | Compression::Jpeg2000 => {
                Err(DecodeError::UnsupportedCodec(scheme.name().to_string()))
            }
        }
    }

    /// From a Zarr v2 compressor id; `None` means uncompressed chunks.
    pub fn from_zarr(id: Option<&str>) -> Result<Self, DecodeError> {
        match id {
            None => Ok(Codec::None),
            Some("zlib") => Ok(Codec::Deflate),
            Some("gzip") => Ok(Codec::Gzip),
            Some("zstd") => Ok(Codec::Zstd),
            Some(other) => Err(DecodeError::UnsupportedCodec(format!(
                "Zarr compressor '{}'",
                other
            ))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Codec::None => "none",
            Codec::Lzw => "LZW",
            Codec::Deflate => "Deflate",
            Codec::Gzip => "gzip",
            Codec::PackBits => "PackBits",
            Codec::Zstd => "Zstandard",
            Codec::Jpeg { .. } => "JPEG",
        }
    }
}

/// Parameters for undoing TIFF horizontal differencing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HorizontalPredictor {
    /// Pixels per decoded row
    pub row_width: usize,
    pub samples_per_pixel: usize,
    pub bytes_per_sample: usize,
    pub byte_order: ByteOrder,
}

impl HorizontalPredictor {
    /// `None` for predictor 1 (no prediction); error for predictors other
    /// than horizontal differencing on integer samples.
    pub fn from_tiff(
        predictor: u16,
        bits_per_sample: u16,
        is_float: bool,
        row_width: usize,
        samples_per_pixel: usize,
        byte_order: ByteOrder,
    ) -> Result<Option<Self>, DecodeError> {
        match predictor {
            1 => Ok(None),
            PREDICTOR_HORIZONTAL if !is_float && matches!(bits_per_sample, 8 | 16 | 32 | 64) => {
                Ok(Some(Self {
                    row_width,
                    samples_per_pixel,
                    bytes_per_sample: bits_per_sample as usize / 8,
                    byte_order,
                }))
            }
            _ => Err(DecodeError::UnsupportedPredictor {
                predictor,
                bits: bits_per_sample,
            }),
        }
    }
}

/// One unit of decode work: compressed bytes in, raw samples out.
#[derive(Debug, Clone)]
pub struct DecodeTask {
    pub codec: Codec,
    pub payload: Bytes,
    /// Decoded size the block must reach; longer output is truncated
    pub expected_len: Option<usize>,
    pub predictor: Option<HorizontalPredictor>,
}

impl DecodeTask {
    pub fn new(codec: Codec, payload: Bytes) -> Self {
        Self {
            codec,
            payload,
            expected_len: None,
            predictor: None,
        }
    }

    pub fn with_expected_len(mut self, len: usize) -> Self {
        self.expected_len = Some(len);
        self
    }

    pub fn with_predictor(mut self, predictor: Option<HorizontalPredictor>) -> Self {
        self.predictor = predictor;
        self
    }
}

/// Something that can run a [`DecodeTask`] synchronously.
pub trait BlockDecoder: Send + Sync + 'static {
    fn decode(&self, task: DecodeTask) -> Result<Vec<u8>, DecodeError>;
}

/// The decoder used by default pools.
#[derive(Debug, Default, Clone, Copy)]
pub struct StandardDecoder;

impl BlockDecoder for StandardDecoder {
    fn decode(&self, task: DecodeTask) -> Result<Vec<u8>, DecodeError> {
        decode_block(task)
    }
}

/// Decompress one block and undo its predictor.
pub fn decode_block(task: DecodeTask) -> Result<Vec<u8>, DecodeError> {
    let DecodeTask {
        codec,
        payload,
        expected_len,
        predictor,
    } = task;

    let mut data = match codec {
        Codec::None => payload.to_vec(),
        Codec::Lzw => LzwDecoder::with_tiff_size_switch(BitOrder::Msb, 8)
            .decode(&payload)
            .map_err(|e| corrupt("LZW", e))?,
        Codec::Deflate => read_all("Deflate", ZlibDecoder::new(&payload[..]), expected_len)?,
        Codec::Gzip => read_all("gzip", GzDecoder::new(&payload[..]), expected_len)?,
        Codec::Zstd => zstd::stream::decode_all(&payload[..]).map_err(|e| corrupt("Zstandard", e))?,
        Codec::PackBits => unpack_bits(&payload)?,
        Codec::Jpeg { tables } => decode_jpeg(tables.as_deref(), &payload)?.pixels,
    };

    if let Some(expected) = expected_len {
        if data.len() < expected {
            return Err(DecodeError::SizeMismatch {
                expected,
                actual: data.len(),
            });
        }
        data.truncate(expected);
    }

    if let Some(predictor) = predictor {
        undo_horizontal_predictor(&mut data, &predictor);
    }

    Ok(data)
}

fn corrupt(codec: &'static str, err: impl std::fmt::Display) -> DecodeError {
    DecodeError::Corrupt {
        codec,
        message: err.to_string(),
    }
}

fn read_all(
    codec: &'static str,
    mut reader: impl Read,
    size_hint: Option<usize>,
) -> Result<Vec<u8>, DecodeError> {
    let mut out = Vec::with_capacity(size_hint.unwrap_or(0));
    reader.read_to_end(&mut out).map_err(|e| corrupt(codec, e))?;
    Ok(out)
}

/// Apple PackBits run-length decoding.
fn unpack_bits(data: &[u8]) -> Result<Vec<u8>, DecodeError> {
    let mut out = Vec::with_capacity(data.len() * 2);
    let mut pos = 0;
    while pos < data.len() {
        let header = data[pos] as i8;
        pos += 1;
        match header {
            0..=127 => {
                let len = header as usize + 1;
                let literal = data
                    .get(pos..pos + len)
                    .ok_or_else(|| corrupt("PackBits", "truncated literal run"))?;
                out.extend_from_slice(literal);
                pos += len;
            }
            -127..=-1 => {
                let value = *data
                    .get(pos)
                    .ok_or_else(|| corrupt("PackBits", "truncated repeat run"))?;
                out.resize(out.len() + (1 - header as isize) as usize, value);
                pos += 1;
            }
            // -128 is a no-op
            _ => {}
        }
    }
    Ok(out)
}

macro_rules! undo_differencing {
    ($row:expr, $ty:ty, $stride:expr, $order:expr) => {{
        const N: usize = std::mem::size_of::<$ty>();
        let read = |bytes: &[u8]| -> $ty {
            let mut raw = [0u8; N];
            raw.copy_from_slice(bytes);
            match $order {
                ByteOrder::LittleEndian => <$ty>::from_le_bytes(raw),
                ByteOrder::BigEndian => <$ty>::from_be_bytes(raw),
            }
        };
        let samples = $row.len() / N;
        for i in $stride..samples {
            let prev = read(&$row[(i - $stride) * N..(i - $stride + 1) * N]);
            let cur = read(&$row[i * N..(i + 1) * N]);
            let sum = cur.wrapping_add(prev);
            let raw = match $order {
                ByteOrder::LittleEndian => sum.to_le_bytes(),
                ByteOrder::BigEndian => sum.to_be_bytes(),
            };
            $row[i * N..(i + 1) * N].copy_from_slice(&raw);
        }
    }};
}

/// Each sample was stored as the difference from the same sample of the
/// previous pixel in its row.
fn undo_horizontal_predictor(data: &mut [u8], predictor: &HorizontalPredictor) {
    let stride = predictor.samples_per_pixel.max(1);
    let row_len = predictor.row_width * stride * predictor.bytes_per_sample;
    if row_len == 0 {
        return;
    }
    let order = predictor.byte_order;
    for row in data.chunks_exact_mut(row_len) {
        match predictor.bytes_per_sample {
            1 => {
                for i in stride..row.len() {
                    row[i] = row[i].wrapping_add(row[i - stride]);
                }
            }
            2 => undo_differencing!(row, u16, stride, order),
            4 => undo_differencing!(row, u32, stride, order),
            8 => undo_differencing!(row, u64, stride, order),
            _ => {}
        }
    }
}
