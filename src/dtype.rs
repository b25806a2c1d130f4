//! Pixel data types and typed buffers.

use std::fmt;

use crate::error::MetadataError;
use crate::format::tiff::{ByteOrder, SampleFormat};

/// Numeric type of one pixel sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    Uint8,
    Uint16,
    Uint32,
    Int8,
    Int16,
    Int32,
    Float32,
    Float64,
}

impl DataType {
    pub const fn bytes_per_sample(self) -> usize {
        match self {
            DataType::Uint8 | DataType::Int8 => 1,
            DataType::Uint16 | DataType::Int16 => 2,
            DataType::Uint32 | DataType::Int32 | DataType::Float32 => 4,
            DataType::Float64 => 8,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            DataType::Uint8 => "Uint8",
            DataType::Uint16 => "Uint16",
            DataType::Uint32 => "Uint32",
            DataType::Int8 => "Int8",
            DataType::Int16 => "Int16",
            DataType::Int32 => "Int32",
            DataType::Float32 => "Float32",
            DataType::Float64 => "Float64",
        }
    }

    pub const fn is_float(self) -> bool {
        matches!(self, DataType::Float32 | DataType::Float64)
    }

    /// From an OME-XML `Pixels/@Type` value.
    pub fn from_ome(value: &str) -> Result<Self, MetadataError> {
        match value.to_ascii_lowercase().as_str() {
            "uint8" => Ok(DataType::Uint8),
            "uint16" => Ok(DataType::Uint16),
            "uint32" => Ok(DataType::Uint32),
            "int8" => Ok(DataType::Int8),
            "int16" => Ok(DataType::Int16),
            "int32" => Ok(DataType::Int32),
            "float" => Ok(DataType::Float32),
            "double" => Ok(DataType::Float64),
            _ => Err(MetadataError::UnsupportedDataType(value.to_string())),
        }
    }

    /// From TIFF `BitsPerSample` and `SampleFormat`.
    pub fn from_tiff(bits_per_sample: u16, sample_format: SampleFormat) -> Result<Self, MetadataError> {
        match (sample_format, bits_per_sample) {
            (SampleFormat::Unsigned, 8) => Ok(DataType::Uint8),
            (SampleFormat::Unsigned, 16) => Ok(DataType::Uint16),
            (SampleFormat::Unsigned, 32) => Ok(DataType::Uint32),
            (SampleFormat::Signed, 8) => Ok(DataType::Int8),
            (SampleFormat::Signed, 16) => Ok(DataType::Int16),
            (SampleFormat::Signed, 32) => Ok(DataType::Int32),
            (SampleFormat::Float, 32) => Ok(DataType::Float32),
            (SampleFormat::Float, 64) => Ok(DataType::Float64),
            (format, bits) => Err(MetadataError::UnsupportedDataType(format!(
                "{:?} {}-bit samples",
                format, bits
            ))),
        }
    }

    /// From a Zarr v2 `dtype` such as `"|u1"`, `"<u2"` or `">f4"`.
    ///
    /// Returns the sample byte order alongside the type; single-byte types
    /// report little endian.
    pub fn from_zarr(value: &str) -> Result<(Self, ByteOrder), MetadataError> {
        let unsupported = || MetadataError::UnsupportedDataType(value.to_string());
        let mut chars = value.chars();
        let byte_order = match chars.next() {
            Some('<') | Some('|') => ByteOrder::LittleEndian,
            Some('>') => ByteOrder::BigEndian,
            _ => return Err(unsupported()),
        };
        let dtype = match chars.as_str() {
            "u1" => DataType::Uint8,
            "u2" => DataType::Uint16,
            "u4" => DataType::Uint32,
            "i1" => DataType::Int8,
            "i2" => DataType::Int16,
            "i4" => DataType::Int32,
            "f4" => DataType::Float32,
            "f8" => DataType::Float64,
            _ => return Err(unsupported()),
        };
        Ok((dtype, byte_order))
    }
}

macro_rules! encode_sample {
    ($value:expr, $ty:ty, $order:expr) => {{
        let v = $value as $ty;
        match $order {
            ByteOrder::LittleEndian => v.to_le_bytes().to_vec(),
            ByteOrder::BigEndian => v.to_be_bytes().to_vec(),
        }
    }};
}

impl DataType {
    /// `value` cast to this type and encoded in `byte_order`.
    pub fn encode_sample(self, value: f64, byte_order: ByteOrder) -> Vec<u8> {
        match self {
            DataType::Uint8 => encode_sample!(value, u8, byte_order),
            DataType::Uint16 => encode_sample!(value, u16, byte_order),
            DataType::Uint32 => encode_sample!(value, u32, byte_order),
            DataType::Int8 => encode_sample!(value, i8, byte_order),
            DataType::Int16 => encode_sample!(value, i16, byte_order),
            DataType::Int32 => encode_sample!(value, i32, byte_order),
            DataType::Float32 => encode_sample!(value, f32, byte_order),
            DataType::Float64 => encode_sample!(value, f64, byte_order),
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A typed pixel buffer.
#[derive(Debug, Clone, PartialEq)]
pub enum PixelBuffer {
    Uint8(Vec<u8>),
    Uint16(Vec<u16>),
    Uint32(Vec<u32>),
    Int8(Vec<i8>),
    Int16(Vec<i16>),
    Int32(Vec<i32>),
    Float32(Vec<f32>),
    Float64(Vec<f64>),
}

macro_rules! decode_samples {
    ($bytes:expr, $ty:ty, $order:expr) => {{
        const N: usize = std::mem::size_of::<$ty>();
        $bytes
            .chunks_exact(N)
            .map(|chunk| {
                let mut raw = [0u8; N];
                raw.copy_from_slice(chunk);
                match $order {
                    ByteOrder::LittleEndian => <$ty>::from_le_bytes(raw),
                    ByteOrder::BigEndian => <$ty>::from_be_bytes(raw),
                }
            })
            .collect::<Vec<$ty>>()
    }};
}

impl PixelBuffer {
    /// Decode raw samples stored in `byte_order`. Trailing bytes that do not
    /// form a whole sample are ignored.
    pub fn from_bytes(dtype: DataType, bytes: &[u8], byte_order: ByteOrder) -> Self {
        match dtype {
            DataType::Uint8 => PixelBuffer::Uint8(bytes.to_vec()),
            DataType::Int8 => PixelBuffer::Int8(bytes.iter().map(|&b| b as i8).collect()),
            DataType::Uint16 => PixelBuffer::Uint16(decode_samples!(bytes, u16, byte_order)),
            DataType::Uint32 => PixelBuffer::Uint32(decode_samples!(bytes, u32, byte_order)),
            DataType::Int16 => PixelBuffer::Int16(decode_samples!(bytes, i16, byte_order)),
            DataType::Int32 => PixelBuffer::Int32(decode_samples!(bytes, i32, byte_order)),
            DataType::Float32 => PixelBuffer::Float32(decode_samples!(bytes, f32, byte_order)),
            DataType::Float64 => PixelBuffer::Float64(decode_samples!(bytes, f64, byte_order)),
        }
    }

    /// A buffer of `len` samples, all equal to `value` cast to `dtype`.
    pub fn filled(dtype: DataType, len: usize, value: f64) -> Self {
        match dtype {
            DataType::Uint8 => PixelBuffer::Uint8(vec![value as u8; len]),
            DataType::Uint16 => PixelBuffer::Uint16(vec![value as u16; len]),
            DataType::Uint32 => PixelBuffer::Uint32(vec![value as u32; len]),
            DataType::Int8 => PixelBuffer::Int8(vec![value as i8; len]),
            DataType::Int16 => PixelBuffer::Int16(vec![value as i16; len]),
            DataType::Int32 => PixelBuffer::Int32(vec![value as i32; len]),
            DataType::Float32 => PixelBuffer::Float32(vec![value as f32; len]),
            DataType::Float64 => PixelBuffer::Float64(vec![value; len]),
        }
    }

    pub fn zeros(dtype: DataType, len: usize) -> Self {
        Self::filled(dtype, len, 0.0)
    }

    pub fn dtype(&self) -> DataType {
        match self {
            PixelBuffer::Uint8(_) => DataType::Uint8,
            PixelBuffer::Uint16(_) => DataType::Uint16,
            PixelBuffer::Uint32(_) => DataType::Uint32,
            PixelBuffer::Int8(_) => DataType::Int8,
            PixelBuffer::Int16(_) => DataType::Int16,
            PixelBuffer::Int32(_) => DataType::Int32,
            PixelBuffer::Float32(_) => DataType::Float32,
            PixelBuffer::Float64(_) => DataType::Float64,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            PixelBuffer::Uint8(v) => v.len(),
            PixelBuffer::Uint16(v) => v.len(),
            PixelBuffer::Uint32(v) => v.len(),
            PixelBuffer::Int8(v) => v.len(),
            PixelBuffer::Int16(v) => v.len(),
            PixelBuffer::Int32(v) => v.len(),
            PixelBuffer::Float32(v) => v.len(),
            PixelBuffer::Float64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Samples encoded in `byte_order`.
    pub fn to_bytes(&self, byte_order: ByteOrder) -> Vec<u8> {
        macro_rules! encode {
            ($values:expr) => {
                $values
                    .iter()
                    .flat_map(|v| match byte_order {
                        ByteOrder::LittleEndian => v.to_le_bytes(),
                        ByteOrder::BigEndian => v.to_be_bytes(),
                    })
                    .collect()
            };
        }
        match self {
            PixelBuffer::Uint8(v) => v.clone(),
            PixelBuffer::Uint16(v) => encode!(v),
            PixelBuffer::Uint32(v) => encode!(v),
            PixelBuffer::Int8(v) => v.iter().map(|&x| x as u8).collect(),
            PixelBuffer::Int16(v) => encode!(v),
            PixelBuffer::Int32(v) => encode!(v),
            PixelBuffer::Float32(v) => encode!(v),
            PixelBuffer::Float64(v) => encode!(v),
        }
    }

    /// Sample `index` widened to f64.
    pub fn get_f64(&self, index: usize) -> Option<f64> {
        match self {
            PixelBuffer::Uint8(v) => v.get(index).map(|&x| x as f64),
            PixelBuffer::Uint16(v) => v.get(index).map(|&x| x as f64),
            PixelBuffer::Uint32(v) => v.get(index).map(|&x| x as f64),
            PixelBuffer::Int8(v) => v.get(index).map(|&x| x as f64),
            PixelBuffer::Int16(v) => v.get(index).map(|&x| x as f64),
            PixelBuffer::Int32(v) => v.get(index).map(|&x| x as f64),
            PixelBuffer::Float32(v) => v.get(index).map(|&x| x as f64),
            PixelBuffer::Float64(v) => v.get(index).copied(),
        }
    }
}
