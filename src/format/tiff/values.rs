//! TIFF tag value reading.
//!
//! Values live either inline in the IFD entry or at an offset in the file.
//! Arrays (block offsets, byte counts, SubIFD pointers) are fetched with a
//! single range read.

use bytes::Bytes;

use crate::error::TiffError;
use crate::io::RangeReader;

use super::parser::{ByteOrder, IfdEntry, TiffHeader};
use super::tags::{FieldType, TiffTag};

fn tag_name(entry: &IfdEntry) -> &'static str {
    TiffTag::from_u16(entry.tag_id)
        .map(TiffTag::name)
        .unwrap_or("unknown")
}

/// Reads tag values through a [`RangeReader`] using the file's byte order.
pub struct ValueReader<'a, R: RangeReader + ?Sized> {
    reader: &'a R,
    header: &'a TiffHeader,
}

impl<'a, R: RangeReader + ?Sized> ValueReader<'a, R> {
    pub fn new(reader: &'a R, header: &'a TiffHeader) -> Self {
        Self { reader, header }
    }

    #[inline]
    pub fn byte_order(&self) -> ByteOrder {
        self.header.byte_order
    }

    /// Raw value bytes, from the entry itself or from the file.
    pub async fn read_bytes(&self, entry: &IfdEntry) -> Result<Bytes, TiffError> {
        let size = entry
            .value_byte_size()
            .ok_or(TiffError::UnknownFieldType(entry.field_type_raw))?;

        if entry.is_inline {
            return Ok(Bytes::copy_from_slice(
                &entry.value_offset_bytes[..size as usize],
            ));
        }

        let size = usize::try_from(size).map_err(|_| TiffError::InvalidTagValue {
            tag: tag_name(entry),
            message: format!("value of {} bytes is too large", size),
        })?;
        let offset = entry.value_offset(self.header.byte_order);
        Ok(self.reader.read_exact_at(offset, size).await?)
    }

    /// A single unsigned integer value.
    pub async fn read_u64(&self, entry: &IfdEntry) -> Result<u64, TiffError> {
        if let Some(value) = entry.inline_u64(self.header.byte_order) {
            return Ok(value);
        }
        if entry.count != 1 {
            return Err(TiffError::InvalidTagValue {
                tag: tag_name(entry),
                message: format!("expected count 1, got {}", entry.count),
            });
        }
        self.read_u64_array(entry)
            .await?
            .first()
            .copied()
            .ok_or(TiffError::InvalidTagValue {
                tag: tag_name(entry),
                message: "empty value".to_string(),
            })
    }

    pub async fn read_u32(&self, entry: &IfdEntry) -> Result<u32, TiffError> {
        let value = self.read_u64(entry).await?;
        u32::try_from(value).map_err(|_| TiffError::InvalidTagValue {
            tag: tag_name(entry),
            message: format!("{} does not fit in 32 bits", value),
        })
    }

    /// An array of unsigned integers of any width, widened to u64.
    pub async fn read_u64_array(&self, entry: &IfdEntry) -> Result<Vec<u64>, TiffError> {
        let field_type = entry
            .field_type
            .ok_or(TiffError::UnknownFieldType(entry.field_type_raw))?;
        if !field_type.is_unsigned_integer() {
            return Err(TiffError::InvalidTagValue {
                tag: tag_name(entry),
                message: format!("expected an unsigned integer type, got {:?}", field_type),
            });
        }
        if entry.count == 0 {
            return Ok(Vec::new());
        }

        let bytes = self.read_bytes(entry).await?;
        Ok(parse_u64_array(
            &bytes,
            entry.count as usize,
            field_type,
            self.header.byte_order,
        ))
    }

    /// An array of u16 values (BitsPerSample, SampleFormat).
    pub async fn read_u16_array(&self, entry: &IfdEntry) -> Result<Vec<u16>, TiffError> {
        let values = self.read_u64_array(entry).await?;
        values
            .into_iter()
            .map(|v| {
                u16::try_from(v).map_err(|_| TiffError::InvalidTagValue {
                    tag: tag_name(entry),
                    message: format!("{} does not fit in 16 bits", v),
                })
            })
            .collect()
    }

    /// A NUL-terminated ASCII string.
    pub async fn read_string(&self, entry: &IfdEntry) -> Result<String, TiffError> {
        match entry.field_type {
            Some(FieldType::Ascii) | Some(FieldType::Undefined) | Some(FieldType::Byte) => {}
            Some(other) => {
                return Err(TiffError::InvalidTagValue {
                    tag: tag_name(entry),
                    message: format!("expected Ascii type for string, got {:?}", other),
                })
            }
            None => return Err(TiffError::UnknownFieldType(entry.field_type_raw)),
        }

        let bytes = self.read_bytes(entry).await?;
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        Ok(String::from_utf8_lossy(&bytes[..end]).into_owned())
    }
}

/// Parse unsigned integers of `field_type` from raw bytes. Truncated input
/// yields fewer values.
pub fn parse_u64_array(
    bytes: &[u8],
    count: usize,
    field_type: FieldType,
    byte_order: ByteOrder,
) -> Vec<u64> {
    let width = field_type.size_in_bytes();
    bytes
        .chunks_exact(width)
        .take(count)
        .map(|chunk| match width {
            1 => chunk[0] as u64,
            2 => byte_order.read_u16(chunk) as u64,
            4 => byte_order.read_u32(chunk) as u64,
            _ => byte_order.read_u64(chunk),
        })
        .collect()
}

// =============================================================================
// Tests
// =============================================================================
