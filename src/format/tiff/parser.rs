//! TIFF header and IFD parsing.
//!
//! # Header
//!
//! ```text
//! Classic (8 bytes):  byte order (II/MM) | version 42 | u32 first IFD offset
//! BigTIFF (16 bytes): byte order (II/MM) | version 43 | u16 8 | u16 0 | u64 first IFD offset
//! ```
//!
//! # IFD
//!
//! ```text
//! entry count (u16 | u64) | entries (12 | 20 bytes each) | next IFD offset (u32 | u64)
//! ```
//!
//! An entry holds its value inline when it fits in the value field (4 bytes
//! classic, 8 bytes BigTIFF); otherwise the field is an offset to the value.

use std::collections::HashMap;

use crate::error::TiffError;
use crate::io::{read_u16_be, read_u16_le, read_u32_be, read_u32_le, read_u64_be, read_u64_le};

use super::tags::{FieldType, TiffTag};

// =============================================================================
// Constants
// =============================================================================

const BYTE_ORDER_LITTLE_ENDIAN: u16 = 0x4949;
const BYTE_ORDER_BIG_ENDIAN: u16 = 0x4D4D;
const VERSION_TIFF: u16 = 42;
const VERSION_BIGTIFF: u16 = 43;

/// Size of classic TIFF header in bytes
pub const TIFF_HEADER_SIZE: usize = 8;

/// Size of BigTIFF header in bytes
pub const BIGTIFF_HEADER_SIZE: usize = 16;

/// Upper bound on entries in one IFD. Real files carry a few dozen.
const MAX_IFD_ENTRIES: u64 = 4096;

// =============================================================================
// ByteOrder
// =============================================================================

/// Byte order (endianness) of a TIFF file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    /// "II"
    LittleEndian,
    /// "MM"
    BigEndian,
}

impl ByteOrder {
    #[inline]
    pub fn read_u16(self, bytes: &[u8]) -> u16 {
        match self {
            ByteOrder::LittleEndian => read_u16_le(bytes),
            ByteOrder::BigEndian => read_u16_be(bytes),
        }
    }

    #[inline]
    pub fn read_u32(self, bytes: &[u8]) -> u32 {
        match self {
            ByteOrder::LittleEndian => read_u32_le(bytes),
            ByteOrder::BigEndian => read_u32_be(bytes),
        }
    }

    #[inline]
    pub fn read_u64(self, bytes: &[u8]) -> u64 {
        match self {
            ByteOrder::LittleEndian => read_u64_le(bytes),
            ByteOrder::BigEndian => read_u64_be(bytes),
        }
    }

    #[inline]
    pub fn is_little_endian(self) -> bool {
        self == ByteOrder::LittleEndian
    }
}

// =============================================================================
// TiffHeader
// =============================================================================

/// Parsed TIFF file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TiffHeader {
    pub byte_order: ByteOrder,
    pub is_bigtiff: bool,
    pub first_ifd_offset: u64,
}

impl TiffHeader {
    /// Parse a header from the first 8 (classic) or 16 (BigTIFF) bytes.
    ///
    /// `file_size` bounds the first IFD offset.
    pub fn parse(bytes: &[u8], file_size: u64) -> Result<Self, TiffError> {
        if bytes.len() < TIFF_HEADER_SIZE {
            return Err(TiffError::FileTooSmall {
                required: TIFF_HEADER_SIZE as u64,
                actual: bytes.len() as u64,
            });
        }

        let magic = u16::from_le_bytes([bytes[0], bytes[1]]);
        let byte_order = match magic {
            BYTE_ORDER_LITTLE_ENDIAN => ByteOrder::LittleEndian,
            BYTE_ORDER_BIG_ENDIAN => ByteOrder::BigEndian,
            _ => return Err(TiffError::InvalidMagic(magic)),
        };

        let version = byte_order.read_u16(&bytes[2..4]);
        let (is_bigtiff, first_ifd_offset) = match version {
            VERSION_TIFF => (false, byte_order.read_u32(&bytes[4..8]) as u64),
            VERSION_BIGTIFF => {
                if bytes.len() < BIGTIFF_HEADER_SIZE {
                    return Err(TiffError::FileTooSmall {
                        required: BIGTIFF_HEADER_SIZE as u64,
                        actual: bytes.len() as u64,
                    });
                }
                let offset_size = byte_order.read_u16(&bytes[4..6]);
                if offset_size != 8 {
                    return Err(TiffError::InvalidBigTiffOffsetSize(offset_size));
                }
                (true, byte_order.read_u64(&bytes[8..16]))
            }
            _ => return Err(TiffError::InvalidVersion(version)),
        };

        if first_ifd_offset >= file_size {
            return Err(TiffError::InvalidIfdOffset(first_ifd_offset));
        }

        Ok(TiffHeader {
            byte_order,
            is_bigtiff,
            first_ifd_offset,
        })
    }

    /// Bytes per IFD entry: 12 classic, 20 BigTIFF.
    #[inline]
    pub const fn ifd_entry_size(&self) -> usize {
        if self.is_bigtiff {
            20
        } else {
            12
        }
    }

    /// Bytes of the leading entry count: 2 classic, 8 BigTIFF.
    #[inline]
    pub const fn ifd_count_size(&self) -> usize {
        if self.is_bigtiff {
            8
        } else {
            2
        }
    }

    /// Bytes of the trailing next-IFD offset, and of each entry's value field.
    #[inline]
    pub const fn offset_size(&self) -> usize {
        if self.is_bigtiff {
            8
        } else {
            4
        }
    }

    /// Decode the entry count at the start of an IFD.
    pub fn read_entry_count(&self, bytes: &[u8]) -> u64 {
        if self.is_bigtiff {
            self.byte_order.read_u64(bytes)
        } else {
            self.byte_order.read_u16(bytes) as u64
        }
    }
}

// =============================================================================
// IfdEntry
// =============================================================================

/// One raw IFD entry. Values are decoded on demand by
/// [`super::ValueReader`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IfdEntry {
    pub tag_id: u16,
    /// `None` for field types this parser does not interpret
    pub field_type: Option<FieldType>,
    pub field_type_raw: u16,
    pub count: u64,
    /// Raw value/offset field (4 or 8 bytes)
    pub value_offset_bytes: Vec<u8>,
    pub is_inline: bool,
}

impl IfdEntry {
    /// Total size of the value in bytes, `None` for unknown field types.
    pub fn value_byte_size(&self) -> Option<u64> {
        self.field_type
            .map(|ft| ft.size_in_bytes() as u64)
            .and_then(|size| size.checked_mul(self.count))
    }

    /// The value field read as a file offset.
    pub fn value_offset(&self, byte_order: ByteOrder) -> u64 {
        if self.value_offset_bytes.len() >= 8 {
            byte_order.read_u64(&self.value_offset_bytes)
        } else {
            byte_order.read_u32(&self.value_offset_bytes) as u64
        }
    }

    /// Single inline integer value, if the entry holds one.
    pub fn inline_u64(&self, byte_order: ByteOrder) -> Option<u64> {
        if !self.is_inline || self.count != 1 {
            return None;
        }
        let bytes = &self.value_offset_bytes;
        match self.field_type? {
            FieldType::Byte | FieldType::Undefined => bytes.first().map(|&b| b as u64),
            FieldType::Short => Some(byte_order.read_u16(bytes) as u64),
            FieldType::Long | FieldType::Ifd => Some(byte_order.read_u32(bytes) as u64),
            FieldType::Long8 | FieldType::Ifd8 if bytes.len() >= 8 => {
                Some(byte_order.read_u64(bytes))
            }
            _ => None,
        }
    }

    pub fn inline_u32(&self, byte_order: ByteOrder) -> Option<u32> {
        self.inline_u64(byte_order)
            .and_then(|v| u32::try_from(v).ok())
    }
}

// =============================================================================
// Ifd
// =============================================================================

/// A parsed Image File Directory.
#[derive(Debug, Clone, Default)]
pub struct Ifd {
    pub entries: Vec<IfdEntry>,
    pub entries_by_tag: HashMap<u16, usize>,
    /// 0 when this is the last IFD of the chain
    pub next_ifd_offset: u64,
}

impl Ifd {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Bytes spanned by an IFD with `entry_count` entries, including the
    /// count and the next-IFD offset.
    pub fn calculate_size(entry_count: u64, header: &TiffHeader) -> usize {
        header.ifd_count_size()
            + entry_count as usize * header.ifd_entry_size()
            + header.offset_size()
    }

    /// Parse an IFD from bytes starting at its entry count.
    pub fn parse(bytes: &[u8], header: &TiffHeader) -> Result<Self, TiffError> {
        let count_size = header.ifd_count_size();
        if bytes.len() < count_size {
            return Err(TiffError::FileTooSmall {
                required: count_size as u64,
                actual: bytes.len() as u64,
            });
        }

        let entry_count = header.read_entry_count(bytes);
        if entry_count > MAX_IFD_ENTRIES {
            return Err(TiffError::InvalidTagValue {
                tag: "IFD",
                message: format!("{} entries exceeds limit {}", entry_count, MAX_IFD_ENTRIES),
            });
        }

        let required = Self::calculate_size(entry_count, header);
        if bytes.len() < required {
            return Err(TiffError::FileTooSmall {
                required: required as u64,
                actual: bytes.len() as u64,
            });
        }

        let byte_order = header.byte_order;
        let entry_size = header.ifd_entry_size();
        let value_size = header.offset_size();
        let mut entries = Vec::with_capacity(entry_count as usize);
        let mut entries_by_tag = HashMap::with_capacity(entry_count as usize);

        for i in 0..entry_count as usize {
            let at = count_size + i * entry_size;
            let raw = &bytes[at..at + entry_size];

            let tag_id = byte_order.read_u16(&raw[0..2]);
            let field_type_raw = byte_order.read_u16(&raw[2..4]);
            let field_type = FieldType::from_u16(field_type_raw);
            let (count, value_at) = if header.is_bigtiff {
                (byte_order.read_u64(&raw[4..12]), 12)
            } else {
                (byte_order.read_u32(&raw[4..8]) as u64, 8)
            };
            let value_offset_bytes = raw[value_at..value_at + value_size].to_vec();
            let is_inline = field_type
                .map(|ft| ft.fits_inline(count, header.is_bigtiff))
                .unwrap_or(false);

            entries_by_tag.entry(tag_id).or_insert(entries.len());
            entries.push(IfdEntry {
                tag_id,
                field_type,
                field_type_raw,
                count,
                value_offset_bytes,
                is_inline,
            });
        }

        let next_at = count_size + entry_count as usize * entry_size;
        let next_ifd_offset = if header.is_bigtiff {
            byte_order.read_u64(&bytes[next_at..])
        } else {
            byte_order.read_u32(&bytes[next_at..]) as u64
        };

        Ok(Self {
            entries,
            entries_by_tag,
            next_ifd_offset,
        })
    }

    pub fn get_entry(&self, tag_id: u16) -> Option<&IfdEntry> {
        self.entries_by_tag
            .get(&tag_id)
            .and_then(|&i| self.entries.get(i))
    }

    pub fn get_entry_by_tag(&self, tag: TiffTag) -> Option<&IfdEntry> {
        self.get_entry(tag.as_u16())
    }

    pub fn is_tiled(&self) -> bool {
        self.get_entry_by_tag(TiffTag::TileWidth).is_some()
            && self.get_entry_by_tag(TiffTag::TileOffsets).is_some()
    }
}

// =============================================================================
// Tests
// =============================================================================
