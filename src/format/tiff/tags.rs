//! TIFF field types, tag IDs and enumerated tag values.

// =============================================================================
// TIFF Field Types
// =============================================================================

/// TIFF field types that determine how values are encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum FieldType {
    Byte = 1,
    Ascii = 2,
    Short = 3,
    Long = 4,
    Rational = 5,
    SByte = 6,
    Undefined = 7,
    SShort = 8,
    SLong = 9,
    SRational = 10,
    Float = 11,
    Double = 12,
    /// 32-bit IFD offset (SubIFDs)
    Ifd = 13,
    /// BigTIFF only
    Long8 = 16,
    /// BigTIFF only
    SLong8 = 17,
    /// 64-bit IFD offset, BigTIFF only
    Ifd8 = 18,
}

impl FieldType {
    /// Size of a single value of this type in bytes.
    #[inline]
    pub const fn size_in_bytes(self) -> usize {
        match self {
            FieldType::Byte | FieldType::Ascii | FieldType::SByte | FieldType::Undefined => 1,
            FieldType::Short | FieldType::SShort => 2,
            FieldType::Long | FieldType::SLong | FieldType::Float | FieldType::Ifd => 4,
            FieldType::Rational
            | FieldType::SRational
            | FieldType::Double
            | FieldType::Long8
            | FieldType::SLong8
            | FieldType::Ifd8 => 8,
        }
    }

    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            1 => Some(FieldType::Byte),
            2 => Some(FieldType::Ascii),
            3 => Some(FieldType::Short),
            4 => Some(FieldType::Long),
            5 => Some(FieldType::Rational),
            6 => Some(FieldType::SByte),
            7 => Some(FieldType::Undefined),
            8 => Some(FieldType::SShort),
            9 => Some(FieldType::SLong),
            10 => Some(FieldType::SRational),
            11 => Some(FieldType::Float),
            12 => Some(FieldType::Double),
            13 => Some(FieldType::Ifd),
            16 => Some(FieldType::Long8),
            17 => Some(FieldType::SLong8),
            18 => Some(FieldType::Ifd8),
            _ => None,
        }
    }

    /// True for the unsigned integer types usable as counts and offsets.
    pub const fn is_unsigned_integer(self) -> bool {
        matches!(
            self,
            FieldType::Byte
                | FieldType::Short
                | FieldType::Long
                | FieldType::Long8
                | FieldType::Ifd
                | FieldType::Ifd8
        )
    }

    /// Check if `count` values of this type fit in the entry's value field
    /// (4 bytes classic, 8 bytes BigTIFF).
    #[inline]
    pub fn fits_inline(self, count: u64, is_bigtiff: bool) -> bool {
        let threshold = if is_bigtiff { 8 } else { 4 };
        (self.size_in_bytes() as u64).saturating_mul(count) <= threshold
    }
}

// =============================================================================
// TIFF Tags
// =============================================================================

macro_rules! tiff_tags {
    ($($(#[$doc:meta])* $variant:ident = $id:literal, $name:literal;)+) => {
        /// TIFF tag IDs read by this crate. Other tags are ignored.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u16)]
        pub enum TiffTag {
            $($(#[$doc])* $variant = $id,)+
        }

        impl TiffTag {
            pub fn from_u16(value: u16) -> Option<Self> {
                match value {
                    $($id => Some(TiffTag::$variant),)+
                    _ => None,
                }
            }

            pub const fn name(self) -> &'static str {
                match self {
                    $(TiffTag::$variant => $name,)+
                }
            }
        }
    };
}

tiff_tags! {
    ImageWidth = 256, "ImageWidth";
    ImageLength = 257, "ImageLength";
    BitsPerSample = 258, "BitsPerSample";
    Compression = 259, "Compression";
    PhotometricInterpretation = 262, "PhotometricInterpretation";
    /// Carries the OME-XML document on the first page of an OME-TIFF
    ImageDescription = 270, "ImageDescription";
    StripOffsets = 273, "StripOffsets";
    SamplesPerPixel = 277, "SamplesPerPixel";
    RowsPerStrip = 278, "RowsPerStrip";
    StripByteCounts = 279, "StripByteCounts";
    PlanarConfiguration = 284, "PlanarConfiguration";
    Predictor = 317, "Predictor";
    TileWidth = 322, "TileWidth";
    TileLength = 323, "TileLength";
    TileOffsets = 324, "TileOffsets";
    TileByteCounts = 325, "TileByteCounts";
    /// Offsets of the reduced-resolution pages of a SubIFD pyramid
    SubIfds = 330, "SubIFDs";
    SampleFormat = 339, "SampleFormat";
    /// Shared quantization and Huffman tables for abbreviated JPEG blocks
    JpegTables = 347, "JPEGTables";
}

impl TiffTag {
    #[inline]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }
}

// =============================================================================
// Compression Values
// =============================================================================

/// TIFF compression scheme identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum Compression {
    None = 1,
    Lzw = 5,
    /// Pre-6.0 JPEG, not decodable
    OldJpeg = 6,
    Jpeg = 7,
    Deflate = 8,
    PackBits = 32773,
    AdobeDeflate = 32946,
    Jpeg2000 = 33003,
    Zstd = 50000,
}

impl Compression {
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            1 => Some(Compression::None),
            5 => Some(Compression::Lzw),
            6 => Some(Compression::OldJpeg),
            7 => Some(Compression::Jpeg),
            8 => Some(Compression::Deflate),
            32773 => Some(Compression::PackBits),
            32946 => Some(Compression::AdobeDeflate),
            33003 => Some(Compression::Jpeg2000),
            50000 => Some(Compression::Zstd),
            _ => None,
        }
    }

    /// True when the decode pool has a codec for this scheme.
    #[inline]
    pub const fn is_supported(self) -> bool {
        !matches!(self, Compression::OldJpeg | Compression::Jpeg2000)
    }

    pub const fn name(self) -> &'static str {
        match self {
            Compression::None => "None",
            Compression::Lzw => "LZW",
            Compression::OldJpeg => "Old JPEG",
            Compression::Jpeg => "JPEG",
            Compression::Deflate => "Deflate",
            Compression::PackBits => "PackBits",
            Compression::AdobeDeflate => "Adobe Deflate",
            Compression::Jpeg2000 => "JPEG 2000",
            Compression::Zstd => "Zstandard",
        }
    }
}

/// SampleFormat tag values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    Unsigned,
    Signed,
    Float,
}

impl SampleFormat {
    /// Missing tag means unsigned integers.
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            1 => Some(SampleFormat::Unsigned),
            2 => Some(SampleFormat::Signed),
            3 => Some(SampleFormat::Float),
            _ => None,
        }
    }
}

/// PlanarConfiguration value for samples stored in separate planes.
pub const PLANAR_SEPARATE: u16 = 2;

/// Predictor value for horizontal differencing.
pub const PREDICTOR_HORIZONTAL: u16 = 2;

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_type_sizes_and_inline() {
        assert_eq!(FieldType::Ifd.size_in_bytes(), 4);
        assert_eq!(FieldType::Ifd8.size_in_bytes(), 8);
        assert_eq!(FieldType::Rational.size_in_bytes(), 8);

        assert!(FieldType::Short.fits_inline(2, false));
        assert!(!FieldType::Short.fits_inline(3, false));
        assert!(!FieldType::Long8.fits_inline(1, false));
        assert!(FieldType::Long8.fits_inline(1, true));
        assert!(!FieldType::Long.fits_inline(u64::MAX, true));
    }

    #[test]
    fn test_field_type_from_u16() {
        assert_eq!(FieldType::from_u16(13), Some(FieldType::Ifd));
        assert_eq!(FieldType::from_u16(18), Some(FieldType::Ifd8));
        assert_eq!(FieldType::from_u16(0), None);
        assert_eq!(FieldType::from_u16(14), None);
    }

    #[test]
    fn test_tag_roundtrip_names() {
        assert_eq!(TiffTag::from_u16(330), Some(TiffTag::SubIfds));
        assert_eq!(TiffTag::SubIfds.name(), "SubIFDs");
        assert_eq!(TiffTag::from_u16(339), Some(TiffTag::SampleFormat));
        assert_eq!(TiffTag::from_u16(9999), None);
    }

    #[test]
    fn test_compression_support() {
        assert!(Compression::Lzw.is_supported());
        assert!(Compression::Zstd.is_supported());
        assert!(Compression::PackBits.is_supported());
        assert!(!Compression::Jpeg2000.is_supported());
        assert_eq!(Compression::from_u16(50000), Some(Compression::Zstd));
        assert_eq!(Compression::from_u16(2), None);
    }

    #[test]
    fn test_sample_format() {
        assert_eq!(SampleFormat::from_u16(3), Some(SampleFormat::Float));
        assert_eq!(SampleFormat::from_u16(4), None);
    }
}
