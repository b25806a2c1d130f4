//! JPEG block decoding.
//!
//! TIFF pages may store abbreviated JPEG blocks: each block lacks the
//! quantization (DQT) and Huffman (DHT) tables, which live once in the
//! page's `JPEGTables` tag. Such blocks are spliced behind the tables before
//! decoding:
//!
//! ```text
//! tables:  SOI DQT DHT EOI
//! block:   SOI SOF SOS ... EOI
//! merged:  SOI DQT DHT SOF SOS ... EOI
//! ```

use std::io::Cursor;

use image::{DynamicImage, ImageFormat, ImageReader};

use crate::error::DecodeError;

const SOI: [u8; 2] = [0xFF, 0xD8];
const EOI: [u8; 2] = [0xFF, 0xD9];
const DHT: u8 = 0xC4;
const DQT: u8 = 0xDB;
const SOS: u8 = 0xDA;

/// True when the stream reaches its scan without defining any tables.
pub fn is_abbreviated_stream(data: &[u8]) -> bool {
    if data.len() < 4 || data[0..2] != SOI {
        return false;
    }

    let mut pos = 2;
    while pos + 1 < data.len() {
        if data[pos] != 0xFF {
            pos += 1;
            continue;
        }
        match data[pos + 1] {
            DQT | DHT => return false,
            SOS => return true,
            // Fill bytes and standalone markers
            0xFF | 0x00 | 0x01 | 0xD0..=0xD9 => pos += 2,
            _ if pos + 3 < data.len() => {
                let length = u16::from_be_bytes([data[pos + 2], data[pos + 3]]) as usize;
                pos += 2 + length;
            }
            _ => return false,
        }
    }
    false
}

/// Splice `block` behind `tables`: tables without EOI, then block without SOI.
pub fn merge_jpeg_tables(tables: &[u8], block: &[u8]) -> Vec<u8> {
    if tables.is_empty() {
        return block.to_vec();
    }
    let tables = tables.strip_suffix(&EOI).unwrap_or(tables);
    let block = block.strip_prefix(&SOI).unwrap_or(block);

    let mut merged = Vec::with_capacity(tables.len() + block.len());
    merged.extend_from_slice(tables);
    merged.extend_from_slice(block);
    merged
}

/// A decoded JPEG block.
#[derive(Debug)]
pub struct DecodedJpeg {
    pub width: u32,
    pub height: u32,
    /// 1 for grayscale, 3 for color
    pub channels: u16,
    pub pixels: Vec<u8>,
}

/// Decode one JPEG block, merging `tables` first when the block needs them.
/// Color output is always RGB, whatever the stored color space.
pub fn decode_jpeg(tables: Option<&[u8]>, block: &[u8]) -> Result<DecodedJpeg, DecodeError> {
    let merged;
    let data = match tables {
        Some(tables) if is_abbreviated_stream(block) => {
            merged = merge_jpeg_tables(tables, block);
            &merged[..]
        }
        _ => block,
    };

    let image = ImageReader::with_format(Cursor::new(data), ImageFormat::Jpeg)
        .decode()
        .map_err(|e| DecodeError::Corrupt {
            codec: "JPEG",
            message: e.to_string(),
        })?;

    let (width, height) = (image.width(), image.height());
    let (channels, pixels) = match image {
        DynamicImage::ImageLuma8(gray) => (1, gray.into_raw()),
        other => (3, other.into_rgb8().into_raw()),
    };

    Ok(DecodedJpeg {
        width,
        height,
        channels,
        pixels,
    })
}
