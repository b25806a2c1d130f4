//! Test utilities for integration tests.
//!
//! Builders for small OME-TIFF files and OME-Zarr directories, plus helpers
//! to open them through the public API.

use std::path::Path;
use std::sync::Arc;

use ome_pixels::{DecodePool, LoadOptions, MemoryRangeReader, RangeReader};

// =============================================================================
// TIFF Builder
// =============================================================================

/// A tiled, uncompressed page.
pub struct Page {
    pub width: u32,
    pub height: u32,
    pub tile: u32,
    /// Bytes per sample, 1 or 2
    pub bytes: usize,
    pub description: Option<String>,
    pub sub_ifds: Vec<Page>,
    pixel: Box<dyn Fn(u32, u32) -> u64>,
}

impl Page {
    pub fn new(width: u32, height: u32, tile: u32, bytes: usize, pixel: impl Fn(u32, u32) -> u64 + 'static) -> Self {
        Self {
            width,
            height,
            tile,
            bytes,
            description: None,
            sub_ifds: Vec::new(),
            pixel: Box::new(pixel),
        }
    }

    /// Page with every pixel set to `value`.
    pub fn flat(size: u32, tile: u32, value: u64) -> Self {
        Self::new(size, size, tile, 1, move |_, _| value)
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_sub_ifds(mut self, pages: Vec<Page>) -> Self {
        self.sub_ifds = pages;
        self
    }

    fn tiles(&self) -> Vec<Vec<u8>> {
        let mut tiles = Vec::new();
        for ty in 0..self.height.div_ceil(self.tile) {
            for tx in 0..self.width.div_ceil(self.tile) {
                let mut tile = Vec::new();
                for y in ty * self.tile..(ty + 1) * self.tile {
                    for x in tx * self.tile..(tx + 1) * self.tile {
                        let value = if x < self.width && y < self.height {
                            (self.pixel)(x, y)
                        } else {
                            0
                        };
                        tile.extend_from_slice(&value.to_le_bytes()[..self.bytes]);
                    }
                }
                tiles.push(tile);
            }
        }
        tiles
    }
}

/// Serialize `pages` as one little-endian IFD chain.
pub fn build_tiff(pages: &[Page]) -> Vec<u8> {
    let mut buf = vec![0x49, 0x49, 0x2A, 0x00, 0, 0, 0, 0];
    let mut link = 4;
    for page in pages {
        let (offset, next) = write_page(&mut buf, page);
        buf[link..link + 4].copy_from_slice(&offset.to_le_bytes());
        link = next;
    }
    buf
}

fn pad(buf: &mut Vec<u8>) {
    if buf.len() % 2 == 1 {
        buf.push(0);
    }
}

fn write_page(buf: &mut Vec<u8>, page: &Page) -> (u32, usize) {
    let sub_offsets: Vec<u32> = page.sub_ifds.iter().map(|p| write_page(buf, p).0).collect();

    let mut offsets = Vec::new();
    let mut counts = Vec::new();
    for tile in page.tiles() {
        pad(buf);
        offsets.push(buf.len() as u32);
        counts.push(tile.len() as u32);
        buf.extend_from_slice(&tile);
    }

    let long = |v: &[u32]| v.iter().flat_map(|x| x.to_le_bytes()).collect::<Vec<u8>>();
    let short = |v: u16| v.to_le_bytes().to_vec();

    let mut entries: Vec<(u16, u16, u32, Vec<u8>)> = vec![
        (256, 4, 1, long(&[page.width])),
        (257, 4, 1, long(&[page.height])),
        (258, 3, 1, short(page.bytes as u16 * 8)),
        (259, 3, 1, short(1)),
        (262, 3, 1, short(1)),
        (277, 3, 1, short(1)),
        (322, 4, 1, long(&[page.tile])),
        (323, 4, 1, long(&[page.tile])),
        (324, 4, offsets.len() as u32, long(&offsets)),
        (325, 4, counts.len() as u32, long(&counts)),
        (339, 3, 1, short(1)),
    ];
    if let Some(description) = &page.description {
        let mut raw = description.as_bytes().to_vec();
        raw.push(0);
        entries.push((270, 2, raw.len() as u32, raw));
    }
    if !sub_offsets.is_empty() {
        entries.push((330, 13, sub_offsets.len() as u32, long(&sub_offsets)));
    }
    entries.sort_by_key(|e| e.0);

    let mut fields = Vec::new();
    for (tag, kind, count, raw) in entries {
        let mut value = [0u8; 4];
        if raw.len() <= 4 {
            value[..raw.len()].copy_from_slice(&raw);
        } else {
            pad(buf);
            value = (buf.len() as u32).to_le_bytes();
            buf.extend_from_slice(&raw);
        }
        fields.push((tag, kind, count, value));
    }

    pad(buf);
    let ifd = buf.len() as u32;
    buf.extend_from_slice(&(fields.len() as u16).to_le_bytes());
    for (tag, kind, count, value) in fields {
        buf.extend_from_slice(&tag.to_le_bytes());
        buf.extend_from_slice(&kind.to_le_bytes());
        buf.extend_from_slice(&count.to_le_bytes());
        buf.extend_from_slice(&value);
    }
    let next = buf.len();
    buf.extend_from_slice(&[0; 4]);
    (ifd, next)
}

// =============================================================================
// OME-XML
// =============================================================================

/// An OME document with one `Image` per entry of `images`, each given as
/// `(dimension order, type, size x, size y, size z, size c, size t)`.
pub fn ome_xml(images: &[(&str, &str, u32, u32, usize, usize, usize)]) -> String {
    let mut xml =
        String::from(r#"<?xml version="1.0" encoding="UTF-8"?><OME xmlns="http://www.openmicroscopy.org/Schemas/OME/2016-06">"#);
    for (i, (order, dtype, x, y, z, c, t)) in images.iter().enumerate() {
        xml.push_str(&format!(
            r#"<Image ID="Image:{i}" Name="series {i}"><Pixels ID="Pixels:{i}" DimensionOrder="{order}" Type="{dtype}" SizeX="{x}" SizeY="{y}" SizeZ="{z}" SizeC="{c}" SizeT="{t}" PhysicalSizeX="0.25" PhysicalSizeY="0.25">"#
        ));
        for ch in 0..*c {
            xml.push_str(&format!(r#"<Channel ID="Channel:{i}:{ch}" Name="ch{ch}" SamplesPerPixel="1"/>"#));
        }
        xml.push_str("</Pixels></Image>");
    }
    xml.push_str("</OME>");
    xml
}

// =============================================================================
// Readers and options
// =============================================================================

/// A memory reader that counts reads, plus the same reader as a trait object.
pub fn memory_reader(bytes: Vec<u8>) -> (Arc<MemoryRangeReader>, Arc<dyn RangeReader>) {
    let reader = Arc::new(MemoryRangeReader::new(bytes, "memory://image.ome.tif"));
    let shared: Arc<dyn RangeReader> = reader.clone();
    (reader, shared)
}

pub fn options() -> LoadOptions {
    LoadOptions::default().with_pool(Arc::new(DecodePool::new(2).unwrap()))
}

// =============================================================================
// Zarr Builder
// =============================================================================

/// Write `contents` under `root`, creating parent directories.
pub fn write_store(root: &Path, contents: &[(&str, Vec<u8>)]) {
    for (key, value) in contents {
        let path = root.join(key);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, value).unwrap();
    }
}

/// `.zarray` document of an uncompressed array.
pub fn zarray(shape: &[usize], chunks: &[usize], dtype: &str, fill_value: i64) -> Vec<u8> {
    serde_json::json!({
        "zarr_format": 2,
        "shape": shape,
        "chunks": chunks,
        "dtype": dtype,
        "compressor": null,
        "fill_value": fill_value,
        "order": "C",
        "filters": null,
    })
    .to_string()
    .into_bytes()
}
