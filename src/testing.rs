//! Little-endian TIFF writer for unit tests.

use std::sync::Arc;

use crate::io::{MemoryRangeReader, RangeReader};

pub(crate) struct TestPage {
    pub width: u32,
    pub height: u32,
    /// `None` writes strips
    pub tile: Option<(u32, u32)>,
    pub rows_per_strip: u32,
    pub bits: u16,
    pub sample_format: u16,
    pub samples: u16,
    pub compression: u16,
    pub predictor: Option<u16>,
    pub blocks: Vec<Vec<u8>>,
    pub description: Option<String>,
    pub sub_ifds: Vec<TestPage>,
}

impl TestPage {
    /// Uncompressed tiled page; `pixel(x, y, sample)` gives each value,
    /// written with `bits / 8` bytes.
    pub fn tiled<F>(width: u32, height: u32, tile: u32, bits: u16, samples: u16, pixel: F) -> Self
    where
        F: Fn(u32, u32, u16) -> u64,
    {
        let bytes = bits as usize / 8;
        let mut blocks = Vec::new();
        for ty in 0..height.div_ceil(tile) {
            for tx in 0..width.div_ceil(tile) {
                let mut block = Vec::with_capacity((tile * tile) as usize * bytes * samples as usize);
                for y in ty * tile..(ty + 1) * tile {
                    for x in tx * tile..(tx + 1) * tile {
                        for s in 0..samples {
                            // Padding outside the image is zero
                            let value = if x < width && y < height { pixel(x, y, s) } else { 0 };
                            block.extend_from_slice(&value.to_le_bytes()[..bytes]);
                        }
                    }
                }
                blocks.push(block);
            }
        }
        Self::base(width, height, Some((tile, tile)), bits, samples, blocks)
    }

    /// Uncompressed stripped page.
    pub fn stripped<F>(width: u32, height: u32, rows_per_strip: u32, bits: u16, pixel: F) -> Self
    where
        F: Fn(u32, u32) -> u64,
    {
        let bytes = bits as usize / 8;
        let mut blocks = Vec::new();
        for strip in 0..height.div_ceil(rows_per_strip) {
            let mut block = Vec::new();
            let end = ((strip + 1) * rows_per_strip).min(height);
            for y in strip * rows_per_strip..end {
                for x in 0..width {
                    block.extend_from_slice(&pixel(x, y).to_le_bytes()[..bytes]);
                }
            }
            blocks.push(block);
        }
        let mut page = Self::base(width, height, None, bits, 1, blocks);
        page.rows_per_strip = rows_per_strip;
        page
    }

    fn base(
        width: u32,
        height: u32,
        tile: Option<(u32, u32)>,
        bits: u16,
        samples: u16,
        blocks: Vec<Vec<u8>>,
    ) -> Self {
        Self {
            width,
            height,
            tile,
            rows_per_strip: height,
            bits,
            sample_format: 1,
            samples,
            compression: 1,
            predictor: None,
            blocks,
            description: None,
            sub_ifds: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_sub_ifds(mut self, pages: Vec<TestPage>) -> Self {
        self.sub_ifds = pages;
        self
    }
}

/// Serialize `pages` as one IFD chain.
pub(crate) fn build_tiff(pages: &[TestPage]) -> Vec<u8> {
    let mut buf = vec![0x49, 0x49, 0x2A, 0x00, 0, 0, 0, 0];
    let mut previous_next = 4usize;
    for page in pages {
        let (offset, next_at) = write_page(&mut buf, page);
        buf[previous_next..previous_next + 4].copy_from_slice(&(offset as u32).to_le_bytes());
        previous_next = next_at;
    }
    buf
}

pub(crate) fn memory_reader(bytes: Vec<u8>) -> (Arc<MemoryRangeReader>, Arc<dyn RangeReader>) {
    let reader = Arc::new(MemoryRangeReader::new(bytes, "memory://test.ome.tif"));
    let dyn_reader: Arc<dyn RangeReader> = reader.clone();
    (reader, dyn_reader)
}

fn align(buf: &mut Vec<u8>) {
    if buf.len() % 2 == 1 {
        buf.push(0);
    }
}

fn write_page(buf: &mut Vec<u8>, page: &TestPage) -> (u64, usize) {
    let sub_offsets: Vec<u32> = page
        .sub_ifds
        .iter()
        .map(|sub| write_page(buf, sub).0 as u32)
        .collect();

    let mut block_offsets = Vec::new();
    let mut block_counts = Vec::new();
    for block in &page.blocks {
        align(buf);
        block_offsets.push(buf.len() as u32);
        block_counts.push(block.len() as u32);
        buf.extend_from_slice(block);
    }

    let longs = |values: &[u32]| values.iter().flat_map(|v| v.to_le_bytes()).collect::<Vec<u8>>();
    let shorts = |values: &[u16]| values.iter().flat_map(|v| v.to_le_bytes()).collect::<Vec<u8>>();

    // (tag, type, count, raw value bytes)
    let mut entries: Vec<(u16, u16, u32, Vec<u8>)> = vec![
        (256, 4, 1, longs(&[page.width])),
        (257, 4, 1, longs(&[page.height])),
        (258, 3, page.samples as u32, shorts(&vec![page.bits; page.samples as usize])),
        (259, 3, 1, shorts(&[page.compression])),
        (262, 3, 1, shorts(&[if page.samples >= 3 { 2 } else { 1 }])),
        (277, 3, 1, shorts(&[page.samples])),
        (339, 3, 1, shorts(&[page.sample_format])),
    ];
    if let Some(predictor) = page.predictor {
        entries.push((317, 3, 1, shorts(&[predictor])));
    }
    if let Some(description) = &page.description {
        let mut raw = description.as_bytes().to_vec();
        raw.push(0);
        entries.push((270, 2, raw.len() as u32, raw));
    }
    let n = block_offsets.len() as u32;
    match page.tile {
        Some((tw, th)) => {
            entries.push((322, 4, 1, longs(&[tw])));
            entries.push((323, 4, 1, longs(&[th])));
            entries.push((324, 4, n, longs(&block_offsets)));
            entries.push((325, 4, n, longs(&block_counts)));
        }
        None => {
            entries.push((273, 4, n, longs(&block_offsets)));
            entries.push((278, 4, 1, longs(&[page.rows_per_strip])));
            entries.push((279, 4, n, longs(&block_counts)));
        }
    }
    if !sub_offsets.is_empty() {
        entries.push((330, 13, sub_offsets.len() as u32, longs(&sub_offsets)));
    }
    entries.sort_by_key(|e| e.0);

    // Out-of-line values first
    let mut fields = Vec::new();
    for (tag, field_type, count, raw) in entries {
        let mut field = [0u8; 4];
        if raw.len() <= 4 {
            field[..raw.len()].copy_from_slice(&raw);
        } else {
            align(buf);
            field = (buf.len() as u32).to_le_bytes();
            buf.extend_from_slice(&raw);
        }
        fields.push((tag, field_type, count, field));
    }

    align(buf);
    let ifd_offset = buf.len() as u64;
    buf.extend_from_slice(&(fields.len() as u16).to_le_bytes());
    for (tag, field_type, count, field) in fields {
        buf.extend_from_slice(&tag.to_le_bytes());
        buf.extend_from_slice(&field_type.to_le_bytes());
        buf.extend_from_slice(&count.to_le_bytes());
        buf.extend_from_slice(&field);
    }
    let next_at = buf.len();
    buf.extend_from_slice(&0u32.to_le_bytes());
    (ifd_offset, next_at)
}
