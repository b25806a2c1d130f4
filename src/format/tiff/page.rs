//! One TIFF page (IFD) resolved into the geometry needed to read pixels.

use std::sync::Arc;

use bytes::Bytes;

use crate::dtype::DataType;
use crate::error::{MetadataError, TiffError};
use crate::io::RangeReader;
use crate::tile::prev_power_of_two;

use super::parser::{ByteOrder, Ifd, IfdEntry, TiffHeader};
use super::tags::{SampleFormat, TiffTag, PLANAR_SEPARATE};
use super::values::ValueReader;

/// How a page's pixels are cut into independently compressed blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockLayout {
    Tiled { tile_width: u32, tile_height: u32 },
    Stripped { rows_per_strip: u32 },
}

/// Pixel rectangle `[x, y, x + width, y + height]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    pub fn intersect(&self, other: &Rect) -> Option<Rect> {
        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());
        if right <= x || bottom <= y {
            return None;
        }
        Some(Rect::new(x, y, right - x, bottom - y))
    }
}

/// A parsed page with its block table loaded.
///
/// Holds the reader it was parsed from, so a page found through any file of
/// a multi-file image reads its blocks from the right place.
#[derive(Clone)]
pub struct TiffPage {
    /// File offset of this page's IFD
    pub offset: u64,
    pub width: u32,
    pub height: u32,
    pub layout: BlockLayout,
    pub bits_per_sample: u16,
    pub sample_format: SampleFormat,
    pub samples_per_pixel: u16,
    pub planar_separate: bool,
    pub compression: u16,
    pub predictor: u16,
    pub photometric: Option<u16>,
    pub block_offsets: Vec<u64>,
    pub block_byte_counts: Vec<u64>,
    pub jpeg_tables: Option<Bytes>,
    /// Offsets of reduced-resolution pages, finest first
    pub sub_ifds: Vec<u64>,
    pub next_ifd_offset: u64,
    pub byte_order: ByteOrder,
    description_entry: Option<IfdEntry>,
    header: TiffHeader,
    reader: Arc<dyn RangeReader>,
}

impl std::fmt::Debug for TiffPage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TiffPage")
            .field("offset", &self.offset)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("layout", &self.layout)
            .field("bits_per_sample", &self.bits_per_sample)
            .field("samples_per_pixel", &self.samples_per_pixel)
            .field("compression", &self.compression)
            .field("sub_ifds", &self.sub_ifds.len())
            .field("reader", &self.reader.identifier())
            .finish()
    }
}

impl TiffPage {
    /// Read and parse the IFD at `offset`.
    pub async fn parse(
        reader: Arc<dyn RangeReader>,
        header: TiffHeader,
        offset: u64,
    ) -> Result<Self, TiffError> {
        if offset == 0 || offset >= reader.size() {
            return Err(TiffError::InvalidIfdOffset(offset));
        }

        let count_bytes = reader
            .read_exact_at(offset, header.ifd_count_size())
            .await?;
        let entry_count = header.read_entry_count(&count_bytes);
        let ifd_size = Ifd::calculate_size(entry_count, &header);
        let ifd_bytes = reader.read_exact_at(offset, ifd_size).await?;
        let ifd = Ifd::parse(&ifd_bytes, &header)?;

        Self::from_ifd(reader, header, offset, &ifd).await
    }

    async fn from_ifd(
        reader: Arc<dyn RangeReader>,
        header: TiffHeader,
        offset: u64,
        ifd: &Ifd,
    ) -> Result<Self, TiffError> {
        let values = ValueReader::new(reader.as_ref(), &header);

        let width = read_required_u32(&values, ifd, TiffTag::ImageWidth).await?;
        let height = read_required_u32(&values, ifd, TiffTag::ImageLength).await?;
        let bits_per_sample = first_u16(&values, ifd, TiffTag::BitsPerSample, 1).await?;
        let samples_per_pixel = first_u16(&values, ifd, TiffTag::SamplesPerPixel, 1).await?;
        let compression = first_u16(&values, ifd, TiffTag::Compression, 1).await?;
        let predictor = first_u16(&values, ifd, TiffTag::Predictor, 1).await?;
        let planar = first_u16(&values, ifd, TiffTag::PlanarConfiguration, 1).await?;
        let format = first_u16(&values, ifd, TiffTag::SampleFormat, 1).await?;
        let sample_format =
            SampleFormat::from_u16(format).ok_or_else(|| TiffError::InvalidTagValue {
                tag: TiffTag::SampleFormat.name(),
                message: format!("unknown sample format {}", format),
            })?;
        let photometric = match ifd.get_entry_by_tag(TiffTag::PhotometricInterpretation) {
            Some(entry) => Some(values.read_u64(entry).await? as u16),
            None => None,
        };

        let (layout, offsets_tag, counts_tag) = if ifd.is_tiled() {
            let tile_width = read_required_u32(&values, ifd, TiffTag::TileWidth).await?;
            let tile_height = read_required_u32(&values, ifd, TiffTag::TileLength).await?;
            if tile_width == 0 || tile_height == 0 {
                return Err(TiffError::InvalidTagValue {
                    tag: TiffTag::TileWidth.name(),
                    message: "tile dimensions must be positive".to_string(),
                });
            }
            (
                BlockLayout::Tiled {
                    tile_width,
                    tile_height,
                },
                TiffTag::TileOffsets,
                TiffTag::TileByteCounts,
            )
        } else {
            let rows_per_strip = match ifd.get_entry_by_tag(TiffTag::RowsPerStrip) {
                Some(entry) => values.read_u64(entry).await?.min(height as u64) as u32,
                None => height,
            };
            (
                BlockLayout::Stripped {
                    rows_per_strip: rows_per_strip.max(1),
                },
                TiffTag::StripOffsets,
                TiffTag::StripByteCounts,
            )
        };

        let block_offsets = read_required_array(&values, ifd, offsets_tag).await?;
        let block_byte_counts = read_required_array(&values, ifd, counts_tag).await?;

        let jpeg_tables = match ifd.get_entry_by_tag(TiffTag::JpegTables) {
            Some(entry) => Some(values.read_bytes(entry).await?),
            None => None,
        };
        let sub_ifds = match ifd.get_entry_by_tag(TiffTag::SubIfds) {
            Some(entry) => values.read_u64_array(entry).await?,
            None => Vec::new(),
        };

        let page = TiffPage {
            offset,
            width,
            height,
            layout,
            bits_per_sample,
            sample_format,
            samples_per_pixel: samples_per_pixel.max(1),
            planar_separate: planar == PLANAR_SEPARATE,
            compression,
            predictor,
            photometric,
            block_offsets,
            block_byte_counts,
            jpeg_tables,
            sub_ifds,
            next_ifd_offset: ifd.next_ifd_offset,
            byte_order: header.byte_order,
            description_entry: ifd.get_entry_by_tag(TiffTag::ImageDescription).cloned(),
            header,
            reader,
        };

        let expected = page.block_count();
        if page.block_offsets.len() < expected || page.block_byte_counts.len() < expected {
            return Err(TiffError::InvalidTagValue {
                tag: offsets_tag.name(),
                message: format!(
                    "expected {} blocks, found {} offsets and {} byte counts",
                    expected,
                    page.block_offsets.len(),
                    page.block_byte_counts.len()
                ),
            });
        }

        Ok(page)
    }

    pub fn reader(&self) -> &Arc<dyn RangeReader> {
        &self.reader
    }

    pub fn header(&self) -> &TiffHeader {
        &self.header
    }

    /// The ImageDescription string, read on demand (it holds the whole
    /// OME-XML document on the first page).
    pub async fn description(&self) -> Result<Option<String>, TiffError> {
        match &self.description_entry {
            Some(entry) => {
                let values = ValueReader::new(self.reader.as_ref(), &self.header);
                Ok(Some(values.read_string(entry).await?))
            }
            None => Ok(None),
        }
    }

    pub fn dtype(&self) -> Result<DataType, MetadataError> {
        DataType::from_tiff(self.bits_per_sample, self.sample_format)
    }

    pub fn bytes_per_sample(&self) -> usize {
        (self.bits_per_sample as usize).div_ceil(8)
    }

    /// Samples stored per pixel inside one block.
    pub fn samples_per_block_pixel(&self) -> usize {
        if self.planar_separate {
            1
        } else {
            self.samples_per_pixel as usize
        }
    }

    pub fn is_tiled(&self) -> bool {
        matches!(self.layout, BlockLayout::Tiled { .. })
    }

    /// Width and height of a full block.
    pub fn block_size(&self) -> (u32, u32) {
        match self.layout {
            BlockLayout::Tiled {
                tile_width,
                tile_height,
            } => (tile_width, tile_height),
            BlockLayout::Stripped { rows_per_strip } => (self.width, rows_per_strip),
        }
    }

    pub fn blocks_across(&self) -> u32 {
        let (bw, _) = self.block_size();
        self.width.div_ceil(bw.max(1))
    }

    pub fn blocks_down(&self) -> u32 {
        let (_, bh) = self.block_size();
        self.height.div_ceil(bh.max(1))
    }

    pub fn blocks_per_plane(&self) -> usize {
        self.blocks_across() as usize * self.blocks_down() as usize
    }

    pub fn block_count(&self) -> usize {
        let planes = if self.planar_separate {
            self.samples_per_pixel as usize
        } else {
            1
        };
        self.blocks_per_plane() * planes
    }

    /// Index into the block table. `sample` selects the plane of
    /// planar-separate pages and is ignored otherwise.
    pub fn block_index(&self, bx: u32, by: u32, sample: u16) -> usize {
        let plane = if self.planar_separate {
            sample as usize * self.blocks_per_plane()
        } else {
            0
        };
        plane + by as usize * self.blocks_across() as usize + bx as usize
    }

    /// File offset and compressed length of block `index`.
    pub fn block_location(&self, index: usize) -> Option<(u64, u64)> {
        Some((
            *self.block_offsets.get(index)?,
            *self.block_byte_counts.get(index)?,
        ))
    }

    /// Pixel rows and columns a decoded block spans. Tiles are padded to full
    /// size; the last strip holds only the remaining rows.
    pub fn decoded_block_size(&self, by: u32) -> (u32, u32) {
        match self.layout {
            BlockLayout::Tiled {
                tile_width,
                tile_height,
            } => (tile_width, tile_height),
            BlockLayout::Stripped { rows_per_strip } => {
                let start = by.saturating_mul(rows_per_strip);
                (
                    self.width,
                    rows_per_strip.min(self.height.saturating_sub(start)),
                )
            }
        }
    }

    /// Image area covered by block `(bx, by)`, clipped to the page.
    pub fn block_rect(&self, bx: u32, by: u32) -> Rect {
        let (bw, bh) = self.block_size();
        let x = bx * bw;
        let y = by * bh;
        Rect::new(
            x,
            y,
            bw.min(self.width.saturating_sub(x)),
            bh.min(self.height.saturating_sub(y)),
        )
    }

    /// Block coordinates intersecting `window`.
    pub fn blocks_in(&self, window: &Rect) -> Vec<(u32, u32)> {
        let (bw, bh) = self.block_size();
        if window.width == 0 || window.height == 0 || bw == 0 || bh == 0 {
            return Vec::new();
        }
        let bx0 = window.x / bw;
        let by0 = window.y / bh;
        let bx1 = ((window.right() - 1) / bw).min(self.blocks_across().saturating_sub(1));
        let by1 = ((window.bottom() - 1) / bh).min(self.blocks_down().saturating_sub(1));
        let mut blocks = Vec::new();
        for by in by0..=by1 {
            for bx in bx0..=bx1 {
                blocks.push((bx, by));
            }
        }
        blocks
    }

    /// Side of the square tiles served from this page: the largest power of
    /// two not above the smaller native block dimension.
    pub fn tile_size(&self) -> u32 {
        let (bw, bh) = self.block_size();
        prev_power_of_two(bw.min(bh)).max(1)
    }
}

async fn read_required_u32<R: RangeReader + ?Sized>(
    values: &ValueReader<'_, R>,
    ifd: &Ifd,
    tag: TiffTag,
) -> Result<u32, TiffError> {
    let entry = ifd
        .get_entry_by_tag(tag)
        .ok_or(TiffError::MissingTag(tag.name()))?;
    values.read_u32(entry).await
}

async fn read_required_array<R: RangeReader + ?Sized>(
    values: &ValueReader<'_, R>,
    ifd: &Ifd,
    tag: TiffTag,
) -> Result<Vec<u64>, TiffError> {
    let entry = ifd
        .get_entry_by_tag(tag)
        .ok_or(TiffError::MissingTag(tag.name()))?;
    values.read_u64_array(entry).await
}

/// First value of a possibly per-sample tag, or `default` when absent.
async fn first_u16<R: RangeReader + ?Sized>(
    values: &ValueReader<'_, R>,
    ifd: &Ifd,
    tag: TiffTag,
    default: u16,
) -> Result<u16, TiffError> {
    match ifd.get_entry_by_tag(tag) {
        Some(entry) => Ok(values
            .read_u16_array(entry)
            .await?
            .first()
            .copied()
            .unwrap_or(default)),
        None => Ok(default),
    }
}
