//! Assembling a pixel window from the compressed blocks of a TIFF page.

use tracing::trace;

use super::abortable;
use crate::decode::{Codec, DecodeHandle, DecodePool, DecodeTask, HorizontalPredictor};
use crate::dtype::PixelBuffer;
use crate::error::{PixelSourceError, TiffError};
use crate::format::tiff::{Rect, SampleFormat, TiffPage};
use crate::signal::AbortSignal;

struct PendingBlock {
    /// Image area the block covers, clipped to the page
    rect: Rect,
    /// Row length of the decoded block in pixels
    decoded_width: u32,
    /// Plane of a planar-separate page
    sample: Option<u16>,
    /// `None` for blocks with no stored bytes, read as zeros
    handle: Option<DecodeHandle>,
}

/// Read `window` of `page`, all samples interleaved per pixel.
///
/// Blocks are read in row-major order and handed to the pool as soon as
/// they arrive, so decoding overlaps the remaining reads.
pub(crate) async fn read_window(
    page: &TiffPage,
    window: Rect,
    pool: &DecodePool,
    signal: Option<&AbortSignal>,
) -> Result<PixelBuffer, PixelSourceError> {
    if window.right() > page.width || window.bottom() > page.height {
        return Err(PixelSourceError::BoundsCheck(format!(
            "window {}x{} at ({}, {}) exceeds page {}x{}",
            window.width, window.height, window.x, window.y, page.width, page.height
        )));
    }

    let dtype = page.dtype()?;
    let samples = page.samples_per_pixel as usize;
    let block_samples = page.samples_per_block_pixel();
    let bytes_per_sample = page.bytes_per_sample();
    let codec = Codec::from_tiff(page.compression, page.jpeg_tables.clone())?;
    let (block_width, _) = page.block_size();
    let predictor = HorizontalPredictor::from_tiff(
        page.predictor,
        page.bits_per_sample,
        page.sample_format == SampleFormat::Float,
        block_width as usize,
        block_samples,
        page.byte_order,
    )?;

    let planes = if page.planar_separate {
        page.samples_per_pixel
    } else {
        1
    };
    let blocks = page.blocks_in(&window);
    trace!(
        page = page.offset,
        blocks = blocks.len() * planes as usize,
        codec = codec.name(),
        "reading window"
    );

    let mut pending = Vec::with_capacity(blocks.len() * planes as usize);
    for sample in 0..planes {
        for &(bx, by) in &blocks {
            let index = page.block_index(bx, by, sample);
            let (offset, len) = page
                .block_location(index)
                .ok_or_else(|| TiffError::InvalidTagValue {
                    tag: if page.is_tiled() {
                        "TileOffsets"
                    } else {
                        "StripOffsets"
                    },
                    message: format!("no entry for block {}", index),
                })?;
            let (decoded_width, decoded_height) = page.decoded_block_size(by);
            let mut block = PendingBlock {
                rect: page.block_rect(bx, by),
                decoded_width,
                sample: page.planar_separate.then_some(sample),
                handle: None,
            };

            if len > 0 {
                let payload = abortable(signal, page.reader().read_exact_at(offset, len as usize))
                    .await??;
                let expected =
                    decoded_width as usize * decoded_height as usize * block_samples * bytes_per_sample;
                let task = DecodeTask::new(codec.clone(), payload)
                    .with_expected_len(expected)
                    .with_predictor(predictor);
                block.handle = Some(pool.submit(task)?);
            }
            pending.push(block);
        }
    }

    let mut out = vec![0u8; window.width as usize * window.height as usize * samples * bytes_per_sample];
    for mut block in pending {
        let Some(handle) = block.handle.take() else {
            continue;
        };
        let data = abortable(signal, handle.wait()).await??;
        copy_block(
            &mut out,
            &data,
            &block,
            window,
            block_samples,
            samples,
            bytes_per_sample,
        );
    }

    Ok(PixelBuffer::from_bytes(dtype, &out, page.byte_order))
}

fn copy_block(
    out: &mut [u8],
    data: &[u8],
    block: &PendingBlock,
    window: Rect,
    block_samples: usize,
    samples: usize,
    bytes_per_sample: usize,
) {
    let Some(area) = block.rect.intersect(&window) else {
        return;
    };
    let src_pixel = block_samples * bytes_per_sample;
    let dst_pixel = samples * bytes_per_sample;
    let src_col = (area.x - block.rect.x) as usize;
    let dst_col = (area.x - window.x) as usize;

    for row in area.y..area.bottom() {
        let src_row = (row - block.rect.y) as usize * block.decoded_width as usize;
        let dst_row = (row - window.y) as usize * window.width as usize;
        match block.sample {
            Some(sample) => {
                let sample_at = sample as usize * bytes_per_sample;
                for i in 0..area.width as usize {
                    let s = (src_row + src_col + i) * src_pixel;
                    let d = (dst_row + dst_col + i) * dst_pixel + sample_at;
                    out[d..d + bytes_per_sample].copy_from_slice(&data[s..s + bytes_per_sample]);
                }
            }
            None => {
                let s = (src_row + src_col) * src_pixel;
                let d = (dst_row + dst_col) * dst_pixel;
                let n = area.width as usize * dst_pixel;
                out[d..d + n].copy_from_slice(&data[s..s + n]);
            }
        }
    }
}
