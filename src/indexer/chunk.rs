use crate::axes::AxisLabels;
use crate::error::IndexError;

/// Chunk grid coordinate plus the position inside that chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkLocation {
    /// One chunk index per axis, in label order
    pub coords: Vec<usize>,
    /// Offset of the selection inside the chunk; 0 on the spatial axes
    pub offsets: Vec<usize>,
}

/// Maps a selection plus a tile coordinate onto a chunk of a chunked array.
///
/// Tiles are chunk-aligned, so the tile `(x, y)` is the chunk index on the
/// spatial axes. Other axes divide the selection by their chunk extent.
#[derive(Debug, Clone)]
pub struct ChunkIndexer {
    chunks: Vec<usize>,
    y_pos: usize,
    x_pos: usize,
}

impl ChunkIndexer {
    pub fn new(labels: &AxisLabels, chunks: Vec<usize>) -> Result<Self, IndexError> {
        if chunks.len() != labels.len() {
            return Err(IndexError::RankMismatch {
                expected: labels.len(),
                actual: chunks.len(),
            });
        }
        let (y_pos, x_pos) = labels
            .spatial_positions()
            .ok_or_else(|| IndexError::UnknownAxis {
                axis: "x".to_string(),
                labels: labels.as_slice().to_vec(),
            })?;
        Ok(Self {
            chunks,
            y_pos,
            x_pos,
        })
    }

    pub fn chunks(&self) -> &[usize] {
        &self.chunks
    }

    /// Positions of the `y` and `x` axes.
    pub fn spatial_positions(&self) -> (usize, usize) {
        (self.y_pos, self.x_pos)
    }

    /// `selection` holds one index per axis in label order; its spatial
    /// entries are ignored.
    pub fn index(&self, selection: &[usize], x: usize, y: usize) -> ChunkLocation {
        let mut coords = Vec::with_capacity(self.chunks.len());
        let mut offsets = Vec::with_capacity(self.chunks.len());
        for (axis, (&index, &chunk)) in selection.iter().zip(&self.chunks).enumerate() {
            if axis == self.x_pos {
                coords.push(x);
                offsets.push(0);
            } else if axis == self.y_pos {
                coords.push(y);
                offsets.push(0);
            } else {
                let chunk = chunk.max(1);
                coords.push(index / chunk);
                offsets.push(index % chunk);
            }
        }
        ChunkLocation { coords, offsets }
    }
}
