//! Mapping selections onto physical storage.
//!
//! TIFF-family images resolve a `(t, c, z)` selection and a pyramid level to
//! a parsed page ([`PlaneIndexer`]); chunked arrays resolve a selection and a
//! tile coordinate to a chunk key ([`ChunkIndexer`]).

mod chunk;
mod tiff;

pub use chunk::{ChunkIndexer, ChunkLocation};
pub use tiff::{LegacyIndexer, MultiFileIndexer, PlaneIndexer, SubIfdIndexer};

use crate::axes::{DimensionOrder, PlaneKey};

/// Sizes of the three non-spatial OME axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaneCounts {
    pub size_t: usize,
    pub size_c: usize,
    pub size_z: usize,
}

impl PlaneCounts {
    pub fn new(size_t: usize, size_c: usize, size_z: usize) -> Self {
        Self {
            size_t,
            size_c,
            size_z,
        }
    }

    /// Planes per pyramid level.
    pub fn plane_count(&self) -> usize {
        self.size_t * self.size_c * self.size_z
    }

    /// True when `key` lies inside the declared cube.
    pub fn contains(&self, key: PlaneKey) -> bool {
        key.t < self.size_t && key.c < self.size_c && key.z < self.size_z
    }

    /// Every key of the cube, t outermost.
    pub fn keys(&self) -> impl Iterator<Item = PlaneKey> + '_ {
        (0..self.size_t).flat_map(move |t| {
            (0..self.size_c).flat_map(move |c| (0..self.size_z).map(move |z| PlaneKey { t, c, z }))
        })
    }
}

/// Position of plane `key` in a sequence of planes stored in `order`.
///
/// The first letter after `XY` varies fastest.
pub fn plane_index(order: DimensionOrder, key: PlaneKey, counts: PlaneCounts) -> usize {
    let PlaneKey { t, c, z } = key;
    let PlaneCounts {
        size_t: st,
        size_c: sc,
        size_z: sz,
    } = counts;
    match order {
        DimensionOrder::Xyzct => t * sz * sc + c * sz + z,
        DimensionOrder::Xyztc => c * sz * st + t * sz + z,
        DimensionOrder::Xyctz => z * sc * st + t * sc + c,
        DimensionOrder::Xyczt => t * sc * sz + z * sc + c,
        DimensionOrder::Xytcz => z * st * sc + c * st + t,
        DimensionOrder::Xytzc => c * st * sz + z * st + t,
    }
}

/// Page of plane `key` at `level` in a legacy pyramid, where each level
/// stores a full plane sequence after the previous one.
pub fn legacy_page_index(
    order: DimensionOrder,
    key: PlaneKey,
    counts: PlaneCounts,
    level: usize,
) -> usize {
    plane_index(order, key, counts) + level * counts.plane_count()
}
