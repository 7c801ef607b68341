//! Voxel regions and chunk alignment
//!
//! Regions are half-open `[start, end)` intervals in voxel indices on one
//! pyramid level, `[z, y, x]` order (z extent 1 for 2D images).

use serde::{Deserialize, Serialize};

/// Half-open voxel region on a level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PixelRegion {
    pub start: [u64; 3],
    pub end: [u64; 3],
}

impl PixelRegion {
    pub fn new(start: [u64; 3], end: [u64; 3]) -> Self {
        Self { start, end }
    }

    /// The whole level
    pub fn full(shape_zyx: [u64; 3]) -> Self {
        Self {
            start: [0, 0, 0],
            end: shape_zyx,
        }
    }

    pub fn dims(&self) -> [u64; 3] {
        [
            self.end[0].saturating_sub(self.start[0]),
            self.end[1].saturating_sub(self.start[1]),
            self.end[2].saturating_sub(self.start[2]),
        ]
    }

    pub fn voxel_count(&self) -> u64 {
        let [z, y, x] = self.dims();
        z * y * x
    }

    pub fn is_empty(&self) -> bool {
        self.voxel_count() == 0
    }

    pub fn intersect(&self, other: &PixelRegion) -> PixelRegion {
        let mut out = *self;
        for a in 0..3 {
            out.start[a] = self.start[a].max(other.start[a]);
            out.end[a] = self.end[a].min(other.end[a]).max(out.start[a]);
        }
        out
    }

    pub fn clamp_to(&self, shape_zyx: [u64; 3]) -> PixelRegion {
        let mut out = *self;
        for a in 0..3 {
            out.start[a] = self.start[a].min(shape_zyx[a]);
            out.end[a] = self.end[a].min(shape_zyx[a]).max(out.start[a]);
        }
        out
    }

    pub fn contains(&self, voxel_zyx: [u64; 3]) -> bool {
        (0..3).all(|a| voxel_zyx[a] >= self.start[a] && voxel_zyx[a] < self.end[a])
    }

    /// Replace one axis with an explicit `[start, end)` interval
    pub fn with_axis(&self, axis: usize, start: u64, end: u64) -> PixelRegion {
        let mut out = *self;
        out.start[axis] = start;
        out.end[axis] = end.max(start);
        out
    }
}

/// A pixel region expanded outward to chunk boundaries
///
/// `aligned_start <= start <= end <= aligned_end <= shape`; the aligned
/// bounds are multiples of the chunk shape except where clamped at the
/// volume edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChunkAlignedRegion {
    pub region: PixelRegion,
    pub aligned_start: [u64; 3],
    pub aligned_end: [u64; 3],
}

impl ChunkAlignedRegion {
    pub fn aligned_dims(&self) -> [u64; 3] {
        [
            self.aligned_end[0] - self.aligned_start[0],
            self.aligned_end[1] - self.aligned_start[1],
            self.aligned_end[2] - self.aligned_start[2],
        ]
    }

    pub fn aligned_voxel_count(&self) -> u64 {
        let [z, y, x] = self.aligned_dims();
        z * y * x
    }

    pub fn aligned_region(&self) -> PixelRegion {
        PixelRegion::new(self.aligned_start, self.aligned_end)
    }

    /// Chunk coordinates (`[z, y, x]`, counted in chunks) covered by the
    /// aligned bounds, in z-major order
    pub fn covered_chunks(&self, chunk_zyx: [u64; 3]) -> Vec<[u64; 3]> {
        let first = [
            self.aligned_start[0] / chunk_zyx[0],
            self.aligned_start[1] / chunk_zyx[1],
            self.aligned_start[2] / chunk_zyx[2],
        ];
        let last = [
            self.aligned_end[0].div_ceil(chunk_zyx[0]),
            self.aligned_end[1].div_ceil(chunk_zyx[1]),
            self.aligned_end[2].div_ceil(chunk_zyx[2]),
        ];
        let mut out = Vec::with_capacity(
            ((last[0] - first[0]) * (last[1] - first[1]) * (last[2] - first[2])) as usize,
        );
        for cz in first[0]..last[0] {
            for cy in first[1]..last[1] {
                for cx in first[2]..last[2] {
                    out.push([cz, cy, cx]);
                }
            }
        }
        out
    }
}

/// Expand a region outward to chunk boundaries, clamped to the volume.
///
/// Start floors to a chunk multiple; end ceils to a chunk multiple and is
/// then clamped to the volume shape.
pub fn align_to_chunks(
    region: &PixelRegion,
    chunk_zyx: [u64; 3],
    shape_zyx: [u64; 3],
) -> ChunkAlignedRegion {
    let region = region.clamp_to(shape_zyx);
    let mut aligned_start = [0u64; 3];
    let mut aligned_end = [0u64; 3];
    for a in 0..3 {
        let chunk = chunk_zyx[a].max(1);
        aligned_start[a] = (region.start[a] / chunk) * chunk;
        aligned_end[a] = region.end[a].div_ceil(chunk) * chunk;
        aligned_end[a] = aligned_end[a].min(shape_zyx[a]).max(aligned_start[a]);
    }
    ChunkAlignedRegion {
        region,
        aligned_start,
        aligned_end,
    }
}
