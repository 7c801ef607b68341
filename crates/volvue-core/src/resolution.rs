//! Pyramid level selection under a pixel budget
//!
//! All geometry here runs in the un-oriented OME-Zarr world frame (plain
//! scale + translation per level). The anatomical orientation permutation
//! only enters the renderer-facing header affine, never region math.

use crate::{
    align_to_chunks, Aabb, Affine, ChunkAlignedRegion, ClipPlaneSet, Multiscales, Result,
    SliceAxis, VolvueError,
};

/// A chosen level plus the chunk-aligned region that justified it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelSelection {
    pub level: usize,
    pub aligned: ChunkAlignedRegion,
}

/// Un-oriented voxel-to-world affine of one level
pub fn geometry_affine(ms: &Multiscales, level: usize) -> Result<Affine> {
    let l = ms.level(level)?;
    Ok(Affine::from_scale_translation(
        l.scale_xyz(ms.layout()),
        l.translation_xyz(ms.layout()),
    ))
}

/// World AABB of one level in the un-oriented frame
pub fn level_world_bounds(ms: &Multiscales, level: usize) -> Result<Aabb> {
    let l = ms.level(level)?;
    Ok(geometry_affine(ms, level)?.world_bounds_from_shape(l.shape_zyx(ms.layout())))
}

/// Chunk-aligned region of the visible volume on one level
pub fn aligned_region_for_level(
    ms: &Multiscales,
    level: usize,
    planes: &ClipPlaneSet,
    viewport: Option<&Aabb>,
) -> Result<ChunkAlignedRegion> {
    let l = ms.level(level)?;
    let affine = geometry_affine(ms, level)?;
    let inverse = affine.inverse()?;
    let shape = l.shape_zyx(ms.layout());
    let bounds = affine.world_bounds_from_shape(shape);
    let region = planes.clip_pixel_region(&bounds, &inverse, shape, viewport);
    Ok(align_to_chunks(&region, l.chunk_zyx(ms.layout()), shape))
}

/// Chunk-aligned slab region: the visible in-plane extent with the
/// orthogonal axis collapsed to the single chunk at `orth_voxel`
pub fn slab_region_for_level(
    ms: &Multiscales,
    level: usize,
    axis: SliceAxis,
    orth_voxel: u64,
    planes: &ClipPlaneSet,
    viewport: Option<&Aabb>,
) -> Result<ChunkAlignedRegion> {
    let l = ms.level(level)?;
    let shape = l.shape_zyx(ms.layout());
    let chunk = l.chunk_zyx(ms.layout());
    let orth = axis.orthogonal_index();

    let affine = geometry_affine(ms, level)?;
    let inverse = affine.inverse()?;
    let bounds = affine.world_bounds_from_shape(shape);
    let region = planes.clip_pixel_region(&bounds, &inverse, shape, viewport);

    let slab_start = (orth_voxel.min(shape[orth].saturating_sub(1)) / chunk[orth]) * chunk[orth];
    let slab_end = (slab_start + chunk[orth]).min(shape[orth]);
    let slab = region.with_axis(orth, slab_start, slab_end);
    Ok(align_to_chunks(&slab, chunk, shape))
}

/// Pick the finest level whose aligned visible region fits `budget`.
///
/// The budget counts voxels, independent of components per voxel; buffer
/// sizing multiplies components in separately. Falls back to the coarsest
/// level when nothing fits. A level exactly at the budget is chosen; ties
/// between levels resolve to the finer one because iteration runs finest
/// to coarsest.
pub fn select_level_3d(
    ms: &Multiscales,
    budget: u64,
    planes: &ClipPlaneSet,
    viewport: Option<&Aabb>,
) -> Result<LevelSelection> {
    let mut last = None;
    for level in 0..ms.levels.len() {
        let aligned = aligned_region_for_level(ms, level, planes, viewport)?;
        let count = aligned.aligned_voxel_count();
        tracing::debug!(level, count, budget, "3d level candidate");
        if count <= budget {
            return Ok(LevelSelection { level, aligned });
        }
        last = Some(LevelSelection { level, aligned });
    }
    last.ok_or_else(|| VolvueError::InternalInvariant("empty pyramid".to_string()))
}

/// Voxel position (`[z, y, x]`, floored and clamped in-volume) of a world
/// point on one level
pub fn world_to_voxel_on_level(
    ms: &Multiscales,
    level: usize,
    world: [f64; 3],
) -> Result<[u64; 3]> {
    let inverse = geometry_affine(ms, level)?.inverse()?;
    let v = Affine::world_to_voxel(world, &inverse);
    let shape = ms.level(level)?.shape_zyx(ms.layout());
    let clamp = |val: f64, max: u64| -> u64 {
        (val.floor().max(0.0) as u64).min(max.saturating_sub(1))
    };
    Ok([
        clamp(v[2], shape[0]),
        clamp(v[1], shape[1]),
        clamp(v[0], shape[2]),
    ])
}

/// Pick the finest level whose single-slab region at the crosshair fits
/// `budget` (a voxel count, like the 3D selector's). The orthogonal voxel
/// position is recomputed per level since voxel coordinates differ across
/// the pyramid.
pub fn select_level_slab(
    ms: &Multiscales,
    budget: u64,
    axis: SliceAxis,
    world: [f64; 3],
    planes: &ClipPlaneSet,
    viewport: Option<&Aabb>,
) -> Result<LevelSelection> {
    let mut last = None;
    for level in 0..ms.levels.len() {
        let orth_voxel = world_to_voxel_on_level(ms, level, world)?[axis.orthogonal_index()];
        let aligned = slab_region_for_level(ms, level, axis, orth_voxel, planes, viewport)?;
        let count = aligned.aligned_voxel_count();
        tracing::debug!(level, count, budget, axis = %axis, "slab level candidate");
        if count <= budget {
            return Ok(LevelSelection { level, aligned });
        }
        last = Some(LevelSelection { level, aligned });
    }
    last.ok_or_else(|| VolvueError::InternalInvariant("empty pyramid".to_string()))
}

/// Outcome of a direction-aware reselection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reselection {
    pub level: usize,
    /// Aligned visible voxel count at the fixed reference level 0, to be
    /// stored for the next decision
    pub reference_count: u64,
}

/// Direction-aware level reselection for clip-plane and viewport updates.
///
/// The visible volume is always measured at level 0 so successive calls
/// compare like with like. The level only moves when the volume change and
/// the selector's suggestion agree in direction; that asymmetry is what
/// prevents oscillation near a budget boundary. A `reset` (planes going
/// from non-empty to empty) adopts the selector's optimum unconditionally.
pub fn reselect_level(
    ms: &Multiscales,
    budget: u64,
    planes: &ClipPlaneSet,
    viewport: Option<&Aabb>,
    current_level: usize,
    previous_reference: Option<u64>,
    reset: bool,
) -> Result<Reselection> {
    let reference = aligned_region_for_level(ms, 0, planes, viewport)?.aligned_voxel_count();
    let optimal = select_level_3d(ms, budget, planes, viewport)?.level;

    let level = if reset {
        optimal
    } else {
        match previous_reference {
            None => optimal,
            Some(prev) => {
                if reference < prev && optimal < current_level {
                    optimal
                } else if reference > prev && optimal > current_level {
                    optimal
                } else {
                    current_level
                }
            }
        }
    };
    if level != current_level {
        tracing::info!(
            from = current_level,
            to = level,
            reference,
            "reselected pyramid level"
        );
    }
    Ok(Reselection {
        level,
        reference_count: reference,
    })
}

/// Comprehensive test suite with Arrange-Act-Assert pattern
#[cfg(test)]
mod tests {
    include!("resolution_test.rs");
}
