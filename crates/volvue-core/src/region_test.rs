// Region and chunk alignment tests

use super::*;

// ============================================================================
// PixelRegion Tests
// ============================================================================

#[test]
fn test_region_dims_and_count() {
    // Arrange
    let region = PixelRegion::new([0, 10, 20], [4, 30, 50]);

    // Act & Assert
    assert_eq!(region.dims(), [4, 20, 30]);
    assert_eq!(region.voxel_count(), 4 * 20 * 30);
    assert!(!region.is_empty());
}

#[test]
fn test_empty_region() {
    let region = PixelRegion::new([5, 5, 5], [5, 10, 10]);
    assert!(region.is_empty());
    assert_eq!(region.voxel_count(), 0);
}

#[test]
fn test_intersect_never_inverts() {
    // Arrange: disjoint regions
    let a = PixelRegion::new([0, 0, 0], [10, 10, 10]);
    let b = PixelRegion::new([20, 20, 20], [30, 30, 30]);

    // Act
    let i = a.intersect(&b);

    // Assert: empty, start <= end on every axis
    assert!(i.is_empty());
    for axis in 0..3 {
        assert!(i.start[axis] <= i.end[axis]);
    }
}

#[test]
fn test_clamp_to_shape() {
    let region = PixelRegion::new([0, 100, 100], [10, 300, 300]);
    let clamped = region.clamp_to([8, 256, 256]);
    assert_eq!(clamped.start, [0, 100, 100]);
    assert_eq!(clamped.end, [8, 256, 256]);
}

#[test]
fn test_with_axis_override() {
    let region = PixelRegion::new([0, 0, 0], [64, 64, 64]);
    let slab = region.with_axis(0, 32, 48);
    assert_eq!(slab.start, [32, 0, 0]);
    assert_eq!(slab.end, [48, 64, 64]);
}

#[test]
fn test_contains_half_open() {
    let region = PixelRegion::new([0, 0, 0], [4, 4, 4]);
    assert!(region.contains([3, 3, 3]));
    assert!(!region.contains([4, 0, 0]));
}

// ============================================================================
// Chunk Alignment Tests
// ============================================================================

#[test]
fn test_align_interior_region() {
    // Arrange: 32-voxel chunks, region straddling chunk boundaries
    let region = PixelRegion::new([10, 40, 70], [20, 90, 100]);

    // Act
    let aligned = align_to_chunks(&region, [32, 32, 32], [128, 128, 128]);

    // Assert: floor/ceil to chunk multiples, containing the original
    assert_eq!(aligned.aligned_start, [0, 32, 64]);
    assert_eq!(aligned.aligned_end, [32, 96, 128]);
    for a in 0..3 {
        assert!(aligned.aligned_start[a] <= region.start[a]);
        assert!(aligned.aligned_end[a] >= region.end[a]);
        assert_eq!(aligned.aligned_start[a] % 32, 0);
    }
}

#[test]
fn test_align_clamps_at_volume_edge() {
    // Arrange: volume not a chunk multiple
    let region = PixelRegion::new([60, 60, 60], [100, 100, 100]);

    // Act
    let aligned = align_to_chunks(&region, [32, 32, 32], [100, 100, 100]);

    // Assert: end clamps to shape, not to the next chunk multiple
    assert_eq!(aligned.aligned_start, [32, 32, 32]);
    assert_eq!(aligned.aligned_end, [100, 100, 100]);
}

#[test]
fn test_align_full_volume() {
    let region = PixelRegion::full([70, 128, 128]);
    let aligned = align_to_chunks(&region, [32, 64, 64], [70, 128, 128]);
    assert_eq!(aligned.aligned_start, [0, 0, 0]);
    assert_eq!(aligned.aligned_end, [70, 128, 128]);
    assert_eq!(aligned.aligned_voxel_count(), 70 * 128 * 128);
}

#[test]
fn test_align_region_outside_volume_is_empty() {
    let region = PixelRegion::new([200, 200, 200], [300, 300, 300]);
    let aligned = align_to_chunks(&region, [32, 32, 32], [128, 128, 128]);
    assert_eq!(aligned.aligned_voxel_count(), 0);
}

#[test]
fn test_aligned_invariant_ordering() {
    // 0 <= alignedStart <= start <= end <= alignedEnd <= shape
    let region = PixelRegion::new([5, 33, 65], [6, 35, 127]);
    let shape = [64, 64, 128];
    let aligned = align_to_chunks(&region, [16, 16, 16], shape);
    for a in 0..3 {
        assert!(aligned.aligned_start[a] <= aligned.region.start[a]);
        assert!(aligned.region.start[a] <= aligned.region.end[a]);
        assert!(aligned.region.end[a] <= aligned.aligned_end[a]);
        assert!(aligned.aligned_end[a] <= shape[a]);
    }
}

// ============================================================================
// Chunk Enumeration Tests
// ============================================================================

#[test]
fn test_covered_chunks_single() {
    let region = PixelRegion::new([0, 0, 0], [10, 10, 10]);
    let aligned = align_to_chunks(&region, [32, 32, 32], [128, 128, 128]);
    assert_eq!(aligned.covered_chunks([32, 32, 32]), vec![[0, 0, 0]]);
}

#[test]
fn test_covered_chunks_grid_order() {
    // Arrange: 2x1x2 chunks
    let region = PixelRegion::new([0, 0, 0], [64, 32, 64]);
    let aligned = align_to_chunks(&region, [32, 32, 32], [128, 128, 128]);

    // Act
    let chunks = aligned.covered_chunks([32, 32, 32]);

    // Assert: z-major order
    assert_eq!(
        chunks,
        vec![[0, 0, 0], [0, 0, 1], [1, 0, 0], [1, 0, 1]]
    );
}

#[test]
fn test_covered_chunks_offset_region() {
    let region = PixelRegion::new([32, 32, 64], [64, 64, 128]);
    let aligned = align_to_chunks(&region, [32, 32, 32], [128, 128, 128]);
    let chunks = aligned.covered_chunks([32, 32, 32]);
    assert_eq!(chunks, vec![[1, 1, 2], [1, 1, 3]]);
}

#[test]
fn test_covered_chunks_at_clamped_edge() {
    // Volume 100 on each axis, chunk 32: last chunk is partial
    let region = PixelRegion::new([96, 96, 96], [100, 100, 100]);
    let aligned = align_to_chunks(&region, [32, 32, 32], [100, 100, 100]);
    assert_eq!(aligned.covered_chunks([32, 32, 32]), vec![[3, 3, 3]]);
}
