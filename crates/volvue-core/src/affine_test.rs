// Affine construction tests

use super::*;
use crate::{Axis, ElementType, Multiscales, Orientation};

// ============================================================================
// Fixtures
// ============================================================================

fn level_zyx(scale_zyx: [f64; 3], translation_zyx: [f64; 3]) -> (ImageLevel, AxisLayout) {
    let axes = vec![Axis::space("z"), Axis::space("y"), Axis::space("x")];
    let level = ImageLevel {
        path: "0".to_string(),
        shape: vec![64, 128, 256],
        chunk_shape: vec![32, 32, 32],
        dtype: ElementType::UInt8,
        scale: scale_zyx.to_vec(),
        translation: translation_zyx.to_vec(),
    };
    let ms = Multiscales::new(None, axes, vec![level.clone()], None, false).unwrap();
    (level, *ms.layout())
}

fn level_2d(shape_yx: [u64; 2]) -> (ImageLevel, AxisLayout) {
    let axes = vec![Axis::space("y"), Axis::space("x")];
    let level = ImageLevel {
        path: "0".to_string(),
        shape: shape_yx.to_vec(),
        chunk_shape: vec![32, 32],
        dtype: ElementType::UInt8,
        scale: vec![0.5, 0.5],
        translation: vec![0.0, 0.0],
    };
    let ms = Multiscales::new(None, axes, vec![level.clone()], None, false).unwrap();
    (level, *ms.layout())
}

fn assert_close(a: f64, b: f64) {
    assert!((a - b).abs() < 1e-12, "{a} != {b}");
}

// ============================================================================
// Scale/Translation Tests
// ============================================================================

#[test]
fn test_unoriented_affine_is_diagonal() {
    // Arrange: scale stored z,y,x = [2, 1, 0.5]
    let (level, layout) = level_zyx([2.0, 1.0, 0.5], [10.0, 20.0, 30.0]);

    // Act
    let affine = Affine::for_level(&level, &layout, None, false);

    // Assert: diag(sx, sy, sz) with the stored translation (x,y,z order)
    assert_eq!(affine.col(0)[0], 0.5);
    assert_eq!(affine.col(1)[1], 1.0);
    assert_eq!(affine.col(2)[2], 2.0);
    assert_eq!(affine.translation(), [30.0, 20.0, 10.0]);
}

#[test]
fn test_voxel_to_world_round_trip() {
    // Arrange
    let (level, layout) = level_zyx([2.0, 0.5, 0.5], [-4.0, 8.0, 1.5]);
    let affine = Affine::for_level(&level, &layout, None, false);
    let inverse = affine.inverse().unwrap();

    // Act: world point strictly inside the volume
    let p = [13.25, 20.0, 40.0];
    let voxel = Affine::world_to_voxel(p, &inverse);
    let floored = [voxel[0].floor(), voxel[1].floor(), voxel[2].floor()];
    let back = affine.voxel_to_world(floored);

    // Assert: within one voxel on each axis
    assert!((back[0] - p[0]).abs() <= 0.5);
    assert!((back[1] - p[1]).abs() <= 0.5);
    assert!((back[2] - p[2]).abs() <= 2.0);
}

#[test]
fn test_inverse_of_identity() {
    let inv = Affine::identity().inverse().unwrap();
    assert_eq!(inv, Affine::identity());
}

#[test]
fn test_singular_affine_rejected() {
    let affine = Affine::from_scale_translation([1.0, 0.0, 1.0], [0.0; 3]);
    assert!(affine.inverse().is_err());
}

// ============================================================================
// Orientation Tests
// ============================================================================

#[test]
fn test_ras_orientation_equals_plain_diag() {
    // Arrange
    let (level, layout) = level_zyx([2.0, 1.0, 0.5], [1.0, 2.0, 3.0]);
    let ras = [
        Orientation::LeftToRight,
        Orientation::PosteriorToAnterior,
        Orientation::InferiorToSuperior,
    ];

    // Act
    let oriented = Affine::for_level(&level, &layout, Some(ras), false);
    let plain = Affine::for_level(&level, &layout, None, false);

    // Assert
    assert_eq!(oriented, plain);
}

#[test]
fn test_lps_orientation_negates_x_and_y() {
    // Arrange
    let (level, layout) = level_zyx([2.0, 1.0, 0.5], [1.0, 2.0, 3.0]);
    let lps = [
        Orientation::RightToLeft,
        Orientation::AnteriorToPosterior,
        Orientation::InferiorToSuperior,
    ];

    // Act
    let affine = Affine::for_level(&level, &layout, Some(lps), false);

    // Assert: x and y columns negated, z untouched
    assert_eq!(affine.col(0)[0], -0.5);
    assert_eq!(affine.col(1)[1], -1.0);
    assert_eq!(affine.col(2)[2], 2.0);
    // Translation sign-flipped on the same axes
    assert_eq!(affine.translation(), [-3.0, -2.0, 1.0]);
}

#[test]
fn test_axis_permutation_lands_on_physical_row() {
    // Arrange: storage y axis encodes S/I, storage z encodes A/P
    let (level, layout) = level_zyx([2.0, 1.0, 0.5], [0.0, 0.0, 0.0]);
    let orient = [
        Orientation::LeftToRight,        // storage x -> physical row 0
        Orientation::InferiorToSuperior, // storage y -> physical row 2
        Orientation::PosteriorToAnterior, // storage z -> physical row 1
    ];

    // Act
    let affine = Affine::for_level(&level, &layout, Some(orient), false);

    // Assert: y column lands in physical row 2
    assert_eq!(affine.col(1)[2], 1.0);
    assert_eq!(affine.col(1)[1], 0.0);
    // z column lands in physical row 1
    assert_eq!(affine.col(2)[1], 2.0);
    assert_eq!(affine.col(2)[2], 0.0);
}

// ============================================================================
// Region Offset Tests
// ============================================================================

#[test]
fn test_region_offset_matches_full_affine() {
    // Arrange: nontrivial orientation
    let (level, layout) = level_zyx([2.0, 1.0, 0.5], [7.0, -3.0, 11.0]);
    let orient = [
        Orientation::RightToLeft,
        Orientation::InferiorToSuperior,
        Orientation::PosteriorToAnterior,
    ];
    let affine = Affine::for_level(&level, &layout, Some(orient), false);
    let region_start = [8u64, 16, 24]; // z,y,x

    // Act
    let offset_affine = affine.with_region_offset(region_start);

    // Assert: voxel [0,0,0] in the offset frame == regionStart in the full
    // frame, exact to machine precision
    let a = offset_affine.voxel_to_world([0.0, 0.0, 0.0]);
    let b = affine.voxel_to_world([24.0, 16.0, 8.0]);
    assert_eq!(a, b);
}

#[test]
fn test_zero_offset_is_identity() {
    let (level, layout) = level_zyx([1.0, 1.0, 1.0], [5.0, 5.0, 5.0]);
    let affine = Affine::for_level(&level, &layout, None, false);
    assert_eq!(affine.with_region_offset([0, 0, 0]), affine);
}

// ============================================================================
// 2D Y-Flip Tests
// ============================================================================

#[test]
fn test_2d_y_flip_negates_and_compensates() {
    // Arrange: 100 rows at 0.5 units
    let (level, layout) = level_2d([100, 200]);

    // Act
    let flipped = Affine::for_level(&level, &layout, None, true);
    let plain = Affine::for_level(&level, &layout, None, false);

    // Assert: y column negated
    assert_eq!(flipped.col(1)[1], -0.5);
    // Row 0 in the flipped frame sits where row 99 sat
    let top = flipped.voxel_to_world([0.0, 0.0, 0.0]);
    let old_last = plain.voxel_to_world([0.0, 99.0, 0.0]);
    assert_eq!(top, old_last);
}

#[test]
fn test_3d_never_y_flips() {
    let (level, layout) = level_zyx([1.0, 1.0, 1.0], [0.0; 3]);
    let flipped = Affine::for_level(&level, &layout, None, true);
    let plain = Affine::for_level(&level, &layout, None, false);
    assert_eq!(flipped, plain);
}

// ============================================================================
// World Bounds Tests
// ============================================================================

#[test]
fn test_world_bounds_from_shape() {
    // Arrange
    let (level, layout) = level_zyx([2.0, 1.0, 0.5], [0.0, 0.0, 0.0]);
    let affine = Affine::for_level(&level, &layout, None, false);

    // Act: shape z,y,x = [64, 128, 256]
    let bounds = affine.world_bounds_from_shape([64, 128, 256]);

    // Assert
    assert_eq!(bounds.min, [0.0, 0.0, 0.0]);
    assert_eq!(bounds.max, [128.0, 128.0, 128.0]);
}

#[test]
fn test_world_bounds_with_negative_column() {
    // Arrange: LPS flips x; bounds must still be min < max
    let (level, layout) = level_zyx([1.0, 1.0, 1.0], [0.0, 0.0, 0.0]);
    let orient = [
        Orientation::RightToLeft,
        Orientation::PosteriorToAnterior,
        Orientation::InferiorToSuperior,
    ];
    let affine = Affine::for_level(&level, &layout, Some(orient), false);

    // Act
    let bounds = affine.world_bounds_from_shape([64, 128, 256]);

    // Assert
    assert_eq!(bounds.min, [-256.0, 0.0, 0.0]);
    assert_eq!(bounds.max, [0.0, 128.0, 64.0]);
}

#[test]
fn test_col_major_flat_layout() {
    let affine = Affine::from_scale_translation([2.0, 3.0, 4.0], [5.0, 6.0, 7.0]);
    let flat = affine.col_major_flat();
    assert_eq!(flat[0], 2.0); // col 0 row 0
    assert_eq!(flat[5], 3.0); // col 1 row 1
    assert_eq!(flat[10], 4.0); // col 2 row 2
    assert_eq!(flat[12], 5.0); // col 3 row 0
    assert_eq!(flat[15], 1.0);
}

#[test]
fn test_rows_view_matches_columns() {
    let affine = Affine::from_scale_translation([2.0, 3.0, 4.0], [5.0, 6.0, 7.0]);
    let rows = affine.rows();
    assert_eq!(rows[0], [2.0, 0.0, 0.0, 5.0]);
    assert_eq!(rows[1], [0.0, 3.0, 0.0, 6.0]);
    assert_eq!(rows[2], [0.0, 0.0, 4.0, 7.0]);
    assert_eq!(rows[3], [0.0, 0.0, 0.0, 1.0]);
}
