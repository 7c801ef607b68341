// Normalization tests

use super::*;

fn window(start: f64, end: f64) -> OmeroWindow {
    OmeroWindow { start, end }
}

// ============================================================================
// Scalar Mapping Tests
// ============================================================================

#[test]
fn test_normalize_value_linear_ramp() {
    let w = window(0.0, 100.0);
    assert_eq!(normalize_value(0.0, &w), 0);
    assert_eq!(normalize_value(50.0, &w), 128); // 0.5 * 255 rounds up
    assert_eq!(normalize_value(100.0, &w), 255);
}

#[test]
fn test_normalize_value_clamps() {
    let w = window(10.0, 20.0);
    assert_eq!(normalize_value(-5.0, &w), 0);
    assert_eq!(normalize_value(1000.0, &w), 255);
}

#[test]
fn test_normalize_value_degenerate_window_is_zero() {
    assert_eq!(normalize_value(42.0, &window(10.0, 10.0)), 0);
    assert_eq!(normalize_value(42.0, &window(20.0, 10.0)), 0);
}

#[test]
fn test_normalize_value_rounds() {
    // 1/255 of the way -> exactly 1.0 after scaling
    let w = window(0.0, 255.0);
    assert_eq!(normalize_value(1.0, &w), 1);
    assert_eq!(normalize_value(0.4, &w), 0);
    assert_eq!(normalize_value(0.6, &w), 1);
}

// ============================================================================
// Region Normalization Tests
// ============================================================================

#[test]
fn test_normalize_into_uint16_rgb() {
    // Arrange: 2 voxels, 3 channels of u16
    let values: [u16; 6] = [0, 500, 1000, 1000, 250, 0];
    let mut src = Vec::new();
    for v in values {
        src.extend_from_slice(&v.to_ne_bytes());
    }
    let windows = vec![window(0.0, 1000.0); 3];
    let mut out = vec![0u8; 6];

    // Act
    normalize_into(&src, ElementType::UInt16, 3, &windows, &mut out).unwrap();

    // Assert
    assert_eq!(out, vec![0, 128, 255, 255, 64, 0]);
}

#[test]
fn test_normalize_into_window_count_mismatch() {
    let src = [0u8; 6];
    let mut out = [0u8; 6];
    let windows = vec![window(0.0, 1.0); 2];
    let result = normalize_into(&src, ElementType::UInt8, 3, &windows, &mut out);
    assert!(result.is_err());
}

#[test]
fn test_normalize_into_output_size_mismatch() {
    let src = [0u8; 6];
    let mut out = [0u8; 5];
    let windows = vec![window(0.0, 1.0); 3];
    let result = normalize_into(&src, ElementType::UInt8, 3, &windows, &mut out);
    assert!(result.is_err());
}

#[test]
fn test_copy_uint8_straight_through() {
    let src = [1u8, 2, 3, 4];
    let mut out = [0u8; 4];
    copy_uint8(&src, &mut out).unwrap();
    assert_eq!(out, src);
}

#[test]
fn test_copy_uint8_size_mismatch() {
    let src = [1u8, 2, 3];
    let mut out = [0u8; 4];
    assert!(copy_uint8(&src, &mut out).is_err());
}

// ============================================================================
// Min/Max Fallback Tests
// ============================================================================

#[test]
fn test_channel_min_max_interleaved() {
    // Arrange: 3 voxels x 2 channels of u16
    let values: [u16; 6] = [10, 1000, 5, 2000, 7, 1500];
    let mut src = Vec::new();
    for v in values {
        src.extend_from_slice(&v.to_ne_bytes());
    }

    // Act
    let windows = compute_channel_min_max(&src, ElementType::UInt16, 2).unwrap();

    // Assert
    assert_eq!(windows.len(), 2);
    assert_eq!(windows[0].start, 5.0);
    assert_eq!(windows[0].end, 10.0);
    assert_eq!(windows[1].start, 1000.0);
    assert_eq!(windows[1].end, 2000.0);
}

#[test]
fn test_channel_min_max_skips_non_finite() {
    // Arrange: one NaN sample in a float channel
    let values: [f32; 4] = [1.0, f32::NAN, 3.0, 2.0];
    let mut src = Vec::new();
    for v in values {
        src.extend_from_slice(&v.to_ne_bytes());
    }

    // Act
    let windows = compute_channel_min_max(&src, ElementType::Float32, 2).unwrap();

    // Assert: NaN ignored, channel 1 still gets the finite sample
    assert_eq!(windows[0].start, 1.0);
    assert_eq!(windows[0].end, 3.0);
    assert_eq!(windows[1].start, 2.0);
    assert_eq!(windows[1].end, 2.0);
}

#[test]
fn test_channel_min_max_empty_input() {
    let windows = compute_channel_min_max(&[], ElementType::UInt8, 3).unwrap();
    assert_eq!(windows.len(), 3);
    for w in windows {
        assert_eq!(w.start, 0.0);
        assert_eq!(w.end, 0.0);
    }
}

#[test]
fn test_round_trip_min_max_then_normalize() {
    // Arrange: derive windows then normalize with them; extremes map to 0/255
    let values: [u16; 4] = [100, 900, 500, 900];
    let mut src = Vec::new();
    for v in values {
        src.extend_from_slice(&v.to_ne_bytes());
    }
    let windows = compute_channel_min_max(&src, ElementType::UInt16, 1).unwrap();
    let mut out = vec![0u8; 4];

    // Act
    normalize_into(&src, ElementType::UInt16, 1, &windows, &mut out).unwrap();

    // Assert
    assert_eq!(out[0], 0);
    assert_eq!(out[1], 255);
    assert_eq!(out[3], 255);
}
