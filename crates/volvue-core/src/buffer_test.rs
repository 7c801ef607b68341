// Volume buffer tests

use super::*;
use crate::ElementType;

// ============================================================================
// Resize Tests
// ============================================================================

#[test]
fn test_initial_buffer_is_empty() {
    let buffer = VolumeBuffer::new(BufferContent::Scalar(ElementType::UInt16));
    assert_eq!(buffer.live_elements(), 0);
    assert_eq!(buffer.capacity_elements(), 0);
    assert_eq!(buffer.dims(), [0, 0, 0]);
}

#[test]
fn test_resize_allocates_exact_size() {
    // Arrange
    let mut buffer = VolumeBuffer::new(BufferContent::Scalar(ElementType::UInt16));

    // Act
    buffer.resize([4, 8, 16]).unwrap();

    // Assert: live view is exactly prod(dims) * components
    assert_eq!(buffer.live_elements(), 4 * 8 * 16);
    assert_eq!(buffer.capacity_elements(), 4 * 8 * 16);
    assert_eq!(buffer.as_bytes().len(), 4 * 8 * 16 * 2);
}

#[test]
fn test_resize_components_multiply() {
    let mut buffer = VolumeBuffer::new(BufferContent::Rgb);
    buffer.resize([2, 4, 4]).unwrap();
    assert_eq!(buffer.live_elements(), 2 * 4 * 4 * 3);
    // RGB output is uint8, one byte per element
    assert_eq!(buffer.as_bytes().len(), 2 * 4 * 4 * 3);
}

#[test]
fn test_shrink_within_floor_reuses_allocation() {
    // Arrange: 4096 elements allocated
    let mut buffer = VolumeBuffer::new(BufferContent::Scalar(ElementType::UInt8));
    buffer.resize([16, 16, 16]).unwrap();
    let capacity = buffer.capacity_elements();

    // Act: shrink to half (>= 25% of capacity)
    buffer.resize([8, 16, 16]).unwrap();

    // Assert: capacity unchanged, live view shrunk
    assert_eq!(buffer.capacity_elements(), capacity);
    assert_eq!(buffer.live_elements(), 8 * 16 * 16);
}

#[test]
fn test_shrink_below_floor_reallocates() {
    // Arrange
    let mut buffer = VolumeBuffer::new(BufferContent::Scalar(ElementType::UInt8));
    buffer.resize([16, 16, 16]).unwrap();

    // Act: shrink to under a quarter of capacity
    buffer.resize([2, 8, 8]).unwrap();

    // Assert: allocation followed the live view down
    assert_eq!(buffer.capacity_elements(), 2 * 8 * 8);
}

#[test]
fn test_grow_reallocates() {
    let mut buffer = VolumeBuffer::new(BufferContent::Scalar(ElementType::Float32));
    buffer.resize([4, 4, 4]).unwrap();
    buffer.resize([8, 8, 8]).unwrap();
    assert_eq!(buffer.live_elements(), 512);
    assert_eq!(buffer.capacity_elements(), 512);
}

#[test]
fn test_resize_quarter_boundary_reuses() {
    // Exactly 25% of capacity must reuse
    let mut buffer = VolumeBuffer::new(BufferContent::Scalar(ElementType::UInt8));
    buffer.resize([4, 16, 16]).unwrap(); // 1024
    buffer.resize([1, 16, 16]).unwrap(); // 256 = exactly 25%
    assert_eq!(buffer.capacity_elements(), 1024);
}

// ============================================================================
// Clear / Snapshot Tests
// ============================================================================

#[test]
fn test_clear_zeroes_live_view_only() {
    // Arrange: fill, then shrink, then clear
    let mut buffer = VolumeBuffer::new(BufferContent::Scalar(ElementType::UInt8));
    buffer.resize([2, 2, 2]).unwrap();
    buffer.as_bytes_mut().fill(0xAB);
    buffer.resize([1, 2, 2]).unwrap();

    // Act
    buffer.clear();

    // Assert: live view zeroed
    assert!(buffer.as_bytes().iter().all(|&b| b == 0));
    assert_eq!(buffer.as_bytes().len(), 4);
}

#[test]
fn test_snapshot_restore_round_trip() {
    // Arrange
    let mut buffer = VolumeBuffer::new(BufferContent::Scalar(ElementType::UInt16));
    buffer.resize([2, 3, 4]).unwrap();
    for (i, b) in buffer.as_bytes_mut().iter_mut().enumerate() {
        *b = (i % 251) as u8;
    }
    let snapshot = buffer.snapshot();

    // Act: disturb, then restore
    buffer.resize([1, 1, 1]).unwrap();
    buffer.restore([2, 3, 4], &snapshot).unwrap();

    // Assert
    assert_eq!(buffer.as_bytes(), &snapshot[..]);
    assert_eq!(buffer.dims(), [2, 3, 4]);
}

#[test]
fn test_restore_size_mismatch_rejected() {
    let mut buffer = VolumeBuffer::new(BufferContent::Scalar(ElementType::UInt8));
    let result = buffer.restore([2, 2, 2], &[0u8; 3]);
    assert!(result.is_err());
}
