// Chunk cache tests

use super::*;

// ============================================================================
// Fixtures
// ============================================================================

fn key(array: &str, coord: [u64; 3], time: u64) -> ChunkKey {
    ChunkKey {
        array: Arc::from(array),
        coord,
        time,
    }
}

fn chunk(fill: u8, shape: [u64; 3]) -> CachedChunk {
    let len = (shape[0] * shape[1] * shape[2]) as usize;
    CachedChunk {
        data: Bytes::from(vec![fill; len]),
        shape,
        dtype: ElementType::UInt8,
    }
}

// ============================================================================
// Basic Operations
// ============================================================================

#[test]
fn test_miss_then_hit() {
    // Arrange
    let cache = ChunkCache::new(4);
    let k = key("0", [0, 0, 0], 0);

    // Act & Assert
    assert!(cache.get(&k).is_none());
    cache.put(k.clone(), chunk(7, [2, 2, 2]));
    let hit = cache.get(&k).unwrap();
    assert_eq!(hit.shape, [2, 2, 2]);
    assert_eq!(hit.data[0], 7);
}

#[test]
fn test_keys_distinguish_time() {
    let cache = ChunkCache::new(4);
    cache.put(key("0", [0, 0, 0], 0), chunk(1, [1, 1, 1]));
    assert!(cache.get(&key("0", [0, 0, 0], 1)).is_none());
    assert!(cache.get(&key("0", [0, 0, 0], 0)).is_some());
}

#[test]
fn test_keys_distinguish_array() {
    let cache = ChunkCache::new(4);
    cache.put(key("0", [1, 2, 3], 0), chunk(1, [1, 1, 1]));
    assert!(cache.get(&key("1", [1, 2, 3], 0)).is_none());
}

// ============================================================================
// Eviction Tests
// ============================================================================

#[test]
fn test_eviction_on_insert_over_capacity() {
    // Arrange: capacity 2
    let cache = ChunkCache::new(2);
    cache.put(key("0", [0, 0, 0], 0), chunk(0, [1, 1, 1]));
    cache.put(key("0", [0, 0, 1], 0), chunk(1, [1, 1, 1]));

    // Act: third insert evicts the least recently used
    cache.put(key("0", [0, 0, 2], 0), chunk(2, [1, 1, 1]));

    // Assert
    assert_eq!(cache.len(), 2);
    assert!(cache.get(&key("0", [0, 0, 0], 0)).is_none());
    assert!(cache.get(&key("0", [0, 0, 2], 0)).is_some());
}

#[test]
fn test_get_refreshes_recency() {
    // Arrange
    let cache = ChunkCache::new(2);
    let a = key("0", [0, 0, 0], 0);
    let b = key("0", [0, 0, 1], 0);
    cache.put(a.clone(), chunk(0, [1, 1, 1]));
    cache.put(b.clone(), chunk(1, [1, 1, 1]));

    // Act: touch a, then insert c
    cache.get(&a);
    cache.put(key("0", [0, 0, 2], 0), chunk(2, [1, 1, 1]));

    // Assert: b was evicted, a survived
    assert!(cache.get(&a).is_some());
    assert!(cache.get(&b).is_none());
}

#[test]
fn test_capacity_bound_holds() {
    let cache = ChunkCache::new(8);
    for i in 0..100u64 {
        cache.put(key("0", [0, 0, i], 0), chunk(0, [1, 1, 1]));
        assert!(cache.len() <= 8);
    }
}

#[test]
fn test_zero_capacity_clamps_to_one() {
    let cache = ChunkCache::new(0);
    assert_eq!(cache.capacity(), 1);
}

// ============================================================================
// Stats Tests
// ============================================================================

#[test]
fn test_stats_counts_hits_and_misses() {
    // Arrange
    let cache = ChunkCache::new(4);
    let k = key("0", [0, 0, 0], 0);

    // Act
    cache.get(&k); // miss
    cache.put(k.clone(), chunk(0, [1, 1, 1]));
    cache.get(&k); // hit
    cache.get(&k); // hit

    // Assert
    let stats = cache.stats();
    assert_eq!(stats.hits, 2);
    assert_eq!(stats.misses, 1);
    assert!((stats.hit_rate() - 2.0 / 3.0).abs() < 1e-12);
}

#[test]
fn test_hit_rate_empty_is_zero() {
    let cache = ChunkCache::new(4);
    assert_eq!(cache.stats().hit_rate(), 0.0);
}

#[test]
fn test_clear() {
    let cache = ChunkCache::new(4);
    cache.put(key("0", [0, 0, 0], 0), chunk(0, [1, 1, 1]));
    cache.clear();
    assert!(cache.is_empty());
}
