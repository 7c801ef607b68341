//! Region coalescer
//!
//! Deduplicates concurrent region fetches: the first caller for a
//! `(level, region, time)` key drives the chunk loop, later callers join
//! its broadcast and share the result (or the failure). Chunks come from
//! the shared LRU when present, otherwise from the store, and are cached
//! on the way through. Cancellation is checked between chunks.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, Notify};
use volvue_core::{
    CachedChunk, CancelToken, ChunkAlignedRegion, ChunkCache, ChunkKey, ElementType, Multiscales,
    Result, VolvueError,
};
use volvue_store::ChunkStore;

/// Dedup key: the content of a fetch request minus the requester
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FetchKey {
    pub level: usize,
    pub region: ChunkAlignedRegion,
    pub time: u64,
}

/// One fetched region: the aligned bounds filled with decoded elements
#[derive(Debug)]
pub struct FetchedRegion {
    pub level: usize,
    pub time: u64,
    pub aligned: ChunkAlignedRegion,
    /// Aligned dims `[z, y, x]`
    pub dims: [u64; 3],
    pub dtype: ElementType,
    pub components: usize,
    /// `prod(dims) * components` elements, component-interleaved
    pub data: Vec<u8>,
}

type SharedResult = std::result::Result<Arc<FetchedRegion>, Arc<VolvueError>>;

pub struct RegionCoalescer {
    store: Arc<dyn ChunkStore>,
    cache: Arc<ChunkCache>,
    inflight: Mutex<HashMap<FetchKey, broadcast::Sender<SharedResult>>>,
    idle: Notify,
}

impl RegionCoalescer {
    pub fn new(store: Arc<dyn ChunkStore>, cache: Arc<ChunkCache>) -> Self {
        Self {
            store,
            cache,
            inflight: Mutex::new(HashMap::new()),
            idle: Notify::new(),
        }
    }

    pub fn cache(&self) -> &Arc<ChunkCache> {
        &self.cache
    }

    pub fn in_flight_count(&self) -> usize {
        self.inflight.lock().len()
    }

    /// Fetch the aligned region, sharing any identical in-flight request.
    ///
    /// The requester id only appears in logs; deduplication is purely by
    /// key content.
    pub async fn fetch_region(
        &self,
        ms: &Multiscales,
        level: usize,
        aligned: ChunkAlignedRegion,
        time: u64,
        requester: &str,
        cancel: &CancelToken,
    ) -> Result<Arc<FetchedRegion>> {
        let key = FetchKey {
            level,
            region: aligned,
            time,
        };

        let joined = {
            let mut map = self.inflight.lock();
            match map.get(&key) {
                Some(tx) => Some(tx.subscribe()),
                None => {
                    let (tx, _) = broadcast::channel(1);
                    map.insert(key, tx);
                    None
                }
            }
        };

        if let Some(mut rx) = joined {
            tracing::debug!(requester, level, time, "joined in-flight region fetch");
            return match rx.recv().await {
                Ok(Ok(region)) => Ok(region),
                Ok(Err(err)) => Err(err.duplicate()),
                Err(_) => Err(VolvueError::InternalInvariant(
                    "in-flight fetch dropped without a result".to_string(),
                )),
            };
        }

        tracing::debug!(requester, level, time, "starting region fetch");
        let result = self.fetch_inner(ms, level, aligned, time, cancel).await;

        let tx = {
            let mut map = self.inflight.lock();
            let tx = map.remove(&key);
            if map.is_empty() {
                self.idle.notify_waiters();
            }
            tx
        };
        match result {
            Ok(region) => {
                if let Some(tx) = tx {
                    let _ = tx.send(Ok(Arc::clone(&region)));
                }
                Ok(region)
            }
            Err(err) => {
                let shared = Arc::new(err);
                if let Some(tx) = tx {
                    let _ = tx.send(Err(Arc::clone(&shared)));
                }
                Err(shared.duplicate())
            }
        }
    }

    async fn fetch_inner(
        &self,
        ms: &Multiscales,
        level: usize,
        aligned: ChunkAlignedRegion,
        time: u64,
        cancel: &CancelToken,
    ) -> Result<Arc<FetchedRegion>> {
        let meta = ms.level(level)?;
        let chunk_shape = meta.chunk_zyx(ms.layout());
        let components = ms.components();
        let dtype = meta.dtype;
        let elem = dtype.size_of();
        let dims = aligned.aligned_dims();
        let total = (dims[0] * dims[1] * dims[2]) as usize * components * elem;
        let mut data = vec![0u8; total];
        let array: Arc<str> = Arc::from(meta.path.as_str());

        for coord in aligned.covered_chunks(chunk_shape) {
            cancel.check()?;
            let key = ChunkKey {
                array: Arc::clone(&array),
                coord,
                time,
            };
            let chunk = match self.cache.get(&key) {
                Some(chunk) => chunk,
                None => {
                    let chunk = self
                        .store
                        .read_chunk(&meta.path, coord, time, cancel)
                        .await?;
                    self.cache.put(key, chunk.clone());
                    chunk
                }
            };
            copy_chunk_into(
                &chunk,
                coord,
                chunk_shape,
                &aligned,
                components,
                elem,
                &mut data,
            )?;
        }
        cancel.check()?;

        Ok(Arc::new(FetchedRegion {
            level,
            time,
            aligned,
            dims,
            dtype,
            components,
            data,
        }))
    }

    /// Completes once no fetch is in flight
    pub async fn on_idle(&self) {
        loop {
            let notified = self.idle.notified();
            if self.inflight.lock().is_empty() {
                return;
            }
            notified.await;
        }
    }
}

/// Copy one decoded chunk into its slice of the aligned output region.
///
/// Chunks enumerated from an aligned region always lie fully inside the
/// aligned bounds (edge chunks carry their clamped shape), so this is a
/// straight row-by-row copy.
fn copy_chunk_into(
    chunk: &CachedChunk,
    coord: [u64; 3],
    chunk_shape: [u64; 3],
    aligned: &ChunkAlignedRegion,
    components: usize,
    elem: usize,
    out: &mut [u8],
) -> Result<()> {
    let dims = aligned.aligned_dims();
    let shape = chunk.shape;
    let expected = (shape[0] * shape[1] * shape[2]) as usize * components * elem;
    if chunk.data.len() != expected {
        return Err(VolvueError::InternalInvariant(format!(
            "chunk {coord:?} payload {} bytes, expected {expected}",
            chunk.data.len()
        )));
    }
    if chunk.dtype.size_of() != elem {
        return Err(VolvueError::InternalInvariant(format!(
            "chunk {coord:?} decoded as {}, level declares a {elem}-byte type",
            chunk.dtype
        )));
    }

    let voxel_bytes = components * elem;
    let mut offset = [0u64; 3];
    for a in 0..3 {
        let start = coord[a] * chunk_shape[a];
        if start < aligned.aligned_start[a] || start + shape[a] > aligned.aligned_end[a] {
            return Err(VolvueError::InternalInvariant(format!(
                "chunk {coord:?} outside aligned region"
            )));
        }
        offset[a] = start - aligned.aligned_start[a];
    }

    let row_bytes = shape[2] as usize * voxel_bytes;
    for z in 0..shape[0] {
        for y in 0..shape[1] {
            let src_off = ((z * shape[1] + y) * shape[2]) as usize * voxel_bytes;
            let dst_voxel = ((offset[0] + z) * dims[1] + (offset[1] + y)) * dims[2] + offset[2];
            let dst_off = dst_voxel as usize * voxel_bytes;
            out[dst_off..dst_off + row_bytes]
                .copy_from_slice(&chunk.data[src_off..src_off + row_bytes]);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use volvue_core::{align_to_chunks, PixelRegion};
    use volvue_store::MemoryStore;

    fn setup(shapes: &[[u64; 3]], chunk: [u64; 3]) -> (Arc<MemoryStore>, Multiscales, RegionCoalescer) {
        let store = Arc::new(MemoryStore::pyramid(
            shapes,
            chunk,
            ElementType::UInt16,
            1,
            4,
        ));
        let ms = store.multiscales(false).unwrap();
        let cache = Arc::new(ChunkCache::new(64));
        let coalescer = RegionCoalescer::new(store.clone() as Arc<dyn ChunkStore>, cache);
        (store, ms, coalescer)
    }

    fn full_region(ms: &Multiscales, level: usize) -> ChunkAlignedRegion {
        let l = ms.level(level).unwrap();
        let shape = l.shape_zyx(ms.layout());
        align_to_chunks(&PixelRegion::full(shape), l.chunk_zyx(ms.layout()), shape)
    }

    #[tokio::test]
    async fn test_fetch_fills_expected_values() {
        // Arrange
        let (_, ms, coalescer) = setup(&[[8, 8, 8]], [4, 4, 4]);
        let aligned = full_region(&ms, 0);

        // Act
        let fetched = coalescer
            .fetch_region(&ms, 0, aligned, 2, "test", &CancelToken::new())
            .await
            .unwrap();

        // Assert: spot-check voxels against the store's fill
        assert_eq!(fetched.dims, [8, 8, 8]);
        for (z, y, x) in [(0u64, 0u64, 0u64), (3, 5, 7), (7, 7, 7)] {
            let idx = ((z * 8 + y) * 8 + x) as usize;
            let v = ElementType::UInt16.read_as_f64(&fetched.data, idx);
            assert_eq!(v, MemoryStore::expected_value(2, z, y, x, 0));
        }
    }

    #[tokio::test]
    async fn test_partial_region_offsets() {
        // Arrange: one interior chunk
        let (_, ms, coalescer) = setup(&[[8, 8, 8]], [4, 4, 4]);
        let l = ms.level(0).unwrap();
        let shape = l.shape_zyx(ms.layout());
        let region = PixelRegion::new([4, 4, 4], [8, 8, 8]);
        let aligned = align_to_chunks(&region, l.chunk_zyx(ms.layout()), shape);

        // Act
        let fetched = coalescer
            .fetch_region(&ms, 0, aligned, 0, "test", &CancelToken::new())
            .await
            .unwrap();

        // Assert: element [0,0,0] of the region is voxel [4,4,4]
        assert_eq!(fetched.dims, [4, 4, 4]);
        let v = ElementType::UInt16.read_as_f64(&fetched.data, 0);
        assert_eq!(v, MemoryStore::expected_value(0, 4, 4, 4, 0));
    }

    #[tokio::test]
    async fn test_concurrent_fetches_share_one_run() {
        // Arrange: slow store so both callers overlap
        let (store, ms, coalescer) = setup(&[[8, 8, 8]], [8, 8, 8]);
        store.set_latency(Duration::from_millis(20));
        let aligned = full_region(&ms, 0);
        let coalescer = Arc::new(coalescer);

        // Act: two identical fetches racing
        let a = {
            let (coalescer, ms) = (coalescer.clone(), ms.clone());
            tokio::spawn(async move {
                coalescer
                    .fetch_region(&ms, 0, aligned, 0, "a", &CancelToken::new())
                    .await
            })
        };
        let b = coalescer
            .fetch_region(&ms, 0, aligned, 0, "b", &CancelToken::new())
            .await
            .unwrap();
        let a = a.await.unwrap().unwrap();

        // Assert: one underlying chunk read, same payload
        assert_eq!(store.read_count(), 1);
        assert_eq!(a.data, b.data);
    }

    #[tokio::test]
    async fn test_error_propagates_to_joiners() {
        // Arrange
        let (store, ms, coalescer) = setup(&[[8, 8, 8]], [8, 8, 8]);
        store.set_latency(Duration::from_millis(20));
        store.fail_next(1);
        let aligned = full_region(&ms, 0);
        let coalescer = Arc::new(coalescer);

        // Act
        let a = {
            let (coalescer, ms) = (coalescer.clone(), ms.clone());
            tokio::spawn(async move {
                coalescer
                    .fetch_region(&ms, 0, aligned, 0, "a", &CancelToken::new())
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;
        let b = coalescer
            .fetch_region(&ms, 0, aligned, 0, "b", &CancelToken::new())
            .await;
        let a = a.await.unwrap();

        // Assert: both see the failure
        assert!(a.is_err());
        assert!(b.is_err());
    }

    #[tokio::test]
    async fn test_cache_reused_across_fetches() {
        // Arrange
        let (store, ms, coalescer) = setup(&[[8, 8, 8]], [4, 4, 4]);
        let aligned = full_region(&ms, 0);

        // Act: same region twice, sequentially
        coalescer
            .fetch_region(&ms, 0, aligned, 0, "first", &CancelToken::new())
            .await
            .unwrap();
        let reads_after_first = store.read_count();
        coalescer
            .fetch_region(&ms, 0, aligned, 0, "second", &CancelToken::new())
            .await
            .unwrap();

        // Assert: second pass served from the chunk cache
        assert_eq!(store.read_count(), reads_after_first);
    }

    #[tokio::test]
    async fn test_cancelled_fetch_bails() {
        let (store, ms, coalescer) = setup(&[[8, 8, 8]], [4, 4, 4]);
        store.set_latency(Duration::from_millis(10));
        let aligned = full_region(&ms, 0);
        let token = CancelToken::new();
        token.cancel();
        let result = coalescer
            .fetch_region(&ms, 0, aligned, 0, "test", &token)
            .await;
        assert!(matches!(result, Err(VolvueError::Cancelled)));
    }

    #[tokio::test]
    async fn test_on_idle_completes_after_fetches() {
        let (_, ms, coalescer) = setup(&[[8, 8, 8]], [4, 4, 4]);
        let aligned = full_region(&ms, 0);
        coalescer
            .fetch_region(&ms, 0, aligned, 0, "test", &CancelToken::new())
            .await
            .unwrap();
        // Must not hang
        coalescer.on_idle().await;
        assert_eq!(coalescer.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn test_multi_component_row_copy() {
        // Arrange: RGB uint8 source
        let store = Arc::new(MemoryStore::pyramid(
            &[[4, 4, 4]],
            [2, 2, 2],
            ElementType::UInt8,
            3,
            1,
        ));
        let ms = store.multiscales(false).unwrap();
        let cache = Arc::new(ChunkCache::new(16));
        let coalescer = RegionCoalescer::new(store as Arc<dyn ChunkStore>, cache);
        let aligned = full_region(&ms, 0);

        // Act
        let fetched = coalescer
            .fetch_region(&ms, 0, aligned, 0, "test", &CancelToken::new())
            .await
            .unwrap();

        // Assert: 3 components per voxel, spot-check an interior voxel
        assert_eq!(fetched.data.len(), 4 * 4 * 4 * 3);
        let idx = (((2 * 4 + 3) * 4 + 1) * 3 + 2) as usize;
        assert_eq!(
            fetched.data[idx] as f64,
            MemoryStore::expected_value(0, 2, 3, 1, 2)
        );
    }
}
