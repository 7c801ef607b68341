//! In-memory reference store
//!
//! Serves synthetic pyramids without touching the network, with latency
//! and failure injection for exercising cancellation, supersession and
//! coalescing behavior. Chunk values come from a deterministic fill so
//! tests can predict exact bytes.

use crate::ChunkStore;
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use thiserror::Error;
use volvue_core::{
    Axis, CachedChunk, CancelToken, ElementType, ImageLevel, Multiscales, Result, VolvueError,
};

/// Failures the memory store can produce; wrapped as the `StoreFailure`
/// cause so callers see them through the error chain
#[derive(Debug, Error)]
pub enum MemoryStoreError {
    #[error("injected failure")]
    Injected,

    #[error("unknown array")]
    UnknownArray,

    #[error("time {0} out of range")]
    TimeOutOfRange(u64),

    #[error("chunk {0:?} out of range")]
    ChunkOutOfRange([u64; 3]),
}

/// Description of one array served by the memory store
#[derive(Debug, Clone)]
struct MemoryArray {
    shape_zyx: [u64; 3],
    chunk_zyx: [u64; 3],
    dtype: ElementType,
    components: usize,
}

/// Deterministic voxel fill: varies with every coordinate so copy offsets
/// and time indices are distinguishable in assertions
fn fill_value(time: u64, z: u64, y: u64, x: u64, c: u64) -> f64 {
    ((z * 3 + y * 5 + x * 7 + time * 11 + c * 13) % 251) as f64
}

fn write_element(dtype: ElementType, buf: &mut Vec<u8>, v: f64) {
    match dtype {
        ElementType::Int8 => buf.push(v as i8 as u8),
        ElementType::UInt8 => buf.push(v as u8),
        ElementType::Int16 => buf.extend_from_slice(&(v as i16).to_ne_bytes()),
        ElementType::UInt16 => buf.extend_from_slice(&(v as u16).to_ne_bytes()),
        ElementType::Int32 => buf.extend_from_slice(&(v as i32).to_ne_bytes()),
        ElementType::UInt32 => buf.extend_from_slice(&(v as u32).to_ne_bytes()),
        ElementType::Int64 => buf.extend_from_slice(&(v as i64).to_ne_bytes()),
        ElementType::UInt64 => buf.extend_from_slice(&(v as u64).to_ne_bytes()),
        ElementType::Float32 => buf.extend_from_slice(&(v as f32).to_ne_bytes()),
        ElementType::Float64 => buf.extend_from_slice(&v.to_ne_bytes()),
    }
}

/// In-memory chunk store over a synthetic pyramid
pub struct MemoryStore {
    arrays: HashMap<String, MemoryArray>,
    time_size: u64,
    /// Injected latency per read
    latency: RwLock<Duration>,
    /// Reads left to fail before recovering
    fail_remaining: AtomicUsize,
    /// Total successful chunk reads (coalescing assertions)
    reads: AtomicU64,
}

impl MemoryStore {
    /// Build a store serving arrays "0", "1", ... with the given spatial
    /// shapes, one shared chunk shape and an optional time dimension
    pub fn pyramid(
        shapes_zyx: &[[u64; 3]],
        chunk_zyx: [u64; 3],
        dtype: ElementType,
        components: usize,
        time_size: u64,
    ) -> Self {
        let arrays = shapes_zyx
            .iter()
            .enumerate()
            .map(|(i, &shape)| {
                (
                    i.to_string(),
                    MemoryArray {
                        shape_zyx: shape,
                        chunk_zyx,
                        dtype,
                        components,
                    },
                )
            })
            .collect();
        Self {
            arrays,
            time_size: time_size.max(1),
            latency: RwLock::new(Duration::ZERO),
            fail_remaining: AtomicUsize::new(0),
            reads: AtomicU64::new(0),
        }
    }

    /// Multiscale metadata matching the served arrays: z,y,x space axes
    /// (plus t and c when present), unit scale at level 0 doubling per
    /// level, zero translation
    pub fn multiscales(&self, is_label: bool) -> Result<Multiscales> {
        let mut axes = Vec::new();
        let has_time = self.time_size > 1;
        let components = self
            .arrays
            .get("0")
            .map(|a| a.components)
            .unwrap_or(1);
        if has_time {
            axes.push(Axis::time("t"));
        }
        if components > 1 {
            axes.push(Axis::channel("c"));
        }
        axes.push(Axis::space("z"));
        axes.push(Axis::space("y"));
        axes.push(Axis::space("x"));

        let mut levels = Vec::new();
        for i in 0..self.arrays.len() {
            let path = i.to_string();
            let array = &self.arrays[&path];
            let f = (1u64 << i) as f64;
            let mut shape = Vec::new();
            let mut chunks = Vec::new();
            let mut scale = Vec::new();
            let mut translation = Vec::new();
            if has_time {
                shape.push(self.time_size);
                chunks.push(1);
                scale.push(1.0);
                translation.push(0.0);
            }
            if components > 1 {
                shape.push(components as u64);
                chunks.push(components as u64);
                scale.push(1.0);
                translation.push(0.0);
            }
            for a in 0..3 {
                shape.push(array.shape_zyx[a]);
                chunks.push(array.chunk_zyx[a]);
                scale.push(f);
                translation.push(0.0);
            }
            levels.push(ImageLevel {
                path,
                shape,
                chunk_shape: chunks,
                dtype: array.dtype,
                scale,
                translation,
            });
        }
        Multiscales::new(Some("memory".to_string()), axes, levels, None, is_label)
    }

    /// Inject per-read latency (cancellation and supersession tests)
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.write() = latency;
    }

    /// Fail the next `count` reads with a store error
    pub fn fail_next(&self, count: usize) {
        self.fail_remaining.store(count, Ordering::SeqCst);
    }

    /// Successful chunk reads so far
    pub fn read_count(&self) -> u64 {
        self.reads.load(Ordering::SeqCst)
    }

    /// Expected element value at one coordinate (test oracles)
    pub fn expected_value(time: u64, z: u64, y: u64, x: u64, c: u64) -> f64 {
        fill_value(time, z, y, x, c)
    }
}

#[async_trait]
impl ChunkStore for MemoryStore {
    async fn read_chunk(
        &self,
        array: &str,
        chunk_coord: [u64; 3],
        time: u64,
        cancel: &CancelToken,
    ) -> Result<CachedChunk> {
        cancel.check()?;
        let latency = *self.latency.read();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
            cancel.check()?;
        }
        if self
            .fail_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(VolvueError::store(array, MemoryStoreError::Injected));
        }

        let meta = self
            .arrays
            .get(array)
            .ok_or_else(|| VolvueError::store(array, MemoryStoreError::UnknownArray))?;
        if time >= self.time_size {
            return Err(VolvueError::store(
                array,
                MemoryStoreError::TimeOutOfRange(time),
            ));
        }

        let mut start = [0u64; 3];
        let mut shape = [0u64; 3];
        for a in 0..3 {
            start[a] = chunk_coord[a] * meta.chunk_zyx[a];
            if start[a] >= meta.shape_zyx[a] {
                return Err(VolvueError::store(
                    array,
                    MemoryStoreError::ChunkOutOfRange(chunk_coord),
                ));
            }
            shape[a] = meta.chunk_zyx[a].min(meta.shape_zyx[a] - start[a]);
        }

        let elements = (shape[0] * shape[1] * shape[2]) as usize * meta.components;
        let mut data = Vec::with_capacity(elements * meta.dtype.size_of());
        for z in 0..shape[0] {
            for y in 0..shape[1] {
                for x in 0..shape[2] {
                    for c in 0..meta.components as u64 {
                        let v =
                            fill_value(time, start[0] + z, start[1] + y, start[2] + x, c);
                        write_element(meta.dtype, &mut data, v);
                    }
                }
            }
        }

        self.reads.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(array, ?chunk_coord, time, "memory store chunk read");
        Ok(CachedChunk {
            data: Bytes::from(data),
            shape,
            dtype: meta.dtype,
        })
    }
}
