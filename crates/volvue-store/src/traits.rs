//! Chunk store contract
//!
//! The engine consumes exactly one operation: read and decode a chunk.
//! Transport, compression codecs and authentication all live behind the
//! implementation; arrays are opaque identities (the dataset paths the
//! multiscale metadata declares).

use async_trait::async_trait;
use volvue_core::{CachedChunk, CancelToken, Result};

/// Read access to a chunked, decoded tensor store.
///
/// Contract:
/// - `chunk_coord` is the spatial chunk coordinate `[z, y, x]`, counted in
///   chunks; 2D arrays use z = 0
/// - the returned chunk carries its clamped spatial shape (edge chunks are
///   smaller than the nominal chunk shape) and its decoded element type
/// - chunk payloads are native-endian elements, component-interleaved per
///   voxel in z,y,x order
/// - implementations should observe `cancel` inside long transfers and
///   return `Cancelled`
#[async_trait]
pub trait ChunkStore: Send + Sync {
    async fn read_chunk(
        &self,
        array: &str,
        chunk_coord: [u64; 3],
        time: u64,
        cancel: &CancelToken,
    ) -> Result<CachedChunk>;
}
