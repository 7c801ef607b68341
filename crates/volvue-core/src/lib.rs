//! volvue-core: geometry, level selection, buffers and caches for the
//! adaptive volume engine
//!
//! Architecture:
//! - Multiscales: immutable pyramid model, shared read access everywhere
//! - Resolution selector: pixel-budget level choice, direction-aware
//! - Clip/viewport geometry: world AABBs down to chunk-aligned regions
//! - VolumeBuffer / ChunkCache: the only mutable storage primitives
//! - EventBus: the one path from engine state to the host

pub mod affine;
pub mod buffer;
pub mod cancel;
pub mod chunk_cache;
pub mod clip;
pub mod colormap;
pub mod error;
pub mod event;
pub mod header;
pub mod multiscales;
pub mod normalize;
pub mod region;
pub mod resolution;
pub mod types;
pub mod viewport;

pub use affine::*;
pub use buffer::*;
pub use cancel::*;
pub use chunk_cache::*;
pub use clip::*;
pub use colormap::*;
pub use error::*;
pub use event::*;
pub use header::*;
pub use multiscales::*;
pub use normalize::*;
pub use region::*;
pub use resolution::*;
pub use types::*;
pub use viewport::*;
