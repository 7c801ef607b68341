//! volvue: adaptive multi-resolution volume engine for chunked
//! scientific images
//!
//! Unified interface over the workspace crates:
//! - [`volvue_core`]: multiscale model, geometry, buffers, caches, events
//! - [`volvue_store`]: the chunk store contract and the in-memory
//!   reference store
//! - [`volvue_engine`]: the engine orchestrator
//!
//! ```no_run
//! use std::sync::Arc;
//! use volvue::{ElementType, EngineOptions, LoadTrigger, MemoryStore, VolumeEngine};
//!
//! # async fn demo() -> volvue::Result<()> {
//! let store = Arc::new(MemoryStore::pyramid(
//!     &[[128, 512, 512], [64, 256, 256]],
//!     [32, 64, 64],
//!     ElementType::UInt16,
//!     1,
//!     1,
//! ));
//! let ms = store.multiscales(false)?;
//! let options = EngineOptions {
//!     auto_load: false,
//!     ..Default::default()
//! };
//! let engine = VolumeEngine::new(ms, store, options)?;
//! engine.populate(false, LoadTrigger::Initial).await?;
//! let header = engine.header().unwrap();
//! println!("loaded {:?} voxels", header.dims);
//! # Ok(())
//! # }
//! ```

pub use volvue_core::*;
pub use volvue_engine::{
    CachedFrame, EngineOptions, FetchKey, FetchedRegion, FrameTag, MetadataOmero, OmeroProvider,
    RegionCoalescer, SlabState, TimeFrameCache, VolumeEngine,
};
pub use volvue_store::{ChunkStore, MemoryStore, MemoryStoreError};
