//! volvue-engine: the adaptive volume-data engine
//!
//! Sits between a chunked tensor store and a renderer and answers, for
//! the current clip planes, viewport, slice mode and pixel budget, which
//! chunks to fetch, how to pack them, and when. See `VolumeEngine` for
//! the public control surface.

pub mod coalescer;
pub mod engine;
pub mod frame_cache;
pub mod omero;
pub mod options;
pub mod slab;

pub use coalescer::{FetchKey, FetchedRegion, RegionCoalescer};
pub use engine::VolumeEngine;
pub use frame_cache::{CachedFrame, FrameTag, TimeFrameCache};
pub use omero::{MetadataOmero, OmeroProvider};
pub use options::EngineOptions;
pub use slab::SlabState;

pub(crate) use slab::{LoadSlot, PendingSlab, SlabEntry};
