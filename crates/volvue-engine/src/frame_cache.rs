//! Time-frame cache
//!
//! Keeps buffer-format copies of recently visited and prefetched time
//! frames so scrubbing the time axis swaps instead of refetching. Entries
//! are only valid for one `(level, region)` pair - the engine's most
//! recent successful 3D load - and any spatial change drops the whole
//! cache atomically.

use bytes::Bytes;
use std::collections::HashMap;
use volvue_core::ChunkAlignedRegion;

/// The load the cached frames belong to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameTag {
    pub level: usize,
    pub region: ChunkAlignedRegion,
}

/// One cached frame: buffer-format bytes plus their dims
#[derive(Debug, Clone)]
pub struct CachedFrame {
    pub dims: [u64; 3],
    pub data: Bytes,
}

#[derive(Debug, Default)]
pub struct TimeFrameCache {
    tag: Option<FrameTag>,
    entries: HashMap<u64, CachedFrame>,
}

impl TimeFrameCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tag(&self) -> Option<FrameTag> {
        self.tag
    }

    /// Point the cache at a new load. A different tag drops every entry;
    /// the same tag keeps them.
    pub fn retag(&mut self, tag: FrameTag) {
        if self.tag != Some(tag) {
            if !self.entries.is_empty() {
                tracing::debug!(
                    dropped = self.entries.len(),
                    "time-frame cache invalidated by region change"
                );
            }
            self.entries.clear();
            self.tag = Some(tag);
        }
    }

    /// Drop everything, including the tag
    pub fn invalidate_all(&mut self) {
        self.entries.clear();
        self.tag = None;
    }

    /// Insert a frame; ignored when `tag` no longer matches (a prefetch
    /// finishing after the region moved on)
    pub fn insert(&mut self, tag: FrameTag, time: u64, frame: CachedFrame) {
        if self.tag == Some(tag) {
            self.entries.insert(time, frame);
        }
    }

    pub fn get(&self, time: u64) -> Option<&CachedFrame> {
        self.entries.get(&time)
    }

    pub fn contains(&self, time: u64) -> bool {
        self.entries.contains_key(&time)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
