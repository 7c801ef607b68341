//! Engine configuration
//!
//! Plain data, deserializable so host applications can persist viewer
//! settings. Shared resources (an external chunk cache, an OMERO
//! provider) are passed to the constructor instead, not serialized.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use volvue_core::DEFAULT_CACHE_ENTRIES;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineOptions {
    /// Pixel budget for level selection (elements in the 3D buffer)
    pub max_pixels: u64,
    /// Decoded-chunk LRU capacity; ignored when an external cache is
    /// supplied at construction
    pub max_cache_entries: usize,
    /// Debounce for clip-plane reselection
    pub clip_plane_debounce_ms: u64,
    /// Debounce for viewport-end handling
    pub viewport_debounce_ms: u64,
    /// Debounce for crosshair-driven slab reloads
    pub slab_scroll_debounce_ms: u64,
    /// Adjacent frames prefetched on each side of the current time
    pub time_prefetch_count: u64,
    /// Top-left pixel origin for 2D images
    pub flip_y_2d: bool,
    /// Lower bound on the 3D zoom factor (volume extent / viewport extent)
    pub min_zoom_3d: Option<f64>,
    /// Upper bound on the 3D zoom factor
    pub max_zoom_3d: Option<f64>,
    /// Kick off the initial populate from the constructor
    pub auto_load: bool,
    /// Initial time index
    pub time_index: u64,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            max_pixels: 50_000_000,
            max_cache_entries: DEFAULT_CACHE_ENTRIES,
            clip_plane_debounce_ms: 300,
            viewport_debounce_ms: 500,
            slab_scroll_debounce_ms: 100,
            time_prefetch_count: 2,
            flip_y_2d: true,
            min_zoom_3d: None,
            max_zoom_3d: None,
            auto_load: true,
            time_index: 0,
        }
    }
}

impl EngineOptions {
    pub fn clip_plane_debounce(&self) -> Duration {
        Duration::from_millis(self.clip_plane_debounce_ms)
    }

    pub fn viewport_debounce(&self) -> Duration {
        Duration::from_millis(self.viewport_debounce_ms)
    }

    pub fn slab_scroll_debounce(&self) -> Duration {
        Duration::from_millis(self.slab_scroll_debounce_ms)
    }
}
