//! Per-slice-type slab state
//!
//! Each 2D slice orientation owns a one-chunk-thick buffer along its
//! orthogonal axis, loaded independently of the 3D buffer and of the
//! other slabs. Entries are created lazily on first use of a slice type.

use parking_lot::Mutex;
use std::sync::atomic::AtomicU64;
use volvue_core::{BufferContent, CancelToken, LoadTrigger, VolumeBuffer, VolumeHeader};

/// Latest-wins load slot: at most one load in flight, at most one pending
/// request that replaces any earlier pending one
#[derive(Debug)]
pub(crate) struct LoadSlot<P> {
    pub loading: bool,
    pub cancel: Option<CancelToken>,
    pub trigger: Option<LoadTrigger>,
    pub pending: Option<P>,
}

impl<P> Default for LoadSlot<P> {
    fn default() -> Self {
        Self {
            loading: false,
            cancel: None,
            trigger: None,
            pending: None,
        }
    }
}

impl<P> LoadSlot<P> {
    pub fn is_idle(&self) -> bool {
        !self.loading && self.pending.is_none()
    }
}

/// A queued slab request
#[derive(Debug, Clone, Copy)]
pub(crate) struct PendingSlab {
    pub world: [f64; 3],
    pub trigger: LoadTrigger,
}

/// Mutable state of one slab
#[derive(Debug)]
pub struct SlabState {
    pub buffer: VolumeBuffer,
    pub header: Option<VolumeHeader>,
    /// Level currently loaded, None before the first load
    pub level: Option<usize>,
    /// Slab interval `[slab_start, slab_end)` along the orthogonal axis
    pub slab_start: u64,
    pub slab_end: u64,
    /// Uniform coordinate rescale applied to the header
    pub rescale: f64,
}

impl SlabState {
    pub fn new(content: BufferContent) -> Self {
        Self {
            buffer: VolumeBuffer::new(content),
            header: None,
            level: None,
            slab_start: 0,
            slab_end: 0,
            rescale: 1.0,
        }
    }

    /// Whether an orthogonal voxel position falls inside the loaded slab
    pub fn contains_orth(&self, voxel: u64) -> bool {
        self.level.is_some() && voxel >= self.slab_start && voxel < self.slab_end
    }

    /// The slab interval along the orthogonal axis
    pub fn bounds(&self) -> (u64, u64) {
        (self.slab_start, self.slab_end)
    }
}

/// One lazily-created slab: its state, its latest-wins slot and the
/// debounce generation for crosshair scrolling
pub(crate) struct SlabEntry {
    pub state: Mutex<SlabState>,
    pub slot: Mutex<LoadSlot<PendingSlab>>,
    pub scroll_gen: AtomicU64,
}

impl SlabEntry {
    pub fn new(content: BufferContent) -> Self {
        Self {
            state: Mutex::new(SlabState::new(content)),
            slot: Mutex::new(LoadSlot::default()),
            scroll_gen: AtomicU64::new(0),
        }
    }
}
