//! Viewport bounds tracking
//!
//! Hosts report per-view world AABBs as the camera moves; the tracker
//! keeps the union across 3D views and one AABB per slab axis, and
//! answers whether a committed change is significant enough to justify a
//! reload. Debouncing of the commit itself is the engine's job.

use crate::{Aabb, SliceAxis};
use std::collections::HashMap;

/// Absolute tolerance for the significance test
pub const VIEWPORT_ABS_TOL: f64 = 1e-6;
/// Relative tolerance: 0.1% of the extent
pub const VIEWPORT_REL_TOL: f64 = 0.001;

#[derive(Debug, Default)]
pub struct ViewportTracker {
    /// Viewport-aware resolution selection enabled
    aware: bool,
    /// Live per-view 3D bounds, keyed by host view id
    views_3d: HashMap<u64, Aabb>,
    /// Live per-slab bounds
    slabs: HashMap<SliceAxis, Aabb>,
    /// Last committed 3D union
    committed_3d: Option<Aabb>,
    /// Last committed slab bounds
    committed_slabs: HashMap<SliceAxis, Aabb>,
}

impl ViewportTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_aware(&mut self, aware: bool) {
        self.aware = aware;
    }

    pub fn is_aware(&self) -> bool {
        self.aware
    }

    /// Report the current bounds of one 3D view; `None` removes the view
    pub fn set_view_3d(&mut self, view: u64, bounds: Option<Aabb>) {
        match bounds {
            Some(b) => {
                self.views_3d.insert(view, b);
            }
            None => {
                self.views_3d.remove(&view);
            }
        }
    }

    /// Report the current bounds of one slab view; `None` removes it
    pub fn set_slab(&mut self, axis: SliceAxis, bounds: Option<Aabb>) {
        match bounds {
            Some(b) => {
                self.slabs.insert(axis, b);
            }
            None => {
                self.slabs.remove(&axis);
            }
        }
    }

    /// Union of all live 3D view bounds
    pub fn union_3d(&self) -> Option<Aabb> {
        if self.views_3d.is_empty() {
            return None;
        }
        let mut out = Aabb::inverted();
        for b in self.views_3d.values() {
            out = out.union(b);
        }
        Some(out)
    }

    /// Commit the 3D union; true when it changed significantly
    pub fn commit_3d(&mut self) -> bool {
        let next = self.union_3d();
        let changed = significant(self.committed_3d.as_ref(), next.as_ref());
        if changed {
            self.committed_3d = next;
        }
        changed
    }

    /// Commit one slab's bounds; true when they changed significantly
    pub fn commit_slab(&mut self, axis: SliceAxis) -> bool {
        let next = self.slabs.get(&axis).copied();
        let changed = significant(self.committed_slabs.get(&axis), next.as_ref());
        if changed {
            match next {
                Some(b) => {
                    self.committed_slabs.insert(axis, b);
                }
                None => {
                    self.committed_slabs.remove(&axis);
                }
            }
        }
        changed
    }

    /// Committed 3D bounds, only while viewport-aware selection is on
    pub fn effective_3d(&self) -> Option<Aabb> {
        if self.aware {
            self.committed_3d
        } else {
            None
        }
    }

    /// Committed slab bounds, only while viewport-aware selection is on
    pub fn effective_slab(&self, axis: SliceAxis) -> Option<Aabb> {
        if self.aware {
            self.committed_slabs.get(&axis).copied()
        } else {
            None
        }
    }
}

fn significant(old: Option<&Aabb>, new: Option<&Aabb>) -> bool {
    match (old, new) {
        (None, None) => false,
        (Some(a), Some(b)) => a.differs_from(b, VIEWPORT_ABS_TOL, VIEWPORT_REL_TOL),
        _ => true,
    }
}
