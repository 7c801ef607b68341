//! Engine events and the subscription bus
//!
//! The engine never calls its host back directly; every observable state
//! change goes through `EventBus`. Listener panics are caught and logged
//! so a misbehaving subscriber cannot take the engine down.

use crate::{ClipPlaneSet, ErrorKind, SliceAxis};
use parking_lot::Mutex;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// What prompted a load
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadTrigger {
    Initial,
    ClipPlanesChanged,
    ViewportChanged,
    SliceChanged,
    TimeChanged,
}

impl std::fmt::Display for LoadTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadTrigger::Initial => write!(f, "initial"),
            LoadTrigger::ClipPlanesChanged => write!(f, "clipPlanesChanged"),
            LoadTrigger::ViewportChanged => write!(f, "viewportChanged"),
            LoadTrigger::SliceChanged => write!(f, "sliceChanged"),
            LoadTrigger::TimeChanged => write!(f, "timeChanged"),
        }
    }
}

/// Events published by the volume engine
#[derive(Debug, Clone)]
pub enum EngineEvent {
    LoadingStart {
        level: usize,
        trigger: LoadTrigger,
    },
    LoadingComplete {
        level: usize,
        trigger: LoadTrigger,
    },
    LoadingSkipped {
        reason: String,
        trigger: LoadTrigger,
    },
    LoadingError {
        kind: ErrorKind,
        trigger: LoadTrigger,
    },
    ResolutionChange {
        previous_level: usize,
        current_level: usize,
        target_level: usize,
    },
    PopulateComplete {
        current_level: usize,
        target_level: usize,
    },
    ClipPlanesChange {
        planes: ClipPlaneSet,
    },
    SlabLoadingStart {
        axis: SliceAxis,
        level: usize,
    },
    SlabLoadingComplete {
        axis: SliceAxis,
        level: usize,
        slab_start: u64,
        slab_end: u64,
    },
    TimeChange {
        index: u64,
        time_value: f64,
        previous_index: u64,
        cached: bool,
    },
    /// The pixel buffer and header were republished after a load
    BufferReady {
        level: usize,
        dims: [u64; 3],
    },
}

/// Handle returned by `subscribe`, used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Listener = Arc<dyn Fn(&EngineEvent) + Send + Sync>;

/// Subscription sink for engine events
#[derive(Clone, Default)]
pub struct EventBus {
    listeners: Arc<Mutex<Vec<(u64, Listener)>>>,
    next_id: Arc<AtomicU64>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&EngineEvent) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.lock().push((id, Arc::new(listener)));
        SubscriptionId(id)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.listeners.lock().retain(|(lid, _)| *lid != id.0);
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    /// Publish to all listeners. The listener list is snapshotted first so
    /// a listener may subscribe or unsubscribe reentrantly.
    pub fn emit(&self, event: &EngineEvent) {
        let snapshot: Vec<Listener> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for listener in snapshot {
            if catch_unwind(AssertUnwindSafe(|| listener(event))).is_err() {
                tracing::error!(?event, "event listener panicked");
            }
        }
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("listener_count", &self.listener_count())
            .finish()
    }
}
