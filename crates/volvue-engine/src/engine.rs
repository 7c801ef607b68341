//! The volume engine orchestrator
//!
//! Owns the 3D buffer, the slab states, the chunk cache, the coalescer
//! and the time-frame cache, and drives every load in response to host
//! input. Contracts:
//! - Latest-wins: one 3D load and one load per slab axis in flight; a
//!   second request becomes the sole pending request and aborts the
//!   in-flight one; intermediate requests never land
//! - Debounced reactions: clip planes, viewport end and slab scrolling
//!   each fire once per burst
//! - State locks are never held across a suspension point

use crate::{
    CachedFrame, FetchedRegion, FrameTag, LoadSlot, MetadataOmero, OmeroProvider, PendingSlab,
    RegionCoalescer, SlabEntry, TimeFrameCache,
};
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use volvue_core::{
    aligned_region_for_level, geometry_affine, label_colormap, level_world_bounds, normalize_into,
    reselect_level, select_level_3d, select_level_slab, slab_region_for_level, unique_labels,
    unit_magnitude_rescale, world_to_voxel_on_level, Aabb, Affine, BufferContent, CacheStats,
    CancelToken, ChunkCache, ClipPlane, ClipPlaneSet, EngineEvent, EventBus, LoadTrigger,
    Multiscales, OmeroWindow, Result, ShaderPlane, SliceAxis, SubscriptionId, VolumeBuffer,
    VolumeHeader, VolvueError, DISABLED_SHADER_PLANE,
};
use volvue_store::ChunkStore;

/// A queued 3D load request
#[derive(Debug, Clone, Copy)]
struct PendingPopulate {
    skip_preview: bool,
    trigger: LoadTrigger,
    level_override: Option<usize>,
}

/// How a committed region shades in the renderer
enum HeaderShading {
    Window(OmeroWindow),
    Labels(Vec<[u8; 4]>),
}

struct PrefetchState {
    token: CancelToken,
    inflight: HashSet<u64>,
}

struct EngineState {
    buffer: VolumeBuffer,
    header: Option<VolumeHeader>,
    /// Un-oriented world AABB of the current buffer region, the frame the
    /// clip-plane shader math runs in
    buffer_aabb: Option<Aabb>,
    clip_planes: ClipPlaneSet,
    shader_planes: Vec<ShaderPlane>,
    current_level: Option<usize>,
    target_level: usize,
    /// Aligned visible voxel count at level 0 from the last decision
    previous_reference: Option<u64>,
    time_index: u64,
    crosshair: Option<[f64; 3]>,
    last_loaded: Option<FrameTag>,
    /// Resolved per-channel windows (provider or metadata), cached
    windows: Option<Vec<OmeroWindow>>,
}

struct EngineInner {
    ms: Arc<Multiscales>,
    options: crate::EngineOptions,
    content: BufferContent,
    cache: Arc<ChunkCache>,
    coalescer: RegionCoalescer,
    omero: Option<Arc<dyn OmeroProvider>>,
    events: EventBus,
    state: Mutex<EngineState>,
    load3d: Mutex<LoadSlot<PendingPopulate>>,
    slabs: Mutex<HashMap<SliceAxis, Arc<SlabEntry>>>,
    frames: Mutex<TimeFrameCache>,
    viewport: Mutex<volvue_core::ViewportTracker>,
    clip_gen: AtomicU64,
    viewport_gen: AtomicU64,
    /// Debounce timers currently armed (idle detection)
    armed_timers: AtomicUsize,
    prefetch: Mutex<PrefetchState>,
    prefetch_active: AtomicUsize,
}

impl Drop for EngineInner {
    fn drop(&mut self) {
        if let Some(token) = &self.load3d.lock().cancel {
            token.cancel();
        }
        for entry in self.slabs.lock().values() {
            if let Some(token) = &entry.slot.lock().cancel {
                token.cancel();
            }
        }
        self.prefetch.lock().token.cancel();
    }
}

/// The adaptive volume engine
#[derive(Clone)]
pub struct VolumeEngine {
    inner: Arc<EngineInner>,
}

impl VolumeEngine {
    /// Construct with default cache and no OMERO provider
    pub fn new(
        ms: Multiscales,
        store: Arc<dyn ChunkStore>,
        options: crate::EngineOptions,
    ) -> Result<Self> {
        Self::with_parts(ms, store, options, None, None)
    }

    /// Construct with an externally shared chunk cache and/or an OMERO
    /// statistics provider.
    ///
    /// With `auto_load` set the initial populate is spawned here, so the
    /// constructor must run inside a tokio runtime.
    pub fn with_parts(
        ms: Multiscales,
        store: Arc<dyn ChunkStore>,
        options: crate::EngineOptions,
        cache: Option<Arc<ChunkCache>>,
        omero: Option<Arc<dyn OmeroProvider>>,
    ) -> Result<Self> {
        let content = BufferContent::classify(ms.dtype(), ms.components())?;
        if options.time_index >= ms.time_size() {
            return Err(VolvueError::TimeOutOfRange {
                index: options.time_index,
                size: ms.time_size(),
            });
        }
        let cache = cache.unwrap_or_else(|| Arc::new(ChunkCache::new(options.max_cache_entries)));
        let coalescer = RegionCoalescer::new(store, Arc::clone(&cache));
        let ms = Arc::new(ms);

        let state = EngineState {
            buffer: VolumeBuffer::new(content),
            header: None,
            buffer_aabb: None,
            clip_planes: ClipPlaneSet::empty(),
            shader_planes: vec![DISABLED_SHADER_PLANE],
            current_level: None,
            target_level: ms.coarsest(),
            previous_reference: None,
            time_index: options.time_index,
            crosshair: None,
            last_loaded: None,
            windows: None,
        };

        let auto_load = options.auto_load;
        let engine = Self {
            inner: Arc::new(EngineInner {
                ms,
                options,
                content,
                cache,
                coalescer,
                omero,
                events: EventBus::new(),
                state: Mutex::new(state),
                load3d: Mutex::new(LoadSlot::default()),
                slabs: Mutex::new(HashMap::new()),
                frames: Mutex::new(TimeFrameCache::new()),
                viewport: Mutex::new(volvue_core::ViewportTracker::new()),
                clip_gen: AtomicU64::new(0),
                viewport_gen: AtomicU64::new(0),
                armed_timers: AtomicUsize::new(0),
                prefetch: Mutex::new(PrefetchState {
                    token: CancelToken::new(),
                    inflight: HashSet::new(),
                }),
                prefetch_active: AtomicUsize::new(0),
            }),
        };

        if auto_load {
            let spawned = engine.clone();
            tokio::spawn(async move {
                if let Err(e) = spawned.populate(false, LoadTrigger::Initial).await {
                    tracing::error!(error = %e, "initial populate failed");
                }
            });
        }
        Ok(engine)
    }

    // ------------------------------------------------------------------
    // 3D loading
    // ------------------------------------------------------------------

    /// Run the 3D loader: optional preview at the coarsest level, then the
    /// target level.
    ///
    /// Latest-wins: a populate issued while another is in flight replaces
    /// any queued one, aborts the in-flight load and returns immediately;
    /// the in-flight call drains the queue before finishing.
    pub async fn populate(&self, skip_preview: bool, trigger: LoadTrigger) -> Result<()> {
        self.populate_request(PendingPopulate {
            skip_preview,
            trigger,
            level_override: None,
        })
        .await
    }

    /// Explicitly load one level, bypassing selection. Invalidates the
    /// time-frame cache like any other spatial change.
    pub async fn load_level(&self, level: usize) -> Result<()> {
        self.inner.ms.level(level)?;
        self.inner.frames.lock().invalidate_all();
        self.populate_request(PendingPopulate {
            skip_preview: true,
            trigger: LoadTrigger::Initial,
            level_override: Some(level),
        })
        .await
    }

    async fn populate_request(&self, request: PendingPopulate) -> Result<()> {
        let mut next = Some(request);
        while let Some(req) = next.take() {
            let token = {
                let mut slot = self.inner.load3d.lock();
                if slot.loading {
                    let replaced = slot.trigger;
                    if let Some(token) = &slot.cancel {
                        token.cancel();
                    }
                    slot.pending = Some(req);
                    drop(slot);
                    if replaced.is_some() && replaced != Some(req.trigger) {
                        self.inner.events.emit(&EngineEvent::LoadingSkipped {
                            reason: "superseded".to_string(),
                            trigger: replaced.unwrap(),
                        });
                    }
                    return Ok(());
                }
                slot.loading = true;
                slot.trigger = Some(req.trigger);
                let token = CancelToken::new();
                slot.cancel = Some(token.clone());
                token
            };

            let result = self.populate_run(&req, &token).await;

            let pending = {
                let mut slot = self.inner.load3d.lock();
                slot.loading = false;
                slot.cancel = None;
                slot.trigger = None;
                slot.pending.take()
            };

            if let Err(e) = &result {
                if !e.is_cancelled() {
                    self.inner.events.emit(&EngineEvent::LoadingError {
                        kind: e.kind(),
                        trigger: req.trigger,
                    });
                }
            }

            match pending {
                Some(p) => next = Some(p),
                None => {
                    return match result {
                        Ok(()) => {
                            let (current, target, time) = {
                                let state = self.inner.state.lock();
                                (
                                    state.current_level.unwrap_or(state.target_level),
                                    state.target_level,
                                    state.time_index,
                                )
                            };
                            self.inner.events.emit(&EngineEvent::PopulateComplete {
                                current_level: current,
                                target_level: target,
                            });
                            if self.inner.ms.has_time() {
                                self.spawn_prefetch(time);
                            }
                            Ok(())
                        }
                        Err(e) if e.is_cancelled() => Ok(()),
                        Err(e) => Err(e),
                    };
                }
            }
        }
        Ok(())
    }

    async fn populate_run(&self, req: &PendingPopulate, cancel: &CancelToken) -> Result<()> {
        let ms = Arc::clone(&self.inner.ms);
        let planes = self.inner.state.lock().clip_planes.clone();
        let viewport = self.effective_viewport_3d();
        let time = self.inner.state.lock().time_index;

        let target = match req.level_override {
            Some(level) => level,
            None => {
                select_level_3d(&ms, self.inner.options.max_pixels, &planes, viewport.as_ref())?
                    .level
            }
        };
        self.inner.state.lock().target_level = target;

        let coarsest = ms.coarsest();
        if !req.skip_preview && coarsest != target {
            self.load_level_run(coarsest, req.trigger, time, false, cancel)
                .await?;
        }
        self.load_level_run(target, req.trigger, time, true, cancel)
            .await?;

        let reference =
            aligned_region_for_level(&ms, 0, &planes, viewport.as_ref())?.aligned_voxel_count();
        self.inner.state.lock().previous_reference = Some(reference);
        Ok(())
    }

    async fn load_level_run(
        &self,
        level: usize,
        trigger: LoadTrigger,
        time: u64,
        is_target: bool,
        cancel: &CancelToken,
    ) -> Result<()> {
        let ms = Arc::clone(&self.inner.ms);
        self.inner
            .events
            .emit(&EngineEvent::LoadingStart { level, trigger });

        let planes = self.inner.state.lock().clip_planes.clone();
        let viewport = self.effective_viewport_3d();
        let aligned = aligned_region_for_level(&ms, level, &planes, viewport.as_ref())?;

        let fetched = self
            .inner
            .coalescer
            .fetch_region(&ms, level, aligned, time, "volume", cancel)
            .await?;
        cancel.check()?;

        self.commit_3d(level, &fetched, is_target, time)?;

        self.inner
            .events
            .emit(&EngineEvent::LoadingComplete { level, trigger });
        Ok(())
    }

    /// Apply one fetched region to the 3D buffer, header and caches.
    /// Synchronous: runs between suspension points.
    fn commit_3d(
        &self,
        level: usize,
        fetched: &FetchedRegion,
        is_target: bool,
        time: u64,
    ) -> Result<()> {
        let ms = &self.inner.ms;
        let meta = ms.level(level)?;
        let layout = ms.layout();

        let mut scratch = vec![
            0u8;
            fetched.data.len() / fetched.dtype.size_of()
                * self.inner.content.element_type().size_of()
        ];
        let shading = self.convert_region(fetched, &mut scratch)?;

        let oriented = Affine::for_level(
            meta,
            layout,
            ms.orientations_xyz(),
            self.inner.options.flip_y_2d,
        )
        .with_region_offset(fetched.aligned.aligned_start);
        let pixdim = meta.scale_xyz(layout);
        let dims_xyz = [fetched.dims[2], fetched.dims[1], fetched.dims[0]];
        let mut header = VolumeHeader::new(dims_xyz, pixdim, oriented, self.inner.content);
        match shading {
            HeaderShading::Window(w) => header.set_window(&w),
            HeaderShading::Labels(table) => header.set_label_colormap(table),
        }

        let geometry =
            geometry_affine(ms, level)?.with_region_offset(fetched.aligned.aligned_start);
        let aabb = geometry.world_bounds_from_shape(fetched.dims);

        let (previous, target, snapshot) = {
            let mut state = self.inner.state.lock();
            state.buffer.resize(fetched.dims)?;
            state.buffer.as_bytes_mut().copy_from_slice(&scratch);
            state.header = Some(header);
            state.buffer_aabb = Some(aabb);
            state.shader_planes = state.clip_planes.to_shader(&aabb);
            let previous = state.current_level.replace(level);
            if is_target {
                state.last_loaded = Some(FrameTag {
                    level,
                    region: fetched.aligned,
                });
            }
            let snapshot = if is_target && ms.has_time() {
                Some(state.buffer.snapshot())
            } else {
                None
            };
            (previous, state.target_level, snapshot)
        };

        if let Some(snapshot) = snapshot {
            let tag = FrameTag {
                level,
                region: fetched.aligned,
            };
            let mut frames = self.inner.frames.lock();
            frames.retag(tag);
            frames.insert(
                tag,
                time,
                CachedFrame {
                    dims: fetched.dims,
                    data: Bytes::from(snapshot),
                },
            );
        }

        if previous != Some(level) {
            self.inner.events.emit(&EngineEvent::ResolutionChange {
                previous_level: previous.unwrap_or(level),
                current_level: level,
                target_level: target,
            });
        }
        self.inner.events.emit(&EngineEvent::BufferReady {
            level,
            dims: fetched.dims,
        });
        Ok(())
    }

    /// Convert fetched elements into buffer-format bytes and derive how
    /// the region shades
    fn convert_region(&self, fetched: &FetchedRegion, out: &mut [u8]) -> Result<HeaderShading> {
        let ms = &self.inner.ms;
        if ms.is_label {
            if fetched.data.len() != out.len() {
                return Err(VolvueError::InternalInvariant(format!(
                    "label copy mismatch: {} != {}",
                    fetched.data.len(),
                    out.len()
                )));
            }
            out.copy_from_slice(&fetched.data);
            let labels = unique_labels(&fetched.data, fetched.dtype)?;
            return Ok(HeaderShading::Labels(label_colormap(&labels)));
        }

        if self.inner.content.needs_normalization(fetched.dtype) {
            let windows = self.resolve_windows(fetched)?;
            normalize_into(
                &fetched.data,
                fetched.dtype,
                fetched.components,
                &windows,
                out,
            )?;
            return Ok(HeaderShading::Window(OmeroWindow {
                start: 0.0,
                end: 255.0,
            }));
        }

        if fetched.data.len() != out.len() {
            return Err(VolvueError::InternalInvariant(format!(
                "region copy mismatch: {} != {}",
                fetched.data.len(),
                out.len()
            )));
        }
        out.copy_from_slice(&fetched.data);
        let window = if fetched.components == 1 {
            self.resolve_windows(fetched)?[0]
        } else {
            OmeroWindow {
                start: 0.0,
                end: 255.0,
            }
        };
        Ok(HeaderShading::Window(window))
    }

    /// Per-channel windows: provider, then metadata, then min/max over the
    /// fetched region. Provider and metadata results are cached; the
    /// min/max fallback is recomputed per fetch.
    fn resolve_windows(&self, fetched: &FetchedRegion) -> Result<Vec<OmeroWindow>> {
        if let Some(w) = self.inner.state.lock().windows.clone() {
            return Ok(w);
        }
        let ms = &self.inner.ms;
        let provided = self
            .inner
            .omero
            .as_ref()
            .and_then(|p| p.windows(ms, &self.inner.cache))
            .or_else(|| MetadataOmero.windows(ms, &self.inner.cache));
        if let Some(w) = provided {
            if w.len() == fetched.components {
                self.inner.state.lock().windows = Some(w.clone());
                return Ok(w);
            }
            tracing::warn!(
                provided = w.len(),
                components = fetched.components,
                "omero window count mismatch, falling back to min/max"
            );
        }
        volvue_core::compute_channel_min_max(&fetched.data, fetched.dtype, fetched.components)
    }

    // ------------------------------------------------------------------
    // Clip planes
    // ------------------------------------------------------------------

    /// Replace the clip-plane set. Shader parameters update immediately
    /// for visual feedback; the resolution decision is debounced.
    pub fn set_clip_planes(&self, planes: Vec<ClipPlane>) -> Result<()> {
        let set = ClipPlaneSet::new(planes)?;
        let reset = {
            let mut state = self.inner.state.lock();
            let reset = !state.clip_planes.is_empty() && set.is_empty();
            state.clip_planes = set.clone();
            if let Some(aabb) = state.buffer_aabb {
                state.shader_planes = set.to_shader(&aabb);
            }
            reset
        };

        let gen = self.inner.clip_gen.fetch_add(1, Ordering::SeqCst) + 1;
        self.arm_timer();
        let engine = self.clone();
        let delay = self.inner.options.clip_plane_debounce();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if engine.inner.clip_gen.load(Ordering::SeqCst) == gen {
                engine.clip_debounce_fired(reset).await;
            }
            engine.disarm_timer();
        });
        Ok(())
    }

    pub fn add_clip_plane(&self, plane: ClipPlane) -> Result<()> {
        let mut planes = self.inner.state.lock().clip_planes.planes().to_vec();
        if planes.len() >= ClipPlaneSet::MAX_PLANES {
            return Err(VolvueError::InvalidArgument(format!(
                "clip plane set full (max {})",
                ClipPlaneSet::MAX_PLANES
            )));
        }
        planes.push(plane);
        self.set_clip_planes(planes)
    }

    pub fn remove_clip_plane(&self, index: usize) -> Result<()> {
        let mut planes = self.inner.state.lock().clip_planes.planes().to_vec();
        if index >= planes.len() {
            return Err(VolvueError::InvalidArgument(format!(
                "clip plane index {index} out of range ({} planes)",
                planes.len()
            )));
        }
        planes.remove(index);
        self.set_clip_planes(planes)
    }

    pub fn clear_clip_planes(&self) -> Result<()> {
        self.set_clip_planes(Vec::new())
    }

    async fn clip_debounce_fired(&self, reset: bool) {
        let ms = Arc::clone(&self.inner.ms);
        let (planes, current_target, previous_reference, last_loaded) = {
            let state = self.inner.state.lock();
            (
                state.clip_planes.clone(),
                state.target_level,
                state.previous_reference,
                state.last_loaded,
            )
        };
        let viewport = self.effective_viewport_3d();

        let decision = reselect_level(
            &ms,
            self.inner.options.max_pixels,
            &planes,
            viewport.as_ref(),
            current_target,
            previous_reference,
            reset,
        );
        match decision {
            Ok(r) => {
                let level_changed = r.level != current_target;
                {
                    let mut state = self.inner.state.lock();
                    state.previous_reference = Some(r.reference_count);
                    if level_changed {
                        state.target_level = r.level;
                    }
                }
                // The visible region can move without the level moving
                // (an axis-aligned cut at constant budget); both cases
                // invalidate cached frames and reload
                let region_changed = match aligned_region_for_level(
                    &ms,
                    r.level,
                    &planes,
                    viewport.as_ref(),
                ) {
                    Ok(aligned) => last_loaded
                        .map(|t| t.level != r.level || t.region != aligned)
                        .unwrap_or(true),
                    Err(_) => true,
                };
                if level_changed || region_changed {
                    self.inner.frames.lock().invalidate_all();
                    if let Err(e) = self.populate(true, LoadTrigger::ClipPlanesChanged).await {
                        tracing::error!(error = %e, "clip-plane reload failed");
                    }
                }
            }
            Err(e) => tracing::error!(error = %e, "clip-plane reselection failed"),
        }
        self.inner
            .events
            .emit(&EngineEvent::ClipPlanesChange { planes });
    }

    // ------------------------------------------------------------------
    // Time axis
    // ------------------------------------------------------------------

    /// Scrub to a time index: swap from the frame cache when possible,
    /// otherwise reload, and prefetch neighbors either way
    pub async fn set_time_index(&self, t: u64) -> Result<()> {
        let ms = Arc::clone(&self.inner.ms);
        if t >= ms.time_size() {
            return Err(VolvueError::TimeOutOfRange {
                index: t,
                size: ms.time_size(),
            });
        }
        let previous = self.inner.state.lock().time_index;
        if t == previous {
            return Ok(());
        }

        let cached_frame = self.inner.frames.lock().get(t).cloned();
        match cached_frame {
            Some(frame) => {
                let level = {
                    let mut state = self.inner.state.lock();
                    state.buffer.restore(frame.dims, &frame.data)?;
                    state.time_index = t;
                    state.current_level
                };
                tracing::debug!(time = t, "time frame served from cache");
                self.inner.events.emit(&EngineEvent::TimeChange {
                    index: t,
                    time_value: ms.time_value(t),
                    previous_index: previous,
                    cached: true,
                });
                if let Some(level) = level {
                    self.inner.events.emit(&EngineEvent::BufferReady {
                        level,
                        dims: frame.dims,
                    });
                }
            }
            None => {
                self.inner.state.lock().time_index = t;
                self.populate(true, LoadTrigger::Initial).await?;
                self.inner.events.emit(&EngineEvent::TimeChange {
                    index: t,
                    time_value: ms.time_value(t),
                    previous_index: previous,
                    cached: false,
                });
            }
        }
        self.spawn_prefetch(t);
        Ok(())
    }

    /// Abort any running prefetch batch and start one around `center`
    fn spawn_prefetch(&self, center: u64) {
        if !self.inner.ms.has_time() {
            return;
        }
        let token = {
            let mut prefetch = self.inner.prefetch.lock();
            prefetch.token.cancel();
            prefetch.token = CancelToken::new();
            prefetch.token.clone()
        };
        self.inner.prefetch_active.fetch_add(1, Ordering::SeqCst);
        let engine = self.clone();
        tokio::spawn(async move {
            engine.prefetch_run(center, token).await;
            engine.inner.prefetch_active.fetch_sub(1, Ordering::SeqCst);
        });
    }

    /// Fill the frame cache around `center`. Never touches the live
    /// buffer; every failure is swallowed.
    async fn prefetch_run(&self, center: u64, token: CancelToken) {
        let ms = Arc::clone(&self.inner.ms);
        let Some(tag) = self.inner.state.lock().last_loaded else {
            return;
        };
        let time_size = ms.time_size();

        for delta in 1..=self.inner.options.time_prefetch_count {
            let mut candidates = Vec::new();
            if center >= delta {
                candidates.push(center - delta);
            }
            if center + delta < time_size {
                candidates.push(center + delta);
            }
            for t in candidates {
                if token.is_cancelled() {
                    return;
                }
                {
                    let frames = self.inner.frames.lock();
                    if frames.tag() != Some(tag) || frames.contains(t) {
                        continue;
                    }
                }
                {
                    let mut prefetch = self.inner.prefetch.lock();
                    if !prefetch.inflight.insert(t) {
                        continue;
                    }
                }
                let fetched = self
                    .inner
                    .coalescer
                    .fetch_region(&ms, tag.level, tag.region, t, "prefetch", &token)
                    .await;
                match fetched {
                    Ok(region) => match self.convert_frame(&region) {
                        Ok(bytes) => {
                            self.inner.frames.lock().insert(
                                tag,
                                t,
                                CachedFrame {
                                    dims: region.dims,
                                    data: Bytes::from(bytes),
                                },
                            );
                            tracing::debug!(time = t, "prefetched time frame");
                        }
                        Err(e) => tracing::debug!(time = t, error = %e, "prefetch convert failed"),
                    },
                    Err(e) => {
                        if !e.is_cancelled() {
                            tracing::debug!(time = t, error = %e, "prefetch fetch failed");
                        }
                    }
                }
                self.inner.prefetch.lock().inflight.remove(&t);
            }
        }
    }

    /// Buffer-format bytes for a fetched region without touching the live
    /// buffer (prefetch path)
    fn convert_frame(&self, fetched: &FetchedRegion) -> Result<Vec<u8>> {
        let elements = fetched.data.len() / fetched.dtype.size_of();
        let mut out = vec![0u8; elements * self.inner.content.element_type().size_of()];
        self.convert_region(fetched, &mut out)?;
        Ok(out)
    }

    // ------------------------------------------------------------------
    // Slabs
    // ------------------------------------------------------------------

    /// React to the host switching slice mode; `None` means a pure 3D
    /// render view with no slab to load
    pub async fn on_slice_type_change(&self, axis: Option<SliceAxis>) -> Result<()> {
        let Some(axis) = axis else {
            return Ok(());
        };
        self.ensure_slab(axis);
        let world = self.crosshair_or_center();
        self.load_slab(axis, world, LoadTrigger::SliceChanged).await
    }

    /// Track the crosshair; slabs whose chunk interval no longer contains
    /// it schedule a debounced reload
    pub fn on_crosshair_move(&self, world: [f64; 3]) {
        self.inner.state.lock().crosshair = Some(world);
        let entries: Vec<(SliceAxis, Arc<SlabEntry>)> = self
            .inner
            .slabs
            .lock()
            .iter()
            .map(|(a, e)| (*a, Arc::clone(e)))
            .collect();
        for (axis, entry) in entries {
            let (level, in_slab) = {
                let slab = entry.state.lock();
                match slab.level {
                    Some(level) => (level, slab.bounds()),
                    None => continue,
                }
            };
            let orth = match world_to_voxel_on_level(&self.inner.ms, level, world) {
                Ok(voxel) => voxel[axis.orthogonal_index()],
                Err(_) => continue,
            };
            if orth >= in_slab.0 && orth < in_slab.1 {
                continue;
            }
            let gen = entry.scroll_gen.fetch_add(1, Ordering::SeqCst) + 1;
            self.arm_timer();
            let engine = self.clone();
            let delay = self.inner.options.slab_scroll_debounce();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                if entry.scroll_gen.load(Ordering::SeqCst) == gen {
                    if let Err(e) = engine
                        .load_slab(axis, world, LoadTrigger::SliceChanged)
                        .await
                    {
                        tracing::error!(%axis, error = %e, "slab scroll reload failed");
                    }
                }
                engine.disarm_timer();
            });
        }
    }

    /// Load the slab for one axis at the crosshair. Latest-wins per axis,
    /// independent of the 3D loader and of other axes.
    pub async fn load_slab(
        &self,
        axis: SliceAxis,
        world: [f64; 3],
        trigger: LoadTrigger,
    ) -> Result<()> {
        let entry = self.ensure_slab(axis);
        let mut next = Some(PendingSlab { world, trigger });
        while let Some(req) = next.take() {
            let token = {
                let mut slot = entry.slot.lock();
                if slot.loading {
                    if let Some(token) = &slot.cancel {
                        token.cancel();
                    }
                    slot.pending = Some(req);
                    return Ok(());
                }
                slot.loading = true;
                slot.trigger = Some(req.trigger);
                let token = CancelToken::new();
                slot.cancel = Some(token.clone());
                token
            };

            let result = self.slab_run(axis, &entry, req, &token).await;

            let pending = {
                let mut slot = entry.slot.lock();
                slot.loading = false;
                slot.cancel = None;
                slot.trigger = None;
                slot.pending.take()
            };

            if let Err(e) = &result {
                if !e.is_cancelled() {
                    self.inner.events.emit(&EngineEvent::LoadingError {
                        kind: e.kind(),
                        trigger: req.trigger,
                    });
                }
            }

            match pending {
                Some(p) => next = Some(p),
                None => {
                    return match result {
                        Err(e) if !e.is_cancelled() => Err(e),
                        _ => Ok(()),
                    }
                }
            }
        }
        Ok(())
    }

    async fn slab_run(
        &self,
        axis: SliceAxis,
        entry: &Arc<SlabEntry>,
        req: PendingSlab,
        cancel: &CancelToken,
    ) -> Result<()> {
        let ms = Arc::clone(&self.inner.ms);
        let planes = self.inner.state.lock().clip_planes.clone();
        let viewport = self.inner.viewport.lock().effective_slab(axis);
        let time = self.inner.state.lock().time_index;

        let target = select_level_slab(
            &ms,
            self.inner.options.max_pixels,
            axis,
            req.world,
            &planes,
            viewport.as_ref(),
        )?
        .level;

        // Progressive preview runs coarsest -> target; viewport pans jump
        // straight to the target
        let levels: Vec<usize> = if req.trigger == LoadTrigger::ViewportChanged {
            vec![target]
        } else {
            (target..=ms.coarsest()).rev().collect()
        };

        for level in levels {
            cancel.check()?;
            let orth_voxel =
                world_to_voxel_on_level(&ms, level, req.world)?[axis.orthogonal_index()];
            // In-plane extent is clip-plane-clamped only; the slab
            // viewport applies to level selection, not the slab region
            let aligned = slab_region_for_level(&ms, level, axis, orth_voxel, &planes, None)?;

            self.inner
                .events
                .emit(&EngineEvent::SlabLoadingStart { axis, level });

            let fetched = self
                .inner
                .coalescer
                .fetch_region(&ms, level, aligned, time, "slab", cancel)
                .await?;
            cancel.check()?;

            let (slab_start, slab_end) = self.commit_slab(axis, entry, level, &fetched)?;

            self.inner.events.emit(&EngineEvent::SlabLoadingComplete {
                axis,
                level,
                slab_start,
                slab_end,
            });
            // Let the host paint the intermediate level
            tokio::task::yield_now().await;
        }
        Ok(())
    }

    fn commit_slab(
        &self,
        axis: SliceAxis,
        entry: &Arc<SlabEntry>,
        level: usize,
        fetched: &FetchedRegion,
    ) -> Result<(u64, u64)> {
        let ms = &self.inner.ms;
        let meta = ms.level(level)?;
        let layout = ms.layout();

        let mut scratch = vec![
            0u8;
            fetched.data.len() / fetched.dtype.size_of()
                * self.inner.content.element_type().size_of()
        ];
        let shading = self.convert_region(fetched, &mut scratch)?;

        let oriented = Affine::for_level(
            meta,
            layout,
            ms.orientations_xyz(),
            self.inner.options.flip_y_2d,
        )
        .with_region_offset(fetched.aligned.aligned_start);
        let pixdim = meta.scale_xyz(layout);
        let dims_xyz = [fetched.dims[2], fetched.dims[1], fetched.dims[0]];
        let mut header = VolumeHeader::new(dims_xyz, pixdim, oriented, self.inner.content);
        match shading {
            HeaderShading::Window(w) => header.set_window(&w),
            HeaderShading::Labels(table) => header.set_label_colormap(table),
        }
        let factor = unit_magnitude_rescale(pixdim);
        header.rescale(factor);

        let orth = axis.orthogonal_index();
        let mut slab = entry.state.lock();
        slab.buffer.resize(fetched.dims)?;
        slab.buffer.as_bytes_mut().copy_from_slice(&scratch);
        slab.header = Some(header);
        slab.level = Some(level);
        slab.slab_start = fetched.aligned.aligned_start[orth];
        slab.slab_end = fetched.aligned.aligned_end[orth];
        slab.rescale = factor;
        Ok((slab.slab_start, slab.slab_end))
    }

    fn ensure_slab(&self, axis: SliceAxis) -> Arc<SlabEntry> {
        let mut slabs = self.inner.slabs.lock();
        Arc::clone(
            slabs
                .entry(axis)
                .or_insert_with(|| Arc::new(SlabEntry::new(self.inner.content))),
        )
    }

    fn crosshair_or_center(&self) -> [f64; 3] {
        if let Some(c) = self.inner.state.lock().crosshair {
            return c;
        }
        level_world_bounds(&self.inner.ms, 0)
            .map(|b| b.center())
            .unwrap_or([0.0; 3])
    }

    // ------------------------------------------------------------------
    // Viewport
    // ------------------------------------------------------------------

    pub fn set_viewport_aware(&self, aware: bool) {
        self.inner.viewport.lock().set_aware(aware);
    }

    /// Report the primary 3D view's world bounds (view id 0)
    pub fn set_viewport_3d(&self, bounds: Option<Aabb>) {
        self.inner.viewport.lock().set_view_3d(0, bounds);
    }

    /// Report an additional 3D view's bounds; the tracker unions them
    pub fn set_viewport_3d_view(&self, view: u64, bounds: Option<Aabb>) {
        self.inner.viewport.lock().set_view_3d(view, bounds);
    }

    pub fn set_viewport_slab(&self, axis: SliceAxis, bounds: Option<Aabb>) {
        self.inner.viewport.lock().set_slab(axis, bounds);
    }

    /// Debounced end-of-interaction handler
    pub fn on_viewport_end(&self) {
        let gen = self.inner.viewport_gen.fetch_add(1, Ordering::SeqCst) + 1;
        self.arm_timer();
        let engine = self.clone();
        let delay = self.inner.options.viewport_debounce();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if engine.inner.viewport_gen.load(Ordering::SeqCst) == gen {
                engine.viewport_fired().await;
            }
            engine.disarm_timer();
        });
    }

    async fn viewport_fired(&self) {
        let ms = Arc::clone(&self.inner.ms);
        let (changed_3d, changed_slabs) = {
            let mut viewport = self.inner.viewport.lock();
            let changed_3d = viewport.commit_3d();
            let changed_slabs: Vec<SliceAxis> = SliceAxis::ALL
                .iter()
                .filter(|a| viewport.commit_slab(**a))
                .copied()
                .collect();
            (changed_3d, changed_slabs)
        };

        if changed_3d {
            let (planes, current_target, previous_reference) = {
                let state = self.inner.state.lock();
                (
                    state.clip_planes.clone(),
                    state.target_level,
                    state.previous_reference,
                )
            };
            let viewport = self.effective_viewport_3d();
            match reselect_level(
                &ms,
                self.inner.options.max_pixels,
                &planes,
                viewport.as_ref(),
                current_target,
                previous_reference,
                false,
            ) {
                Ok(r) => {
                    let level_changed = r.level != current_target;
                    {
                        let mut state = self.inner.state.lock();
                        state.previous_reference = Some(r.reference_count);
                        if level_changed {
                            state.target_level = r.level;
                        }
                    }
                    if level_changed {
                        self.inner.frames.lock().invalidate_all();
                        if let Err(e) = self.populate(true, LoadTrigger::ViewportChanged).await {
                            tracing::error!(error = %e, "viewport reload failed");
                        }
                    }
                }
                Err(e) => tracing::error!(error = %e, "viewport reselection failed"),
            }
        }

        let existing: Vec<SliceAxis> = {
            let slabs = self.inner.slabs.lock();
            changed_slabs
                .into_iter()
                .filter(|a| slabs.contains_key(a))
                .collect()
        };
        let world = self.crosshair_or_center();
        for axis in existing {
            if let Err(e) = self.load_slab(axis, world, LoadTrigger::ViewportChanged).await {
                tracing::error!(%axis, error = %e, "viewport slab reload failed");
            }
        }
    }

    /// Committed 3D viewport with the zoom clamp applied
    fn effective_viewport_3d(&self) -> Option<Aabb> {
        let bounds = self.inner.viewport.lock().effective_3d()?;
        let volume = level_world_bounds(&self.inner.ms, 0).ok()?;
        Some(clamp_viewport_zoom(
            bounds,
            &volume,
            self.inner.options.min_zoom_3d,
            self.inner.options.max_zoom_3d,
        ))
    }

    // ------------------------------------------------------------------
    // Idle / cancellation / accessors
    // ------------------------------------------------------------------

    fn arm_timer(&self) {
        self.inner.armed_timers.fetch_add(1, Ordering::SeqCst);
    }

    fn disarm_timer(&self) {
        self.inner.armed_timers.fetch_sub(1, Ordering::SeqCst);
    }

    /// Poll until no debounce timer is armed, no 3D or slab load is in
    /// flight or queued, no prefetch batch runs and the coalescer map is
    /// empty
    pub async fn wait_for_idle(&self) {
        loop {
            let idle = self.inner.armed_timers.load(Ordering::SeqCst) == 0
                && self.inner.load3d.lock().is_idle()
                && self
                    .inner
                    .slabs
                    .lock()
                    .values()
                    .all(|e| e.slot.lock().is_idle())
                && self.inner.prefetch_active.load(Ordering::SeqCst) == 0
                && self.inner.coalescer.in_flight_count() == 0;
            if idle {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// Abort every in-flight load and prefetch
    pub fn cancel_all(&self) {
        if let Some(token) = &self.inner.load3d.lock().cancel {
            token.cancel();
        }
        for entry in self.inner.slabs.lock().values() {
            if let Some(token) = &entry.slot.lock().cancel {
                token.cancel();
            }
        }
        self.inner.prefetch.lock().token.cancel();
    }

    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&EngineEvent) + Send + Sync + 'static,
    {
        self.inner.events.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.inner.events.unsubscribe(id);
    }

    pub fn multiscales(&self) -> &Multiscales {
        &self.inner.ms
    }

    pub fn options(&self) -> &crate::EngineOptions {
        &self.inner.options
    }

    pub fn header(&self) -> Option<VolumeHeader> {
        self.inner.state.lock().header.clone()
    }

    /// Read access to the live 3D pixel buffer
    pub fn with_buffer<R>(&self, f: impl FnOnce(&VolumeBuffer) -> R) -> R {
        f(&self.inner.state.lock().buffer)
    }

    /// Read access to one slab's state, if that slice type was used
    pub fn with_slab<R>(
        &self,
        axis: SliceAxis,
        f: impl FnOnce(&crate::SlabState) -> R,
    ) -> Option<R> {
        let entry = {
            let slabs = self.inner.slabs.lock();
            slabs.get(&axis).cloned()
        }?;
        let slab = entry.state.lock();
        Some(f(&slab))
    }

    /// Ordered shader clip-plane list; the disabled sentinel when empty
    pub fn shader_clip_planes(&self) -> Vec<ShaderPlane> {
        self.inner.state.lock().shader_planes.clone()
    }

    pub fn clip_planes(&self) -> ClipPlaneSet {
        self.inner.state.lock().clip_planes.clone()
    }

    pub fn current_level(&self) -> Option<usize> {
        self.inner.state.lock().current_level
    }

    pub fn target_level(&self) -> usize {
        self.inner.state.lock().target_level
    }

    pub fn time_index(&self) -> u64 {
        self.inner.state.lock().time_index
    }

    pub fn cached_frame_count(&self) -> usize {
        self.inner.frames.lock().len()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.inner.cache.stats()
    }
}

/// Scale `viewport` around its center so the zoom factor (volume extent
/// over viewport extent, largest axis) stays inside `[min_zoom, max_zoom]`
fn clamp_viewport_zoom(
    viewport: Aabb,
    volume: &Aabb,
    min_zoom: Option<f64>,
    max_zoom: Option<f64>,
) -> Aabb {
    let ve = viewport.extent();
    let we = volume.extent();
    let mut zoom: f64 = 0.0;
    for a in 0..3 {
        if ve[a] > 0.0 && we[a] > 0.0 {
            zoom = zoom.max(we[a] / ve[a]);
        }
    }
    if zoom <= 0.0 {
        return viewport;
    }
    let clamped = zoom
        .min(max_zoom.unwrap_or(f64::INFINITY))
        .max(min_zoom.unwrap_or(0.0));
    if (clamped - zoom).abs() < f64::EPSILON {
        return viewport;
    }
    let grow = zoom / clamped;
    let center = viewport.center();
    let mut out = viewport;
    for a in 0..3 {
        let half = (ve[a] * grow) * 0.5;
        out.min[a] = center[a] - half;
        out.max[a] = center[a] + half;
    }
    out
}

impl std::fmt::Debug for VolumeEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("VolumeEngine")
            .field("current_level", &state.current_level)
            .field("target_level", &state.target_level)
            .field("time_index", &state.time_index)
            .field("clip_planes", &state.clip_planes.len())
            .finish()
    }
}
