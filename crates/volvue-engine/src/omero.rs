//! OMERO display-window provider boundary
//!
//! The statistics routine that derives per-channel windows is an opaque
//! external dependency. It receives the shared chunk cache so any chunks
//! it decodes are reused by the loaders (and vice versa). When no provider
//! is configured, windows come from the `omero` metadata block; when that
//! is absent too, the engine falls back to min/max over the fetched
//! region.

use std::sync::Arc;
use volvue_core::{ChunkCache, Multiscales, OmeroWindow};

pub trait OmeroProvider: Send + Sync {
    /// Per-channel display windows, or `None` when unavailable
    fn windows(&self, ms: &Multiscales, cache: &Arc<ChunkCache>) -> Option<Vec<OmeroWindow>>;
}

/// Provider reading the `omero` metadata block carried by the multiscale
/// document
#[derive(Debug, Default)]
pub struct MetadataOmero;

impl OmeroProvider for MetadataOmero {
    fn windows(&self, ms: &Multiscales, _cache: &Arc<ChunkCache>) -> Option<Vec<OmeroWindow>> {
        let omero = ms.omero.as_ref()?;
        if omero.channels.is_empty() {
            return None;
        }
        Some(omero.channels.iter().map(|c| c.window).collect())
    }
}
