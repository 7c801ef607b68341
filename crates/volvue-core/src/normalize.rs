//! Display-window normalization for multi-component data
//!
//! Non-8-bit RGB/RGBA sources are mapped to uint8 through per-channel
//! windows, either taken from OMERO metadata or derived from the fetched
//! region. The per-voxel loop is the one CPU-bound stage the engine
//! offloads to a thread pool.

use crate::{ElementType, OmeroWindow, Result, VolvueError};
use rayon::prelude::*;

/// Map one value through a window to uint8.
///
/// A degenerate window (`end <= start`) maps everything to 0.
pub fn normalize_value(v: f64, window: &OmeroWindow) -> u8 {
    if window.end <= window.start {
        return 0;
    }
    let t = ((v - window.start) / (window.end - window.start)).clamp(0.0, 1.0);
    (t * 255.0).round() as u8
}

/// Normalize an interleaved multi-component region into a uint8 buffer.
///
/// `src` holds `voxels * components` elements of `dtype`; `out` must have
/// exactly the same element count. `windows` is one window per component.
pub fn normalize_into(
    src: &[u8],
    dtype: ElementType,
    components: usize,
    windows: &[OmeroWindow],
    out: &mut [u8],
) -> Result<()> {
    if components == 0 || windows.len() != components {
        return Err(VolvueError::InvalidArgument(format!(
            "{} windows for {components} components",
            windows.len()
        )));
    }
    let elements = src.len() / dtype.size_of();
    if elements % components != 0 || out.len() != elements {
        return Err(VolvueError::InvalidArgument(format!(
            "normalize shape mismatch: {elements} source elements, {} output",
            out.len()
        )));
    }

    out.par_chunks_mut(components)
        .enumerate()
        .for_each(|(voxel, pixel)| {
            let base = voxel * components;
            for (c, slot) in pixel.iter_mut().enumerate() {
                let v = dtype.read_as_f64(src, base + c);
                *slot = normalize_value(v, &windows[c]);
            }
        });
    Ok(())
}

/// Copy an already-uint8 interleaved region straight through
pub fn copy_uint8(src: &[u8], out: &mut [u8]) -> Result<()> {
    if src.len() != out.len() {
        return Err(VolvueError::InvalidArgument(format!(
            "copy shape mismatch: {} source bytes, {} output",
            src.len(),
            out.len()
        )));
    }
    out.copy_from_slice(src);
    Ok(())
}

/// Fallback windows when no OMERO metadata is available: per-channel
/// min/max over the fetched region
pub fn compute_channel_min_max(
    src: &[u8],
    dtype: ElementType,
    components: usize,
) -> Result<Vec<OmeroWindow>> {
    if components == 0 {
        return Err(VolvueError::InvalidArgument(
            "zero components".to_string(),
        ));
    }
    let elements = src.len() / dtype.size_of();
    let mut windows = vec![
        OmeroWindow {
            start: f64::INFINITY,
            end: f64::NEG_INFINITY,
        };
        components
    ];
    for i in 0..elements {
        let v = dtype.read_as_f64(src, i);
        if !v.is_finite() {
            continue;
        }
        let w = &mut windows[i % components];
        w.start = w.start.min(v);
        w.end = w.end.max(v);
    }
    for w in &mut windows {
        // Channel with no finite samples
        if w.start > w.end {
            *w = OmeroWindow {
                start: 0.0,
                end: 0.0,
            };
        }
    }
    Ok(windows)
}
