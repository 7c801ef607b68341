//! Discrete colormaps for label images
//!
//! Label volumes hold class identifiers, not intensities; they render
//! through a lookup table instead of a display window. The palette is
//! fixed so a given label set always colors the same way.

use crate::{ElementType, Result, VolvueError};
use std::collections::BTreeSet;

/// RGBA palette cycled for label indices >= 1. Hues are spread so
/// neighboring labels stay distinguishable.
pub const LABEL_PALETTE: [[u8; 4]; 20] = [
    [230, 25, 75, 255],
    [60, 180, 75, 255],
    [255, 225, 25, 255],
    [0, 130, 200, 255],
    [245, 130, 48, 255],
    [145, 30, 180, 255],
    [70, 240, 240, 255],
    [240, 50, 230, 255],
    [210, 245, 60, 255],
    [250, 190, 212, 255],
    [0, 128, 128, 255],
    [220, 190, 255, 255],
    [170, 110, 40, 255],
    [255, 250, 200, 255],
    [128, 0, 0, 255],
    [170, 255, 195, 255],
    [128, 128, 0, 255],
    [255, 215, 180, 255],
    [0, 0, 128, 255],
    [128, 128, 128, 255],
];

/// Unique integer values in a fetched region, ascending.
///
/// Label arrays must be integer typed; float data is rejected before any
/// side effect.
pub fn unique_labels(src: &[u8], dtype: ElementType) -> Result<Vec<i64>> {
    if dtype.is_float() {
        return Err(VolvueError::InvalidArgument(format!(
            "label image with float dtype {dtype}"
        )));
    }
    let elements = src.len() / dtype.size_of();
    let mut set = BTreeSet::new();
    for i in 0..elements {
        // read_as_i64 is Some for every integer dtype
        if let Some(v) = dtype.read_as_i64(src, i) {
            set.insert(v);
        }
    }
    Ok(set.into_iter().collect())
}

/// Build the discrete colormap for a sorted label list: entry 0 is
/// transparent black, entries >= 1 cycle the palette
pub fn label_colormap(labels: &[i64]) -> Vec<[u8; 4]> {
    let mut table = Vec::with_capacity(labels.len().max(1));
    table.push([0, 0, 0, 0]);
    for i in 1..labels.len() {
        table.push(LABEL_PALETTE[(i - 1) % LABEL_PALETTE.len()]);
    }
    table
}
