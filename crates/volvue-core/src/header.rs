//! Renderer-facing volume header
//!
//! A NIfTI-style description of the pixel buffer the renderer consumes:
//! voxel dims, voxel size, the voxel-to-world affine (column-major, see
//! `Affine::col_major_flat`), a datatype code, the display window and an
//! optional label lookup table.

use crate::{Affine, BufferContent, OmeroWindow};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeHeader {
    /// Voxel counts `[x, y, z]` of the live buffer region
    pub dims: [u64; 3],
    /// Voxel size per axis `[x, y, z]` in physical units
    pub pixdim: [f64; 3],
    /// Voxel-to-world affine for the buffer region (region offset already
    /// composed in)
    pub affine: Affine,
    /// NIfTI-1 datatype code, RGB24/RGBA32 for multi-component buffers
    pub datatype: i16,
    /// Display window lower bound
    pub cal_min: f64,
    /// Display window upper bound
    pub cal_max: f64,
    /// Discrete lookup table for label images; replaces the window
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_colormap: Option<Vec<[u8; 4]>>,
}

impl VolumeHeader {
    pub fn new(dims: [u64; 3], pixdim: [f64; 3], affine: Affine, content: BufferContent) -> Self {
        Self {
            dims,
            pixdim,
            affine,
            datatype: content.nifti_code(),
            cal_min: 0.0,
            cal_max: 0.0,
            label_colormap: None,
        }
    }

    /// NIfTI dim array: rank 3, then x,y,z extents, trailing axes 1
    pub fn dim_array(&self) -> [i64; 8] {
        [
            3,
            self.dims[0] as i64,
            self.dims[1] as i64,
            self.dims[2] as i64,
            1,
            1,
            1,
            1,
        ]
    }

    pub fn set_window(&mut self, window: &OmeroWindow) {
        self.cal_min = window.start;
        self.cal_max = window.end;
        self.label_colormap = None;
    }

    pub fn set_label_colormap(&mut self, table: Vec<[u8; 4]>) {
        self.cal_min = 0.0;
        self.cal_max = 0.0;
        self.label_colormap = Some(table);
    }

    /// Apply a uniform coordinate rescale: pixel dims and the affine are
    /// scaled by `factor`, keeping geometry proportional
    pub fn rescale(&mut self, factor: f64) {
        for p in &mut self.pixdim {
            *p *= factor;
        }
        self.affine = self.affine.scaled(factor);
    }
}

/// Pick a power-of-ten factor that brings the mean pixel dim near unit
/// magnitude; slab headers apply it so renderer math stays well
/// conditioned for nanometer- or kilometer-scaled volumes
pub fn unit_magnitude_rescale(pixdim: [f64; 3]) -> f64 {
    let mean = (pixdim[0].abs() + pixdim[1].abs() + pixdim[2].abs()) / 3.0;
    if mean <= 0.0 || !mean.is_finite() {
        return 1.0;
    }
    let exp = mean.log10().round();
    10f64.powf(-exp)
}
