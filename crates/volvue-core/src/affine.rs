//! Voxel-to-world affine construction
//!
//! The affine maps voxel `[i, j, k, 1]` (i along storage x, j along y,
//! k along z) to world `[x, y, z, 1]`. Storage is column-major:
//! `cols[c][r]`, columns 0..2 are the 3x3, column 3 is the translation.
//!
//! With anatomical orientations declared, the 3x3 becomes a signed
//! permutation of the scale diagonal: each storage axis lands on its
//! physical row (R/L = 0, A/P = 1, S/I = 2) with sign -1 when the axis
//! runs toward the anatomically negative direction.

use crate::{Aabb, AxisLayout, ImageLevel, Orientation, Result, VolvueError};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Affine {
    cols: [[f64; 4]; 4],
}

impl Affine {
    pub fn identity() -> Self {
        let mut cols = [[0.0; 4]; 4];
        for (i, col) in cols.iter_mut().enumerate() {
            col[i] = 1.0;
        }
        Self { cols }
    }

    /// Plain scaling affine: `diag(sx, sy, sz)` plus translation
    pub fn from_scale_translation(scale: [f64; 3], translation: [f64; 3]) -> Self {
        let mut affine = Self::identity();
        for a in 0..3 {
            affine.cols[a][a] = scale[a];
            affine.cols[3][a] = translation[a];
        }
        affine
    }

    /// Build the oriented affine for one pyramid level.
    ///
    /// `flip_y_2d` applies the top-left pixel origin convention to 2D
    /// images (no z axis): the y column is negated and the translation
    /// compensated so the image occupies the same world extent.
    pub fn for_level(
        level: &ImageLevel,
        layout: &AxisLayout,
        orientations: Option<[Orientation; 3]>,
        flip_y_2d: bool,
    ) -> Self {
        let scale = level.scale_xyz(layout);
        let translation = level.translation_xyz(layout);

        let mut affine = match orientations {
            None => Self::from_scale_translation(scale, translation),
            Some(orient) => {
                let mut cols = [[0.0; 4]; 4];
                cols[3][3] = 1.0;
                for (axis, o) in orient.iter().enumerate() {
                    let row = o.physical_row();
                    let sign = o.sign();
                    cols[axis][row] = sign * scale[axis];
                    cols[3][row] = sign * translation[axis];
                }
                Self { cols }
            }
        };

        if flip_y_2d && !layout.has_z() {
            let ny = level.shape_zyx(layout)[1];
            affine.flip_axis(1, ny);
        }
        affine
    }

    /// Negate storage axis `axis` and shift the translation so voxel
    /// index `n-1` takes the place of index 0
    fn flip_axis(&mut self, axis: usize, n: u64) {
        let steps = n.saturating_sub(1) as f64;
        for r in 0..3 {
            self.cols[3][r] += self.cols[axis][r] * steps;
            self.cols[axis][r] = -self.cols[axis][r];
        }
    }

    /// Compose a voxel-space region offset (`[z, y, x]` order) through the
    /// 3x3 so permuted axes land on the correct world row
    pub fn with_region_offset(&self, region_start_zyx: [u64; 3]) -> Self {
        let offset = [
            region_start_zyx[2] as f64,
            region_start_zyx[1] as f64,
            region_start_zyx[0] as f64,
        ];
        let mut out = *self;
        for r in 0..3 {
            out.cols[3][r] = self.cols[0][r] * offset[0]
                + self.cols[1][r] * offset[1]
                + self.cols[2][r] * offset[2]
                + self.cols[3][r];
        }
        out
    }

    /// Map a voxel-space point (x, y, z index order) to world space
    pub fn voxel_to_world(&self, v: [f64; 3]) -> [f64; 3] {
        let mut out = [0.0; 3];
        for (r, o) in out.iter_mut().enumerate() {
            *o = self.cols[0][r] * v[0]
                + self.cols[1][r] * v[1]
                + self.cols[2][r] * v[2]
                + self.cols[3][r];
        }
        out
    }

    /// Map a world-space point to voxel space using a precomputed inverse
    pub fn world_to_voxel(world: [f64; 3], inverse: &Affine) -> [f64; 3] {
        inverse.voxel_to_world(world)
    }

    /// Invert. The 3x3 must be nonsingular, which holds for any signed
    /// permutation of a nonzero scale diagonal.
    pub fn inverse(&self) -> Result<Affine> {
        let m = &self.cols;
        let det = m[0][0] * (m[1][1] * m[2][2] - m[2][1] * m[1][2])
            - m[1][0] * (m[0][1] * m[2][2] - m[2][1] * m[0][2])
            + m[2][0] * (m[0][1] * m[1][2] - m[1][1] * m[0][2]);
        if det.abs() < f64::EPSILON || !det.is_finite() {
            return Err(VolvueError::InvalidGeometry(format!(
                "singular affine (det = {det})"
            )));
        }
        let inv_det = 1.0 / det;
        let mut inv = [[0.0; 4]; 4];
        inv[0][0] = (m[1][1] * m[2][2] - m[2][1] * m[1][2]) * inv_det;
        inv[1][0] = (m[2][0] * m[1][2] - m[1][0] * m[2][2]) * inv_det;
        inv[2][0] = (m[1][0] * m[2][1] - m[2][0] * m[1][1]) * inv_det;
        inv[0][1] = (m[2][1] * m[0][2] - m[0][1] * m[2][2]) * inv_det;
        inv[1][1] = (m[0][0] * m[2][2] - m[2][0] * m[0][2]) * inv_det;
        inv[2][1] = (m[2][0] * m[0][1] - m[0][0] * m[2][1]) * inv_det;
        inv[0][2] = (m[0][1] * m[1][2] - m[1][1] * m[0][2]) * inv_det;
        inv[1][2] = (m[1][0] * m[0][2] - m[0][0] * m[1][2]) * inv_det;
        inv[2][2] = (m[0][0] * m[1][1] - m[1][0] * m[0][1]) * inv_det;
        // -R^-1 * t
        for r in 0..3 {
            inv[3][r] = -(inv[0][r] * m[3][0] + inv[1][r] * m[3][1] + inv[2][r] * m[3][2]);
        }
        inv[3][3] = 1.0;
        Ok(Affine { cols: inv })
    }

    /// World AABB of a level, treating the volume as the voxel-edge box
    /// `[0, shape)` on each axis
    pub fn world_bounds_from_shape(&self, shape_zyx: [u64; 3]) -> Aabb {
        let n = [
            shape_zyx[2] as f64,
            shape_zyx[1] as f64,
            shape_zyx[0] as f64,
        ];
        let corners = [
            [0.0, 0.0, 0.0],
            [n[0], 0.0, 0.0],
            [0.0, n[1], 0.0],
            [n[0], n[1], 0.0],
            [0.0, 0.0, n[2]],
            [n[0], 0.0, n[2]],
            [0.0, n[1], n[2]],
            [n[0], n[1], n[2]],
        ];
        Aabb::from_points(corners.iter().map(|&c| self.voxel_to_world(c)))
    }

    /// Column-major flat array, the renderer header convention
    pub fn col_major_flat(&self) -> [f64; 16] {
        let mut out = [0.0; 16];
        for c in 0..4 {
            for r in 0..4 {
                out[c * 4 + r] = self.cols[c][r];
            }
        }
        out
    }

    /// Rows of the matrix (row-major view), handy for NIfTI srow fields
    pub fn rows(&self) -> [[f64; 4]; 4] {
        let mut rows = [[0.0; 4]; 4];
        for (c, col) in self.cols.iter().enumerate() {
            for (r, row) in rows.iter_mut().enumerate() {
                row[c] = col[r];
            }
        }
        rows
    }

    /// Uniformly scale the spatial rows, leaving the homogeneous row
    /// untouched. Used for the slab headers' coordinate rescale.
    pub fn scaled(&self, factor: f64) -> Affine {
        let mut out = *self;
        for col in &mut out.cols {
            for v in col.iter_mut().take(3) {
                *v *= factor;
            }
        }
        out
    }

    pub fn col(&self, c: usize) -> [f64; 4] {
        self.cols[c]
    }

    pub fn translation(&self) -> [f64; 3] {
        [self.cols[3][0], self.cols[3][1], self.cols[3][2]]
    }
}

/// Comprehensive test suite with Arrange-Act-Assert pattern
#[cfg(test)]
mod tests {
    include!("affine_test.rs");
}
