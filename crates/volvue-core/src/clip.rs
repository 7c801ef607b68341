//! Clip-plane geometry
//!
//! A plane is `(point, normal)` in world space with a unit normal pointing
//! toward the visible half-space. A set holds 0 to 6 planes; the empty set
//! leaves the full volume visible.

use crate::{Aabb, Affine, PixelRegion, Result, VolvueError};
use serde::{Deserialize, Serialize};

/// Component magnitude above which a normal counts as axis-aligned
const AXIS_ALIGNED_MAJOR: f64 = 1.0 - 1e-3;
/// Component magnitude below which an off-axis component counts as zero
const AXIS_ALIGNED_MINOR: f64 = 1e-3;

/// Shader parameterization of one plane: depth from the buffer center
/// along the normal, then azimuth/elevation of the negated normal in
/// degrees (azimuth from +y toward +x, elevation toward +z)
pub type ShaderPlane = [f64; 3];

/// Sentinel handed to the renderer when no planes are active; depth 2 is
/// outside the normalized [-0.5, 0.5] range, so the shader disables it
pub const DISABLED_SHADER_PLANE: ShaderPlane = [2.0, 0.0, 0.0];

/// One clip plane in world space
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClipPlane {
    pub point: [f64; 3],
    pub normal: [f64; 3],
}

impl ClipPlane {
    /// Build a plane, normalizing the normal. Zero-length or non-finite
    /// input is `InvalidGeometry`.
    pub fn new(point: [f64; 3], normal: [f64; 3]) -> Result<Self> {
        for v in point.iter().chain(normal.iter()) {
            if !v.is_finite() {
                return Err(VolvueError::InvalidGeometry(
                    "non-finite clip plane component".to_string(),
                ));
            }
        }
        let len = (normal[0] * normal[0] + normal[1] * normal[1] + normal[2] * normal[2]).sqrt();
        if len < f64::EPSILON {
            return Err(VolvueError::InvalidGeometry(
                "zero-length clip plane normal".to_string(),
            ));
        }
        Ok(Self {
            point,
            normal: [normal[0] / len, normal[1] / len, normal[2] / len],
        })
    }

    /// Signed distance of `p` from the plane; positive means visible
    pub fn signed_distance(&self, p: [f64; 3]) -> f64 {
        (p[0] - self.point[0]) * self.normal[0]
            + (p[1] - self.point[1]) * self.normal[1]
            + (p[2] - self.point[2]) * self.normal[2]
    }

    /// The dominant axis when the plane is axis-aligned within tolerance
    fn axis_aligned(&self) -> Option<usize> {
        for a in 0..3 {
            if self.normal[a].abs() > AXIS_ALIGNED_MAJOR
                && (0..3)
                    .filter(|&b| b != a)
                    .all(|b| self.normal[b].abs() < AXIS_ALIGNED_MINOR)
            {
                return Some(a);
            }
        }
        None
    }

    /// Shrink `aabb` to the part that can be visible under this plane.
    ///
    /// Axis-aligned planes cut exactly. Oblique planes shrink each axis by
    /// the conservative projection bound, so the result always contains
    /// the true visible intersection and never expands.
    fn clip_aabb(&self, aabb: &Aabb) -> Aabb {
        let mut out = *aabb;
        if let Some(a) = self.axis_aligned() {
            if self.normal[a] > 0.0 {
                out.min[a] = out.min[a].max(self.point[a]);
            } else {
                out.max[a] = out.max[a].min(self.point[a]);
            }
            out.max[a] = out.max[a].max(out.min[a]);
            return out;
        }

        let d = self.point[0] * self.normal[0]
            + self.point[1] * self.normal[1]
            + self.point[2] * self.normal[2];
        for a in 0..3 {
            let n_a = self.normal[a];
            if n_a.abs() < AXIS_ALIGNED_MINOR {
                continue;
            }
            // Largest contribution the other axes can make toward the
            // visible side, over the current box
            let mut other_max = 0.0;
            for b in 0..3 {
                if b == a {
                    continue;
                }
                other_max += (self.normal[b] * out.min[b]).max(self.normal[b] * out.max[b]);
            }
            let bound = (d - other_max) / n_a;
            if n_a > 0.0 {
                out.min[a] = out.min[a].max(bound).min(out.max[a]);
            } else {
                out.max[a] = out.max[a].min(bound).max(out.min[a]);
            }
        }
        out
    }
}

/// Ordered collection of at most 6 clip planes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClipPlaneSet {
    planes: Vec<ClipPlane>,
}

impl ClipPlaneSet {
    pub const MAX_PLANES: usize = 6;

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new(planes: Vec<ClipPlane>) -> Result<Self> {
        if planes.len() > Self::MAX_PLANES {
            return Err(VolvueError::InvalidArgument(format!(
                "{} clip planes (max {})",
                planes.len(),
                Self::MAX_PLANES
            )));
        }
        Ok(Self { planes })
    }

    pub fn len(&self) -> usize {
        self.planes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.planes.is_empty()
    }

    pub fn planes(&self) -> &[ClipPlane] {
        &self.planes
    }

    pub fn push(&mut self, plane: ClipPlane) -> Result<()> {
        if self.planes.len() >= Self::MAX_PLANES {
            return Err(VolvueError::InvalidArgument(format!(
                "clip plane set full (max {})",
                Self::MAX_PLANES
            )));
        }
        self.planes.push(plane);
        Ok(())
    }

    pub fn remove(&mut self, index: usize) -> Result<ClipPlane> {
        if index >= self.planes.len() {
            return Err(VolvueError::InvalidArgument(format!(
                "clip plane index {index} out of range ({} planes)",
                self.planes.len()
            )));
        }
        Ok(self.planes.remove(index))
    }

    /// World AABB of the visible part of `volume_bounds`
    pub fn clip_aabb(&self, volume_bounds: &Aabb) -> Aabb {
        let mut out = *volume_bounds;
        for plane in &self.planes {
            out = plane.clip_aabb(&out);
        }
        out
    }

    /// Voxel region of the visible part on one level.
    ///
    /// The clip AABB is intersected with the viewport AABB when given,
    /// world corners go through the inverse affine, and the voxel box is
    /// floored/ceiled then clamped to the level shape.
    pub fn clip_pixel_region(
        &self,
        volume_bounds: &Aabb,
        inverse_affine: &Affine,
        shape_zyx: [u64; 3],
        viewport: Option<&Aabb>,
    ) -> PixelRegion {
        let mut world = self.clip_aabb(volume_bounds);
        if let Some(vp) = viewport {
            world = world.intersect(vp);
        }
        if world.is_empty() {
            return PixelRegion::new([0, 0, 0], [0, 0, 0]);
        }

        let mut voxel = Aabb::inverted();
        for corner in world.corners() {
            let v = Affine::world_to_voxel(corner, inverse_affine);
            for a in 0..3 {
                voxel.min[a] = voxel.min[a].min(v[a]);
                voxel.max[a] = voxel.max[a].max(v[a]);
            }
        }

        // Voxel AABB is x,y,z; regions are z,y,x
        let clamp = |v: f64, max: u64| -> u64 { (v.max(0.0) as u64).min(max) };
        let start = [
            clamp(voxel.min[2].floor(), shape_zyx[0]),
            clamp(voxel.min[1].floor(), shape_zyx[1]),
            clamp(voxel.min[0].floor(), shape_zyx[2]),
        ];
        let end = [
            clamp(voxel.max[2].ceil(), shape_zyx[0]).max(start[0]),
            clamp(voxel.max[1].ceil(), shape_zyx[1]).max(start[1]),
            clamp(voxel.max[0].ceil(), shape_zyx[2]).max(start[2]),
        ];
        PixelRegion::new(start, end)
    }

    /// Shader plane list for the renderer. Depth is the signed distance of
    /// the plane from the buffer center along its normal, normalized by
    /// the buffer extent projected onto that normal; azimuth/elevation
    /// encode the negated normal.
    pub fn to_shader(&self, buffer_aabb: &Aabb) -> Vec<ShaderPlane> {
        if self.planes.is_empty() {
            return vec![DISABLED_SHADER_PLANE];
        }
        let center = buffer_aabb.center();
        let extent = buffer_aabb.extent();
        self.planes
            .iter()
            .map(|plane| {
                let n = plane.normal;
                let projected = (n[0] * extent[0]).abs()
                    + (n[1] * extent[1]).abs()
                    + (n[2] * extent[2]).abs();
                // Distance from the buffer center to the plane, along n
                let depth = if projected > f64::EPSILON {
                    -plane.signed_distance(center) / projected
                } else {
                    0.0
                };
                let m = [-n[0], -n[1], -n[2]];
                let azimuth = m[0].atan2(m[1]).to_degrees();
                let elevation = m[2].clamp(-1.0, 1.0).asin().to_degrees();
                [depth, azimuth, elevation]
            })
            .collect()
    }
}
