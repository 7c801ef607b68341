//! Core types shared across the volume engine
//!
//! Conventions:
//! - Voxel regions, shapes and buffer dims are `[z, y, x]` order
//! - World coordinates and AABBs are `[x, y, z]` order
//! - Chunk coordinates count chunks, not voxels

use crate::{Result, VolvueError};
use serde::{Deserialize, Serialize};

/// Element type of a stored array
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementType {
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Float32,
    Float64,
}

impl ElementType {
    /// Size of one element in bytes
    pub fn size_of(self) -> usize {
        match self {
            ElementType::Int8 | ElementType::UInt8 => 1,
            ElementType::Int16 | ElementType::UInt16 => 2,
            ElementType::Int32 | ElementType::UInt32 | ElementType::Float32 => 4,
            ElementType::Int64 | ElementType::UInt64 | ElementType::Float64 => 8,
        }
    }

    pub fn is_float(self) -> bool {
        matches!(self, ElementType::Float32 | ElementType::Float64)
    }

    pub fn is_integer(self) -> bool {
        !self.is_float()
    }

    /// NIfTI-1 datatype code for a scalar volume of this element type
    pub fn nifti_code(self) -> i16 {
        match self {
            ElementType::UInt8 => 2,
            ElementType::Int16 => 4,
            ElementType::Int32 => 8,
            ElementType::Float32 => 16,
            ElementType::Float64 => 64,
            ElementType::Int8 => 256,
            ElementType::UInt16 => 512,
            ElementType::UInt32 => 768,
            ElementType::Int64 => 1024,
            ElementType::UInt64 => 1280,
        }
    }

    /// Parse a Zarr dtype string.
    ///
    /// Accepts v2 numpy typestrings (`|u1`, `<u2`, `<f4`, ...) and v3 names
    /// (`uint8`, `float32`, ...). Byte order prefixes are accepted and
    /// ignored; the store is expected to hand over native-endian elements.
    pub fn from_zarr_dtype(dtype: &str) -> Result<Self> {
        let name = dtype.trim_start_matches(['<', '>', '|', '=']);
        match name {
            "i1" | "int8" => Ok(ElementType::Int8),
            "u1" | "uint8" => Ok(ElementType::UInt8),
            "i2" | "int16" => Ok(ElementType::Int16),
            "u2" | "uint16" => Ok(ElementType::UInt16),
            "i4" | "int32" => Ok(ElementType::Int32),
            "u4" | "uint32" => Ok(ElementType::UInt32),
            "i8" | "int64" => Ok(ElementType::Int64),
            "u8" | "uint64" => Ok(ElementType::UInt64),
            "f4" | "float32" => Ok(ElementType::Float32),
            "f8" | "float64" => Ok(ElementType::Float64),
            other => Err(VolvueError::Metadata(format!(
                "unsupported dtype: {other}"
            ))),
        }
    }

    /// Read element `idx` from a native-endian byte slice as f64.
    ///
    /// Integer values above 2^53 lose precision, which is acceptable for
    /// display-window math.
    pub fn read_as_f64(self, bytes: &[u8], idx: usize) -> f64 {
        let off = idx * self.size_of();
        match self {
            ElementType::Int8 => bytes[off] as i8 as f64,
            ElementType::UInt8 => bytes[off] as f64,
            ElementType::Int16 => {
                i16::from_ne_bytes([bytes[off], bytes[off + 1]]) as f64
            }
            ElementType::UInt16 => {
                u16::from_ne_bytes([bytes[off], bytes[off + 1]]) as f64
            }
            ElementType::Int32 => {
                i32::from_ne_bytes(bytes[off..off + 4].try_into().unwrap()) as f64
            }
            ElementType::UInt32 => {
                u32::from_ne_bytes(bytes[off..off + 4].try_into().unwrap()) as f64
            }
            ElementType::Int64 => {
                i64::from_ne_bytes(bytes[off..off + 8].try_into().unwrap()) as f64
            }
            ElementType::UInt64 => {
                u64::from_ne_bytes(bytes[off..off + 8].try_into().unwrap()) as f64
            }
            ElementType::Float32 => {
                f32::from_ne_bytes(bytes[off..off + 4].try_into().unwrap()) as f64
            }
            ElementType::Float64 => {
                f64::from_ne_bytes(bytes[off..off + 8].try_into().unwrap())
            }
        }
    }

    /// Read element `idx` as an integer label value, if this is an integer type
    pub fn read_as_i64(self, bytes: &[u8], idx: usize) -> Option<i64> {
        let off = idx * self.size_of();
        match self {
            ElementType::Int8 => Some(bytes[off] as i8 as i64),
            ElementType::UInt8 => Some(bytes[off] as i64),
            ElementType::Int16 => Some(i16::from_ne_bytes([bytes[off], bytes[off + 1]]) as i64),
            ElementType::UInt16 => Some(u16::from_ne_bytes([bytes[off], bytes[off + 1]]) as i64),
            ElementType::Int32 => {
                Some(i32::from_ne_bytes(bytes[off..off + 4].try_into().unwrap()) as i64)
            }
            ElementType::UInt32 => {
                Some(u32::from_ne_bytes(bytes[off..off + 4].try_into().unwrap()) as i64)
            }
            ElementType::Int64 => {
                Some(i64::from_ne_bytes(bytes[off..off + 8].try_into().unwrap()))
            }
            ElementType::UInt64 => {
                Some(u64::from_ne_bytes(bytes[off..off + 8].try_into().unwrap()) as i64)
            }
            ElementType::Float32 | ElementType::Float64 => None,
        }
    }
}

impl std::fmt::Display for ElementType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ElementType::Int8 => "int8",
            ElementType::UInt8 => "uint8",
            ElementType::Int16 => "int16",
            ElementType::UInt16 => "uint16",
            ElementType::Int32 => "int32",
            ElementType::UInt32 => "uint32",
            ElementType::Int64 => "int64",
            ElementType::UInt64 => "uint64",
            ElementType::Float32 => "float32",
            ElementType::Float64 => "float64",
        };
        write!(f, "{name}")
    }
}

/// What one voxel of the render buffer holds
///
/// Multi-component sources that are not already uint8 are normalized on the
/// fly, so `Rgb`/`Rgba` buffers are always uint8 regardless of source type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BufferContent {
    /// One element per voxel, source element type preserved
    Scalar(ElementType),
    /// Three uint8 components per voxel
    Rgb,
    /// Four uint8 components per voxel
    Rgba,
}

impl BufferContent {
    /// Components per voxel (1, 3 or 4)
    pub fn components(self) -> usize {
        match self {
            BufferContent::Scalar(_) => 1,
            BufferContent::Rgb => 3,
            BufferContent::Rgba => 4,
        }
    }

    /// Element type of the buffer itself (not the source array)
    pub fn element_type(self) -> ElementType {
        match self {
            BufferContent::Scalar(dtype) => dtype,
            BufferContent::Rgb | BufferContent::Rgba => ElementType::UInt8,
        }
    }

    /// NIfTI-1 datatype code (RGB24 / RGBA32 for multi-component)
    pub fn nifti_code(self) -> i16 {
        match self {
            BufferContent::Scalar(dtype) => dtype.nifti_code(),
            BufferContent::Rgb => 128,
            BufferContent::Rgba => 2304,
        }
    }

    /// Whether a source of `dtype` with `components` needs window
    /// normalization before it can land in this buffer
    pub fn needs_normalization(self, source: ElementType) -> bool {
        match self {
            BufferContent::Scalar(_) => false,
            BufferContent::Rgb | BufferContent::Rgba => source != ElementType::UInt8,
        }
    }

    /// Classify a source layout. Components other than 1, 3 or 4 are
    /// rejected before any side effect.
    pub fn classify(source: ElementType, components: usize) -> Result<Self> {
        match components {
            1 => Ok(BufferContent::Scalar(source)),
            3 => Ok(BufferContent::Rgb),
            4 => Ok(BufferContent::Rgba),
            other => Err(VolvueError::UnsupportedComponents {
                components: other,
                dtype: source.to_string(),
            }),
        }
    }
}

/// 2D slice orientations, each backed by its own slab buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SliceAxis {
    /// In-plane y/x, slab along z
    Axial,
    /// In-plane z/x, slab along y
    Coronal,
    /// In-plane z/y, slab along x
    Sagittal,
}

impl SliceAxis {
    /// Index of the orthogonal (slab) axis in `[z, y, x]` order
    pub fn orthogonal_index(self) -> usize {
        match self {
            SliceAxis::Axial => 0,
            SliceAxis::Coronal => 1,
            SliceAxis::Sagittal => 2,
        }
    }

    pub const ALL: [SliceAxis; 3] = [SliceAxis::Axial, SliceAxis::Coronal, SliceAxis::Sagittal];
}

impl std::fmt::Display for SliceAxis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SliceAxis::Axial => write!(f, "axial"),
            SliceAxis::Coronal => write!(f, "coronal"),
            SliceAxis::Sagittal => write!(f, "sagittal"),
        }
    }
}

/// Axis-aligned bounding box in world space, `[x, y, z]` order
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub min: [f64; 3],
    pub max: [f64; 3],
}

impl Aabb {
    pub fn new(min: [f64; 3], max: [f64; 3]) -> Self {
        Self { min, max }
    }

    /// Smallest box containing a point set. Empty input yields a degenerate
    /// inverted box that unions as the identity.
    pub fn from_points<I: IntoIterator<Item = [f64; 3]>>(points: I) -> Self {
        let mut aabb = Self::inverted();
        for p in points {
            for a in 0..3 {
                aabb.min[a] = aabb.min[a].min(p[a]);
                aabb.max[a] = aabb.max[a].max(p[a]);
            }
        }
        aabb
    }

    /// Inverted box: identity element for `union`
    pub fn inverted() -> Self {
        Self {
            min: [f64::INFINITY; 3],
            max: [f64::NEG_INFINITY; 3],
        }
    }

    pub fn is_empty(&self) -> bool {
        (0..3).any(|a| self.max[a] <= self.min[a])
    }

    pub fn center(&self) -> [f64; 3] {
        [
            (self.min[0] + self.max[0]) * 0.5,
            (self.min[1] + self.max[1]) * 0.5,
            (self.min[2] + self.max[2]) * 0.5,
        ]
    }

    pub fn extent(&self) -> [f64; 3] {
        [
            self.max[0] - self.min[0],
            self.max[1] - self.min[1],
            self.max[2] - self.min[2],
        ]
    }

    pub fn union(&self, other: &Aabb) -> Aabb {
        Aabb {
            min: [
                self.min[0].min(other.min[0]),
                self.min[1].min(other.min[1]),
                self.min[2].min(other.min[2]),
            ],
            max: [
                self.max[0].max(other.max[0]),
                self.max[1].max(other.max[1]),
                self.max[2].max(other.max[2]),
            ],
        }
    }

    pub fn intersect(&self, other: &Aabb) -> Aabb {
        Aabb {
            min: [
                self.min[0].max(other.min[0]),
                self.min[1].max(other.min[1]),
                self.min[2].max(other.min[2]),
            ],
            max: [
                self.max[0].min(other.max[0]),
                self.max[1].min(other.max[1]),
                self.max[2].min(other.max[2]),
            ],
        }
    }

    pub fn contains(&self, p: [f64; 3]) -> bool {
        (0..3).all(|a| p[a] >= self.min[a] && p[a] <= self.max[a])
    }

    /// Significance test: differs by more than `abs_tol` or `rel_tol` of the
    /// union extent on any corner component
    pub fn differs_from(&self, other: &Aabb, abs_tol: f64, rel_tol: f64) -> bool {
        for a in 0..3 {
            let span = (self.max[a] - self.min[a])
                .abs()
                .max((other.max[a] - other.min[a]).abs());
            let tol = abs_tol.max(span * rel_tol);
            if (self.min[a] - other.min[a]).abs() > tol || (self.max[a] - other.max[a]).abs() > tol
            {
                return true;
            }
        }
        false
    }

    /// The eight corner points
    pub fn corners(&self) -> [[f64; 3]; 8] {
        let (mn, mx) = (self.min, self.max);
        [
            [mn[0], mn[1], mn[2]],
            [mx[0], mn[1], mn[2]],
            [mn[0], mx[1], mn[2]],
            [mx[0], mx[1], mn[2]],
            [mn[0], mn[1], mx[2]],
            [mx[0], mn[1], mx[2]],
            [mn[0], mx[1], mx[2]],
            [mx[0], mx[1], mx[2]],
        ]
    }
}
