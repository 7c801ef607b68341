//! Multiscale image model - ordered pyramid levels plus axis metadata
//!
//! This is the single source of truth the engine reads from. It is immutable
//! after construction; every loader component receives shared read access.
//!
//! Axis conventions:
//! - Stored axis order is whatever the NGFF document declares (subset of
//!   t, c, z, y, x)
//! - `AxisLayout` resolves stored order into fixed slots once, at build time
//! - Spatial accessors return `[z, y, x]` (voxel) or `[x, y, z]` (world)

use crate::{ElementType, Result, VolvueError};
use serde::{Deserialize, Serialize};

/// Kind of a named axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AxisKind {
    Time,
    Channel,
    Space,
}

/// Anatomical direction of increasing voxel index along an axis
///
/// RAS is the positive frame: right, anterior and superior directions
/// contribute sign +1, their opposites -1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Orientation {
    #[serde(rename = "left-to-right")]
    LeftToRight,
    #[serde(rename = "right-to-left")]
    RightToLeft,
    #[serde(rename = "posterior-to-anterior")]
    PosteriorToAnterior,
    #[serde(rename = "anterior-to-posterior")]
    AnteriorToPosterior,
    #[serde(rename = "inferior-to-superior")]
    InferiorToSuperior,
    #[serde(rename = "superior-to-inferior")]
    SuperiorToInferior,
}

impl Orientation {
    /// Physical row this axis lands on: 0 = R/L, 1 = A/P, 2 = S/I
    pub fn physical_row(self) -> usize {
        match self {
            Orientation::LeftToRight | Orientation::RightToLeft => 0,
            Orientation::PosteriorToAnterior | Orientation::AnteriorToPosterior => 1,
            Orientation::InferiorToSuperior | Orientation::SuperiorToInferior => 2,
        }
    }

    /// +1 toward the RAS-positive direction, -1 otherwise
    pub fn sign(self) -> f64 {
        match self {
            Orientation::LeftToRight
            | Orientation::PosteriorToAnterior
            | Orientation::InferiorToSuperior => 1.0,
            Orientation::RightToLeft
            | Orientation::AnteriorToPosterior
            | Orientation::SuperiorToInferior => -1.0,
        }
    }
}

/// One named axis of the stored arrays
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Axis {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: AxisKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orientation: Option<Orientation>,
}

impl Axis {
    pub fn space(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: AxisKind::Space,
            unit: None,
            orientation: None,
        }
    }

    pub fn with_orientation(mut self, orientation: Orientation) -> Self {
        self.orientation = Some(orientation);
        self
    }

    pub fn time(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: AxisKind::Time,
            unit: None,
            orientation: None,
        }
    }

    pub fn channel(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: AxisKind::Channel,
            unit: None,
            orientation: None,
        }
    }
}

/// Stored-order axis slots, resolved once at construction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AxisLayout {
    pub t: Option<usize>,
    pub c: Option<usize>,
    pub z: Option<usize>,
    pub y: usize,
    pub x: usize,
}

impl AxisLayout {
    /// Spatial axis slots in `[z, y, x]` order; z slot is None for 2D images
    pub fn spatial(&self) -> [Option<usize>; 3] {
        [self.z, Some(self.y), Some(self.x)]
    }

    pub fn has_z(&self) -> bool {
        self.z.is_some()
    }
}

/// One pyramid level: an addressable chunked array plus its transform
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageLevel {
    /// Array identity within the store (the dataset path)
    pub path: String,
    /// Sizes per stored axis
    pub shape: Vec<u64>,
    /// Chunk sizes per stored axis
    pub chunk_shape: Vec<u64>,
    /// Element type
    pub dtype: ElementType,
    /// Physical units per voxel, per stored axis
    pub scale: Vec<f64>,
    /// Physical origin, per stored axis
    pub translation: Vec<f64>,
}

impl ImageLevel {
    /// Spatial shape `[z, y, x]`, z = 1 for 2D images
    pub fn shape_zyx(&self, layout: &AxisLayout) -> [u64; 3] {
        let get = |slot: Option<usize>| slot.map(|i| self.shape[i]).unwrap_or(1);
        [get(layout.z), get(Some(layout.y)), get(Some(layout.x))]
    }

    /// Spatial chunk shape `[z, y, x]`, z = 1 for 2D images
    pub fn chunk_zyx(&self, layout: &AxisLayout) -> [u64; 3] {
        let get = |slot: Option<usize>| slot.map(|i| self.chunk_shape[i]).unwrap_or(1);
        [get(layout.z), get(Some(layout.y)), get(Some(layout.x))]
    }

    /// Voxel spacing `[x, y, z]` in physical units, z = 1 for 2D images
    pub fn scale_xyz(&self, layout: &AxisLayout) -> [f64; 3] {
        let get = |slot: Option<usize>| slot.map(|i| self.scale[i]).unwrap_or(1.0);
        [get(Some(layout.x)), get(Some(layout.y)), get(layout.z)]
    }

    /// Physical origin `[x, y, z]`, z = 0 for 2D images
    pub fn translation_xyz(&self, layout: &AxisLayout) -> [f64; 3] {
        let get = |slot: Option<usize>| slot.map(|i| self.translation[i]).unwrap_or(0.0);
        [get(Some(layout.x)), get(Some(layout.y)), get(layout.z)]
    }

    /// Total spatial voxel count of the level
    pub fn voxel_count(&self, layout: &AxisLayout) -> u64 {
        let [z, y, x] = self.shape_zyx(layout);
        z * y * x
    }
}

/// Per-channel display window from the OMERO metadata block
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OmeroWindow {
    pub start: f64,
    pub end: f64,
}

/// One OMERO rendering channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OmeroChannel {
    pub window: OmeroWindow,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// OMERO rendering metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Omero {
    pub channels: Vec<OmeroChannel>,
}

/// An ordered image pyramid: level 0 is the highest resolution
#[derive(Debug, Clone)]
pub struct Multiscales {
    pub name: Option<String>,
    pub axes: Vec<Axis>,
    pub levels: Vec<ImageLevel>,
    pub omero: Option<Omero>,
    /// Discrete class identifiers rather than intensities
    pub is_label: bool,
    layout: AxisLayout,
}

impl Multiscales {
    /// Build and validate a pyramid.
    ///
    /// Chunk dims are clamped into `[1, shape dim]` so downstream
    /// chunk-alignment math never divides by zero or overshoots the volume.
    pub fn new(
        name: Option<String>,
        axes: Vec<Axis>,
        mut levels: Vec<ImageLevel>,
        omero: Option<Omero>,
        is_label: bool,
    ) -> Result<Self> {
        let layout = resolve_layout(&axes)?;
        if levels.is_empty() {
            return Err(VolvueError::Metadata("no pyramid levels".to_string()));
        }
        let arity = axes.len();
        for level in &mut levels {
            if level.shape.len() != arity
                || level.chunk_shape.len() != arity
                || level.scale.len() != arity
                || level.translation.len() != arity
            {
                return Err(VolvueError::Metadata(format!(
                    "level {} arity mismatch (axes: {arity})",
                    level.path
                )));
            }
            for (c, s) in level.chunk_shape.iter_mut().zip(&level.shape) {
                *c = (*c).max(1).min((*s).max(1));
            }
        }
        Ok(Self {
            name,
            axes,
            levels,
            omero,
            is_label,
            layout,
        })
    }

    /// Parse the NGFF attribute document (`.zattrs` content) together with
    /// the per-dataset array metadata read from the store.
    ///
    /// Unknown attribute fields are ignored. The first `multiscales` entry
    /// is used; others describe alternative downsamplings this engine does
    /// not consume.
    pub fn from_ngff(attrs: &serde_json::Value, arrays: &[ArrayMeta]) -> Result<Self> {
        let doc: NgffAttrs = serde_json::from_value(attrs.clone())?;
        let ms = doc
            .multiscales
            .first()
            .ok_or_else(|| VolvueError::Metadata("missing multiscales block".to_string()))?;

        let axes = ms.axes.clone();
        let mut levels = Vec::with_capacity(ms.datasets.len());
        for dataset in &ms.datasets {
            let meta = arrays
                .iter()
                .find(|a| a.path == dataset.path)
                .ok_or_else(|| {
                    VolvueError::Metadata(format!("no array metadata for dataset {}", dataset.path))
                })?;
            let mut scale = vec![1.0; axes.len()];
            let mut translation = vec![0.0; axes.len()];
            for transform in &dataset.coordinate_transformations {
                match transform {
                    NgffTransform::Scale { scale: s } => scale = s.clone(),
                    NgffTransform::Translation { translation: t } => translation = t.clone(),
                }
            }
            levels.push(ImageLevel {
                path: dataset.path.clone(),
                shape: meta.shape.clone(),
                chunk_shape: meta.chunks.clone(),
                dtype: ElementType::from_zarr_dtype(&meta.dtype)?,
                scale,
                translation,
            });
        }

        let is_label = doc.image_label.is_some()
            || ms
                .metadata
                .as_ref()
                .and_then(|m| m.method.as_deref())
                .is_some_and(|m| m.to_ascii_lowercase().contains("label"));

        Multiscales::new(ms.name.clone(), axes, levels, doc.omero, is_label)
    }

    pub fn layout(&self) -> &AxisLayout {
        &self.layout
    }

    /// Size of the time dimension, 1 when there is no time axis
    pub fn time_size(&self) -> u64 {
        match self.layout.t {
            Some(i) => self.levels[0].shape[i],
            None => 1,
        }
    }

    pub fn has_time(&self) -> bool {
        self.layout.t.is_some()
    }

    /// Physical time value of one frame index (0.0 without a time axis)
    pub fn time_value(&self, t: u64) -> f64 {
        match self.layout.t {
            Some(i) => self.levels[0].scale[i] * t as f64 + self.levels[0].translation[i],
            None => 0.0,
        }
    }

    /// Components per voxel: the channel axis size, 1 when absent
    pub fn components(&self) -> usize {
        match self.layout.c {
            Some(i) => self.levels[0].shape[i] as usize,
            None => 1,
        }
    }

    /// Source element type (level 0; all levels share it in practice)
    pub fn dtype(&self) -> ElementType {
        self.levels[0].dtype
    }

    /// Index of the coarsest level
    pub fn coarsest(&self) -> usize {
        self.levels.len() - 1
    }

    pub fn level(&self, index: usize) -> Result<&ImageLevel> {
        self.levels.get(index).ok_or_else(|| {
            VolvueError::InvalidArgument(format!(
                "level {index} out of range ({} levels)",
                self.levels.len()
            ))
        })
    }

    /// Per-storage-spatial-axis orientations `[x, y, z]`, None when any
    /// spatial axis lacks one (orientation is all-or-nothing)
    pub fn orientations_xyz(&self) -> Option<[Orientation; 3]> {
        let get = |slot: Option<usize>| -> Option<Orientation> {
            match slot {
                Some(i) => self.axes[i].orientation,
                // 2D images have no z axis; treat it as superior-positive
                None => Some(Orientation::InferiorToSuperior),
            }
        };
        let x = get(Some(self.layout.x))?;
        let y = get(Some(self.layout.y))?;
        let z = get(self.layout.z)?;
        Some([x, y, z])
    }
}

fn resolve_layout(axes: &[Axis]) -> Result<AxisLayout> {
    let mut t = None;
    let mut c = None;
    let mut z = None;
    let mut y = None;
    let mut x = None;
    for (i, axis) in axes.iter().enumerate() {
        let slot = match (axis.kind, axis.name.as_str()) {
            (AxisKind::Time, _) => &mut t,
            (AxisKind::Channel, _) => &mut c,
            (AxisKind::Space, "z") => &mut z,
            (AxisKind::Space, "y") => &mut y,
            (AxisKind::Space, "x") => &mut x,
            (AxisKind::Space, other) => {
                return Err(VolvueError::Metadata(format!(
                    "unsupported space axis name: {other}"
                )))
            }
        };
        if slot.is_some() {
            return Err(VolvueError::Metadata(format!(
                "duplicate axis: {}",
                axis.name
            )));
        }
        *slot = Some(i);
    }
    let y = y.ok_or_else(|| VolvueError::Metadata("missing y axis".to_string()))?;
    let x = x.ok_or_else(|| VolvueError::Metadata("missing x axis".to_string()))?;
    Ok(AxisLayout { t, c, z, y, x })
}

/// Array metadata as read from the store (`.zarray` fields)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArrayMeta {
    pub path: String,
    pub shape: Vec<u64>,
    pub chunks: Vec<u64>,
    pub dtype: String,
}

// NGFF attribute document shapes. Only the fields the engine consumes are
// modeled; serde skips the rest.

#[derive(Debug, Deserialize)]
struct NgffAttrs {
    multiscales: Vec<NgffMultiscale>,
    #[serde(default)]
    omero: Option<Omero>,
    #[serde(default, rename = "image-label")]
    image_label: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct NgffMultiscale {
    #[serde(default)]
    name: Option<String>,
    axes: Vec<Axis>,
    datasets: Vec<NgffDataset>,
    #[serde(default)]
    metadata: Option<NgffMetadata>,
}

#[derive(Debug, Deserialize)]
struct NgffDataset {
    path: String,
    #[serde(rename = "coordinateTransformations")]
    coordinate_transformations: Vec<NgffTransform>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum NgffTransform {
    Scale { scale: Vec<f64> },
    Translation { translation: Vec<f64> },
}

#[derive(Debug, Deserialize)]
struct NgffMetadata {
    #[serde(default)]
    method: Option<String>,
}
