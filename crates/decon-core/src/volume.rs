use std::fmt;

use ndarray::Array3;
use serde::{Deserialize, Serialize};

use crate::error::{DeconError, Result};

/// Extent of a 3-D volume in voxels. `width` is the fastest-varying axis.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dims3 {
    pub width: usize,
    pub height: usize,
    pub depth: usize,
}

impl Dims3 {
    pub const fn new(width: usize, height: usize, depth: usize) -> Self {
        Self {
            width,
            height,
            depth,
        }
    }

    pub const fn cube(edge: usize) -> Self {
        Self::new(edge, edge, edge)
    }

    /// Build from an ndarray-style shape (slowest axis first).
    ///
    /// Rank 2 shapes are read as a single slice; any other rank, or a
    /// zero-length axis, is rejected.
    pub fn from_shape(shape: &[usize]) -> Result<Self> {
        let dims = match *shape {
            [h, w] => Self::new(w, h, 1),
            [d, h, w] => Self::new(w, h, d),
            _ => {
                return Err(DeconError::InvalidDimensions(format!(
                    "expected 2 or 3 axes, got {}",
                    shape.len()
                )))
            }
        };
        dims.ensure_non_empty()?;
        Ok(dims)
    }

    /// ndarray shape `(depth, height, width)`.
    pub const fn shape(&self) -> (usize, usize, usize) {
        (self.depth, self.height, self.width)
    }

    pub const fn voxel_count(&self) -> usize {
        self.width * self.height * self.depth
    }

    pub const fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0 || self.depth == 0
    }

    pub fn ensure_non_empty(&self) -> Result<()> {
        if self.is_empty() {
            return Err(DeconError::InvalidDimensions(format!(
                "volume {self} has an empty axis"
            )));
        }
        Ok(())
    }

    /// True when `other` fits inside `self` on every axis.
    pub const fn contains(&self, other: &Dims3) -> bool {
        self.width >= other.width && self.height >= other.height && self.depth >= other.depth
    }

    pub const fn from_array(axes: [usize; 3]) -> Self {
        Self::new(axes[0], axes[1], axes[2])
    }
}

impl fmt::Display for Dims3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}x{}", self.width, self.height, self.depth)
    }
}

impl From<(usize, usize, usize)> for Dims3 {
    /// From an ndarray shape `(depth, height, width)`.
    fn from((depth, height, width): (usize, usize, usize)) -> Self {
        Self::new(width, height, depth)
    }
}

/// Integer voxel offset `(x, y, z)` of a block inside a larger volume.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Offset3 {
    pub x: usize,
    pub y: usize,
    pub z: usize,
}

impl Offset3 {
    pub const ORIGIN: Offset3 = Offset3 { x: 0, y: 0, z: 0 };

    pub const fn new(x: usize, y: usize, z: usize) -> Self {
        Self { x, y, z }
    }

    /// True when a block of `block` dims placed at this offset lies inside `outer`.
    pub const fn fits(&self, block: &Dims3, outer: &Dims3) -> bool {
        self.x + block.width <= outer.width
            && self.y + block.height <= outer.height
            && self.z + block.depth <= outer.depth
    }
}

impl fmt::Display for Offset3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Sample type a volume was acquired in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ElementType {
    U8,
    U16,
    #[default]
    F32,
}

impl ElementType {
    pub const fn is_float(&self) -> bool {
        matches!(self, ElementType::F32)
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ElementType::U8 => "8-bit unsigned",
            ElementType::U16 => "16-bit unsigned",
            ElementType::F32 => "32-bit float",
        };
        f.write_str(name)
    }
}

/// A volume held in host memory.
///
/// Samples are stored as f32 regardless of `element_type`; integer volumes
/// carry whole-number values until converted.
#[derive(Clone, Debug)]
pub struct Volume {
    /// Voxel data, shape = (depth, height, width)
    pub data: Array3<f32>,
    pub element_type: ElementType,
}

impl Volume {
    pub fn new(data: Array3<f32>, element_type: ElementType) -> Self {
        Self { data, element_type }
    }

    pub fn from_f32(data: Array3<f32>) -> Self {
        Self::new(data, ElementType::F32)
    }

    pub fn zeros(dims: Dims3) -> Self {
        Self::from_f32(Array3::zeros(dims.shape()))
    }

    pub fn dims(&self) -> Dims3 {
        Dims3::from(self.data.dim())
    }

    pub fn sum(&self) -> f64 {
        self.data.iter().map(|&v| v as f64).sum()
    }

    /// `(min, max)` over all voxels.
    pub fn min_max(&self) -> (f32, f32) {
        self.data
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            })
    }
}
