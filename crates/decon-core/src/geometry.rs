use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::consts::{SMOOTH_PRIMES, SMOOTH_TABLE_LIMIT};
use crate::error::{DeconError, Result};
use crate::volume::{Dims3, Offset3};

/// Placement of an original volume inside an extended canvas.
///
/// The offset on each axis is `(extended - original) / 2` with floor
/// division. When the difference is odd the extra voxel ends up on the high
/// side; padding, cropping and the non-circulant mask all read the offset
/// from here so the split is the same everywhere.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PaddedGeometry {
    pub original: Dims3,
    pub extended: Dims3,
}

impl PaddedGeometry {
    pub fn new(original: Dims3, extended: Dims3) -> Result<Self> {
        if !extended.contains(&original) {
            return Err(DeconError::InvalidDimensions(format!(
                "extended canvas {extended} is smaller than original volume {original}"
            )));
        }
        Ok(Self { original, extended })
    }

    pub fn offset(&self) -> Offset3 {
        Offset3::new(
            (self.extended.width - self.original.width) / 2,
            (self.extended.height - self.original.height) / 2,
            (self.extended.depth - self.original.depth) / 2,
        )
    }
}

/// How the combined image + kernel size is turned into a canvas size.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExtensionSize {
    /// Use `image + kernel` as is.
    Exact,
    /// Round each axis up to the next 7-smooth number.
    #[default]
    Smooth,
}

/// Canvas size for convolving a volume of `image` dims with a kernel of
/// `kernel` dims without wrap-around reaching the valid region.
pub fn extended_dims(image: Dims3, kernel: Dims3, sizing: ExtensionSize) -> Dims3 {
    let axes = [
        image.width + kernel.width,
        image.height + kernel.height,
        image.depth + kernel.depth,
    ];
    match sizing {
        ExtensionSize::Exact => Dims3::from_array(axes),
        ExtensionSize::Smooth => Dims3::from_array(axes.map(next_smooth)),
    }
}

/// Smallest 7-smooth number (only prime factors 2, 3, 5, 7) that is `>= n`.
pub fn next_smooth(n: usize) -> usize {
    if n <= 1 {
        return 1;
    }
    let table = smooth_table();
    let idx = table.partition_point(|&v| v < n);
    if let Some(&v) = table.get(idx) {
        return v;
    }
    (n..).find(|&m| is_smooth(m)).unwrap_or(n)
}

pub fn is_smooth(mut n: usize) -> bool {
    if n == 0 {
        return false;
    }
    for p in SMOOTH_PRIMES {
        while n % p == 0 {
            n /= p;
        }
    }
    n == 1
}

fn smooth_table() -> &'static [usize] {
    static TABLE: OnceLock<Vec<usize>> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut values = vec![1usize];
        for p in SMOOTH_PRIMES {
            let mut next = Vec::new();
            for &v in &values {
                let mut m = v;
                while m <= SMOOTH_TABLE_LIMIT {
                    next.push(m);
                    match m.checked_mul(p) {
                        Some(prod) => m = prod,
                        None => break,
                    }
                }
            }
            values = next;
        }
        values.sort_unstable();
        values.dedup();
        values
    })
}
