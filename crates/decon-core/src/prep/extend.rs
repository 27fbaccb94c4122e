use ndarray::{Array3, Zip};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::buffers::ScopedBuffer;
use crate::compute::{ComputeBackend, DeviceBuffer};
use crate::consts::PARALLEL_VOXEL_THRESHOLD;
use crate::error::Result;
use crate::geometry::{extended_dims, ExtensionSize, PaddedGeometry};
use crate::volume::Volume;

/// How the region around the original image is filled when extending.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Boundary {
    /// Reflect the image across each face without repeating the edge voxel.
    #[default]
    Mirror,
    /// Constant zero background.
    ZeroFill,
}

/// Extend `image` to a canvas large enough to convolve it with `kernel`
/// without circular wrap-around reaching the original data.
///
/// The image is centered at [`PaddedGeometry::offset`]. Returns a new buffer
/// owned by the caller; the inputs are not modified.
pub fn extend(
    backend: &dyn ComputeBackend,
    image: &DeviceBuffer,
    kernel: &DeviceBuffer,
    boundary: Boundary,
    sizing: ExtensionSize,
) -> Result<DeviceBuffer> {
    let image_dims = image.dims();
    image_dims.ensure_non_empty()?;
    kernel.dims().ensure_non_empty()?;

    let geometry = PaddedGeometry::new(
        image_dims,
        extended_dims(image_dims, kernel.dims(), sizing),
    )?;
    debug!(
        original = %geometry.original,
        extended = %geometry.extended,
        offset = %geometry.offset(),
        ?boundary,
        "Extending image"
    );

    match boundary {
        Boundary::Mirror => extend_mirror(backend, image, &geometry),
        Boundary::ZeroFill => extend_constant(backend, image, &geometry, 0.0),
    }
}

/// Mirror extension runs on the host: the image is read back, padded and
/// uploaded as a new buffer.
fn extend_mirror(
    backend: &dyn ComputeBackend,
    image: &DeviceBuffer,
    geometry: &PaddedGeometry,
) -> Result<DeviceBuffer> {
    let host = backend.download(image)?;
    let padded = mirror_pad(&host, geometry);
    backend.upload(&Volume::new(padded, image.element_type()))
}

fn extend_constant(
    backend: &dyn ComputeBackend,
    image: &DeviceBuffer,
    geometry: &PaddedGeometry,
    background: f32,
) -> Result<DeviceBuffer> {
    let mut canvas = ScopedBuffer::create(backend, geometry.extended, image.element_type())?;
    if background != 0.0 {
        backend.fill(&mut canvas, background)?;
    }
    backend.paste(image, &mut canvas, geometry.offset())?;
    Ok(canvas.into_inner())
}

/// Pad `data` to `geometry.extended` by single-boundary reflection.
pub fn mirror_pad(data: &Array3<f32>, geometry: &PaddedGeometry) -> Array3<f32> {
    let (d, h, w) = data.dim();
    let o = geometry.offset();
    let sample = |(z, y, x): (usize, usize, usize)| {
        let sz = mirror_index(z as isize - o.z as isize, d);
        let sy = mirror_index(y as isize - o.y as isize, h);
        let sx = mirror_index(x as isize - o.x as isize, w);
        data[[sz, sy, sx]]
    };

    let mut out = Array3::<f32>::zeros(geometry.extended.shape());
    if out.len() >= PARALLEL_VOXEL_THRESHOLD {
        Zip::indexed(&mut out).par_for_each(|idx, v| *v = sample(idx));
    } else {
        Zip::indexed(&mut out).for_each(|idx, v| *v = sample(idx));
    }
    out
}

/// Reflect `idx` into `[0, len)` without repeating the edge sample:
/// `-1 -> 1`, `len -> len - 2`. Periodic with period `2 * (len - 1)`, so any
/// distance outside the range is valid.
pub fn mirror_index(idx: isize, len: usize) -> usize {
    if len <= 1 {
        return 0;
    }
    let period = 2 * (len as isize - 1);
    let m = idx.rem_euclid(period);
    if m >= len as isize {
        (period - m) as usize
    } else {
        m as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::volume::Dims3;

    #[test]
    fn mirror_index_reflects_without_repeating_edge() {
        let got: Vec<usize> = (-4..9).map(|i| mirror_index(i, 5)).collect();
        assert_eq!(got, vec![4, 3, 2, 1, 0, 1, 2, 3, 4, 3, 2, 1, 0]);
    }

    #[test]
    fn mirror_index_far_outside_range() {
        assert_eq!(mirror_index(-9, 3), 1);
        assert_eq!(mirror_index(10, 3), 2);
        assert_eq!(mirror_index(-7, 1), 0);
    }

    #[test]
    fn mirror_pad_keeps_center_and_reflects_border() {
        let data = Array3::from_shape_fn((1, 1, 4), |(_, _, x)| x as f32);
        let g = PaddedGeometry::new(Dims3::new(4, 1, 1), Dims3::new(8, 1, 1)).unwrap();
        let out = mirror_pad(&data, &g);
        let row: Vec<f32> = out.iter().copied().collect();
        assert_eq!(row, vec![2.0, 1.0, 0.0, 1.0, 2.0, 3.0, 2.0, 1.0]);
    }
}
