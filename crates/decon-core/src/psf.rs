//! Synthetic point-spread functions.

use ndarray::Array3;

use crate::error::{DeconError, Result};
use crate::volume::{Dims3, Volume};

/// Anisotropic Gaussian PSF centered at voxel `dims / 2`, normalized to sum 1.
///
/// `sigma_xy` applies to the lateral axes and `sigma_z` to depth, both in
/// voxels. A sigma of zero collapses that axis onto the center plane.
pub fn gaussian_psf(dims: Dims3, sigma_xy: f32, sigma_z: f32) -> Result<Volume> {
    dims.ensure_non_empty()?;
    if !(sigma_xy >= 0.0 && sigma_z >= 0.0) {
        return Err(DeconError::InvalidDimensions(format!(
            "PSF sigmas must be non-negative, got xy={sigma_xy} z={sigma_z}"
        )));
    }

    let (cz, cy, cx) = center(dims);
    let weight = |d: f64, sigma: f32| -> f64 {
        if sigma == 0.0 {
            if d == 0.0 {
                1.0
            } else {
                0.0
            }
        } else {
            let s = sigma as f64;
            (-(d * d) / (2.0 * s * s)).exp()
        }
    };

    let mut data = Array3::from_shape_fn(dims.shape(), |(z, y, x)| {
        let wz = weight(z as f64 - cz as f64, sigma_z);
        let wy = weight(y as f64 - cy as f64, sigma_xy);
        let wx = weight(x as f64 - cx as f64, sigma_xy);
        (wz * wy * wx) as f32
    });

    let sum: f64 = data.iter().map(|&v| v as f64).sum();
    if sum > 0.0 {
        let inv = (1.0 / sum) as f32;
        data.mapv_inplace(|v| v * inv);
    }
    Ok(Volume::from_f32(data))
}

/// A single unit voxel at `dims / 2`; deconvolving with it is the identity.
pub fn point_psf(dims: Dims3) -> Result<Volume> {
    dims.ensure_non_empty()?;
    let mut volume = Volume::zeros(dims);
    let (cz, cy, cx) = center(dims);
    volume.data[[cz, cy, cx]] = 1.0;
    Ok(volume)
}

fn center(dims: Dims3) -> (usize, usize, usize) {
    (dims.depth / 2, dims.height / 2, dims.width / 2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gaussian_sums_to_one_and_peaks_at_center() {
        let psf = gaussian_psf(Dims3::new(9, 9, 7), 1.5, 2.0).unwrap();
        assert!((psf.sum() - 1.0).abs() < 1e-5);
        let peak = psf.data[[3, 4, 4]];
        assert!(psf.data.iter().all(|&v| v <= peak));
    }

    #[test]
    fn zero_sigma_is_a_point() {
        let psf = gaussian_psf(Dims3::cube(5), 0.0, 0.0).unwrap();
        assert_eq!(psf.data[[2, 2, 2]], 1.0);
        assert!((psf.sum() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn point_psf_of_even_cube() {
        let psf = point_psf(Dims3::cube(8)).unwrap();
        assert_eq!(psf.data[[4, 4, 4]], 1.0);
        assert_eq!(psf.sum(), 1.0);
    }

    #[test]
    fn negative_sigma_is_rejected() {
        assert!(gaussian_psf(Dims3::cube(5), -1.0, 1.0).is_err());
    }
}
