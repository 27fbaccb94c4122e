use ndarray::{Array3, Zip};

use crate::consts::{PARALLEL_VOXEL_THRESHOLD, TV_DENOMINATOR_FLOOR, TV_GRADIENT_FLOOR};

/// Per-voxel total-variation factor `1 / (1 - lambda * div(grad u / |grad u|))`
/// (Dey et al., 2006).
///
/// Gradients use forward differences, the divergence backward differences,
/// both with zero flux across the volume border.
pub fn tv_factor(estimate: &Array3<f32>, lambda: f32) -> Array3<f32> {
    let (nz, ny, nx) = estimate.dim();
    let parallel = estimate.len() >= PARALLEL_VOXEL_THRESHOLD;

    let unit_gradient = |(z, y, x): (usize, usize, usize)| -> [f32; 3] {
        let u = estimate[[z, y, x]];
        let gx = if x + 1 < nx { estimate[[z, y, x + 1]] - u } else { 0.0 };
        let gy = if y + 1 < ny { estimate[[z, y + 1, x]] - u } else { 0.0 };
        let gz = if z + 1 < nz { estimate[[z + 1, y, x]] - u } else { 0.0 };
        let norm = (gx * gx + gy * gy + gz * gz).sqrt().max(TV_GRADIENT_FLOOR);
        [gx / norm, gy / norm, gz / norm]
    };

    let mut field = Array3::<[f32; 3]>::from_elem(estimate.dim(), [0.0; 3]);
    if parallel {
        Zip::indexed(&mut field).par_for_each(|idx, g| *g = unit_gradient(idx));
    } else {
        Zip::indexed(&mut field).for_each(|idx, g| *g = unit_gradient(idx));
    }

    let factor = |(z, y, x): (usize, usize, usize)| -> f32 {
        let [fx, fy, fz] = field[[z, y, x]];
        let mut div = fx + fy + fz;
        if x > 0 {
            div -= field[[z, y, x - 1]][0];
        }
        if y > 0 {
            div -= field[[z, y - 1, x]][1];
        }
        if z > 0 {
            div -= field[[z - 1, y, x]][2];
        }
        1.0 / (1.0 - lambda * div).max(TV_DENOMINATOR_FLOOR)
    };

    let mut out = Array3::<f32>::zeros(estimate.dim());
    if parallel {
        Zip::indexed(&mut out).par_for_each(|idx, o| *o = factor(idx));
    } else {
        Zip::indexed(&mut out).for_each(|idx, o| *o = factor(idx));
    }
    out
}
