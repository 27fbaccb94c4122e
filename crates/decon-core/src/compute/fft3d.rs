//! 3-D FFT helpers on ndarray volumes, shared by the CPU backend and the
//! host-side fallbacks of the GPU backend.

use std::sync::Arc;

use ndarray::{Array3, ArrayViewMut1, Axis, Zip};
use num_complex::Complex;
use rustfft::{Fft, FftPlanner};

use crate::consts::PARALLEL_VOXEL_THRESHOLD;

/// Forward and inverse plans for one volume shape, reused across iterations.
pub struct Fft3dPlan {
    shape: (usize, usize, usize),
    forward: [Arc<dyn Fft<f64>>; 3],
    inverse: [Arc<dyn Fft<f64>>; 3],
}

impl Fft3dPlan {
    /// Plan transforms for an ndarray shape `(depth, height, width)`.
    pub fn new(shape: (usize, usize, usize)) -> Self {
        let mut planner = FftPlanner::new();
        let (d, h, w) = shape;
        let forward = [
            planner.plan_fft_forward(d),
            planner.plan_fft_forward(h),
            planner.plan_fft_forward(w),
        ];
        let inverse = [
            planner.plan_fft_inverse(d),
            planner.plan_fft_inverse(h),
            planner.plan_fft_inverse(w),
        ];
        Self {
            shape,
            forward,
            inverse,
        }
    }

    pub fn shape(&self) -> (usize, usize, usize) {
        self.shape
    }

    /// Forward transform of a real volume.
    pub fn forward_real(&self, data: &Array3<f32>) -> Array3<Complex<f64>> {
        let mut spectrum = data.mapv(|v| Complex::new(v as f64, 0.0));
        self.forward(&mut spectrum);
        spectrum
    }

    /// In-place forward transform.
    pub fn forward(&self, data: &mut Array3<Complex<f64>>) {
        for (axis, fft) in self.forward.iter().enumerate() {
            transform_axis(data, axis, fft);
        }
    }

    /// In-place inverse transform, scaled by `1/N`.
    pub fn inverse(&self, data: &mut Array3<Complex<f64>>) {
        for (axis, fft) in self.inverse.iter().enumerate() {
            transform_axis(data, axis, fft);
        }
        let scale = 1.0 / data.len() as f64;
        data.mapv_inplace(|v| v * scale);
    }

    /// Inverse transform keeping the real part as f32.
    pub fn inverse_real(&self, mut spectrum: Array3<Complex<f64>>) -> Array3<f32> {
        self.inverse(&mut spectrum);
        spectrum.mapv(|v| v.re as f32)
    }
}

fn transform_axis(data: &mut Array3<Complex<f64>>, axis: usize, fft: &Arc<dyn Fft<f64>>) {
    let parallel = data.len() >= PARALLEL_VOXEL_THRESHOLD;
    let lanes = data.lanes_mut(Axis(axis));
    if parallel {
        Zip::from(lanes).par_for_each(|lane| process_lane(lane, fft.as_ref()));
    } else {
        Zip::from(lanes).for_each(|lane| process_lane(lane, fft.as_ref()));
    }
}

fn process_lane(mut lane: ArrayViewMut1<Complex<f64>>, fft: &dyn Fft<f64>) {
    if let Some(slice) = lane.as_slice_mut() {
        fft.process(slice);
        return;
    }
    let mut buf = lane.to_vec();
    fft.process(&mut buf);
    lane.iter_mut().zip(buf).for_each(|(dst, src)| *dst = src);
}

/// Element-wise `a * b` (or `a * conj(b)` when `conjugate`), written into `a`.
pub fn multiply_spectra(a: &mut Array3<Complex<f64>>, b: &Array3<Complex<f64>>, conjugate: bool) {
    let parallel = a.len() >= PARALLEL_VOXEL_THRESHOLD;
    let zip = Zip::from(a).and(b);
    match (parallel, conjugate) {
        (true, false) => zip.par_for_each(|x, &y| *x *= y),
        (true, true) => zip.par_for_each(|x, &y| *x *= y.conj()),
        (false, false) => zip.for_each(|x, &y| *x *= y),
        (false, true) => zip.for_each(|x, &y| *x *= y.conj()),
    }
}

/// Circular convolution of two equally shaped real volumes. `kernel` must
/// have its origin at index (0, 0, 0).
pub fn convolve_circular(image: &Array3<f32>, kernel: &Array3<f32>) -> Array3<f32> {
    let plan = Fft3dPlan::new(image.dim());
    let otf = plan.forward_real(kernel);
    let mut spectrum = plan.forward_real(image);
    multiply_spectra(&mut spectrum, &otf, false);
    plan.inverse_real(spectrum)
}
