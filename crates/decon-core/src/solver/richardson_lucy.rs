use ndarray::{Array3, Zip};
use tracing::{debug, trace};

use crate::compute::fft3d::{multiply_spectra, Fft3dPlan};
use crate::consts::{EPSILON, NORMALIZATION_THRESHOLD, PARALLEL_VOXEL_THRESHOLD};

use super::total_variation::tv_factor;

/// Read-only inputs of one solver call. All arrays share one shape.
pub struct RichardsonLucyInputs<'a> {
    /// Observed (extended) image.
    pub image: &'a Array3<f32>,
    /// Normalized kernel with its origin at (0, 0, 0).
    pub kernel: &'a Array3<f32>,
    /// Optional non-circulant normalization factor.
    pub normalization: Option<&'a Array3<f32>>,
    pub iterations: usize,
    /// Total-variation weight; 0 disables the TV term.
    pub regularization: f32,
}

/// Run `inputs.iterations` multiplicative updates on `estimate`.
///
/// Each step reblurs the estimate, takes the ratio against the observed
/// image, correlates the ratio with the kernel and multiplies it into the
/// estimate. With a regularization weight the update is divided by
/// `1 - lambda * div(grad u / |grad u|)`; with a normalization factor it is
/// divided by the factor, and voxels where the factor vanishes are zeroed.
pub fn run_iterations(inputs: &RichardsonLucyInputs<'_>, estimate: &mut Array3<f32>) {
    if inputs.iterations == 0 {
        return;
    }

    let plan = Fft3dPlan::new(inputs.image.dim());
    let otf = plan.forward_real(inputs.kernel);
    let inverse_normal = inputs.normalization.map(invert_normalization);
    let parallel = estimate.len() >= PARALLEL_VOXEL_THRESHOLD;

    debug!(
        iterations = inputs.iterations,
        regularization = inputs.regularization,
        non_circulant = inputs.normalization.is_some(),
        shape = ?plan.shape(),
        "Richardson-Lucy start"
    );

    for iteration in 0..inputs.iterations {
        // reblurred = IFFT(FFT(estimate) * OTF)
        let mut spectrum = plan.forward_real(estimate);
        multiply_spectra(&mut spectrum, &otf, false);
        let reblurred = plan.inverse_real(spectrum);

        let ratio = observed_ratio(inputs.image, &reblurred, parallel);

        // correction = IFFT(FFT(ratio) * conj(OTF))
        let mut spectrum = plan.forward_real(&ratio);
        multiply_spectra(&mut spectrum, &otf, true);
        let mut correction = plan.inverse_real(spectrum);

        if inputs.regularization > 0.0 {
            let tv = tv_factor(estimate, inputs.regularization);
            correction *= &tv;
        }
        if let Some(ref inv) = inverse_normal {
            correction *= inv;
        }

        if parallel {
            Zip::from(&mut *estimate)
                .and(&correction)
                .par_for_each(|e, &c| *e *= c);
        } else {
            Zip::from(&mut *estimate)
                .and(&correction)
                .for_each(|e, &c| *e *= c);
        }

        trace!(iteration, "Richardson-Lucy step done");
    }
}

fn observed_ratio(observed: &Array3<f32>, reblurred: &Array3<f32>, parallel: bool) -> Array3<f32> {
    let ratio = |&o: &f32, &r: &f32| if r > EPSILON { o / r } else { 0.0 };
    let zip = Zip::from(observed).and(reblurred);
    if parallel {
        zip.par_map_collect(ratio)
    } else {
        zip.map_collect(ratio)
    }
}

/// `1 / n` where the factor is meaningful, 0 elsewhere.
fn invert_normalization(normal: &Array3<f32>) -> Array3<f32> {
    normal.mapv(|n| {
        if n > NORMALIZATION_THRESHOLD {
            1.0 / n
        } else {
            0.0
        }
    })
}
