use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info};

use crate::buffers::ScopedBuffer;
use crate::compute::{ComputeBackend, DeviceBuffer, IterationRequest};
use crate::config::DeconvolutionParams;
use crate::error::{DeconError, Result};
use crate::geometry::PaddedGeometry;
use crate::noncirculant::normalization_factor;
use crate::prep::{crop_extended, extend, normalize_kernel, shift_kernel};

/// Runs the full deconvolution pipeline on one backend.
///
/// Every intermediate buffer is owned by a [`ScopedBuffer`], so a failure at
/// any step releases what was allocated before it and leaves the output
/// untouched.
pub struct Deconvolver {
    backend: Arc<dyn ComputeBackend>,
}

impl Deconvolver {
    pub fn new(backend: Arc<dyn ComputeBackend>) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &dyn ComputeBackend {
        self.backend.as_ref()
    }

    /// Deconvolve `input` with `psf` and write the result into `output`,
    /// which must have the dims of `input`.
    pub fn deconvolve(
        &self,
        input: &DeviceBuffer,
        psf: &DeviceBuffer,
        output: &mut DeviceBuffer,
        params: &DeconvolutionParams,
    ) -> Result<()> {
        params.validate()?;
        if output.dims() != input.dims() {
            return Err(DeconError::InvalidDimensions(format!(
                "output {} does not match input {}",
                output.dims(),
                input.dims()
            )));
        }

        let start = Instant::now();
        self.run(input, psf, output, params)?;
        info!(
            backend = self.backend.name(),
            dims = %input.dims(),
            iterations = params.iterations,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Deconvolution complete"
        );
        Ok(())
    }

    /// Plain Richardson-Lucy with `iterations` steps: no regularization and
    /// no border correction.
    pub fn deconvolve_basic(
        &self,
        input: &DeviceBuffer,
        psf: &DeviceBuffer,
        output: &mut DeviceBuffer,
        iterations: usize,
    ) -> Result<()> {
        self.deconvolve(
            input,
            psf,
            output,
            &DeconvolutionParams::with_iterations(iterations),
        )
    }

    fn run(
        &self,
        input: &DeviceBuffer,
        psf: &DeviceBuffer,
        output: &mut DeviceBuffer,
        params: &DeconvolutionParams,
    ) -> Result<()> {
        let backend = self.backend();

        let converted_input = to_float(backend, input)?;
        let image = converted_input.as_deref().unwrap_or(input);
        let converted_psf = to_float(backend, psf)?;
        let psf = converted_psf.as_deref().unwrap_or(psf);

        let normalized_psf = ScopedBuffer::new(backend, normalize_kernel(backend, psf)?);

        let extended_image = ScopedBuffer::new(
            backend,
            extend(
                backend,
                image,
                &normalized_psf,
                params.boundary,
                params.sizing,
            )?,
        );
        let geometry = PaddedGeometry::new(image.dims(), extended_image.dims())?;
        debug!(
            original = %geometry.original,
            extended = %geometry.extended,
            kernel = %normalized_psf.dims(),
            "Prepared extended image"
        );

        let mut estimate = ScopedBuffer::create_like(backend, &extended_image)?;
        backend.copy(&extended_image, &mut estimate)?;

        let kernel = ScopedBuffer::new(
            backend,
            shift_kernel(backend, &normalized_psf, geometry.extended)?,
        );

        let normalization = if params.non_circulant {
            Some(ScopedBuffer::new(
                backend,
                normalization_factor(backend, &geometry, &kernel)?,
            ))
        } else {
            None
        };

        backend.run_iterations(IterationRequest {
            iterations: params.iterations,
            regularization: params.regularization,
            image: &extended_image,
            kernel: &kernel,
            estimate: &mut estimate,
            normalization: normalization.as_deref(),
        })?;

        crop_extended(backend, &estimate, output)
    }
}

/// A float copy of `buffer` when it holds integer samples, `None` when it is
/// already float.
fn to_float<'a>(
    backend: &'a dyn ComputeBackend,
    buffer: &DeviceBuffer,
) -> Result<Option<ScopedBuffer<'a>>> {
    if buffer.element_type().is_float() {
        return Ok(None);
    }
    debug!(from = %buffer.element_type(), dims = %buffer.dims(), "Converting to f32");
    Ok(Some(ScopedBuffer::new(
        backend,
        backend.convert_to_f32(buffer)?,
    )))
}
