use tracing::debug;

use crate::buffers::ScopedBuffer;
use crate::compute::{ComputeBackend, DeviceBuffer};
use crate::error::{DeconError, Result};

/// Scale `kernel` so its voxels sum to one. Returns a new buffer; the input
/// is left unchanged.
pub fn normalize_kernel(backend: &dyn ComputeBackend, kernel: &DeviceBuffer) -> Result<DeviceBuffer> {
    let factor = inverse_sum(backend, kernel)?;
    let mut dst = ScopedBuffer::create_like(backend, kernel)?;
    backend.multiply_scalar(kernel, &mut dst, factor)?;
    Ok(dst.into_inner())
}

/// Like [`normalize_kernel`], writing into a caller-owned buffer of the same
/// dims.
pub fn normalize_into(
    backend: &dyn ComputeBackend,
    kernel: &DeviceBuffer,
    dst: &mut DeviceBuffer,
) -> Result<()> {
    let factor = inverse_sum(backend, kernel)?;
    backend.multiply_scalar(kernel, dst, factor)
}

fn inverse_sum(backend: &dyn ComputeBackend, kernel: &DeviceBuffer) -> Result<f32> {
    let sum = backend.sum_of_all_voxels(kernel)?;
    // A tiny but nonzero sum still overflows once the factor is narrowed to f32.
    let factor = (1.0 / sum) as f32;
    if sum == 0.0 || !sum.is_finite() || !factor.is_finite() {
        return Err(DeconError::DegenerateKernel { sum });
    }
    debug!(dims = %kernel.dims(), sum, factor, "Normalizing kernel");
    Ok(factor)
}
