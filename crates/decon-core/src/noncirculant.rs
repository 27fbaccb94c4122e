//! Boundary correction for deconvolving extended images.
//!
//! Convolving an indicator of the original image region with the kernel
//! gives, for every voxel of the canvas, the fraction of kernel mass that
//! falls on real data. The solver divides its update by this factor so
//! voxels near the border are not dimmed by the padding.

use tracing::debug;

use crate::buffers::ScopedBuffer;
use crate::compute::{ComputeBackend, DeviceBuffer};
use crate::convolve::{convolve, KernelLayout};
use crate::error::{DeconError, Result};
use crate::geometry::PaddedGeometry;
use crate::volume::ElementType;

/// Build the normalization factor for `geometry` from a kernel that is
/// already shifted into the extended canvas.
///
/// Values lie in `[0, 1]` up to FFT round-off for a normalized kernel.
pub fn normalization_factor(
    backend: &dyn ComputeBackend,
    geometry: &PaddedGeometry,
    shifted_kernel: &DeviceBuffer,
) -> Result<DeviceBuffer> {
    if shifted_kernel.dims() != geometry.extended {
        return Err(DeconError::InvalidDimensions(format!(
            "shifted kernel {} does not match canvas {}",
            shifted_kernel.dims(),
            geometry.extended
        )));
    }
    debug!(
        original = %geometry.original,
        extended = %geometry.extended,
        offset = %geometry.offset(),
        "Building non-circulant normalization factor"
    );

    let mut mask = ScopedBuffer::create(backend, geometry.extended, ElementType::F32)?;
    {
        let mut ones = ScopedBuffer::create(backend, geometry.original, ElementType::F32)?;
        backend.fill(&mut ones, 1.0)?;
        backend.paste(&ones, &mut mask, geometry.offset())?;
    }

    let mut factor = ScopedBuffer::create(backend, geometry.extended, ElementType::F32)?;
    convolve(backend, &mask, shifted_kernel, &mut factor, KernelLayout::Shifted)?;
    Ok(factor.into_inner())
}
