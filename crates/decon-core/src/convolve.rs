use tracing::debug;

use crate::buffers::ScopedBuffer;
use crate::compute::{ComputeBackend, DeviceBuffer};
use crate::error::{DeconError, Result};
use crate::geometry::ExtensionSize;
use crate::prep::{crop_extended, extend, shift_kernel, Boundary};

/// Where the kernel's center sits in its buffer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum KernelLayout {
    /// Same dims as the image, center at voxel (0, 0, 0).
    Shifted,
    /// A regular PSF with its center in the middle of the buffer.
    #[default]
    Centered,
}

/// FFT convolution of `image` with `kernel`, written into `dst`.
///
/// With [`KernelLayout::Shifted`] the kernel is used as is and the result
/// is circular. With [`KernelLayout::Centered`] the image is zero-extended,
/// the kernel is shifted into the extended canvas and the valid region is
/// cropped back out, so `dst` never sees wrap-around.
pub fn convolve(
    backend: &dyn ComputeBackend,
    image: &DeviceBuffer,
    kernel: &DeviceBuffer,
    dst: &mut DeviceBuffer,
    layout: KernelLayout,
) -> Result<()> {
    if dst.dims() != image.dims() {
        return Err(DeconError::InvalidDimensions(format!(
            "convolution output {} does not match image {}",
            dst.dims(),
            image.dims()
        )));
    }

    match layout {
        KernelLayout::Shifted => backend.convolve_circular(image, kernel, dst),
        KernelLayout::Centered => {
            let extended = ScopedBuffer::new(
                backend,
                extend(backend, image, kernel, Boundary::ZeroFill, ExtensionSize::Smooth)?,
            );
            debug!(canvas = %extended.dims(), kernel = %kernel.dims(), "Convolving with centered kernel");
            let shifted = ScopedBuffer::new(backend, shift_kernel(backend, kernel, extended.dims())?);
            let mut result = ScopedBuffer::create_like(backend, &extended)?;
            backend.convolve_circular(&extended, &shifted, &mut result)?;
            crop_extended(backend, &result, dst)
        }
    }
}
