use tracing::debug;

use crate::compute::{ComputeBackend, DeviceBuffer};
use crate::error::Result;
use crate::geometry::PaddedGeometry;

/// Copy the central `output`-sized block of `extended` into `output`.
///
/// The block starts at the same offset [`super::extend`] placed the original
/// image at, so cropping undoes extension exactly.
pub fn crop_extended(
    backend: &dyn ComputeBackend,
    extended: &DeviceBuffer,
    output: &mut DeviceBuffer,
) -> Result<()> {
    let geometry = PaddedGeometry::new(output.dims(), extended.dims())?;
    let offset = geometry.offset();
    debug!(from = %geometry.extended, to = %geometry.original, %offset, "Cropping");
    backend.crop(extended, output, offset)
}
