use tracing::trace;

use crate::buffers::ScopedBuffer;
use crate::compute::{ComputeBackend, DeviceBuffer};
use crate::error::{DeconError, Result};
use crate::volume::{Dims3, ElementType, Offset3};

/// One axis of the octant split: a source range and where it lands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct AxisPart {
    src_start: usize,
    len: usize,
    dst_start: usize,
}

/// Split one kernel axis of length `n` for a destination axis of length
/// `dest`.
///
/// The split point is `n / 2`. The upper part starts at the split, holds the
/// center voxel and moves to the origin; the lower part moves to the far end
/// of the destination. For odd `n` the upper part is one voxel longer.
fn split_axis(n: usize, dest: usize) -> [AxisPart; 2] {
    let half = n / 2;
    [
        AxisPart {
            src_start: 0,
            len: half,
            dst_start: dest - half,
        },
        AxisPart {
            src_start: half,
            len: n - half,
            dst_start: 0,
        },
    ]
}

/// Zero-pad `kernel` to `extended` dims and move its center to voxel
/// (0, 0, 0), the layout frequency-domain convolution expects.
pub fn shift_kernel(
    backend: &dyn ComputeBackend,
    kernel: &DeviceBuffer,
    extended: Dims3,
) -> Result<DeviceBuffer> {
    ensure_kernel_fits(kernel.dims(), extended)?;
    let mut dst = ScopedBuffer::create(backend, extended, ElementType::F32)?;
    shift_kernel_into(backend, kernel, &mut dst)?;
    Ok(dst.into_inner())
}

/// Like [`shift_kernel`], writing into a caller-owned destination.
///
/// The destination is zeroed first. Each of the eight octants of the kernel
/// is cropped into a transient block and pasted into the diagonally opposite
/// corner, so every kernel voxel is written exactly once.
pub fn shift_kernel_into(
    backend: &dyn ComputeBackend,
    kernel: &DeviceBuffer,
    dst: &mut DeviceBuffer,
) -> Result<()> {
    let k = kernel.dims();
    let d = dst.dims();
    ensure_kernel_fits(k, d)?;

    backend.fill(dst, 0.0)?;

    let xs = split_axis(k.width, d.width);
    let ys = split_axis(k.height, d.height);
    let zs = split_axis(k.depth, d.depth);

    for pz in zs {
        for py in ys {
            for px in xs {
                move_octant(backend, kernel, dst, px, py, pz)?;
            }
        }
    }
    Ok(())
}

fn move_octant(
    backend: &dyn ComputeBackend,
    kernel: &DeviceBuffer,
    dst: &mut DeviceBuffer,
    px: AxisPart,
    py: AxisPart,
    pz: AxisPart,
) -> Result<()> {
    let block = Dims3::new(px.len, py.len, pz.len);
    if block.is_empty() {
        return Ok(());
    }
    let from = Offset3::new(px.src_start, py.src_start, pz.src_start);
    let to = Offset3::new(px.dst_start, py.dst_start, pz.dst_start);
    trace!(%block, %from, %to, "Moving kernel octant");

    let mut temp = ScopedBuffer::create(backend, block, kernel.element_type())?;
    backend.crop(kernel, &mut temp, from)?;
    backend.paste(&temp, dst, to)
}

fn ensure_kernel_fits(kernel: Dims3, extended: Dims3) -> Result<()> {
    kernel.ensure_non_empty()?;
    if !extended.contains(&kernel) {
        return Err(DeconError::InvalidDimensions(format!(
            "kernel {kernel} does not fit into canvas {extended}"
        )));
    }
    Ok(())
}
