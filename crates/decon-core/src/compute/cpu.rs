use ndarray::{s, Array3, ArrayView3, ArrayViewMut3, Zip};
use rayon::prelude::*;

use crate::consts::PARALLEL_VOXEL_THRESHOLD;
use crate::error::{DeconError, Result};
use crate::solver::richardson_lucy::{self, RichardsonLucyInputs};
use crate::volume::{Dims3, ElementType, Offset3, Volume};

use super::fft3d;
use super::{BufferInner, ComputeBackend, DeviceBuffer, IterationRequest};

/// CPU backend using ndarray storage and Rayon for parallelism.
pub struct CpuBackend;

impl ComputeBackend for CpuBackend {
    fn name(&self) -> &str {
        "CPU/Rayon"
    }

    fn create(&self, dims: Dims3, element_type: ElementType) -> Result<DeviceBuffer> {
        dims.ensure_non_empty()?;
        Ok(DeviceBuffer::from_array(
            Array3::zeros(dims.shape()),
            element_type,
        ))
    }

    fn release(&self, buffer: &mut DeviceBuffer) {
        buffer.mark_released();
    }

    fn upload(&self, volume: &Volume) -> Result<DeviceBuffer> {
        volume.dims().ensure_non_empty()?;
        Ok(DeviceBuffer::from_array(
            volume.data.clone(),
            volume.element_type,
        ))
    }

    fn download(&self, buffer: &DeviceBuffer) -> Result<Array3<f32>> {
        Ok(cpu_array(buffer)?.clone())
    }

    fn convert_to_f32(&self, src: &DeviceBuffer) -> Result<DeviceBuffer> {
        Ok(DeviceBuffer::from_array(
            cpu_array(src)?.clone(),
            ElementType::F32,
        ))
    }

    fn copy(&self, src: &DeviceBuffer, dst: &mut DeviceBuffer) -> Result<()> {
        ensure_same_dims("copy", src, dst)?;
        let src = cpu_array(src)?;
        cpu_array_mut(dst)?.assign(src);
        Ok(())
    }

    fn crop(&self, src: &DeviceBuffer, dst: &mut DeviceBuffer, offset: Offset3) -> Result<()> {
        let block = dst.dims();
        ensure_fits("crop", &block, offset, &src.dims())?;
        let view = block_view(cpu_array(src)?.view(), block, offset);
        cpu_array_mut(dst)?.assign(&view);
        Ok(())
    }

    fn paste(&self, src: &DeviceBuffer, dst: &mut DeviceBuffer, offset: Offset3) -> Result<()> {
        let block = src.dims();
        ensure_fits("paste", &block, offset, &dst.dims())?;
        let src = cpu_array(src)?;
        block_view_mut(cpu_array_mut(dst)?.view_mut(), block, offset).assign(src);
        Ok(())
    }

    fn sum_of_all_voxels(&self, buffer: &DeviceBuffer) -> Result<f64> {
        let data = cpu_array(buffer)?;
        Ok(sum_f64(data))
    }

    fn multiply_scalar(
        &self,
        src: &DeviceBuffer,
        dst: &mut DeviceBuffer,
        factor: f32,
    ) -> Result<()> {
        ensure_same_dims("multiply_scalar", src, dst)?;
        let src = cpu_array(src)?;
        let dst = cpu_array_mut(dst)?;
        if src.len() >= PARALLEL_VOXEL_THRESHOLD {
            Zip::from(dst).and(src).par_for_each(|d, &s| *d = s * factor);
        } else {
            Zip::from(dst).and(src).for_each(|d, &s| *d = s * factor);
        }
        Ok(())
    }

    fn fill(&self, buffer: &mut DeviceBuffer, value: f32) -> Result<()> {
        cpu_array_mut(buffer)?.fill(value);
        Ok(())
    }

    fn convolve_circular(
        &self,
        image: &DeviceBuffer,
        kernel: &DeviceBuffer,
        dst: &mut DeviceBuffer,
    ) -> Result<()> {
        ensure_same_dims("convolve", image, kernel)?;
        ensure_same_dims("convolve", image, dst)?;
        let result = fft3d::convolve_circular(cpu_array(image)?, cpu_array(kernel)?);
        cpu_array_mut(dst)?.assign(&result);
        Ok(())
    }

    fn run_iterations(&self, request: IterationRequest<'_>) -> Result<()> {
        request.validate()?;
        let inputs = RichardsonLucyInputs {
            image: cpu_array(request.image)?,
            kernel: cpu_array(request.kernel)?,
            normalization: request.normalization.map(cpu_array).transpose()?,
            iterations: request.iterations,
            regularization: request.regularization,
        };
        richardson_lucy::run_iterations(&inputs, cpu_array_mut(request.estimate)?);
        Ok(())
    }
}

/// Sum in f64, split across threads for large volumes.
fn sum_f64(data: &Array3<f32>) -> f64 {
    match data.as_slice_memory_order() {
        Some(slice) if slice.len() >= PARALLEL_VOXEL_THRESHOLD => {
            slice.par_iter().map(|&v| v as f64).sum()
        }
        _ => data.iter().map(|&v| v as f64).sum(),
    }
}

// ---------------------------------------------------------------------------
// Helpers: extract CPU storage from a buffer
// ---------------------------------------------------------------------------

fn cpu_array(buf: &DeviceBuffer) -> Result<&Array3<f32>> {
    match &buf.inner {
        BufferInner::Cpu(arr) => Ok(arr),
        BufferInner::Released => Err(released(buf)),
        #[cfg(feature = "gpu")]
        _ => Err(DeconError::DeviceResource(
            "CpuBackend received a GPU buffer".into(),
        )),
    }
}

fn cpu_array_mut(buf: &mut DeviceBuffer) -> Result<&mut Array3<f32>> {
    let dims = buf.dims();
    match &mut buf.inner {
        BufferInner::Cpu(arr) => Ok(arr),
        BufferInner::Released => Err(DeconError::DeviceResource(format!(
            "buffer {dims} used after release"
        ))),
        #[cfg(feature = "gpu")]
        _ => Err(DeconError::DeviceResource(
            "CpuBackend received a GPU buffer".into(),
        )),
    }
}

fn released(buf: &DeviceBuffer) -> DeconError {
    DeconError::DeviceResource(format!("buffer {} used after release", buf.dims()))
}

// ---------------------------------------------------------------------------
// Shape checks and block views (shared with the GPU backend's host paths)
// ---------------------------------------------------------------------------

pub(crate) fn ensure_same_dims(op: &str, a: &DeviceBuffer, b: &DeviceBuffer) -> Result<()> {
    if a.dims() != b.dims() {
        return Err(DeconError::InvalidDimensions(format!(
            "{op}: buffer dims differ ({} vs {})",
            a.dims(),
            b.dims()
        )));
    }
    Ok(())
}

pub(crate) fn ensure_fits(op: &str, block: &Dims3, offset: Offset3, outer: &Dims3) -> Result<()> {
    if !offset.fits(block, outer) {
        return Err(DeconError::InvalidDimensions(format!(
            "{op}: block {block} at {offset} exceeds volume {outer}"
        )));
    }
    Ok(())
}

fn block_view(view: ArrayView3<'_, f32>, block: Dims3, o: Offset3) -> ArrayView3<'_, f32> {
    view.slice_move(s![
        o.z..o.z + block.depth,
        o.y..o.y + block.height,
        o.x..o.x + block.width
    ])
}

fn block_view_mut(
    view: ArrayViewMut3<'_, f32>,
    block: Dims3,
    o: Offset3,
) -> ArrayViewMut3<'_, f32> {
    view.slice_move(s![
        o.z..o.z + block.depth,
        o.y..o.y + block.height,
        o.x..o.x + block.width
    ])
}
