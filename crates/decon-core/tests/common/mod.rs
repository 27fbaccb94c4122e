#![allow(dead_code)]

use std::sync::atomic::{AtomicIsize, AtomicUsize, Ordering};

use ndarray::Array3;

use decon_core::compute::cpu::CpuBackend;
use decon_core::compute::{ComputeBackend, DeviceBuffer, IterationRequest};
use decon_core::error::{DeconError, Result};
use decon_core::volume::{Dims3, ElementType, Offset3, Volume};

/// CPU backend that counts every allocation and release, and can be told
/// to fail the n-th allocation.
pub struct TrackingBackend {
    inner: CpuBackend,
    allocated: AtomicUsize,
    released: AtomicUsize,
    /// Allocations left before the next one fails; negative = never fail.
    budget: AtomicIsize,
}

impl TrackingBackend {
    pub fn new() -> Self {
        Self {
            inner: CpuBackend,
            allocated: AtomicUsize::new(0),
            released: AtomicUsize::new(0),
            budget: AtomicIsize::new(-1),
        }
    }

    pub fn allocated(&self) -> usize {
        self.allocated.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    /// Buffers allocated and not yet released.
    pub fn live(&self) -> usize {
        self.allocated() - self.released()
    }

    /// Let `successes` more allocations through, then fail.
    pub fn fail_after(&self, successes: usize) {
        self.budget.store(successes as isize, Ordering::SeqCst);
    }

    pub fn never_fail(&self) {
        self.budget.store(-1, Ordering::SeqCst);
    }

    fn allocate(&self, make: impl FnOnce() -> Result<DeviceBuffer>) -> Result<DeviceBuffer> {
        let left = self.budget.load(Ordering::SeqCst);
        if left == 0 {
            return Err(DeconError::DeviceResource("injected allocation failure".into()));
        }
        if left > 0 {
            self.budget.store(left - 1, Ordering::SeqCst);
        }
        let buffer = make()?;
        self.allocated.fetch_add(1, Ordering::SeqCst);
        Ok(buffer)
    }
}

impl ComputeBackend for TrackingBackend {
    fn name(&self) -> &str {
        "tracking"
    }

    fn create(&self, dims: Dims3, element_type: ElementType) -> Result<DeviceBuffer> {
        self.allocate(|| self.inner.create(dims, element_type))
    }

    fn release(&self, buffer: &mut DeviceBuffer) {
        if !buffer.is_released() {
            self.released.fetch_add(1, Ordering::SeqCst);
        }
        self.inner.release(buffer);
    }

    fn upload(&self, volume: &Volume) -> Result<DeviceBuffer> {
        self.allocate(|| self.inner.upload(volume))
    }

    fn download(&self, buffer: &DeviceBuffer) -> Result<Array3<f32>> {
        self.inner.download(buffer)
    }

    fn convert_to_f32(&self, src: &DeviceBuffer) -> Result<DeviceBuffer> {
        self.allocate(|| self.inner.convert_to_f32(src))
    }

    fn copy(&self, src: &DeviceBuffer, dst: &mut DeviceBuffer) -> Result<()> {
        self.inner.copy(src, dst)
    }

    fn crop(&self, src: &DeviceBuffer, dst: &mut DeviceBuffer, offset: Offset3) -> Result<()> {
        self.inner.crop(src, dst, offset)
    }

    fn paste(&self, src: &DeviceBuffer, dst: &mut DeviceBuffer, offset: Offset3) -> Result<()> {
        self.inner.paste(src, dst, offset)
    }

    fn sum_of_all_voxels(&self, buffer: &DeviceBuffer) -> Result<f64> {
        self.inner.sum_of_all_voxels(buffer)
    }

    fn multiply_scalar(
        &self,
        src: &DeviceBuffer,
        dst: &mut DeviceBuffer,
        factor: f32,
    ) -> Result<()> {
        self.inner.multiply_scalar(src, dst, factor)
    }

    fn fill(&self, buffer: &mut DeviceBuffer, value: f32) -> Result<()> {
        self.inner.fill(buffer, value)
    }

    fn convolve_circular(
        &self,
        image: &DeviceBuffer,
        kernel: &DeviceBuffer,
        dst: &mut DeviceBuffer,
    ) -> Result<()> {
        self.inner.convolve_circular(image, kernel, dst)
    }

    fn run_iterations(&self, request: IterationRequest<'_>) -> Result<()> {
        self.inner.run_iterations(request)
    }
}

/// Volume whose voxel value encodes its position: `x + 100 y + 10000 z`.
pub fn ramp_volume(dims: Dims3) -> Volume {
    Volume::from_f32(Array3::from_shape_fn(dims.shape(), |(z, y, x)| {
        (x + 100 * y + 10_000 * z) as f32
    }))
}

/// Strictly positive smooth-ish test volume.
pub fn positive_volume(dims: Dims3) -> Volume {
    Volume::from_f32(Array3::from_shape_fn(dims.shape(), |(z, y, x)| {
        1.0 + ((x * 7 + y * 3 + z * 5) % 11) as f32 / 10.0
    }))
}

/// Kernel with unique values `1..=N`, so every voxel can be traced.
pub fn numbered_kernel(dims: Dims3) -> Volume {
    let w = dims.width;
    let h = dims.height;
    Volume::from_f32(Array3::from_shape_fn(dims.shape(), |(z, y, x)| {
        (1 + x + w * (y + h * z)) as f32
    }))
}

pub fn upload(backend: &dyn ComputeBackend, volume: &Volume) -> DeviceBuffer {
    backend.upload(volume).expect("upload")
}

pub fn download(backend: &dyn ComputeBackend, buffer: &DeviceBuffer) -> Array3<f32> {
    backend.download(buffer).expect("download")
}
