use std::sync::Arc;

use ndarray::Array3;
use serde::{Deserialize, Serialize};

use crate::error::{DeconError, Result};
use crate::volume::{Dims3, ElementType, Offset3, Volume};

use super::cpu::CpuBackend;

/// A volume resident in backend memory.
///
/// Every buffer has exactly one owner, which must hand it back through
/// [`ComputeBackend::release`]. Dimensions never change after creation.
#[derive(Debug)]
pub struct DeviceBuffer {
    pub(crate) inner: BufferInner,
    dims: Dims3,
    element_type: ElementType,
}

#[derive(Debug)]
pub(crate) enum BufferInner {
    Cpu(Array3<f32>),
    #[cfg(feature = "gpu")]
    Wgpu {
        buffer: wgpu::Buffer,
        device: Arc<wgpu::Device>,
        queue: Arc<wgpu::Queue>,
    },
    Released,
}

impl DeviceBuffer {
    pub(crate) fn new(inner: BufferInner, dims: Dims3, element_type: ElementType) -> Self {
        Self {
            inner,
            dims,
            element_type,
        }
    }

    /// Wrap a host array as a CPU-resident buffer.
    pub fn from_array(data: Array3<f32>, element_type: ElementType) -> Self {
        let dims = Dims3::from(data.dim());
        Self::new(BufferInner::Cpu(data), dims, element_type)
    }

    /// A placeholder with no storage, already in the released state.
    pub(crate) fn detached(dims: Dims3, element_type: ElementType) -> Self {
        Self::new(BufferInner::Released, dims, element_type)
    }

    pub fn dims(&self) -> Dims3 {
        self.dims
    }

    pub fn element_type(&self) -> ElementType {
        self.element_type
    }

    pub fn is_released(&self) -> bool {
        matches!(self.inner, BufferInner::Released)
    }

    /// Drop the storage. Calling this twice is a no-op.
    pub(crate) fn mark_released(&mut self) {
        self.inner = BufferInner::Released;
    }
}

/// Inputs for one call of the iterative solver.
///
/// `estimate` is updated in place; the other buffers are only read. All
/// buffers share the extended canvas dims.
pub struct IterationRequest<'a> {
    pub iterations: usize,
    pub regularization: f32,
    pub image: &'a DeviceBuffer,
    pub kernel: &'a DeviceBuffer,
    pub estimate: &'a mut DeviceBuffer,
    pub normalization: Option<&'a DeviceBuffer>,
}

impl IterationRequest<'_> {
    pub fn validate(&self) -> Result<Dims3> {
        let dims = self.image.dims();
        let mut others = vec![("kernel", self.kernel.dims()), ("estimate", self.estimate.dims())];
        if let Some(norm) = self.normalization {
            others.push(("normalization", norm.dims()));
        }
        for (name, d) in others {
            if d != dims {
                return Err(DeconError::InvalidDimensions(format!(
                    "solver {name} buffer is {d}, image is {dims}"
                )));
            }
        }
        Ok(dims)
    }
}

/// Device primitives the deconvolution pipeline is written against.
///
/// Implementations own the storage behind [`DeviceBuffer`]; the pipeline
/// never touches voxel memory directly.
pub trait ComputeBackend: Send + Sync {
    fn name(&self) -> &str;

    fn is_gpu(&self) -> bool {
        false
    }

    /// Allocate a zero-initialised buffer.
    fn create(&self, dims: Dims3, element_type: ElementType) -> Result<DeviceBuffer>;

    /// Allocate a zero-initialised buffer with the shape and type of `like`.
    fn create_like(&self, like: &DeviceBuffer) -> Result<DeviceBuffer> {
        self.create(like.dims(), like.element_type())
    }

    /// Free the storage behind `buffer`. Releasing twice is a no-op.
    fn release(&self, buffer: &mut DeviceBuffer);

    fn upload(&self, volume: &Volume) -> Result<DeviceBuffer>;

    fn download(&self, buffer: &DeviceBuffer) -> Result<Array3<f32>>;

    /// New f32 copy of `src`.
    fn convert_to_f32(&self, src: &DeviceBuffer) -> Result<DeviceBuffer>;

    /// Element-wise copy between buffers of equal dims.
    fn copy(&self, src: &DeviceBuffer, dst: &mut DeviceBuffer) -> Result<()>;

    /// Copy the `dst`-sized block of `src` starting at `offset` into `dst`.
    fn crop(&self, src: &DeviceBuffer, dst: &mut DeviceBuffer, offset: Offset3) -> Result<()>;

    /// Copy all of `src` into `dst` starting at `offset`.
    fn paste(&self, src: &DeviceBuffer, dst: &mut DeviceBuffer, offset: Offset3) -> Result<()>;

    fn sum_of_all_voxels(&self, buffer: &DeviceBuffer) -> Result<f64>;

    /// `dst = src * factor`
    fn multiply_scalar(&self, src: &DeviceBuffer, dst: &mut DeviceBuffer, factor: f32)
        -> Result<()>;

    fn fill(&self, buffer: &mut DeviceBuffer, value: f32) -> Result<()>;

    /// Circular convolution of `image` with a kernel that already has the
    /// same dims and its origin at voxel (0, 0, 0).
    fn convolve_circular(
        &self,
        image: &DeviceBuffer,
        kernel: &DeviceBuffer,
        dst: &mut DeviceBuffer,
    ) -> Result<()>;

    /// Run `request.iterations` Richardson-Lucy updates on `request.estimate`.
    fn run_iterations(&self, request: IterationRequest<'_>) -> Result<()>;
}

/// Which compute device to run on.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DevicePreference {
    #[default]
    Auto,
    Cpu,
    Gpu,
}

/// Build a backend for `preference`, falling back to the CPU when no GPU is
/// available.
pub fn create_backend(preference: &DevicePreference) -> Arc<dyn ComputeBackend> {
    match preference {
        DevicePreference::Cpu => Arc::new(CpuBackend),
        DevicePreference::Auto | DevicePreference::Gpu => gpu_or_cpu(preference),
    }
}

#[cfg(feature = "gpu")]
fn gpu_or_cpu(preference: &DevicePreference) -> Arc<dyn ComputeBackend> {
    match super::wgpu_backend::WgpuBackend::new() {
        Ok(backend) => Arc::new(backend),
        Err(e) => {
            if *preference == DevicePreference::Gpu {
                tracing::warn!("GPU requested but unavailable ({e}), using CPU");
            } else {
                tracing::debug!("No GPU backend ({e}), using CPU");
            }
            Arc::new(CpuBackend)
        }
    }
}

#[cfg(not(feature = "gpu"))]
fn gpu_or_cpu(preference: &DevicePreference) -> Arc<dyn ComputeBackend> {
    if *preference == DevicePreference::Gpu {
        tracing::warn!("Built without the `gpu` feature, using CPU");
    }
    Arc::new(CpuBackend)
}
