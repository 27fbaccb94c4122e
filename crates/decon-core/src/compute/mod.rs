mod backend;
pub mod cpu;
pub mod fft3d;
#[cfg(feature = "gpu")]
pub mod wgpu_backend;

pub(crate) use backend::BufferInner;
pub use backend::{create_backend, ComputeBackend, DeviceBuffer, DevicePreference, IterationRequest};
