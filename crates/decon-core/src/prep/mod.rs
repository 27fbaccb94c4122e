//! Preparing image and kernel for frequency-domain deconvolution.
//!
//! Each step takes device buffers through a [`ComputeBackend`](crate::compute::ComputeBackend)
//! and either returns a new buffer owned by the caller or writes into one
//! the caller passes in.

pub mod crop;
pub mod extend;
pub mod normalize;
pub mod shift;

pub use crop::crop_extended;
pub use extend::{extend, mirror_index, mirror_pad, Boundary};
pub use normalize::{normalize_into, normalize_kernel};
pub use shift::{shift_kernel, shift_kernel_into};
