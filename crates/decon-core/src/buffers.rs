//! Release discipline for transient buffers.
//!
//! Pipeline steps allocate several short-lived buffers. Wrapping each one in
//! a [`ScopedBuffer`] hands it back to the backend when the guard goes out of
//! scope, so an early `?` return releases everything allocated so far.

use std::ops::{Deref, DerefMut};

use crate::compute::{ComputeBackend, DeviceBuffer};
use crate::error::Result;
use crate::volume::{Dims3, ElementType};

/// Owns a [`DeviceBuffer`] and releases it through its backend on drop.
pub struct ScopedBuffer<'a> {
    backend: &'a dyn ComputeBackend,
    buffer: DeviceBuffer,
}

impl<'a> ScopedBuffer<'a> {
    /// Take ownership of an already allocated buffer.
    pub fn new(backend: &'a dyn ComputeBackend, buffer: DeviceBuffer) -> Self {
        Self { backend, buffer }
    }

    pub fn create(
        backend: &'a dyn ComputeBackend,
        dims: Dims3,
        element_type: ElementType,
    ) -> Result<Self> {
        Ok(Self::new(backend, backend.create(dims, element_type)?))
    }

    pub fn create_like(backend: &'a dyn ComputeBackend, like: &DeviceBuffer) -> Result<Self> {
        Ok(Self::new(backend, backend.create_like(like)?))
    }

    /// Hand the buffer to the caller without releasing it.
    pub fn into_inner(mut self) -> DeviceBuffer {
        let dims = self.buffer.dims();
        let element_type = self.buffer.element_type();
        std::mem::replace(&mut self.buffer, DeviceBuffer::detached(dims, element_type))
    }
}

impl Deref for ScopedBuffer<'_> {
    type Target = DeviceBuffer;

    fn deref(&self) -> &DeviceBuffer {
        &self.buffer
    }
}

impl DerefMut for ScopedBuffer<'_> {
    fn deref_mut(&mut self) -> &mut DeviceBuffer {
        &mut self.buffer
    }
}

impl Drop for ScopedBuffer<'_> {
    fn drop(&mut self) {
        if !self.buffer.is_released() {
            self.backend.release(&mut self.buffer);
        }
    }
}
