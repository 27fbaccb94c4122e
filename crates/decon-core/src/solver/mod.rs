//! Richardson-Lucy iteration on host arrays.
//!
//! This is the numeric core behind [`ComputeBackend::run_iterations`]: the
//! pipeline hands it the extended image, the corner-shifted kernel and an
//! estimate to refine in place.
//!
//! [`ComputeBackend::run_iterations`]: crate::compute::ComputeBackend::run_iterations

pub mod richardson_lucy;
pub mod total_variation;
