// GPU backend tests (require `gpu` feature). Each test returns early when no
// adapter is available.
#![cfg(feature = "gpu")]

mod common;

use std::sync::Arc;

use ndarray::Array3;

use common::{download, ramp_volume, upload};
use decon_core::compute::cpu::CpuBackend;
use decon_core::compute::{create_backend, ComputeBackend, DevicePreference};
use decon_core::volume::{Dims3, ElementType, Volume};

fn gpu_backend() -> Option<Arc<dyn ComputeBackend>> {
    let backend = create_backend(&DevicePreference::Gpu);
    backend.is_gpu().then_some(backend)
}

#[test]
fn gpu_sum_matches_cpu_sum() {
    let Some(backend) = gpu_backend() else {
        return;
    };
    let backend = backend.as_ref();

    // Not a multiple of the workgroup size, so the last group is partial.
    let vol = ramp_volume(Dims3::new(37, 19, 11));
    let expected = CpuBackend
        .sum_of_all_voxels(&upload(&CpuBackend, &vol))
        .unwrap();

    let mut buf = upload(backend, &vol);
    let got = backend.sum_of_all_voxels(&buf).unwrap();
    assert!((got - expected).abs() <= expected * 1e-5, "{got} vs {expected}");
    backend.release(&mut buf);
}

#[test]
fn gpu_sum_of_filled_volume() {
    let Some(backend) = gpu_backend() else {
        return;
    };
    let backend = backend.as_ref();

    let dims = Dims3::new(64, 64, 17);
    let mut buf = backend.create(dims, ElementType::F32).unwrap();
    backend.fill(&mut buf, 0.5).unwrap();
    let got = backend.sum_of_all_voxels(&buf).unwrap();
    assert!((got - 0.5 * dims.voxel_count() as f64).abs() < 1e-3);
    backend.release(&mut buf);
}

#[test]
fn gpu_scale_and_readback() {
    let Some(backend) = gpu_backend() else {
        return;
    };
    let backend = backend.as_ref();

    let vol = Volume::from_f32(Array3::from_elem((3, 4, 5), 2.0));
    let src = upload(backend, &vol);
    let mut dst = backend.create_like(&src).unwrap();
    backend.multiply_scalar(&src, &mut dst, 0.25).unwrap();
    assert!(download(backend, &dst).iter().all(|&v| v == 0.5));
}
