mod common;

use ndarray::Array3;

use common::{download, ramp_volume, upload};
use decon_core::compute::cpu::CpuBackend;
use decon_core::compute::fft3d::{convolve_circular, Fft3dPlan};
use decon_core::compute::{create_backend, ComputeBackend, DevicePreference, IterationRequest};
use decon_core::error::DeconError;
use decon_core::volume::{Dims3, ElementType, Offset3, Volume};

// ---------------------------------------------------------------------------
// 3-D FFT
// ---------------------------------------------------------------------------

#[test]
fn test_fft3d_roundtrip() {
    let original = Array3::from_shape_fn((6, 10, 15), |(z, y, x)| ((x * y + z) % 13) as f32);
    let plan = Fft3dPlan::new(original.dim());
    let spectrum = plan.forward_real(&original);
    let recovered = plan.inverse_real(spectrum);
    for (a, b) in original.iter().zip(recovered.iter()) {
        assert!((a - b).abs() < 1e-4, "{a} vs {b}");
    }
}

#[test]
fn test_fft3d_roundtrip_parallel_path() {
    // 64^3 is above PARALLEL_VOXEL_THRESHOLD
    let original = Array3::from_shape_fn((64, 64, 64), |(z, y, x)| ((x + 2 * y + 3 * z) % 7) as f32);
    let plan = Fft3dPlan::new(original.dim());
    let recovered = plan.inverse_real(plan.forward_real(&original));
    for (a, b) in original.iter().zip(recovered.iter()) {
        assert!((a - b).abs() < 1e-3);
    }
}

#[test]
fn test_dc_component_is_sum() {
    let data = Array3::from_elem((4, 4, 4), 0.5f32);
    let spectrum = Fft3dPlan::new(data.dim()).forward_real(&data);
    assert!((spectrum[[0, 0, 0]].re - 32.0).abs() < 1e-9);
    assert!(spectrum[[1, 2, 3]].norm() < 1e-9);
}

#[test]
fn test_circular_convolution_with_shifted_delta_translates() {
    let image = Array3::from_shape_fn((4, 5, 6), |(z, y, x)| (x + 10 * y + 100 * z) as f32);
    let mut kernel = Array3::<f32>::zeros((4, 5, 6));
    kernel[[0, 0, 1]] = 1.0;
    let out = convolve_circular(&image, &kernel);
    // out[x] = image[x - 1] with wrap-around
    assert!((out[[2, 3, 1]] - image[[2, 3, 0]]).abs() < 1e-3);
    assert!((out[[2, 3, 0]] - image[[2, 3, 5]]).abs() < 1e-3);
}

// ---------------------------------------------------------------------------
// Buffer primitives
// ---------------------------------------------------------------------------

#[test]
fn test_create_is_zeroed_and_fill_sets_value() {
    let backend = CpuBackend;
    let mut buf = backend.create(Dims3::new(3, 4, 5), ElementType::F32).unwrap();
    assert_eq!(backend.sum_of_all_voxels(&buf).unwrap(), 0.0);
    backend.fill(&mut buf, 2.0).unwrap();
    assert_eq!(backend.sum_of_all_voxels(&buf).unwrap(), 120.0);
}

#[test]
fn test_create_rejects_empty_dims() {
    let backend = CpuBackend;
    assert!(matches!(
        backend.create(Dims3::new(3, 0, 5), ElementType::F32),
        Err(DeconError::InvalidDimensions(_))
    ));
}

#[test]
fn test_crop_and_paste_use_offsets() {
    let backend = CpuBackend;
    let vol = ramp_volume(Dims3::new(6, 5, 4));
    let src = upload(&backend, &vol);

    let mut block = backend.create(Dims3::new(2, 2, 2), ElementType::F32).unwrap();
    backend.crop(&src, &mut block, Offset3::new(3, 1, 2)).unwrap();
    let b = download(&backend, &block);
    assert_eq!(b[[0, 0, 0]], vol.data[[2, 1, 3]]);
    assert_eq!(b[[1, 1, 1]], vol.data[[3, 2, 4]]);

    let mut canvas = backend.create(Dims3::cube(5), ElementType::F32).unwrap();
    backend.paste(&block, &mut canvas, Offset3::new(0, 3, 1)).unwrap();
    let c = download(&backend, &canvas);
    assert_eq!(c[[1, 3, 0]], b[[0, 0, 0]]);
    assert_eq!(c[[2, 4, 1]], b[[1, 1, 1]]);
    assert_eq!(c[[0, 0, 0]], 0.0);
}

#[test]
fn test_out_of_bounds_block_is_rejected() {
    let backend = CpuBackend;
    let src = backend.create(Dims3::cube(4), ElementType::F32).unwrap();
    let mut dst = backend.create(Dims3::cube(2), ElementType::F32).unwrap();
    assert!(matches!(
        backend.crop(&src, &mut dst, Offset3::new(3, 0, 0)),
        Err(DeconError::InvalidDimensions(_))
    ));
    let mut small = backend.create(Dims3::cube(3), ElementType::F32).unwrap();
    assert!(backend.paste(&src, &mut small, Offset3::ORIGIN).is_err());
}

#[test]
fn test_multiply_scalar_and_copy() {
    let backend = CpuBackend;
    let src = upload(&backend, &ramp_volume(Dims3::new(4, 3, 2)));
    let mut dst = backend.create_like(&src).unwrap();
    backend.multiply_scalar(&src, &mut dst, 0.5).unwrap();
    let mut copy = backend.create_like(&src).unwrap();
    backend.copy(&dst, &mut copy).unwrap();
    let expected = download(&backend, &src).mapv(|v| v * 0.5);
    assert_eq!(download(&backend, &copy), expected);

    let mut wrong = backend.create(Dims3::new(4, 3, 3), ElementType::F32).unwrap();
    assert!(backend.copy(&src, &mut wrong).is_err());
}

#[test]
fn test_convert_keeps_values_and_tags_float() {
    let backend = CpuBackend;
    let vol = Volume::new(Array3::from_elem((2, 2, 2), 300.0), ElementType::U16);
    let src = upload(&backend, &vol);
    let converted = backend.convert_to_f32(&src).unwrap();
    assert_eq!(converted.element_type(), ElementType::F32);
    assert_eq!(src.element_type(), ElementType::U16);
    assert_eq!(download(&backend, &converted), vol.data);
}

#[test]
fn test_released_buffer_cannot_be_used() {
    let backend = CpuBackend;
    let mut buf = backend.create(Dims3::cube(2), ElementType::F32).unwrap();
    backend.release(&mut buf);
    assert!(buf.is_released());
    assert_eq!(buf.dims(), Dims3::cube(2));
    // Releasing twice is a no-op
    backend.release(&mut buf);
    assert!(matches!(
        backend.sum_of_all_voxels(&buf),
        Err(DeconError::DeviceResource(_))
    ));
    assert!(backend.fill(&mut buf, 1.0).is_err());
}

#[test]
fn test_run_iterations_rejects_mismatched_buffers() {
    let backend = CpuBackend;
    let image = backend.create(Dims3::cube(4), ElementType::F32).unwrap();
    let kernel = backend.create(Dims3::cube(4), ElementType::F32).unwrap();
    let mut estimate = backend.create(Dims3::cube(5), ElementType::F32).unwrap();
    let err = backend
        .run_iterations(IterationRequest {
            iterations: 1,
            regularization: 0.0,
            image: &image,
            kernel: &kernel,
            estimate: &mut estimate,
            normalization: None,
        })
        .unwrap_err();
    assert!(matches!(err, DeconError::InvalidDimensions(_)));
}

#[test]
fn test_run_iterations_leaves_inputs_untouched() {
    let backend = CpuBackend;
    let image_vol = ramp_volume(Dims3::cube(4)).data.mapv(|v| v + 1.0);
    let image = upload(&backend, &Volume::from_f32(image_vol.clone()));
    let mut kernel_data = Array3::<f32>::zeros((4, 4, 4));
    kernel_data[[0, 0, 0]] = 0.5;
    kernel_data[[0, 0, 1]] = 0.25;
    kernel_data[[0, 0, 3]] = 0.25;
    let kernel = upload(&backend, &Volume::from_f32(kernel_data.clone()));
    let normal = upload(&backend, &Volume::from_f32(Array3::from_elem((4, 4, 4), 0.9)));
    let mut estimate = upload(&backend, &Volume::from_f32(image_vol.clone()));

    backend
        .run_iterations(IterationRequest {
            iterations: 3,
            regularization: 0.001,
            image: &image,
            kernel: &kernel,
            estimate: &mut estimate,
            normalization: Some(&normal),
        })
        .unwrap();

    assert_eq!(download(&backend, &image), image_vol);
    assert_eq!(download(&backend, &kernel), kernel_data);
    assert!(download(&backend, &normal).iter().all(|&v| v == 0.9));
    assert!(download(&backend, &estimate).iter().all(|v| v.is_finite()));
}

#[test]
fn test_cpu_preference_creates_cpu_backend() {
    let backend = create_backend(&DevicePreference::Cpu);
    assert!(!backend.is_gpu());
    assert_eq!(backend.name(), "CPU/Rayon");
}

#[test]
fn test_sum_of_large_volume_matches_serial_sum() {
    let backend = CpuBackend;
    let dims = Dims3::cube(64);
    let vol = ramp_volume(dims);
    let buf = upload(&backend, &vol);

    let expected: f64 = vol.data.iter().map(|&v| v as f64).sum();
    let got = backend.sum_of_all_voxels(&buf).unwrap();
    assert!((got - expected).abs() <= expected.abs() * 1e-12, "{got} vs {expected}");

    let ones = upload(&backend, &Volume::from_f32(Array3::ones(dims.shape())));
    assert_eq!(backend.sum_of_all_voxels(&ones).unwrap(), dims.voxel_count() as f64);
}
