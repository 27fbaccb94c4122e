use std::fs::File;
use std::io::BufWriter;

use ndarray::Array3;
use tempfile::TempDir;
use tiff::encoder::{colortype, TiffEncoder};

use decon_core::error::DeconError;
use decon_core::io::{load_volume, save_volume};
use decon_core::volume::{Dims3, ElementType, Volume};

#[test]
fn test_tiff_stack_roundtrip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("stack.tiff");
    let data = Array3::from_shape_fn((4, 5, 6), |(z, y, x)| x as f32 * 0.5 + y as f32 - z as f32);
    let volume = Volume::from_f32(data.clone());

    save_volume(&volume, &path).unwrap();
    let loaded = load_volume(&path).unwrap();

    assert_eq!(loaded.dims(), Dims3::new(6, 5, 4));
    assert_eq!(loaded.element_type, ElementType::F32);
    assert_eq!(loaded.data, data);
}

#[test]
fn test_u16_stack_keeps_integer_tag() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("counts.tif");
    {
        let mut encoder = TiffEncoder::new(BufWriter::new(File::create(&path).unwrap())).unwrap();
        for z in 0..3u16 {
            let page: Vec<u16> = (0..8u16).map(|i| 1000 * z + i).collect();
            encoder
                .write_image::<colortype::Gray16>(4, 2, &page)
                .unwrap();
        }
    }

    let loaded = load_volume(&path).unwrap();
    assert_eq!(loaded.element_type, ElementType::U16);
    assert_eq!(loaded.dims(), Dims3::new(4, 2, 3));
    assert_eq!(loaded.data[[2, 1, 3]], 2007.0);
}

#[test]
fn test_png_loads_as_single_slice() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("slice.png");
    let img = image::GrayImage::from_fn(5, 3, |x, y| image::Luma([(x + 10 * y) as u8]));
    img.save(&path).unwrap();

    let loaded = load_volume(&path).unwrap();
    assert_eq!(loaded.dims(), Dims3::new(5, 3, 1));
    assert_eq!(loaded.element_type, ElementType::U8);
    assert_eq!(loaded.data[[0, 2, 4]], 24.0);
}

#[test]
fn test_unknown_extension_is_rejected() {
    let dir = TempDir::new().unwrap();
    let volume = Volume::zeros(Dims3::cube(2));
    let err = save_volume(&volume, &dir.path().join("out.raw")).unwrap_err();
    assert!(matches!(err, DeconError::UnsupportedFormat(_)));
    assert!(matches!(
        load_volume(&dir.path().join("in.raw")),
        Err(DeconError::UnsupportedFormat(_))
    ));
}

#[test]
fn test_missing_file_is_io_error() {
    let dir = TempDir::new().unwrap();
    let err = load_volume(&dir.path().join("missing.tiff")).unwrap_err();
    assert!(matches!(err, DeconError::Io(_)));
}

#[test]
fn test_color_png_loads_as_float_luma_slice() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("color.png");
    let img = image::RgbImage::from_fn(7, 2, |_, _| image::Rgb([255, 255, 255]));
    img.save(&path).unwrap();

    let loaded = load_volume(&path).unwrap();
    assert_eq!(loaded.dims(), Dims3::new(7, 2, 1));
    assert_eq!(loaded.element_type, ElementType::F32);
    assert!(loaded.data.iter().all(|&v| (v - 1.0).abs() < 1e-4));
}

#[test]
fn test_single_page_tiff_is_depth_one() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("plane.tif");
    {
        let mut encoder = TiffEncoder::new(BufWriter::new(File::create(&path).unwrap())).unwrap();
        let page: Vec<u8> = (0..12u8).collect();
        encoder.write_image::<colortype::Gray8>(3, 4, &page).unwrap();
    }

    let loaded = load_volume(&path).unwrap();
    assert_eq!(loaded.dims(), Dims3::new(3, 4, 1));
    assert_eq!(loaded.element_type, ElementType::U8);
    assert_eq!(loaded.data[[0, 3, 2]], 11.0);
}
