use std::path::Path;

use image::DynamicImage;
use ndarray::Array3;

use crate::error::{DeconError, Result};
use crate::volume::{Dims3, ElementType, Volume};

/// Load a single 2-D image (PNG, JPEG, ...) as a volume of depth 1.
///
/// 8-bit and 16-bit grayscale images keep their raw sample values; anything
/// else is converted to grayscale float in `[0, 1]`.
pub fn load_image_slice(path: &Path) -> Result<Volume> {
    let img = image::open(path)?;
    let (w, h) = (img.width() as usize, img.height() as usize);

    let (element_type, samples): (ElementType, Vec<f32>) = match img {
        DynamicImage::ImageLuma8(gray) => (
            ElementType::U8,
            gray.into_raw().into_iter().map(f32::from).collect(),
        ),
        DynamicImage::ImageLuma16(gray) => (
            ElementType::U16,
            gray.into_raw().into_iter().map(f32::from).collect(),
        ),
        other => (ElementType::F32, other.to_luma32f().into_raw()),
    };

    let dims = Dims3::from_shape(&[h, w])?;
    let data = Array3::from_shape_vec(dims.shape(), samples)
        .map_err(|e| DeconError::InvalidDimensions(e.to_string()))?;
    Ok(Volume::new(data, element_type))
}
