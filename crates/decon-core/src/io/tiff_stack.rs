use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use ndarray::Array3;
use num_traits::AsPrimitive;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::{colortype, TiffEncoder};
use tiff::ColorType;
use tracing::debug;

use crate::error::{DeconError, Result};
use crate::volume::{Dims3, ElementType, Volume};

/// Read every page of a grayscale TIFF as one z-slice.
///
/// 8-bit and 16-bit pages keep their integer tag; 32-bit float pages load as
/// F32. All pages must share size and sample type.
pub fn load_tiff_stack(path: &Path) -> Result<Volume> {
    let mut decoder = Decoder::new(BufReader::new(File::open(path)?))?;
    let (width, height) = decoder.dimensions()?;
    let page_len = width as usize * height as usize;

    let mut samples: Vec<f32> = Vec::new();
    let mut element_type = None;
    let mut depth = 0usize;

    loop {
        if decoder.dimensions()? != (width, height) {
            return Err(DeconError::InvalidDimensions(format!(
                "page {depth} of {} differs in size from page 0",
                path.display()
            )));
        }
        let color = decoder.colortype()?;
        if !matches!(color, ColorType::Gray(_)) {
            return Err(DeconError::UnsupportedFormat(format!(
                "{}: only grayscale pages are supported, found {color:?}",
                path.display()
            )));
        }

        let (page_type, page) = decode_page(decoder.read_image()?, path)?;
        if *element_type.get_or_insert(page_type) != page_type {
            return Err(DeconError::UnsupportedFormat(format!(
                "{}: pages mix sample types",
                path.display()
            )));
        }
        if page.len() != page_len {
            return Err(DeconError::InvalidDimensions(format!(
                "page {depth} holds {} samples, expected {page_len}",
                page.len()
            )));
        }
        samples.extend(page);
        depth += 1;

        if !decoder.more_images() {
            break;
        }
        decoder.next_image()?;
    }

    let dims = Dims3::from_shape(&[depth, height as usize, width as usize])?;
    debug!(path = %path.display(), %dims, "Loaded TIFF stack");
    let data = Array3::from_shape_vec(dims.shape(), samples)
        .map_err(|e| DeconError::InvalidDimensions(e.to_string()))?;
    Ok(Volume::new(data, element_type.unwrap_or_default()))
}

fn decode_page(result: DecodingResult, path: &Path) -> Result<(ElementType, Vec<f32>)> {
    match result {
        DecodingResult::U8(v) => Ok((ElementType::U8, widen(&v))),
        DecodingResult::U16(v) => Ok((ElementType::U16, widen(&v))),
        DecodingResult::F32(v) => Ok((ElementType::F32, v)),
        DecodingResult::F64(v) => Ok((ElementType::F32, widen(&v))),
        _ => Err(DeconError::UnsupportedFormat(format!(
            "{}: sample type is not u8, u16 or float",
            path.display()
        ))),
    }
}

fn widen<T: AsPrimitive<f32>>(samples: &[T]) -> Vec<f32> {
    samples.iter().map(|v| v.as_()).collect()
}

/// Write `volume` as a multi-page 32-bit float TIFF, one page per z-slice.
pub fn save_tiff_stack(volume: &Volume, path: &Path) -> Result<()> {
    let dims = volume.dims();
    dims.ensure_non_empty()?;
    let mut encoder = TiffEncoder::new(BufWriter::new(File::create(path)?))?;

    let data = volume.data.as_standard_layout();
    let page_len = dims.width * dims.height;
    let samples = data
        .as_slice()
        .ok_or_else(|| DeconError::InvalidDimensions("volume is not contiguous".into()))?;

    for page in samples.chunks_exact(page_len) {
        encoder.write_image::<colortype::Gray32Float>(
            dims.width as u32,
            dims.height as u32,
            page,
        )?;
    }
    debug!(path = %path.display(), %dims, "Saved TIFF stack");
    Ok(())
}
