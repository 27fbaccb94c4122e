//! Reading and writing volumes.

pub mod image_io;
pub mod tiff_stack;

use std::path::Path;

use crate::error::{DeconError, Result};
use crate::volume::Volume;

pub use image_io::load_image_slice;
pub use tiff_stack::{load_tiff_stack, save_tiff_stack};

/// Load a volume, choosing the reader from the file extension.
pub fn load_volume(path: &Path) -> Result<Volume> {
    match extension(path).as_deref() {
        Some("tif" | "tiff") => load_tiff_stack(path),
        Some("png" | "jpg" | "jpeg" | "bmp") => load_image_slice(path),
        other => Err(DeconError::UnsupportedFormat(format!(
            "cannot read {} (extension {:?})",
            path.display(),
            other.unwrap_or("")
        ))),
    }
}

/// Save a volume as a float TIFF stack.
pub fn save_volume(volume: &Volume, path: &Path) -> Result<()> {
    match extension(path).as_deref() {
        Some("tif" | "tiff") => save_tiff_stack(volume, path),
        _ => Err(DeconError::UnsupportedFormat(format!(
            "volumes are written as TIFF, got {}",
            path.display()
        ))),
    }
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}
