use thiserror::Error;

#[derive(Error, Debug)]
pub enum DeconError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid dimensions: {0}")]
    InvalidDimensions(String),

    #[error("Degenerate kernel: voxel sum is {sum}")]
    DegenerateKernel { sum: f64 },

    #[error("Device resource error: {0}")]
    DeviceResource(String),

    #[error("TIFF error: {0}")]
    Tiff(#[from] tiff::TiffError),

    #[error("Image format error: {0}")]
    ImageError(#[from] image::ImageError),

    #[error("Unsupported volume format: {0}")]
    UnsupportedFormat(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, DeconError>;
