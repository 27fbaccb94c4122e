use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use decon_core::buffers::ScopedBuffer;
use decon_core::compute::create_backend;
use decon_core::convolve::{convolve, KernelLayout};
use decon_core::io::{load_volume, save_volume};
use decon_core::prep::normalize_kernel;
use decon_core::volume::{ElementType, Volume};

use super::deconvolve::DeviceArg;

#[derive(Args)]
pub struct ConvolveArgs {
    /// Input volume
    pub input: PathBuf,

    /// Centered point-spread function (normalized before use)
    #[arg(long)]
    pub psf: PathBuf,

    /// Output TIFF stack
    #[arg(short, long, default_value = "blurred.tiff")]
    pub output: PathBuf,

    /// Compute device
    #[arg(long, value_enum, default_value = "auto")]
    pub device: DeviceArg,
}

/// Blur a volume with a PSF; the forward model deconvolution inverts.
pub fn run(args: &ConvolveArgs) -> Result<()> {
    let input = load_volume(&args.input)
        .with_context(|| format!("Failed to load {}", args.input.display()))?;
    let psf = load_volume(&args.psf)
        .with_context(|| format!("Failed to load PSF {}", args.psf.display()))?;

    let backend = create_backend(&args.device.preference());
    let backend = backend.as_ref();

    let image = ScopedBuffer::new(backend, backend.upload(&input)?);
    let kernel = ScopedBuffer::new(backend, backend.upload(&psf)?);
    let kernel = ScopedBuffer::new(backend, normalize_kernel(backend, &kernel)?);
    let mut output = ScopedBuffer::create(backend, input.dims(), ElementType::F32)?;

    convolve(backend, &image, &kernel, &mut output, KernelLayout::Centered)
        .context("Convolution failed")?;

    let result = Volume::from_f32(backend.download(&output)?);
    save_volume(&result, &args.output)
        .with_context(|| format!("Failed to save {}", args.output.display()))?;
    println!(
        "Convolved {} with {} -> {}",
        input.dims(),
        psf.dims(),
        args.output.display()
    );
    Ok(())
}
