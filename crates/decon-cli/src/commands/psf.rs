use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use decon_core::io::save_volume;
use decon_core::psf::{gaussian_psf, point_psf};
use decon_core::volume::Dims3;

#[derive(Args)]
pub struct PsfArgs {
    /// Width in voxels
    #[arg(long, default_value = "16")]
    pub width: usize,

    /// Height in voxels
    #[arg(long, default_value = "16")]
    pub height: usize,

    /// Depth in voxels
    #[arg(long, default_value = "16")]
    pub depth: usize,

    /// Lateral Gaussian sigma in voxels
    #[arg(long, default_value = "2.0")]
    pub sigma_xy: f32,

    /// Axial Gaussian sigma in voxels
    #[arg(long, default_value = "4.0")]
    pub sigma_z: f32,

    /// Write a single-voxel point source instead of a Gaussian
    #[arg(long)]
    pub point: bool,

    /// Output TIFF stack
    #[arg(short, long, default_value = "psf.tiff")]
    pub output: PathBuf,
}

pub fn run(args: &PsfArgs) -> Result<()> {
    let dims = Dims3::new(args.width, args.height, args.depth);
    let psf = if args.point {
        point_psf(dims)?
    } else {
        gaussian_psf(dims, args.sigma_xy, args.sigma_z)?
    };

    save_volume(&psf, &args.output)
        .with_context(|| format!("Failed to save {}", args.output.display()))?;
    println!("PSF {} saved to {}", dims, args.output.display());
    Ok(())
}
