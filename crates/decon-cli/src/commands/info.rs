use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use decon_core::io::load_volume;

#[derive(Args)]
pub struct InfoArgs {
    /// Volume file (TIFF stack or 2-D image)
    pub file: PathBuf,
}

pub fn run(args: &InfoArgs) -> Result<()> {
    let volume = load_volume(&args.file)
        .with_context(|| format!("Failed to load {}", args.file.display()))?;
    let dims = volume.dims();
    let (min, max) = volume.min_max();

    println!("File:        {}", args.file.display());
    println!("Dimensions:  {}", dims);
    println!("Voxels:      {}", dims.voxel_count());
    println!("Sample type: {}", volume.element_type);
    println!("Range:       {} .. {}", min, max);
    println!("Sum:         {:.6}", volume.sum());

    let float_mb = (dims.voxel_count() * std::mem::size_of::<f32>()) as f64 / (1024.0 * 1024.0);
    println!("Float size:  {:.1} MB", float_mb);

    Ok(())
}
