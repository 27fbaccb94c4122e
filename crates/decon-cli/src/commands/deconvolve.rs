use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use decon_core::buffers::ScopedBuffer;
use decon_core::compute::{create_backend, ComputeBackend};
use decon_core::config::{DeconvolutionParams, DevicePreference, RunConfig};
use decon_core::deconvolve::Deconvolver;
use decon_core::geometry::ExtensionSize;
use decon_core::io::{load_volume, save_volume};
use decon_core::prep::Boundary;
use decon_core::volume::{ElementType, Volume};
use indicatif::{ProgressBar, ProgressStyle};

use crate::summary::print_run_summary;

#[derive(Clone, ValueEnum)]
pub enum BoundaryArg {
    /// Reflect the image across its faces
    Mirror,
    /// Pad with zeros
    ZeroFill,
}

#[derive(Clone, ValueEnum)]
pub enum SizingArg {
    /// Round the canvas up to FFT-friendly sizes
    Smooth,
    /// Use image + kernel size as is
    Exact,
}

#[derive(Clone, ValueEnum)]
pub enum DeviceArg {
    Auto,
    Cpu,
    Gpu,
}

impl DeviceArg {
    pub fn preference(&self) -> DevicePreference {
        match self {
            DeviceArg::Auto => DevicePreference::Auto,
            DeviceArg::Cpu => DevicePreference::Cpu,
            DeviceArg::Gpu => DevicePreference::Gpu,
        }
    }
}

#[derive(Args)]
pub struct DeconvolveArgs {
    /// Input volume (TIFF stack or 2-D image)
    pub input: Option<PathBuf>,

    /// Point-spread function volume
    #[arg(long)]
    pub psf: Option<PathBuf>,

    /// Output TIFF stack
    #[arg(short, long, default_value = "deconvolved.tiff")]
    pub output: PathBuf,

    /// Run config file (TOML); replaces all other options
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Richardson-Lucy iterations
    #[arg(long, default_value = "100")]
    pub iterations: usize,

    /// Total-variation regularization weight (0 disables)
    #[arg(long, default_value = "0.0")]
    pub regularization: f32,

    /// Correct for missing data beyond the image border
    #[arg(long)]
    pub non_circulant: bool,

    /// How the image is extended before the FFT
    #[arg(long, value_enum, default_value = "mirror")]
    pub boundary: BoundaryArg,

    /// Canvas sizing rule
    #[arg(long, value_enum, default_value = "smooth")]
    pub sizing: SizingArg,

    /// Compute device
    #[arg(long, value_enum, default_value = "auto")]
    pub device: DeviceArg,
}

pub fn run(args: &DeconvolveArgs) -> Result<()> {
    let config = if let Some(ref config_path) = args.config {
        let contents = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config {}", config_path.display()))?;
        toml::from_str(&contents).context("Invalid run config")?
    } else {
        build_config_from_args(args)?
    };

    let input = load_volume(&config.input)
        .with_context(|| format!("Failed to load {}", config.input.display()))?;
    let psf = load_volume(&config.psf)
        .with_context(|| format!("Failed to load PSF {}", config.psf.display()))?;

    tracing::debug!(input = %input.dims(), psf = %psf.dims(), "Volumes loaded");

    let backend = create_backend(&config.device);
    print_run_summary(&config, &input, &psf, backend.name());

    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner} {msg} [{elapsed}]")?);
    pb.set_message(format!(
        "Deconvolving ({} iterations)",
        config.deconvolution.iterations
    ));
    pb.enable_steady_tick(Duration::from_millis(120));

    let result = deconvolve_volumes(backend, &input, &psf, &config.deconvolution);
    pb.finish_and_clear();
    let result = result?;

    save_volume(&result, &config.output)
        .with_context(|| format!("Failed to save {}", config.output.display()))?;
    println!("Output saved to {}", config.output.display());

    Ok(())
}

fn deconvolve_volumes(
    backend: Arc<dyn ComputeBackend>,
    input: &Volume,
    psf: &Volume,
    params: &DeconvolutionParams,
) -> Result<Volume> {
    let deconvolver = Deconvolver::new(backend);
    let backend = deconvolver.backend();

    let input_buf = ScopedBuffer::new(backend, backend.upload(input)?);
    let psf_buf = ScopedBuffer::new(backend, backend.upload(psf)?);
    let mut output = ScopedBuffer::create(backend, input.dims(), ElementType::F32)?;

    deconvolver
        .deconvolve(&input_buf, &psf_buf, &mut output, params)
        .context("Deconvolution failed")?;

    Ok(Volume::from_f32(backend.download(&output)?))
}

fn build_config_from_args(args: &DeconvolveArgs) -> Result<RunConfig> {
    let input = args
        .input
        .clone()
        .context("An input volume is required unless --config is given")?;
    let psf = args
        .psf
        .clone()
        .context("--psf is required unless --config is given")?;

    let mut config = RunConfig::new(input, psf, args.output.clone());
    config.device = args.device.preference();
    config.deconvolution = DeconvolutionParams {
        iterations: args.iterations,
        regularization: args.regularization,
        non_circulant: args.non_circulant,
        boundary: match args.boundary {
            BoundaryArg::Mirror => Boundary::Mirror,
            BoundaryArg::ZeroFill => Boundary::ZeroFill,
        },
        sizing: match args.sizing {
            SizingArg::Smooth => ExtensionSize::Smooth,
            SizingArg::Exact => ExtensionSize::Exact,
        },
    };
    Ok(config)
}
