mod commands;
mod summary;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "decon", about = "Richardson-Lucy deconvolution for volumetric images")]
#[command(version)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Deconvolve a volume with a point-spread function
    Deconvolve(commands::deconvolve::DeconvolveArgs),
    /// Blur a volume with a point-spread function
    Convolve(commands::convolve::ConvolveArgs),
    /// Generate a synthetic point-spread function
    Psf(commands::psf::PsfArgs),
    /// Show volume file metadata
    Info(commands::info::InfoArgs),
    /// Print a default run config
    Config(commands::config::ConfigArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match &cli.command {
        Commands::Deconvolve(args) => commands::deconvolve::run(args),
        Commands::Convolve(args) => commands::convolve::run(args),
        Commands::Psf(args) => commands::psf::run(args),
        Commands::Info(args) => commands::info::run(args),
        Commands::Config(args) => commands::config::run(args),
    }
}
