use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::consts::{DEFAULT_ITERATIONS, DEFAULT_REGULARIZATION};
use crate::error::{DeconError, Result};
use crate::geometry::ExtensionSize;
use crate::prep::Boundary;

pub use crate::compute::DevicePreference;

/// Everything one deconvolution run needs, as read from a TOML file.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunConfig {
    pub input: PathBuf,
    pub psf: PathBuf,
    pub output: PathBuf,
    #[serde(default)]
    pub device: DevicePreference,
    #[serde(default)]
    pub deconvolution: DeconvolutionParams,
}

/// Solver and preparation settings for [`Deconvolver::deconvolve`].
///
/// [`Deconvolver::deconvolve`]: crate::deconvolve::Deconvolver::deconvolve
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeconvolutionParams {
    /// Number of Richardson-Lucy updates.
    pub iterations: usize,
    /// Total-variation weight (0.0 = plain Richardson-Lucy).
    pub regularization: f32,
    /// Correct for the missing data outside the image border.
    pub non_circulant: bool,
    pub boundary: Boundary,
    pub sizing: ExtensionSize,
}

impl Default for DeconvolutionParams {
    fn default() -> Self {
        Self {
            iterations: DEFAULT_ITERATIONS,
            regularization: DEFAULT_REGULARIZATION,
            non_circulant: false,
            boundary: Boundary::default(),
            sizing: ExtensionSize::default(),
        }
    }
}

impl DeconvolutionParams {
    pub fn with_iterations(iterations: usize) -> Self {
        Self {
            iterations,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.regularization.is_finite() && self.regularization >= 0.0) {
            return Err(DeconError::Config(format!(
                "regularization must be a non-negative number, got {}",
                self.regularization
            )));
        }
        Ok(())
    }
}

impl RunConfig {
    pub fn new(input: PathBuf, psf: PathBuf, output: PathBuf) -> Self {
        Self {
            input,
            psf,
            output,
            device: DevicePreference::default(),
            deconvolution: DeconvolutionParams::default(),
        }
    }
}
