use std::path::PathBuf;

use decon_core::config::{DeconvolutionParams, DevicePreference, RunConfig};
use decon_core::geometry::ExtensionSize;
use decon_core::prep::Boundary;

#[test]
fn test_default_params() {
    let p = DeconvolutionParams::default();
    assert_eq!(p.iterations, 100);
    assert_eq!(p.regularization, 0.0);
    assert!(!p.non_circulant);
    assert_eq!(p.boundary, Boundary::Mirror);
    assert_eq!(p.sizing, ExtensionSize::Smooth);
}

#[test]
fn test_run_config_toml_roundtrip() {
    let mut config = RunConfig::new(
        PathBuf::from("cells.tiff"),
        PathBuf::from("psf.tiff"),
        PathBuf::from("out.tiff"),
    );
    config.device = DevicePreference::Cpu;
    config.deconvolution.iterations = 40;
    config.deconvolution.regularization = 0.002;
    config.deconvolution.non_circulant = true;
    config.deconvolution.boundary = Boundary::ZeroFill;

    let text = toml::to_string_pretty(&config).unwrap();
    let parsed: RunConfig = toml::from_str(&text).unwrap();

    assert_eq!(parsed.input, config.input);
    assert_eq!(parsed.psf, config.psf);
    assert_eq!(parsed.output, config.output);
    assert_eq!(parsed.device, DevicePreference::Cpu);
    assert_eq!(parsed.deconvolution, config.deconvolution);
}

#[test]
fn test_partial_toml_fills_defaults() {
    let text = r#"
input = "a.tiff"
psf = "p.tiff"
output = "b.tiff"

[deconvolution]
iterations = 12
non_circulant = true
"#;
    let parsed: RunConfig = toml::from_str(text).unwrap();
    assert_eq!(parsed.device, DevicePreference::Auto);
    assert_eq!(parsed.deconvolution.iterations, 12);
    assert!(parsed.deconvolution.non_circulant);
    assert_eq!(parsed.deconvolution.boundary, Boundary::Mirror);
    assert_eq!(parsed.deconvolution.regularization, 0.0);
}

#[test]
fn test_missing_paths_are_rejected() {
    let result: Result<RunConfig, _> = toml::from_str("input = \"a.tiff\"\n");
    assert!(result.is_err());
}

#[test]
fn test_negative_regularization_is_rejected() {
    let params = DeconvolutionParams {
        regularization: -0.1,
        ..Default::default()
    };
    assert!(matches!(
        params.validate(),
        Err(decon_core::error::DeconError::Config(_))
    ));
    assert!(DeconvolutionParams::default().validate().is_ok());
}
