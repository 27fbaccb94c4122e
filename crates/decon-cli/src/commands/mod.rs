pub mod config;
pub mod convolve;
pub mod deconvolve;
pub mod info;
pub mod psf;
