pub mod buffers;
pub mod compute;
pub mod config;
pub mod consts;
pub mod convolve;
pub mod deconvolve;
pub mod error;
pub mod geometry;
pub mod io;
pub mod noncirculant;
pub mod prep;
pub mod psf;
pub mod solver;
pub mod volume;
