//! Image processing specific to the simulator.
//!
//! Generic primitives (FFT convolution, colour conversion, noise) live in
//! `shared::image_proc`; this module applies them to PSF kernels and source
//! photographs.

pub mod convolve;

pub use convolve::{convolve_image, fit_source, point_source_planes};
