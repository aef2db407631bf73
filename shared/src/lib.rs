//! Shared numeric and image primitives for the aperture simulator.
//!
//! Nothing in here knows about optics: the crate provides the FFT, the
//! convolution routines, the random-field generators and the image format
//! conversions that the simulator core is assembled from.

pub mod algo;
pub mod image_proc;
