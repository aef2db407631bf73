//! Image plane primitives: convolution, noise and format conversion.

pub mod convolve2d;
pub mod image;
pub mod noise;

pub use convolve2d::{gaussian_blur, gaussian_kernel_1d, EdgeMode, FftConvolver};
pub use image::{
    green_transmittance, linear_to_u8, planes_to_rgba, rgba_to_linear_planes, u8_to_linear,
    DISPLAY_GAMMA,
};
pub use noise::{standard_normal_field, BoxMuller};
