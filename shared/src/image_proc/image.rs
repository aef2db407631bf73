//! Conversions between 8-bit RGBA images and linear float planes.
//!
//! Simulation math runs on linear-light `f32` planes stored as an
//! `Array3<f32>` of shape `(channel, height, width)` with channels R, G, B.
//! The display transfer is a plain power law with exponent [`DISPLAY_GAMMA`].
//!
//! # Coordinate System Conversions
//!
//! - **ndarray**: `[channel, row, col]` = `[c, y, x]`
//! - **image crate**: `(x, y)` with `(width, height)` dimensions

use image::{Rgba, RgbaImage};
use ndarray::{Array2, Array3};

/// Exponent of the display transfer curve.
pub const DISPLAY_GAMMA: f32 = 2.2;

/// Decode an 8-bit display value to linear light in `[0, 1]`.
pub fn u8_to_linear(value: u8) -> f32 {
    (value as f32 / 255.0).powf(DISPLAY_GAMMA)
}

/// Encode linear light as an 8-bit display value.
///
/// Negative and NaN inputs map to 0; anything above 1 saturates at 255.
pub fn linear_to_u8(value: f32) -> u8 {
    if value.is_nan() || value <= 0.0 {
        return 0;
    }
    let encoded = value.powf(1.0 / DISPLAY_GAMMA) * 255.0;
    encoded.min(255.0) as u8
}

/// Split an RGBA image into linear R, G, B planes. Alpha is dropped.
///
/// # Returns
/// `Array3<f32>` with shape `(3, height, width)`
pub fn rgba_to_linear_planes(img: &RgbaImage) -> Array3<f32> {
    let (width, height) = img.dimensions();
    let mut planes = Array3::zeros((3, height as usize, width as usize));
    for (x, y, pixel) in img.enumerate_pixels() {
        for c in 0..3 {
            planes[[c, y as usize, x as usize]] = u8_to_linear(pixel[c]);
        }
    }
    planes
}

/// Gamma-encode linear R, G, B planes into an opaque RGBA image.
///
/// # Arguments
/// * `planes` - `(3, height, width)` linear planes
pub fn planes_to_rgba(planes: &Array3<f32>) -> RgbaImage {
    let (_, height, width) = planes.dim();
    RgbaImage::from_fn(width as u32, height as u32, |x, y| {
        let (x, y) = (x as usize, y as usize);
        Rgba([
            linear_to_u8(planes[[0, y, x]]),
            linear_to_u8(planes[[1, y, x]]),
            linear_to_u8(planes[[2, y, x]]),
            255,
        ])
    })
}

/// Read the green channel of an RGBA raster as transmittance in `[0, 1]`.
///
/// Aperture masks are drawn white-on-black, so any channel would do; green is
/// the convention.
pub fn green_transmittance(img: &RgbaImage) -> Array2<f32> {
    let (width, height) = img.dimensions();
    Array2::from_shape_fn((height as usize, width as usize), |(y, x)| {
        img.get_pixel(x as u32, y as u32)[1] as f32 / 255.0
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_transfer_endpoints() {
        assert_eq!(u8_to_linear(0), 0.0);
        assert_relative_eq!(u8_to_linear(255), 1.0);
        assert_eq!(linear_to_u8(0.0), 0);
        assert_eq!(linear_to_u8(1.0), 255);
        assert_eq!(linear_to_u8(4.0), 255);
        assert_eq!(linear_to_u8(-1.0), 0);
        assert_eq!(linear_to_u8(f32::NAN), 0);
    }

    #[test]
    fn test_mid_grey_decodes_dark() {
        // 50% display grey is about 22% linear
        assert_relative_eq!(u8_to_linear(128), 0.2195, epsilon = 1e-3);
    }

    #[test]
    fn test_green_transmittance() {
        let img = RgbaImage::from_fn(4, 2, |x, _| Rgba([0, (x * 85) as u8, 255, 255]));
        let t = green_transmittance(&img);
        assert_eq!(t.dim(), (2, 4));
        assert_eq!(t[[1, 0]], 0.0);
        assert_relative_eq!(t[[0, 3]], 1.0);
    }

    #[test]
    fn test_planes_round_trip_within_one_level() {
        let img = RgbaImage::from_fn(5, 3, |x, y| {
            Rgba([(x * 50) as u8, (y * 100) as u8, 200, 17])
        });
        let planes = rgba_to_linear_planes(&img);
        assert_eq!(planes.dim(), (3, 3, 5));

        let back = planes_to_rgba(&planes);
        for (a, b) in img.pixels().zip(back.pixels()) {
            for c in 0..3 {
                assert!((a[c] as i32 - b[c] as i32).abs() <= 1);
            }
            assert_eq!(b[3], 255);
        }
    }
}
