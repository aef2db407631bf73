//! Convolution of a source photograph with a PSF kernel.
//!
//! The source is resampled to the kernel grid, linearised with the display
//! gamma and convolved per channel with clamp-to-edge padding. Gain is applied
//! here; gamma re-encoding is left to the sensor model.

use image::imageops::{self, FilterType};
use image::RgbaImage;
use log::debug;
use ndarray::{Array3, Axis};
use shared::algo::FftError;
use shared::image_proc::{rgba_to_linear_planes, EdgeMode, FftConvolver};

use crate::optics::PsfKernel;

/// Resample `source` to `width × height` with a triangle filter.
pub fn fit_source(source: &RgbaImage, width: u32, height: u32) -> RgbaImage {
    if source.dimensions() == (width, height) {
        return source.clone();
    }
    debug!(
        "resampling source {}x{} to {width}x{height}",
        source.width(),
        source.height()
    );
    imageops::resize(source, width, height, FilterType::Triangle)
}

/// Convolve `source` with `kernel` and scale by `gain`.
///
/// `progress` is called once per finished channel with the channel index.
///
/// # Returns
/// Linear RGB planes of shape `(3, kernel.height(), kernel.width())`, clamped at zero
pub fn convolve_image(
    source: &RgbaImage,
    kernel: &PsfKernel,
    gain: f64,
    progress: &mut dyn FnMut(usize),
) -> Result<Array3<f32>, FftError> {
    let (width, height) = (kernel.width(), kernel.height());
    let fitted = fit_source(source, width as u32, height as u32);
    let linear = rgba_to_linear_planes(&fitted);

    let convolver = FftConvolver::new(width, height)?;
    let gain = gain as f32;
    let mut output = Array3::zeros((3, height, width));

    for c in 0..3 {
        let convolved = convolver.convolve(
            &linear.index_axis(Axis(0), c),
            &kernel.channel(c),
            EdgeMode::Extend,
        )?;
        output
            .index_axis_mut(Axis(0), c)
            .zip_mut_with(&convolved, |dst, &v| *dst = (v * gain).max(0.0));
        progress(c);
    }

    Ok(output)
}

/// Point-source display: the kernel itself, scaled by `intensity × display_gain`.
pub fn point_source_planes(kernel: &PsfKernel, intensity: f64, display_gain: f64) -> Array3<f32> {
    let scale = (intensity * display_gain) as f32;
    kernel.planes().mapv(|v| v * scale)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use image::Rgba;
    use shared::image_proc::{linear_to_u8, u8_to_linear};

    fn impulse_kernel(width: usize, height: usize) -> PsfKernel {
        let mut planes = Array3::zeros((3, height, width));
        for c in 0..3 {
            planes[[c, height / 2, width / 2]] = 1.0;
        }
        PsfKernel::from_planes(planes)
    }

    fn test_card(width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_fn(width, height, |x, y| {
            Rgba([(x * 9 % 256) as u8, (y * 13 % 256) as u8, ((x + y) * 5 % 256) as u8, 255])
        })
    }

    #[test]
    fn test_impulse_reproduces_source() {
        let source = test_card(40, 24);
        let out = convolve_image(&source, &impulse_kernel(40, 24), 1.0, &mut |_| {}).unwrap();

        for (x, y, px) in source.enumerate_pixels() {
            for c in 0..3 {
                let encoded = linear_to_u8(out[[c, y as usize, x as usize]]);
                assert!(
                    (encoded as i32 - px[c] as i32).abs() <= 1,
                    "pixel ({x},{y}) channel {c}: {encoded} vs {}",
                    px[c]
                );
            }
        }
    }

    #[test]
    fn test_gain_scales_linear_output() {
        let source = RgbaImage::from_pixel(16, 16, Rgba([128, 128, 128, 255]));
        let out = convolve_image(&source, &impulse_kernel(16, 16), 2.4, &mut |_| {}).unwrap();
        assert_relative_eq!(out[[1, 8, 8]], u8_to_linear(128) * 2.4, max_relative = 1e-3);
    }

    #[test]
    fn test_flat_field_survives_wide_kernel() {
        // Clamp-to-edge padding keeps a flat field flat right up to the border
        let source = RgbaImage::from_pixel(30, 20, Rgba([200, 200, 200, 255]));
        let kernel = PsfKernel::from_planes(Array3::from_elem((3, 20, 30), 1.0 / 600.0));
        let out = convolve_image(&source, &kernel, 1.0, &mut |_| {}).unwrap();
        let expected = u8_to_linear(200);
        assert_relative_eq!(out[[0, 0, 0]], expected, max_relative = 1e-3);
        assert_relative_eq!(out[[2, 19, 29]], expected, max_relative = 1e-3);
    }

    #[test]
    fn test_source_is_resampled_and_progress_reported() {
        let source = test_card(80, 48);
        let mut channels = Vec::new();
        let out = convolve_image(&source, &impulse_kernel(40, 24), 1.0, &mut |c| channels.push(c)).unwrap();
        assert_eq!(out.dim(), (3, 24, 40));
        assert_eq!(channels, vec![0, 1, 2]);
    }

    #[test]
    fn test_point_source_scaling() {
        let planes = point_source_planes(&impulse_kernel(8, 8), 10.0, 50_000.0);
        assert_eq!(planes[[0, 4, 4]], 500_000.0);
        assert_eq!(planes[[0, 0, 0]], 0.0);
    }
}
