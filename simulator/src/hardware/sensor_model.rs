//! Sensor-side compositing: gamma encode, cos⁴ vignetting and luminance noise.
//!
//! The stages run in a fixed order on the convolved linear image:
//! gamma encode to 8 bits, then vignetting, then noise. Vignetting and noise
//! act on the encoded 8-bit values.

use image::RgbaImage;
use log::debug;
use ndarray::{Array2, Array3};
use rayon::prelude::*;
use shared::image_proc::{planes_to_rgba, standard_normal_field};

use super::camera::CameraSpec;

/// Which post-convolution effects to apply.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SensorEffects {
    pub vignetting: bool,
    pub noise: bool,
    /// Seed for the noise field; random when `None`
    pub noise_seed: Option<u64>,
}

/// Read and shot noise scale factors for an ISO setting, in 8-bit levels.
///
/// Both are zero at ISO 100 and below.
pub fn noise_levels(iso: f64) -> (f64, f64) {
    if iso.is_nan() || iso <= 100.0 {
        return (0.0, 0.0);
    }
    let excess = iso - 100.0;
    let read = excess / 3200.0 * 2.0;
    let shot = excess / 1600.0 * 1.5;
    (read, shot)
}

/// cos⁴ falloff at `r_mm` from the optical axis.
pub fn cos4_falloff(r_mm: f64, focal_length_mm: f64) -> f64 {
    let f2 = focal_length_mm * focal_length_mm;
    let cos2 = f2 / (f2 + r_mm * r_mm);
    cos2 * cos2
}

/// Multiply RGB by the cos⁴ falloff. The image spans the full sensor width.
pub fn apply_vignetting(img: &mut RgbaImage, camera: &CameraSpec) {
    let (width, height) = img.dimensions();
    if width == 0 || height == 0 {
        return;
    }
    let px_per_mm = width as f64 / camera.sensor_width_mm;
    let cx = width as f64 / 2.0;
    let cy = height as f64 / 2.0;
    let focal = camera.focal_length_mm;

    let buffer: &mut [u8] = img;
    buffer
        .par_chunks_mut(width as usize * 4)
        .enumerate()
        .for_each(|(y, row)| {
            let dy = (y as f64 - cy) / px_per_mm;
            for (x, px) in row.chunks_exact_mut(4).enumerate() {
                let dx = (x as f64 - cx) / px_per_mm;
                let factor = cos4_falloff(dx.hypot(dy), focal);
                for c in &mut px[..3] {
                    *c = (*c as f64 * factor).round().clamp(0.0, 255.0) as u8;
                }
            }
        });
}

/// Add luminance noise: one deviate per pixel, the same delta on all three channels.
pub fn apply_noise(img: &mut RgbaImage, iso: f64, seed: Option<u64>) {
    let (read, shot) = noise_levels(iso);
    if read == 0.0 && shot == 0.0 {
        return;
    }
    let (width, height) = img.dimensions();
    if width == 0 || height == 0 {
        return;
    }
    debug!("sensor noise at ISO {iso}: read {read:.3}, shot {shot:.3}");

    let deviates: Array2<f32> = standard_normal_field((height as usize, width as usize), seed);

    let buffer: &mut [u8] = img;
    buffer
        .par_chunks_mut(width as usize * 4)
        .zip(deviates.outer_iter().into_par_iter())
        .for_each(|(row, noise_row)| {
            for (px, &n) in row.chunks_exact_mut(4).zip(noise_row.iter()) {
                let luma = 0.299 * px[0] as f64 + 0.587 * px[1] as f64 + 0.114 * px[2] as f64;
                let delta = n as f64 * (read + luma.sqrt() * shot);
                for c in &mut px[..3] {
                    *c = (*c as f64 + delta).round().clamp(0.0, 255.0) as u8;
                }
            }
        });
}

/// Gamma-encode linear RGB planes and apply the enabled sensor effects.
pub fn apply_sensor_effects(
    planes: &Array3<f32>,
    camera: &CameraSpec,
    effects: SensorEffects,
) -> RgbaImage {
    let mut img = planes_to_rgba(planes);
    if effects.vignetting {
        apply_vignetting(&mut img, camera);
    }
    if effects.noise {
        apply_noise(&mut img, camera.iso, effects.noise_seed);
    }
    img
}
