//! Geometric engine: the aperture's shadow on the sensor, softened by a
//! Gaussian whose sigma stands in for diffraction.

use log::debug;
use ndarray::Array2;
use shared::image_proc::gaussian_blur;

use crate::aperture::{ApertureSpec, BinaryMask, RasterError};
use crate::config::SimulationConfig;
use crate::hardware::camera::CameraSpec;

/// Render the aperture at sensor scale onto a `width × height` grid.
///
/// The blur sigma in pixels is `0.5 × blur_hint_mm × px_per_mm`; blurs below
/// `config.geometric_blur_min_px` are skipped.
pub fn render_geometric(
    aperture: &ApertureSpec,
    mask: Option<&BinaryMask>,
    camera: &CameraSpec,
    width: usize,
    height: usize,
    blur_hint_mm: f64,
    config: &SimulationConfig,
) -> Result<Array2<f32>, RasterError> {
    let px_per_mm = width as f64 / camera.sensor_width_mm;
    let buffer = aperture.render_rect(
        width as u32,
        height as u32,
        px_per_mm,
        camera.wavelength_mm(),
        camera.focal_length_mm,
        mask,
    )?;

    let blur_px = blur_hint_mm * px_per_mm * 0.5;
    if blur_hint_mm > 0.0 && blur_px > config.geometric_blur_min_px {
        debug!("geometric engine: {px_per_mm:.2} px/mm, blur sigma {blur_px:.2} px");
        Ok(gaussian_blur(&buffer.data.view(), blur_px as f32))
    } else {
        debug!("geometric engine: {px_per_mm:.2} px/mm, no blur");
        Ok(buffer.data)
    }
}
