//! Scalar diffraction from the aperture plane to the sensor plane.
//!
//! Two propagators share one interface:
//!
//! - **Scaled Fresnel transform** (far field): the aperture field is
//!   multiplied by the quadratic phase `exp(iπr²/λf)` and transformed once.
//!   The sensor-plane window is `L2 = Nλf/L1` for an aperture-plane window
//!   `L1`.
//! - **Angular spectrum method** (near field): the field is transformed to
//!   spatial frequencies, multiplied by the free-space transfer function
//!   `exp(i2πz√(1/λ² − fx² − fy²))` with evanescent components removed, and
//!   transformed back. Both planes share the window `simulationL`.
//!
//! [`PropagationPlan::select`] picks between them: when the Fresnel window
//! achievable at the smallest usable aperture window is below half the sensor,
//! the far-field grid cannot cover the sensor and ASM is used instead.

use std::collections::HashMap;
use std::f64::consts::{PI, TAU};
use std::fmt;

use log::debug;
use ndarray::{Array2, Zip};
use rustfft::num_complex::Complex32;
use serde::{Deserialize, Serialize};
use shared::algo::{fft_shift_in_place, next_power_of_two, Fft2dPlan, FftError};

use crate::config::SimulationConfig;

/// Which propagation path produced a kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PropagationMethod {
    Geometric,
    Fresnel,
    Asm,
}

impl fmt::Display for PropagationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PropagationMethod::Geometric => "GEOMETRIC",
            PropagationMethod::Fresnel => "FRESNEL",
            PropagationMethod::Asm => "ASM",
        };
        f.write_str(name)
    }
}

/// Grid and windows for one wave-optics band.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PropagationPlan {
    pub method: PropagationMethod,
    /// FFT grid size N (square, power of two)
    pub grid_size: usize,
    /// Aperture-plane window in mm
    pub aperture_window_mm: f64,
    /// Sensor-plane window in mm
    pub sensor_window_mm: f64,
}

impl PropagationPlan {
    /// Choose the propagator and windows for one band.
    ///
    /// # Arguments
    /// * `aperture_extent_mm` - Largest structural extent of the aperture
    /// * `wavelength_mm` - Band wavelength
    /// * `focal_length_mm` - Aperture-to-sensor distance
    /// * `sensor_max_mm` - Larger sensor dimension
    /// * `output_width` - Output image width in pixels
    pub fn select(
        aperture_extent_mm: f64,
        wavelength_mm: f64,
        focal_length_mm: f64,
        sensor_max_mm: f64,
        output_width: usize,
        config: &SimulationConfig,
    ) -> Self {
        let wanted = next_power_of_two((output_width as f64 * 1.5).ceil() as usize);
        let required = config.min_grid_size.max(wanted);
        let max_n = required.min(config.max_fresnel_grid_size);

        let min_window = (aperture_extent_mm * config.aperture_window_factor)
            .max(config.min_aperture_window_mm);
        let lambda_f = wavelength_mm * focal_length_mm;
        let fresnel_window_at_min = max_n as f64 * lambda_f / min_window;

        if fresnel_window_at_min < config.asm_switch_ratio * sensor_max_mm {
            let window = aperture_extent_mm.max(sensor_max_mm) * config.aperture_window_factor;
            Self {
                method: PropagationMethod::Asm,
                grid_size: required.min(config.max_asm_grid_size),
                aperture_window_mm: window,
                sensor_window_mm: window,
            }
        } else {
            let target = max_n as f64 * lambda_f / (sensor_max_mm * config.fresnel_window_margin);
            let l1 = min_window.max(target);
            Self {
                method: PropagationMethod::Fresnel,
                grid_size: max_n,
                aperture_window_mm: l1,
                sensor_window_mm: max_n as f64 * lambda_f / l1,
            }
        }
    }

    /// Rasterisation scale of the aperture plane.
    pub fn aperture_px_per_mm(&self) -> f64 {
        self.grid_size as f64 / self.aperture_window_mm
    }

    /// Sample spacing of the propagated intensity on the sensor.
    pub fn sensor_sample_mm(&self) -> f64 {
        self.sensor_window_mm / self.grid_size as f64
    }
}

/// Runs propagations, reusing FFT plans and the complex field buffer across bands.
#[derive(Debug, Default)]
pub struct Propagator {
    plans: HashMap<usize, (Fft2dPlan, Fft2dPlan)>,
    field: Option<Array2<Complex32>>,
}

impl Propagator {
    pub fn new() -> Self {
        Self::default()
    }

    fn plans_for(&mut self, n: usize) -> Result<(Fft2dPlan, Fft2dPlan), FftError> {
        if let Some(plans) = self.plans.get(&n) {
            return Ok(plans.clone());
        }
        let plans = (Fft2dPlan::forward(n, n)?, Fft2dPlan::inverse(n, n)?);
        self.plans.insert(n, plans.clone());
        Ok(plans)
    }

    fn take_field(&mut self, n: usize) -> Array2<Complex32> {
        match self.field.take() {
            Some(field) if field.dim() == (n, n) => field,
            _ => Array2::zeros((n, n)),
        }
    }

    /// Propagate `transmittance` (an N × N raster of the aperture plane) to
    /// the sensor plane.
    ///
    /// # Returns
    /// N × N intensity normalised to unit total energy (all zeros for an opaque aperture)
    pub fn propagate(
        &mut self,
        plan: &PropagationPlan,
        transmittance: &Array2<f32>,
        wavelength_mm: f64,
        focal_length_mm: f64,
    ) -> Result<Array2<f32>, FftError> {
        let n = plan.grid_size;
        if transmittance.dim() != (n, n) {
            let (rows, cols) = transmittance.dim();
            return Err(FftError::ShapeMismatch {
                expected_rows: n,
                expected_cols: n,
                rows,
                cols,
            });
        }
        let (forward, inverse) = self.plans_for(n)?;
        let mut field = self.take_field(n);

        debug!(
            "{} propagation: N={n}, aperture window {:.4} mm, sensor window {:.4} mm, λ={:.1} nm",
            plan.method,
            plan.aperture_window_mm,
            plan.sensor_window_mm,
            wavelength_mm * 1e6
        );

        match plan.method {
            PropagationMethod::Asm => {
                Zip::from(&mut field)
                    .and(transmittance)
                    .par_for_each(|out, &amp| *out = Complex32::new(amp, 0.0));
                fft_shift_in_place(&mut field);
                forward.process(&mut field)?;
                fft_shift_in_place(&mut field);
                apply_transfer_function(&mut field, plan.aperture_window_mm, wavelength_mm, focal_length_mm);
                fft_shift_in_place(&mut field);
                inverse.process(&mut field)?;
                fft_shift_in_place(&mut field);
            }
            PropagationMethod::Fresnel | PropagationMethod::Geometric => {
                apply_chirp(&mut field, transmittance, plan.aperture_window_mm, wavelength_mm, focal_length_mm);
                fft_shift_in_place(&mut field);
                forward.process(&mut field)?;
                fft_shift_in_place(&mut field);
            }
        }

        let intensity = normalized_intensity(&field);
        self.field = Some(field);
        Ok(intensity)
    }
}

/// Aperture amplitude times the Fresnel chirp `exp(iπr²/λf)`.
fn apply_chirp(
    field: &mut Array2<Complex32>,
    transmittance: &Array2<f32>,
    window_mm: f64,
    wavelength_mm: f64,
    focal_length_mm: f64,
) {
    let n = field.nrows();
    let half = (n / 2) as f64;
    let dx = window_mm / n as f64;
    let k = PI / (wavelength_mm * focal_length_mm);

    Zip::indexed(field)
        .and(transmittance)
        .par_for_each(|(y, x), out, &amp| {
            let px = (x as f64 - half) * dx;
            let py = (y as f64 - half) * dx;
            let phase = (k * (px * px + py * py)).rem_euclid(TAU);
            *out = Complex32::from_polar(amp, phase as f32);
        });
}

/// Multiply a centred spectrum by the free-space transfer function over distance `z`.
fn apply_transfer_function(
    spectrum: &mut Array2<Complex32>,
    window_mm: f64,
    wavelength_mm: f64,
    z_mm: f64,
) {
    let n = spectrum.nrows();
    let half = (n / 2) as f64;
    let df = 1.0 / window_mm;
    let k2 = 1.0 / (wavelength_mm * wavelength_mm);

    Zip::indexed(spectrum).par_for_each(|(y, x), v| {
        let fx = (x as f64 - half) * df;
        let fy = (y as f64 - half) * df;
        let radial = fx * fx + fy * fy;
        if radial < k2 {
            let phase = (TAU * z_mm * (k2 - radial).sqrt()).rem_euclid(TAU);
            *v *= Complex32::from_polar(1.0, phase as f32);
        } else {
            // evanescent
            *v = Complex32::new(0.0, 0.0);
        }
    });
}

fn normalized_intensity(field: &Array2<Complex32>) -> Array2<f32> {
    let mut intensity = field.mapv(|c| c.norm_sqr());
    let total: f64 = intensity.iter().map(|&v| v as f64).sum();
    if total > 0.0 {
        let scale = (1.0 / total) as f32;
        intensity.par_mapv_inplace(|v| v * scale);
    }
    intensity
}

/// Bilinearly sample a centred N × N intensity grid onto the sensor grid.
///
/// Output pixel `(x, y)` maps to grid coordinate
/// `N/2 + (x − width/2) · pitch/sample`; samples outside `[0, N−1)` are zero.
pub fn resample_to_sensor(
    intensity: &Array2<f32>,
    sample_mm: f64,
    width: usize,
    height: usize,
    pixel_pitch_mm: f64,
) -> Array2<f32> {
    let n = intensity.nrows();
    let limit = n as f64 - 1.0;
    let centre = (n / 2) as f64;
    let ratio = pixel_pitch_mm / sample_mm;
    let out_cx = width as f64 / 2.0;
    let out_cy = height as f64 / 2.0;

    let mut out = Array2::zeros((height, width));
    Zip::indexed(&mut out).par_for_each(|(y, x), v| {
        let gx = centre + (x as f64 - out_cx) * ratio;
        let gy = centre + (y as f64 - out_cy) * ratio;
        if gx < 0.0 || gy < 0.0 || gx >= limit || gy >= limit {
            return;
        }
        let (ix, iy) = (gx.floor() as usize, gy.floor() as usize);
        let (fx, fy) = ((gx - ix as f64) as f32, (gy - iy as f64) as f32);
        let top = intensity[[iy, ix]] * (1.0 - fx) + intensity[[iy, ix + 1]] * fx;
        let bottom = intensity[[iy + 1, ix]] * (1.0 - fx) + intensity[[iy + 1, ix + 1]] * fx;
        *v = top * (1.0 - fy) + bottom * fy;
    });
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aperture::ApertureSpec;
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    const LAMBDA: f64 = 550e-6;

    #[test]
    fn test_small_pinhole_uses_fresnel() {
        let config = SimulationConfig::default();
        let plan = PropagationPlan::select(0.23, LAMBDA, 50.0, 35.9, 512, &config);
        assert_eq!(plan.method, PropagationMethod::Fresnel);
        assert_eq!(plan.grid_size, 2048);
        // L1 = max(0.5, Nλf/(1.05·35.9))
        let l1 = 2048.0 * LAMBDA * 50.0 / (1.05 * 35.9);
        assert_relative_eq!(plan.aperture_window_mm, l1, max_relative = 1e-12);
        assert_relative_eq!(plan.sensor_window_mm, 35.9 * 1.05, max_relative = 1e-12);
    }

    #[test]
    fn test_large_aperture_uses_asm() {
        let config = SimulationConfig::default();
        let plan = PropagationPlan::select(10.0, LAMBDA, 50.0, 35.9, 1024, &config);
        assert_eq!(plan.method, PropagationMethod::Asm);
        assert_eq!(plan.grid_size, 2048);
        assert_relative_eq!(plan.aperture_window_mm, 35.9 * 1.5);
    }

    #[test]
    fn test_grid_grows_with_output() {
        let config = SimulationConfig::default();
        let plan = PropagationPlan::select(0.3, LAMBDA, 50.0, 35.9, 2000, &config);
        // 1.5 × 2000 → 4096
        assert_eq!(plan.grid_size, 4096);
    }

    #[test]
    fn test_selection_flips_once_over_focal_sweep() {
        let config = SimulationConfig::default();
        let methods: Vec<PropagationMethod> = (1..=400)
            .rev()
            .map(|f| PropagationPlan::select(2.0, LAMBDA, f as f64, 35.9, 1024, &config).method)
            .collect();
        let flips = methods.windows(2).filter(|w| w[0] != w[1]).count();
        assert!(flips <= 1);
        assert_eq!(methods.last(), Some(&PropagationMethod::Asm));
    }

    #[test]
    fn test_method_serialises_upper_case() {
        assert_eq!(serde_json::to_string(&PropagationMethod::Asm).unwrap(), "\"ASM\"");
        assert_eq!(PropagationMethod::Fresnel.to_string(), "FRESNEL");
    }

    fn pinhole_raster(plan: &PropagationPlan, diameter: f64) -> Array2<f32> {
        ApertureSpec::pinhole(diameter)
            .render(plan.grid_size as u32, plan.aperture_px_per_mm(), LAMBDA, 50.0, None)
            .unwrap()
            .data
    }

    #[test]
    fn test_fresnel_pinhole_is_centred_and_normalised() {
        let config = SimulationConfig::preview();
        let plan = PropagationPlan::select(0.23, LAMBDA, 50.0, 20.0, 128, &config);
        assert_eq!(plan.method, PropagationMethod::Fresnel);

        let mut propagator = Propagator::new();
        let intensity = propagator
            .propagate(&plan, &pinhole_raster(&plan, 0.23), LAMBDA, 50.0)
            .unwrap();

        assert_abs_diff_eq!(intensity.sum(), 1.0, epsilon = 1e-3);
        let (peak, _) = intensity
            .indexed_iter()
            .fold(((0, 0), f32::MIN), |best, (idx, &v)| if v > best.1 { (idx, v) } else { best });
        let centre = plan.grid_size / 2;
        assert!(peak.0.abs_diff(centre) <= 1 && peak.1.abs_diff(centre) <= 1);
    }

    #[test]
    fn test_asm_conserves_energy_and_stays_centred() {
        let config = SimulationConfig::preview();
        let plan = PropagationPlan::select(3.0, LAMBDA, 20.0, 10.0, 128, &config);
        assert_eq!(plan.method, PropagationMethod::Asm);

        let mut propagator = Propagator::new();
        let intensity = propagator
            .propagate(&plan, &pinhole_raster(&plan, 3.0), LAMBDA, 20.0)
            .unwrap();
        assert_abs_diff_eq!(intensity.sum(), 1.0, epsilon = 1e-3);

        // Near field: light stays within the geometric shadow of the 3 mm hole
        let c = plan.grid_size / 2;
        let radius_px = (1.5 * plan.aperture_px_per_mm()) as usize;
        assert!(intensity[[c, c]] > 0.0);
        assert!(intensity[[c, c + radius_px * 2]] < intensity[[c, c]] * 0.05);
    }

    #[test]
    fn test_opaque_aperture_gives_zero_intensity() {
        let config = SimulationConfig::preview();
        let plan = PropagationPlan::select(0.5, LAMBDA, 50.0, 36.0, 128, &config);
        let dark = Array2::zeros((plan.grid_size, plan.grid_size));
        let intensity = Propagator::new().propagate(&plan, &dark, LAMBDA, 50.0).unwrap();
        assert!(intensity.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_wrong_raster_size_is_rejected() {
        let config = SimulationConfig::preview();
        let plan = PropagationPlan::select(0.5, LAMBDA, 50.0, 36.0, 128, &config);
        let wrong = Array2::zeros((8, 8));
        assert!(matches!(
            Propagator::new().propagate(&plan, &wrong, LAMBDA, 50.0),
            Err(FftError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_resample_identity_and_bounds() {
        let grid = Array2::from_shape_fn((16, 16), |(y, x)| (y * 16 + x) as f32);
        // pitch == sample: output centre maps onto grid centre
        let out = resample_to_sensor(&grid, 1.0, 8, 8, 1.0);
        assert_eq!(out[[4, 4]], grid[[8, 8]]);
        assert_eq!(out[[0, 0]], grid[[4, 4]]);

        // Half-pixel steps interpolate
        let half = resample_to_sensor(&grid, 2.0, 8, 8, 1.0);
        assert_relative_eq!(half[[4, 5]], (grid[[8, 8]] + grid[[8, 9]]) / 2.0);

        // Far outside the grid is zero
        let wide = resample_to_sensor(&grid, 1.0, 8, 8, 10.0);
        assert_eq!(wide[[0, 0]], 0.0);
    }
}
