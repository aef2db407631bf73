//! Spectral compositing of per-band intensities into an RGB kernel.
//!
//! Each band's sensor-plane intensity is added to the three kernel channels
//! in proportion to the band's RGB weights. After the last band every channel
//! is scaled to unit sum, which makes convolution with the kernel
//! energy-conserving.

use log::{debug, warn};
use ndarray::{Array2, Array3, ArrayView2, Axis, Zip};

use super::geometric::render_geometric;
use super::propagation::{resample_to_sensor, PropagationMethod, PropagationPlan, Propagator};
use super::spectrum::band_set;
use super::{EngineMode, OpticsError};
use crate::aperture::{ApertureSpec, BinaryMask};
use crate::config::SimulationConfig;
use crate::hardware::camera::CameraSpec;

/// Three-channel kernel, shape `(3, height, width)`.
#[derive(Debug, Clone, PartialEq)]
pub struct PsfKernel {
    data: Array3<f32>,
}

impl PsfKernel {
    pub fn zeros(width: usize, height: usize) -> Self {
        Self {
            data: Array3::zeros((3, height, width)),
        }
    }

    /// Wrap existing `(3, height, width)` planes.
    pub fn from_planes(data: Array3<f32>) -> Self {
        Self { data }
    }

    pub fn width(&self) -> usize {
        self.data.dim().2
    }

    pub fn height(&self) -> usize {
        self.data.dim().1
    }

    pub fn planes(&self) -> &Array3<f32> {
        &self.data
    }

    pub fn into_planes(self) -> Array3<f32> {
        self.data
    }

    pub fn channel(&self, c: usize) -> ArrayView2<'_, f32> {
        self.data.index_axis(Axis(0), c)
    }

    /// Add `intensity × weights[c]` to each channel `c`.
    pub fn accumulate(&mut self, intensity: &ArrayView2<f32>, weights: [f32; 3]) {
        for (c, mut plane) in self.data.outer_iter_mut().enumerate() {
            let w = weights[c];
            if w == 0.0 {
                continue;
            }
            Zip::from(&mut plane)
                .and(intensity)
                .par_for_each(|k, &v| *k += v * w);
        }
    }

    pub fn channel_sums(&self) -> [f64; 3] {
        let mut sums = [0.0; 3];
        for (c, plane) in self.data.outer_iter().enumerate() {
            sums[c] = plane.iter().map(|&v| v as f64).sum();
        }
        sums
    }

    /// Scale each channel to unit sum. Channels summing to zero are left untouched.
    ///
    /// # Returns
    /// The channel sums before normalisation
    pub fn normalize(&mut self) -> [f64; 3] {
        let sums = self.channel_sums();
        for (c, mut plane) in self.data.outer_iter_mut().enumerate() {
            if sums[c] > 0.0 {
                let scale = (1.0 / sums[c]) as f32;
                plane.par_mapv_inplace(|v| v * scale);
            }
        }
        sums
    }
}

/// What the compositor needs besides the aperture and camera.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompositeOptions {
    pub engine: EngineMode,
    pub chromatic_aberration: bool,
    /// Output grid in pixels
    pub width: usize,
    pub height: usize,
    /// Blur stand-in for the geometric engine, in mm
    pub diffraction_blur_hint_mm: f64,
}

impl CompositeOptions {
    /// Five-band sampling for chromatic aberration and for every wave run.
    pub fn polychromatic(&self) -> bool {
        self.chromatic_aberration || self.engine == EngineMode::Wave
    }
}

/// Build the normalised PSF kernel for `aperture` on `camera`.
///
/// `progress` receives a label and a completion percentage after each band.
///
/// # Returns
/// The kernel and the propagation method of the last band
pub fn composite(
    aperture: &ApertureSpec,
    mask: Option<&BinaryMask>,
    camera: &CameraSpec,
    options: &CompositeOptions,
    config: &SimulationConfig,
    progress: &mut dyn FnMut(&str, f32),
) -> Result<(PsfKernel, PropagationMethod), OpticsError> {
    let (width, height) = (options.width, options.height);
    let bands = band_set(camera.wavelength_nm, options.polychromatic());
    let mut kernel = PsfKernel::zeros(width, height);
    let band_count = bands.len();
    let band_percent = |i: usize| 10.0 + 55.0 * (i + 1) as f32 / band_count as f32;

    let method = match options.engine {
        EngineMode::Geometric => {
            // The shadow does not depend on wavelength
            let shadow = render_geometric(
                aperture,
                mask,
                camera,
                width,
                height,
                options.diffraction_blur_hint_mm,
                config,
            )?;
            for (i, band) in bands.iter().enumerate() {
                kernel.accumulate(&shadow.view(), band.weights);
                progress(
                    &format!("Band {}/{band_count} ({:.0} nm)", i + 1, band.wavelength_nm()),
                    band_percent(i),
                );
            }
            PropagationMethod::Geometric
        }
        EngineMode::Wave => {
            let pitch_mm = camera.sensor_width_mm / width as f64;
            let extent_mm = aperture.extent_mm();
            let mut propagator = Propagator::new();
            let mut raster: Option<(usize, f64, Array2<f32>)> = None;
            let mut method = PropagationMethod::Fresnel;

            for (i, band) in bands.iter().enumerate() {
                let plan = PropagationPlan::select(
                    extent_mm,
                    band.wavelength_mm,
                    camera.focal_length_mm,
                    camera.sensor_max_mm(),
                    width,
                    config,
                );
                let n = plan.grid_size;
                let px_per_mm = plan.aperture_px_per_mm();

                // ASM windows do not depend on wavelength, so the raster is reused
                let transmittance = match raster.take() {
                    Some((rn, rs, data)) if rn == n && rs == px_per_mm => data,
                    _ => {
                        aperture
                            .render(
                                n as u32,
                                px_per_mm,
                                camera.wavelength_mm(),
                                camera.focal_length_mm,
                                mask,
                            )?
                            .data
                    }
                };

                let intensity = propagator.propagate(
                    &plan,
                    &transmittance,
                    band.wavelength_mm,
                    camera.focal_length_mm,
                )?;
                raster = Some((n, px_per_mm, transmittance));
                let sampled =
                    resample_to_sensor(&intensity, plan.sensor_sample_mm(), width, height, pitch_mm);
                kernel.accumulate(&sampled.view(), band.weights);
                method = plan.method;

                progress(
                    &format!(
                        "Band {}/{band_count} ({:.0} nm, {method})",
                        i + 1,
                        band.wavelength_nm()
                    ),
                    band_percent(i),
                );
            }
            method
        }
    };

    let sums = kernel.normalize();
    debug!("kernel channel sums before normalisation: {sums:?}");
    if sums.iter().any(|&s| s <= 0.0) {
        warn!("kernel has a channel with no energy: {sums:?}");
    }

    Ok((kernel, method))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aperture::ApertureKind;
    use approx::assert_abs_diff_eq;

    fn options(engine: EngineMode, chromatic: bool) -> CompositeOptions {
        CompositeOptions {
            engine,
            chromatic_aberration: chromatic,
            width: 96,
            height: 64,
            diffraction_blur_hint_mm: 0.1,
        }
    }

    #[test]
    fn test_accumulate_and_normalize() {
        let mut kernel = PsfKernel::zeros(2, 2);
        let intensity = Array2::from_elem((2, 2), 1.0f32);
        kernel.accumulate(&intensity.view(), [1.0, 0.5, 0.0]);

        let sums = kernel.normalize();
        assert_eq!(sums, [4.0, 2.0, 0.0]);
        let after = kernel.channel_sums();
        assert_abs_diff_eq!(after[0], 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(after[1], 1.0, epsilon = 1e-6);
        assert_eq!(after[2], 0.0);
    }

    #[test]
    fn test_band_selection_rule() {
        assert!(!options(EngineMode::Geometric, false).polychromatic());
        assert!(options(EngineMode::Geometric, true).polychromatic());
        assert!(options(EngineMode::Wave, false).polychromatic());
    }

    #[test]
    fn test_geometric_kernel_is_normalised() {
        let camera = CameraSpec::new(50.0, 36.0, 24.0);
        let mut labels = Vec::new();
        let (kernel, method) = composite(
            &ApertureSpec::pinhole(2.0),
            None,
            &camera,
            &options(EngineMode::Geometric, true),
            &SimulationConfig::preview(),
            &mut |label, pct| labels.push((label.to_string(), pct)),
        )
        .unwrap();

        assert_eq!(method, PropagationMethod::Geometric);
        assert_eq!((kernel.width(), kernel.height()), (96, 64));
        for sum in kernel.channel_sums() {
            assert_abs_diff_eq!(sum, 1.0, epsilon = 1e-4);
        }
        assert_eq!(labels.len(), 5);
        assert!(labels.windows(2).all(|w| w[0].1 < w[1].1));
    }

    #[test]
    fn test_wave_kernel_is_normalised() {
        let camera = CameraSpec::new(50.0, 20.0, 13.0);
        let (kernel, method) = composite(
            &ApertureSpec::pinhole(0.23),
            None,
            &camera,
            &options(EngineMode::Wave, false),
            &SimulationConfig::preview(),
            &mut |_, _| {},
        )
        .unwrap();

        assert_eq!(method, PropagationMethod::Fresnel);
        for sum in kernel.channel_sums() {
            assert_abs_diff_eq!(sum, 1.0, epsilon = 1e-4);
        }
    }

    #[test]
    fn test_blank_aperture_leaves_kernel_empty() {
        let camera = CameraSpec::new(50.0, 36.0, 24.0);
        let custom = ApertureSpec::new(
            ApertureKind::Custom {
                threshold: None,
                invert: false,
            },
            1.0,
        );
        let (kernel, _) = composite(
            &custom,
            None,
            &camera,
            &options(EngineMode::Geometric, false),
            &SimulationConfig::preview(),
            &mut |_, _| {},
        )
        .unwrap();
        assert_eq!(kernel.channel_sums(), [0.0; 3]);
    }
}
