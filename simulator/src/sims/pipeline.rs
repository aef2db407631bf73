//! One complete simulation run: PSF synthesis, scene convolution and sensor
//! compositing.
//!
//! [`run_simulation`] is a pure function of its request. It either returns a
//! finished image together with the propagation method that produced the
//! kernel, or an error; there is no partial output.

use image::RgbaImage;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use shared::algo::FftError;
use thiserror::Error;

use crate::aperture::mask::DEFAULT_THRESHOLD;
use crate::aperture::{ApertureError, ApertureKind, ApertureSpec, BinaryMask};
use crate::config::SimulationConfig;
use crate::hardware::{apply_sensor_effects, CameraError, CameraSpec, SensorEffects};
use crate::image_proc::{convolve_image, point_source_planes};
use crate::optics::{composite, CompositeOptions, EngineMode, OpticsError, PropagationMethod};
use crate::physics::calculate_physics;

#[derive(Error, Debug)]
pub enum SimulationError {
    #[error("invalid camera: {0}")]
    Camera(#[from] CameraError),
    #[error("invalid aperture: {0}")]
    Aperture(#[from] ApertureError),
    #[error(transparent)]
    Optics(#[from] OpticsError),
    #[error("convolution failed: {0}")]
    Fft(#[from] FftError),
    #[error("output image would be {width}x{height} pixels")]
    EmptyOutput { width: usize, height: usize },
}

/// Rendering switches chosen by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderOptions {
    pub engine: EngineMode,
    /// Output width in pixels
    pub resolution: usize,
    pub chromatic_aberration: bool,
    pub vignetting: bool,
    pub sensor_noise: bool,
    pub noise_seed: Option<u64>,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            engine: EngineMode::Wave,
            resolution: 1024,
            chromatic_aberration: false,
            vignetting: false,
            sensor_noise: false,
            noise_seed: None,
        }
    }
}

/// Bitmap for the custom aperture kind, either decoded pixels or encoded file bytes.
#[derive(Debug, Clone)]
pub enum MaskSource {
    Pixels(RgbaImage),
    Encoded(Vec<u8>),
}

/// Everything one run needs.
#[derive(Debug, Clone)]
pub struct SimulationRequest {
    pub camera: CameraSpec,
    pub aperture: ApertureSpec,
    /// Scene to image; `None` renders a single point source
    pub source_image: Option<RgbaImage>,
    /// Exposure compensation in stops
    pub exposure_ev: f64,
    pub point_source_intensity: f64,
    /// Only read for [`ApertureKind::Custom`]
    pub mask: Option<MaskSource>,
    /// Blur of the geometric engine in mm; the Airy disk diameter when `None`
    pub diffraction_blur_hint_mm: Option<f64>,
    pub options: RenderOptions,
}

impl SimulationRequest {
    pub fn new(camera: CameraSpec, aperture: ApertureSpec) -> Self {
        Self {
            camera,
            aperture,
            source_image: None,
            exposure_ev: 0.0,
            point_source_intensity: 10.0,
            mask: None,
            diffraction_blur_hint_mm: None,
            options: RenderOptions::default(),
        }
    }

    pub fn with_options(mut self, options: RenderOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_source_image(mut self, image: RgbaImage) -> Self {
        self.source_image = Some(image);
        self
    }

    /// Output size: the requested width and the height that keeps the sensor aspect ratio.
    pub fn output_size(&self) -> (usize, usize) {
        let width = self.options.resolution;
        let height = (width as f64 * self.camera.sensor_height_mm / self.camera.sensor_width_mm)
            .round() as usize;
        (width, height)
    }
}

/// Finished image and the method of the last spectral band.
#[derive(Debug, Clone)]
pub struct SimulationOutput {
    pub image: RgbaImage,
    pub method: PropagationMethod,
}

/// Messages a run emits: any number of progress events, then one terminal event.
#[derive(Debug, Clone)]
pub enum SimulationEvent {
    Progress { label: String, percent: f32 },
    Completed(SimulationOutput),
    Failed { error: String },
}

impl SimulationEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SimulationEvent::Progress { .. })
    }
}

/// Threshold the custom mask. A mask that cannot be read is treated as absent.
fn resolve_mask(request: &SimulationRequest) -> Option<BinaryMask> {
    let ApertureKind::Custom { threshold, invert } = &request.aperture.kind else {
        return None;
    };
    let threshold = threshold.unwrap_or(DEFAULT_THRESHOLD);
    let decoded = match request.mask.as_ref()? {
        MaskSource::Pixels(img) => BinaryMask::from_image(img, threshold, *invert),
        MaskSource::Encoded(bytes) => BinaryMask::decode(bytes, threshold, *invert),
    };
    match decoded {
        Ok(mask) => Some(mask),
        Err(e) => {
            warn!("custom mask unusable, drawing a blank aperture: {e}");
            None
        }
    }
}

/// Run one simulation.
///
/// `progress` receives coarse milestones with a completion percentage in
/// `0..=100`. They are advisory; the run cannot be interrupted through them.
pub fn run_simulation(
    request: &SimulationRequest,
    config: &SimulationConfig,
    progress: &mut dyn FnMut(&str, f32),
) -> Result<SimulationOutput, SimulationError> {
    let camera = &request.camera;
    camera.validate()?;
    request.aperture.validate()?;

    let (width, height) = request.output_size();
    if width == 0 || height == 0 {
        return Err(SimulationError::EmptyOutput { width, height });
    }

    info!(
        "simulating {} aperture ({:.3} mm) at f={} mm, {width}x{height}, {:?} engine",
        request.aperture.kind.name(),
        request.aperture.diameter_mm,
        camera.focal_length_mm,
        request.options.engine
    );
    progress("Initializing Physics Engine...", 5.0);

    let mask = resolve_mask(request);
    let blur_hint_mm = request
        .diffraction_blur_hint_mm
        .filter(|v| v.is_finite() && *v >= 0.0)
        .unwrap_or_else(|| calculate_physics(camera, &request.aperture).diffraction_blur_mm);

    let composite_options = CompositeOptions {
        engine: request.options.engine,
        chromatic_aberration: request.options.chromatic_aberration,
        width,
        height,
        diffraction_blur_hint_mm: blur_hint_mm,
    };
    let (kernel, method) = composite(
        &request.aperture,
        mask.as_ref(),
        camera,
        &composite_options,
        config,
        progress,
    )?;

    let planes = match &request.source_image {
        Some(source) => {
            progress("Convolving Scene...", 70.0);
            let gain = config.exposure_gain(request.exposure_ev);
            convolve_image(source, &kernel, gain, &mut |c| {
                progress(&format!("Channel {}/3...", c + 1), 70.0 + (c + 1) as f32 * 8.0);
            })?
        }
        None => point_source_planes(
            &kernel,
            request.point_source_intensity,
            config.point_source_display_gain,
        ),
    };

    progress("Finalizing...", 95.0);
    let effects = SensorEffects {
        vignetting: request.options.vignetting,
        noise: request.options.sensor_noise,
        noise_seed: request.options.noise_seed,
    };
    let image = apply_sensor_effects(&planes, camera, effects);

    info!("simulation finished using {method}");
    Ok(SimulationOutput { image, method })
}

/// Run `request` and report everything, including failure, as events.
pub fn run_with_events(
    request: &SimulationRequest,
    config: &SimulationConfig,
    sink: &mut dyn FnMut(SimulationEvent),
) {
    let result = run_simulation(request, config, &mut |label, percent| {
        sink(SimulationEvent::Progress {
            label: label.to_string(),
            percent,
        })
    });
    sink(match result {
        Ok(output) => SimulationEvent::Completed(output),
        Err(e) => SimulationEvent::Failed {
            error: e.to_string(),
        },
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn preview_request(aperture: ApertureSpec, engine: EngineMode) -> SimulationRequest {
        SimulationRequest::new(CameraSpec::new(50.0, 36.0, 24.0), aperture).with_options(
            RenderOptions {
                engine,
                resolution: 96,
                ..RenderOptions::default()
            },
        )
    }

    #[test]
    fn test_output_size_follows_aspect() {
        let request = preview_request(ApertureSpec::pinhole(0.3), EngineMode::Geometric);
        assert_eq!(request.output_size(), (96, 64));
    }

    #[test]
    fn test_geometric_point_source() {
        let request = preview_request(ApertureSpec::pinhole(0.3), EngineMode::Geometric);
        let mut labels = Vec::new();
        let output = run_simulation(&request, &SimulationConfig::preview(), &mut |label, pct| {
            labels.push((label.to_string(), pct))
        })
        .unwrap();

        assert_eq!(output.method, PropagationMethod::Geometric);
        assert_eq!(output.image.dimensions(), (96, 64));
        assert_eq!(labels.first().unwrap().0, "Initializing Physics Engine...");
        assert_eq!(labels.last().unwrap(), &("Finalizing...".to_string(), 95.0));
        // Three bands without chromatic aberration
        assert_eq!(labels.iter().filter(|(l, _)| l.starts_with("Band")).count(), 3);
        assert!(labels.windows(2).all(|w| w[0].1 <= w[1].1));
    }

    #[test]
    fn test_scene_convolution_progress() {
        let request = preview_request(ApertureSpec::pinhole(0.3), EngineMode::Geometric)
            .with_source_image(RgbaImage::from_pixel(48, 32, Rgba([120, 120, 120, 255])));
        let mut labels = Vec::new();
        let output = run_simulation(&request, &SimulationConfig::preview(), &mut |label, pct| {
            labels.push((label.to_string(), pct))
        })
        .unwrap();

        assert!(labels.contains(&("Convolving Scene...".to_string(), 70.0)));
        assert!(labels.contains(&("Channel 3/3...".to_string(), 94.0)));
        // Flat grey stays roughly flat grey, brightened by the 1.2 gain
        let centre = output.image.get_pixel(48, 32);
        assert!(centre[0] > 120 && centre[0] < 140, "centre {centre:?}");
    }

    #[test]
    fn test_invalid_camera_fails() {
        let mut request = preview_request(ApertureSpec::pinhole(0.3), EngineMode::Wave);
        request.camera.focal_length_mm = 0.0;
        let err = run_simulation(&request, &SimulationConfig::preview(), &mut |_, _| {})
            .unwrap_err();
        assert!(matches!(err, SimulationError::Camera(_)));
    }

    #[test]
    fn test_zero_resolution_is_empty_output() {
        let mut request = preview_request(ApertureSpec::pinhole(0.3), EngineMode::Geometric);
        request.options.resolution = 0;
        let err = run_simulation(&request, &SimulationConfig::preview(), &mut |_, _| {})
            .unwrap_err();
        assert!(matches!(err, SimulationError::EmptyOutput { .. }));
    }

    #[test]
    fn test_bad_mask_falls_back_to_blank() {
        let mut request = preview_request(
            ApertureSpec::new(
                ApertureKind::Custom {
                    threshold: None,
                    invert: false,
                },
                2.0,
            ),
            EngineMode::Geometric,
        );
        request.mask = Some(MaskSource::Encoded(b"not an image".to_vec()));
        assert!(resolve_mask(&request).is_none());

        let output = run_simulation(&request, &SimulationConfig::preview(), &mut |_, _| {});
        assert!(output.is_ok());
    }

    #[test]
    fn test_mask_ignored_for_other_kinds() {
        let mut request = preview_request(ApertureSpec::pinhole(0.3), EngineMode::Geometric);
        request.mask = Some(MaskSource::Pixels(RgbaImage::from_pixel(
            4,
            4,
            Rgba([255, 255, 255, 255]),
        )));
        assert!(resolve_mask(&request).is_none());
    }

    #[test]
    fn test_events_end_with_one_terminal() {
        let mut request = preview_request(ApertureSpec::pinhole(0.3), EngineMode::Geometric);
        request.options.resolution = 0;
        let mut events = Vec::new();
        run_with_events(&request, &SimulationConfig::preview(), &mut |e| events.push(e));

        assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
        match events.last() {
            Some(SimulationEvent::Failed { error }) => assert!(error.contains("0x0")),
            other => panic!("expected failure, got {other:?}"),
        }
    }
}
