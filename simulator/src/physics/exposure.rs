//! Exposure transfer from a metered lens shot to the pinhole.
//!
//! The light reaching the sensor is held constant: the reference time is
//! scaled by the square of the T-stop ratio and by the ISO ratio. Film bodies
//! additionally get a Schwarzschild reciprocity correction past one second.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::PhysicsSummary;
use crate::hardware::camera::CameraSpec;

/// Above this many seconds a tripod is needed
pub const LONG_EXPOSURE_S: f64 = 30.0;

/// Above this many seconds an ND filter or faster film is worth considering
pub const VERY_LONG_EXPOSURE_S: f64 = 300.0;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExposureError {
    #[error("reference f-number must be positive, got {0}")]
    InvalidFNumber(f64),
    #[error("reference exposure time must be positive, got {0} s")]
    InvalidTime(f64),
    #[error("ISO must be positive, got {0}")]
    InvalidIso(f64),
}

/// A correctly metered exposure taken with a conventional lens.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReferenceExposure {
    pub f_number: f64,
    pub time_s: f64,
    pub iso: f64,
}

impl ReferenceExposure {
    pub fn new(f_number: f64, time_s: f64, iso: f64) -> Self {
        Self {
            f_number,
            time_s,
            iso,
        }
    }

    /// Exposure value normalised to ISO 100.
    pub fn ev100(&self) -> f64 {
        (self.f_number * self.f_number / self.time_s).log2() - (self.iso / 100.0).log2()
    }

    fn validate(&self) -> Result<(), ExposureError> {
        if !(self.f_number.is_finite() && self.f_number > 0.0) {
            return Err(ExposureError::InvalidFNumber(self.f_number));
        }
        if !(self.time_s.is_finite() && self.time_s > 0.0) {
            return Err(ExposureError::InvalidTime(self.time_s));
        }
        if !(self.iso.is_finite() && self.iso > 0.0) {
            return Err(ExposureError::InvalidIso(self.iso));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExposureWarning {
    LongExposure,
    VeryLongExposure,
}

impl std::fmt::Display for ExposureWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExposureWarning::LongExposure => {
                f.write_str("Long exposure - use tripod & cable release")
            }
            ExposureWarning::VeryLongExposure => {
                f.write_str("Very long exposure - consider ND filter or higher ISO")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PinholeExposure {
    pub t_stop: f64,
    pub time_s: f64,
    pub time_display: String,
    /// Film only, when the metered time exceeds one second
    pub reciprocity_time_s: Option<f64>,
    pub reciprocity_display: Option<String>,
    pub warning: Option<ExposureWarning>,
}

/// Pinhole exposure equivalent to `reference` on `camera`.
pub fn pinhole_exposure(
    reference: &ReferenceExposure,
    camera: &CameraSpec,
    summary: &PhysicsSummary,
) -> Result<PinholeExposure, ExposureError> {
    reference.validate()?;
    if !(camera.iso.is_finite() && camera.iso > 0.0) {
        return Err(ExposureError::InvalidIso(camera.iso));
    }

    let t_stop = summary.t_stop;
    let stop_ratio_sq = (t_stop / reference.f_number).powi(2);
    let time_s = reference.time_s * stop_ratio_sq * (reference.iso / camera.iso);

    let reciprocity_time_s = camera
        .reciprocity()
        .filter(|_| time_s > 1.0)
        .map(|p| time_s.powf(p));

    let warning = if time_s > VERY_LONG_EXPOSURE_S {
        Some(ExposureWarning::VeryLongExposure)
    } else if time_s > LONG_EXPOSURE_S {
        Some(ExposureWarning::LongExposure)
    } else {
        None
    };

    Ok(PinholeExposure {
        t_stop,
        time_s,
        time_display: format_exposure_time(time_s),
        reciprocity_time_s,
        reciprocity_display: reciprocity_time_s.map(format_exposure_time),
        warning,
    })
}

/// Human-readable shutter time: `1/250s`, `2.5s`, `4m 10s`, `1h 5m`.
pub fn format_exposure_time(seconds: f64) -> String {
    if seconds < 0.0001 {
        "1/10000s+".to_string()
    } else if seconds < 1.0 {
        format!("1/{}s", (1.0 / seconds).round())
    } else if seconds < 60.0 {
        format!("{seconds:.1}s")
    } else if seconds < 3600.0 {
        let mins = (seconds / 60.0).floor();
        let secs = (seconds % 60.0).floor();
        format!("{mins}m {secs}s")
    } else {
        let hours = (seconds / 3600.0).floor();
        let mins = ((seconds % 3600.0) / 60.0).floor();
        format!("{hours}h {mins}m")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aperture::ApertureSpec;
    use crate::hardware::camera::models;
    use crate::physics::calculate_physics;
    use approx::assert_relative_eq;

    #[test]
    fn test_format_exposure_time() {
        assert_eq!(format_exposure_time(0.00001), "1/10000s+");
        assert_eq!(format_exposure_time(0.004), "1/250s");
        assert_eq!(format_exposure_time(2.46), "2.5s");
        assert_eq!(format_exposure_time(250.0), "4m 10s");
        assert_eq!(format_exposure_time(3900.0), "1h 5m");
    }

    #[test]
    fn test_transfer_scales_with_t_stop_and_iso() {
        let camera = CameraSpec::new(50.0, 35.9, 23.9).with_iso(200.0);
        let summary = calculate_physics(&camera, &ApertureSpec::pinhole(0.25));
        let reference = ReferenceExposure::new(8.0, 1.0 / 125.0, 100.0);

        let exposure = pinhole_exposure(&reference, &camera, &summary).unwrap();

        // T/200 vs f/8 is 625x the light, ISO 200 halves it
        assert_relative_eq!(exposure.t_stop, 200.0, epsilon = 1e-9);
        assert_relative_eq!(exposure.time_s, 625.0 / 125.0 / 2.0, epsilon = 1e-9);
        assert_eq!(exposure.time_display, "2.5s");
        assert!(exposure.reciprocity_time_s.is_none());
        assert!(exposure.warning.is_none());
    }

    #[test]
    fn test_film_reciprocity_and_warnings() {
        let camera = CameraSpec::from_preset(&models::FILM_6X6).with_focal_length(50.0);
        let summary = calculate_physics(&camera, &ApertureSpec::pinhole(0.25));
        let reference = ReferenceExposure::new(8.0, 1.0 / 15.0, 100.0);

        let exposure = pinhole_exposure(&reference, &camera, &summary).unwrap();

        assert_relative_eq!(exposure.time_s, 625.0 / 15.0, epsilon = 1e-9);
        assert_relative_eq!(
            exposure.reciprocity_time_s.unwrap(),
            (625.0f64 / 15.0).powf(1.33),
            epsilon = 1e-9
        );
        assert_eq!(exposure.warning, Some(ExposureWarning::LongExposure));

        let dim = ReferenceExposure::new(8.0, 1.0, 100.0);
        let exposure = pinhole_exposure(&dim, &camera, &summary).unwrap();
        assert_eq!(exposure.warning, Some(ExposureWarning::VeryLongExposure));
    }

    #[test]
    fn test_rejects_bad_reference() {
        let camera = CameraSpec::default();
        let summary = calculate_physics(&camera, &ApertureSpec::pinhole(0.3));
        assert_eq!(
            pinhole_exposure(&ReferenceExposure::new(8.0, 0.0, 100.0), &camera, &summary),
            Err(ExposureError::InvalidTime(0.0))
        );
    }

    #[test]
    fn test_ev100() {
        assert_relative_eq!(ReferenceExposure::new(16.0, 1.0 / 100.0, 100.0).ev100(), 14.64, epsilon = 0.01);
        assert_relative_eq!(ReferenceExposure::new(1.0, 1.0, 200.0).ev100(), -1.0, epsilon = 1e-12);
    }
}
