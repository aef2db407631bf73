//! Camera body geometry for pinhole and aperture-plate photography.
//!
//! A [`CameraSpec`] is the image-side half of every simulation: the distance
//! from the aperture plate to the sensor (the "focal length" of a lensless
//! camera), the sensor format, the centre wavelength of the illumination and
//! the ISO used by the sensor model.
//!
//! # Presets
//!
//! Common interchangeable-lens mounts and film formats are available in
//! [`models`]. A preset fixes the sensor format and the flange distance; the
//! shortest usable focal length is the flange distance itself, so
//! [`CameraSpec::from_preset`] starts from `max(flange + 10, 50)` mm.
//!
//! # Examples
//!
//! ```rust
//! use simulator::hardware::camera::{models, CameraSpec};
//!
//! let camera = CameraSpec::from_preset(&models::NIKON_Z);
//! assert_eq!(camera.focal_length_mm, 50.0);
//! assert!(camera.validate().is_ok());
//!
//! let fov = camera.field_of_view_deg();
//! println!("{:.1}° × {:.1}°", fov.0, fov.1);
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Nanometres to millimetres.
pub const NM_TO_MM: f64 = 1e-6;

/// Diagonal of a 36 × 24 mm full-frame sensor.
pub const FULL_FRAME_DIAGONAL_MM: f64 = 43.266;

/// Schwarzschild exponent used when a film camera does not specify one.
pub const DEFAULT_RECIPROCITY_EXPONENT: f64 = 1.33;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CameraError {
    #[error("focal length must be positive and finite, got {0} mm")]
    InvalidFocalLength(f64),
    #[error("sensor dimensions must be positive and finite, got {width} x {height} mm")]
    InvalidSensor { width: f64, height: f64 },
    #[error("wavelength must be positive and finite, got {0} nm")]
    InvalidWavelength(f64),
}

/// Recording medium of a camera body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CameraKind {
    Digital,
    Film,
    Custom,
}

/// A camera mount or film format.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraPreset {
    pub id: &'static str,
    pub name: &'static str,
    /// Mount-to-sensor distance in mm (0 for film backs)
    pub flange_distance_mm: f64,
    pub sensor_width_mm: f64,
    pub sensor_height_mm: f64,
    pub kind: CameraKind,
}

impl CameraPreset {
    const fn new(
        id: &'static str,
        name: &'static str,
        flange_distance_mm: f64,
        sensor_width_mm: f64,
        sensor_height_mm: f64,
        kind: CameraKind,
    ) -> Self {
        Self {
            id,
            name,
            flange_distance_mm,
            sensor_width_mm,
            sensor_height_mm,
            kind,
        }
    }

    /// Focal length a freshly selected body starts with.
    pub fn default_focal_length_mm(&self) -> f64 {
        (self.flange_distance_mm + 10.0).max(50.0)
    }
}

/// Camera geometry and exposure settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraSpec {
    /// Aperture-to-sensor distance in mm
    pub focal_length_mm: f64,
    pub sensor_width_mm: f64,
    pub sensor_height_mm: f64,
    /// Centre wavelength of the illumination in nm
    #[serde(default = "default_wavelength_nm")]
    pub wavelength_nm: f64,
    #[serde(default = "default_iso")]
    pub iso: f64,
    /// Id of the preset this body came from, if any
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub flange_distance_mm: Option<f64>,
    /// Schwarzschild exponent for long film exposures
    #[serde(default)]
    pub reciprocity_exponent: Option<f64>,
}

fn default_wavelength_nm() -> f64 {
    550.0
}

fn default_iso() -> f64 {
    100.0
}

impl Default for CameraSpec {
    fn default() -> Self {
        Self::from_preset(&models::NIKON_Z)
    }
}

impl CameraSpec {
    pub fn new(focal_length_mm: f64, sensor_width_mm: f64, sensor_height_mm: f64) -> Self {
        Self {
            focal_length_mm,
            sensor_width_mm,
            sensor_height_mm,
            wavelength_nm: default_wavelength_nm(),
            iso: default_iso(),
            model: None,
            flange_distance_mm: None,
            reciprocity_exponent: None,
        }
    }

    /// Body built from a preset, at its default focal length.
    pub fn from_preset(preset: &CameraPreset) -> Self {
        Self {
            model: Some(preset.id.to_string()),
            flange_distance_mm: Some(preset.flange_distance_mm),
            ..Self::new(
                preset.default_focal_length_mm(),
                preset.sensor_width_mm,
                preset.sensor_height_mm,
            )
        }
    }

    pub fn with_focal_length(mut self, focal_length_mm: f64) -> Self {
        self.focal_length_mm = focal_length_mm;
        self
    }

    pub fn with_wavelength(mut self, wavelength_nm: f64) -> Self {
        self.wavelength_nm = wavelength_nm;
        self
    }

    pub fn with_iso(mut self, iso: f64) -> Self {
        self.iso = iso;
        self
    }

    pub fn validate(&self) -> Result<(), CameraError> {
        if !(self.focal_length_mm.is_finite() && self.focal_length_mm > 0.0) {
            return Err(CameraError::InvalidFocalLength(self.focal_length_mm));
        }
        let sensor_ok = [self.sensor_width_mm, self.sensor_height_mm]
            .iter()
            .all(|v| v.is_finite() && *v > 0.0);
        if !sensor_ok {
            return Err(CameraError::InvalidSensor {
                width: self.sensor_width_mm,
                height: self.sensor_height_mm,
            });
        }
        if !(self.wavelength_nm.is_finite() && self.wavelength_nm > 0.0) {
            return Err(CameraError::InvalidWavelength(self.wavelength_nm));
        }
        Ok(())
    }

    pub fn wavelength_mm(&self) -> f64 {
        self.wavelength_nm * NM_TO_MM
    }

    pub fn sensor_max_mm(&self) -> f64 {
        self.sensor_width_mm.max(self.sensor_height_mm)
    }

    pub fn sensor_diagonal_mm(&self) -> f64 {
        self.sensor_width_mm.hypot(self.sensor_height_mm)
    }

    /// Horizontal and vertical field of view in degrees.
    pub fn field_of_view_deg(&self) -> (f64, f64) {
        let fov = |dim: f64| 2.0 * (dim / (2.0 * self.focal_length_mm)).atan().to_degrees();
        (fov(self.sensor_width_mm), fov(self.sensor_height_mm))
    }

    /// Preset this body was built from, if it names a known one.
    pub fn preset(&self) -> Option<&'static CameraPreset> {
        self.model.as_deref().and_then(models::find)
    }

    /// True for film backs and home-made bodies, which suffer reciprocity failure.
    pub fn is_film(&self) -> bool {
        match self.preset() {
            Some(preset) => matches!(preset.kind, CameraKind::Film | CameraKind::Custom),
            None => self.reciprocity_exponent.is_some(),
        }
    }

    /// Schwarzschild exponent to apply, if this body needs one.
    pub fn reciprocity(&self) -> Option<f64> {
        if !self.is_film() {
            return None;
        }
        Some(
            self.reciprocity_exponent
                .filter(|p| p.is_finite() && *p > 0.0)
                .unwrap_or(DEFAULT_RECIPROCITY_EXPONENT),
        )
    }
}

pub mod models {
    use super::*;
    use once_cell::sync::Lazy;

    pub static CANON_EF: Lazy<CameraPreset> = Lazy::new(|| {
        CameraPreset::new("canon_ef", "Canon EF (DSLR)", 44.0, 36.0, 24.0, CameraKind::Digital)
    });
    pub static CANON_RF: Lazy<CameraPreset> = Lazy::new(|| {
        CameraPreset::new("canon_rf", "Canon RF (Mirrorless)", 20.0, 36.0, 24.0, CameraKind::Digital)
    });
    pub static FUJI_GFX: Lazy<CameraPreset> = Lazy::new(|| {
        CameraPreset::new(
            "fuji_gfx",
            "Fujifilm GFX (Medium Format)",
            26.7,
            43.8,
            32.9,
            CameraKind::Digital,
        )
    });
    pub static FUJI_X: Lazy<CameraPreset> = Lazy::new(|| {
        CameraPreset::new("fuji_x", "Fujifilm X (APS-C)", 17.7, 23.6, 15.6, CameraKind::Digital)
    });
    pub static HASSELBLAD_XCD: Lazy<CameraPreset> = Lazy::new(|| {
        CameraPreset::new("hasselblad_xcd", "Hasselblad XCD", 18.14, 43.8, 32.9, CameraKind::Digital)
    });
    pub static L_MOUNT: Lazy<CameraPreset> = Lazy::new(|| {
        CameraPreset::new("l_mount", "L-Mount (Leica/Pan/Sig)", 20.0, 36.0, 24.0, CameraKind::Digital)
    });
    pub static LEICA_M: Lazy<CameraPreset> = Lazy::new(|| {
        CameraPreset::new("leica_m", "Leica M (Rangefinder)", 27.8, 36.0, 24.0, CameraKind::Digital)
    });
    pub static MFT: Lazy<CameraPreset> = Lazy::new(|| {
        CameraPreset::new("mft", "Micro 4/3", 19.25, 17.3, 13.0, CameraKind::Digital)
    });
    pub static NIKON_F: Lazy<CameraPreset> = Lazy::new(|| {
        CameraPreset::new("nikon_f", "Nikon F (SLR)", 46.5, 36.0, 24.0, CameraKind::Digital)
    });
    /// Default body
    pub static NIKON_Z: Lazy<CameraPreset> = Lazy::new(|| {
        CameraPreset::new("nikon_z", "Nikon Z (Mirrorless)", 16.0, 35.9, 23.9, CameraKind::Digital)
    });
    pub static SONY_E: Lazy<CameraPreset> = Lazy::new(|| {
        CameraPreset::new("sony_e", "Sony E (Mirrorless)", 18.0, 35.6, 23.8, CameraKind::Digital)
    });

    pub static FILM_35: Lazy<CameraPreset> = Lazy::new(|| {
        CameraPreset::new("film_35", "35mm Film Standard", 0.0, 36.0, 24.0, CameraKind::Film)
    });
    pub static FILM_645: Lazy<CameraPreset> = Lazy::new(|| {
        CameraPreset::new("film_645", "Medium Format 645", 0.0, 56.0, 41.5, CameraKind::Film)
    });
    pub static FILM_6X6: Lazy<CameraPreset> = Lazy::new(|| {
        CameraPreset::new("film_6x6", "Medium Format 6x6", 0.0, 56.0, 56.0, CameraKind::Film)
    });
    pub static LARGE_4X5: Lazy<CameraPreset> = Lazy::new(|| {
        CameraPreset::new("large_4x5", "Large Format 4x5", 0.0, 102.0, 127.0, CameraKind::Film)
    });
    pub static LARGE_8X10: Lazy<CameraPreset> = Lazy::new(|| {
        CameraPreset::new("large_8x10", "Large Format 8x10", 0.0, 203.0, 254.0, CameraKind::Film)
    });

    pub static CUSTOM: Lazy<CameraPreset> = Lazy::new(|| {
        CameraPreset::new("custom", "Custom / Homemade", 0.0, 36.0, 24.0, CameraKind::Custom)
    });

    /// Every preset, digital mounts first.
    pub static ALL: Lazy<Vec<&'static CameraPreset>> = Lazy::new(|| {
        vec![
            &*CANON_EF,
            &*CANON_RF,
            &*FUJI_GFX,
            &*FUJI_X,
            &*HASSELBLAD_XCD,
            &*L_MOUNT,
            &*LEICA_M,
            &*MFT,
            &*NIKON_F,
            &*NIKON_Z,
            &*SONY_E,
            &*FILM_35,
            &*FILM_645,
            &*FILM_6X6,
            &*LARGE_4X5,
            &*LARGE_8X10,
            &*CUSTOM,
        ]
    });

    /// Look up a preset by id.
    pub fn find(id: &str) -> Option<&'static CameraPreset> {
        ALL.iter().copied().find(|p| p.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_default_focal_length_from_flange() {
        assert_eq!(models::NIKON_Z.default_focal_length_mm(), 50.0);
        assert_eq!(models::NIKON_F.default_focal_length_mm(), 56.5);
        assert_eq!(models::FILM_35.default_focal_length_mm(), 50.0);
    }

    #[test]
    fn test_from_preset() {
        let camera = CameraSpec::from_preset(&models::FUJI_X);
        assert_eq!(camera.sensor_width_mm, 23.6);
        assert_eq!(camera.sensor_height_mm, 15.6);
        assert_eq!(camera.model.as_deref(), Some("fuji_x"));
        assert_eq!(camera.flange_distance_mm, Some(17.7));
        assert_eq!(camera.wavelength_nm, 550.0);
    }

    #[test]
    fn test_find_all_ids_unique() {
        for preset in models::ALL.iter() {
            assert_eq!(models::find(preset.id), Some(*preset));
        }
        assert!(models::find("nope").is_none());
    }

    #[test]
    fn test_validate() {
        assert!(CameraSpec::default().validate().is_ok());
        assert_eq!(
            CameraSpec::new(0.0, 36.0, 24.0).validate(),
            Err(CameraError::InvalidFocalLength(0.0))
        );
        assert!(matches!(
            CameraSpec::new(50.0, 36.0, f64::NAN).validate(),
            Err(CameraError::InvalidSensor { .. })
        ));
        assert!(matches!(
            CameraSpec::new(50.0, 36.0, 24.0).with_wavelength(-1.0).validate(),
            Err(CameraError::InvalidWavelength(_))
        ));
    }

    #[test]
    fn test_field_of_view() {
        let camera = CameraSpec::new(18.0, 36.0, 24.0);
        let (h, v) = camera.field_of_view_deg();
        assert_relative_eq!(h, 90.0, epsilon = 1e-9);
        assert_relative_eq!(v, 2.0 * (24.0f64 / 36.0).atan().to_degrees(), epsilon = 1e-9);
    }

    #[test]
    fn test_reciprocity_only_for_film() {
        assert_eq!(CameraSpec::from_preset(&models::SONY_E).reciprocity(), None);
        assert_eq!(
            CameraSpec::from_preset(&models::FILM_645).reciprocity(),
            Some(DEFAULT_RECIPROCITY_EXPONENT)
        );

        let mut custom = CameraSpec::from_preset(&models::CUSTOM);
        custom.reciprocity_exponent = Some(1.5);
        assert_eq!(custom.reciprocity(), Some(1.5));

        // Unknown body with an explicit exponent is treated as film
        let mut bare = CameraSpec::new(50.0, 36.0, 24.0);
        assert_eq!(bare.reciprocity(), None);
        bare.reciprocity_exponent = Some(1.2);
        assert_eq!(bare.reciprocity(), Some(1.2));
    }

    #[test]
    fn test_json_defaults() {
        let camera: CameraSpec = serde_json::from_str(
            r#"{"focal_length_mm": 50, "sensor_width_mm": 36, "sensor_height_mm": 24}"#,
        )
        .unwrap();
        assert_eq!(camera.wavelength_nm, 550.0);
        assert_eq!(camera.iso, 100.0);
        assert!(camera.model.is_none());
    }
}
