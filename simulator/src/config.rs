//! Tunable constants of the simulation engine.
//!
//! Every grid limit and gain used by the propagation, composition and
//! convolution stages lives here so that tests and memory-constrained callers
//! can shrink grids without touching the algorithms.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Engine constants, persisted as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Lower bound of the wave-optics grid size
    pub min_grid_size: usize,
    /// Upper bound of the Fresnel grid size
    pub max_fresnel_grid_size: usize,
    /// Upper bound of the angular-spectrum grid size
    pub max_asm_grid_size: usize,
    /// ASM is chosen when the Fresnel window falls below this fraction of the sensor
    pub asm_switch_ratio: f64,
    /// Margin on the sensor size when sizing the Fresnel window
    pub fresnel_window_margin: f64,
    /// Smallest aperture-plane window in mm
    pub min_aperture_window_mm: f64,
    /// Aperture-plane window as a multiple of the aperture extent
    pub aperture_window_factor: f64,
    /// Base gain applied after convolution, before the exposure compensation
    pub convolution_gain: f64,
    /// Gain applied to the raw kernel in point-source mode
    pub point_source_display_gain: f64,
    /// Geometric blur below this many pixels is skipped
    pub geometric_blur_min_px: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            min_grid_size: 2048,
            max_fresnel_grid_size: 4096,
            max_asm_grid_size: 2048,
            asm_switch_ratio: 0.5,
            fresnel_window_margin: 1.05,
            min_aperture_window_mm: 0.5,
            aperture_window_factor: 1.5,
            convolution_gain: 1.2,
            point_source_display_gain: 50_000.0,
            geometric_blur_min_px: 0.1,
        }
    }
}

impl SimulationConfig {
    /// Small grids for tests and quick previews.
    pub fn preview() -> Self {
        Self {
            min_grid_size: 256,
            max_fresnel_grid_size: 512,
            max_asm_grid_size: 512,
            ..Self::default()
        }
    }

    /// Gain applied to convolved images for an exposure compensation of `ev` stops.
    pub fn exposure_gain(&self, ev: f64) -> f64 {
        self.convolution_gain * 2f64.powf(ev)
    }

    /// Save as pretty-printed JSON.
    pub fn save_to_file(&self, path: &Path) -> Result<(), std::io::Error> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, json)
    }

    /// Load from JSON. Missing fields take their default values.
    pub fn load_from_file(path: &Path) -> Result<Self, std::io::Error> {
        let json = std::fs::read_to_string(path)?;
        serde_json::from_str(&json)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_exposure_gain() {
        let config = SimulationConfig::default();
        assert_relative_eq!(config.exposure_gain(0.0), 1.2);
        assert_relative_eq!(config.exposure_gain(1.0), 2.4);
        assert_relative_eq!(config.exposure_gain(-1.0), 0.6);
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");

        let config = SimulationConfig::preview();
        config.save_to_file(&path).unwrap();
        assert_eq!(SimulationConfig::load_from_file(&path).unwrap(), config);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: SimulationConfig = serde_json::from_str(r#"{"max_asm_grid_size": 1024}"#).unwrap();
        assert_eq!(config.max_asm_grid_size, 1024);
        assert_eq!(config.min_grid_size, 2048);
    }

    #[test]
    fn test_load_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "not json").unwrap();
        let err = SimulationConfig::load_from_file(&path).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
    }
}
