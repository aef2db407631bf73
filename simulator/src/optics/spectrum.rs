//! Spectral sampling of the illumination.
//!
//! The polychromatic set samples the visible band at five wavelengths with
//! fixed RGB weights. The monochromatic set repeats the camera's centre
//! wavelength three times, once per output channel.

use crate::hardware::camera::NM_TO_MM;

/// One spectral sample and the output channels it contributes to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpectralBand {
    pub wavelength_mm: f64,
    /// Contribution to the R, G and B kernel channels
    pub weights: [f32; 3],
}

impl SpectralBand {
    pub fn new(wavelength_nm: f64, weights: [f32; 3]) -> Self {
        Self {
            wavelength_mm: wavelength_nm * NM_TO_MM,
            weights,
        }
    }

    pub fn wavelength_nm(&self) -> f64 {
        self.wavelength_mm / NM_TO_MM
    }
}

/// Wavelengths (nm) and RGB weights of the polychromatic set, red first.
pub const SPECTRAL_SAMPLES: [(f64, [f32; 3]); 5] = [
    (640.0, [1.0, 0.0, 0.0]),
    (590.0, [1.0, 0.6, 0.0]),
    (530.0, [0.0, 1.0, 0.0]),
    (490.0, [0.0, 0.8, 1.0]),
    (450.0, [0.2, 0.0, 1.0]),
];

pub fn polychromatic_bands() -> Vec<SpectralBand> {
    SPECTRAL_SAMPLES
        .iter()
        .map(|&(nm, weights)| SpectralBand::new(nm, weights))
        .collect()
}

pub fn monochromatic_bands(center_nm: f64) -> Vec<SpectralBand> {
    [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]]
        .into_iter()
        .map(|weights| SpectralBand::new(center_nm, weights))
        .collect()
}

/// Band set for a run: polychromatic when `polychromatic` is set, else the centre wavelength.
pub fn band_set(center_nm: f64, polychromatic: bool) -> Vec<SpectralBand> {
    if polychromatic {
        polychromatic_bands()
    } else {
        monochromatic_bands(center_nm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_monochromatic_covers_each_channel_once() {
        let bands = monochromatic_bands(600.0);
        assert_eq!(bands.len(), 3);
        let mut coverage = [0.0f32; 3];
        for band in &bands {
            assert_relative_eq!(band.wavelength_mm, 600e-6);
            for c in 0..3 {
                coverage[c] += band.weights[c];
            }
        }
        assert_eq!(coverage, [1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_polychromatic_spans_visible() {
        let bands = band_set(550.0, true);
        assert_eq!(bands.len(), 5);
        assert_relative_eq!(bands[0].wavelength_nm(), 640.0, epsilon = 1e-9);
        assert_relative_eq!(bands[4].wavelength_nm(), 450.0, epsilon = 1e-9);
        // Every channel receives light from some band
        for c in 0..3 {
            assert!(bands.iter().any(|b| b.weights[c] > 0.0));
        }
    }
}
