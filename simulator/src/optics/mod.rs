//! Point-spread-function synthesis.
//!
//! - **spectrum**: spectral band sets
//! - **propagation**: Fresnel and angular-spectrum propagators and their selection
//! - **geometric**: fast ray-optics kernel with a Gaussian diffraction stand-in
//! - **compositor**: per-band accumulation into a normalised RGB kernel

pub mod compositor;
pub mod geometric;
pub mod propagation;
pub mod spectrum;

use serde::{Deserialize, Serialize};
use shared::algo::FftError;
use thiserror::Error;

use crate::aperture::RasterError;

pub use compositor::{composite, CompositeOptions, PsfKernel};
pub use geometric::render_geometric;
pub use propagation::{resample_to_sensor, PropagationMethod, PropagationPlan, Propagator};
pub use spectrum::{band_set, SpectralBand};

/// Kernel engine requested by the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EngineMode {
    /// Aperture drawn at sensor scale plus a Gaussian blur
    Geometric,
    /// Scalar diffraction
    #[default]
    Wave,
}

#[derive(Error, Debug)]
pub enum OpticsError {
    #[error("aperture rasterisation failed: {0}")]
    Raster(#[from] RasterError),
    #[error("propagation failed: {0}")]
    Fft(#[from] FftError),
}
