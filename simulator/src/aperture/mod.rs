//! Aperture geometry and rasterisation.
//!
//! An [`ApertureSpec`] describes one thin aperture plate: the overall
//! diameter, a rotation, an optional seed for stochastic layouts, an optional
//! spider-vane obstruction and an [`ApertureKind`] carrying the parameters
//! specific to each shape. Every kind knows how to draw itself onto a
//! [`RasterContext`] through the [`Rasterizable`] trait, producing a
//! transmittance grid at a caller-chosen pixel scale.
//!
//! # Parameter defaults
//!
//! Per-kind parameters are optional. Missing, zero, negative or non-finite
//! values are replaced by documented defaults at draw time (for example a slit
//! is 0.2 mm wide unless told otherwise), so rasterising a structurally valid
//! spec never fails. Only [`ApertureSpec::validate`] reports bad input.
//!
//! # Coordinate conventions
//!
//! Drawing happens in pixels with the origin at the centre of the surface,
//! x to the right and y downwards. Rotations are in degrees, clockwise on
//! screen.

pub mod lcg;
pub mod mask;
pub mod raster;
pub mod shapes;
pub mod ura;

use log::warn;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use lcg::Lcg32;
pub use mask::{BinaryMask, MaskError};
pub use raster::{Ink, RasterContext, RasterError};
pub use ura::generate_ura;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApertureError {
    #[error("aperture diameter must be positive and finite, got {0} mm")]
    InvalidDiameter(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PolygonStyle {
    #[default]
    Filled,
    Lined,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ZonePlateProfile {
    #[default]
    Binary,
    Sinusoidal,
    Spiral,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GratingOrientation {
    #[default]
    Vertical,
    Horizontal,
    Grid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MultiDotPattern {
    #[default]
    Ring,
    Line,
    Grid,
    Random,
    Concentric,
}

/// One point of a freeform stroke path in normalised `[-1, 1]` coordinates.
///
/// A missing or NaN coordinate lifts the pen: the current stroke ends and the
/// next valid point starts a new one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FreeformPoint {
    pub x: Option<f64>,
    pub y: Option<f64>,
}

impl FreeformPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self {
            x: Some(x),
            y: Some(y),
        }
    }

    pub fn pen_up() -> Self {
        Self { x: None, y: None }
    }

    /// The coordinates, or `None` for a pen-up sentinel.
    pub fn position(&self) -> Option<(f64, f64)> {
        match (self.x, self.y) {
            (Some(x), Some(y)) if !x.is_nan() && !y.is_nan() => Some((x, y)),
            _ => None,
        }
    }
}

/// Radial struts drawn over the aperture as zero transmittance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpiderVanes {
    pub count: u32,
    /// Strut width, default 0.05 mm
    pub width_mm: Option<f64>,
    /// Rotation independent of the aperture body
    #[serde(default)]
    pub rotation_deg: f64,
}

/// Shape of the aperture, with per-kind parameters.
///
/// Lengths are in millimetres. The overall [`ApertureSpec::diameter_mm`] plays
/// a per-kind role: circle diameter for round kinds, length for slits and
/// waves, dot size for dot fields, critical dimension for litho features.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApertureKind {
    Pinhole,
    Polygon {
        sides: Option<u32>,
        #[serde(default)]
        style: PolygonStyle,
        line_width_mm: Option<f64>,
    },
    ZonePlate {
        zones: Option<u32>,
        #[serde(default)]
        profile: ZonePlateProfile,
    },
    PhotonSieve {
        zones: Option<u32>,
    },
    Slit {
        width_mm: Option<f64>,
    },
    Cross {
        width_mm: Option<f64>,
    },
    SlitArray {
        count: Option<u32>,
        width_mm: Option<f64>,
        separation_mm: Option<f64>,
    },
    DiffractionGrating {
        lines_per_mm: Option<f64>,
        #[serde(default)]
        orientation: GratingOrientation,
    },
    Random {
        count: Option<u32>,
        spread_mm: Option<f64>,
    },
    Annular {
        inner_diameter_mm: Option<f64>,
    },
    MultiDot {
        #[serde(default)]
        pattern: MultiDotPattern,
        count: Option<u32>,
        spread_mm: Option<f64>,
        #[serde(default)]
        center_dot: bool,
    },
    Star {
        spikes: Option<u32>,
        inner_diameter_mm: Option<f64>,
    },
    Waves {
        count: Option<u32>,
        amplitude_mm: Option<f64>,
        thickness_mm: Option<f64>,
    },
    YinYang {
        count: Option<u32>,
        amplitude_mm: Option<f64>,
        thickness_mm: Option<f64>,
        dot_diameter_mm: Option<f64>,
    },
    Ura {
        rank: Option<u32>,
    },
    Freeform {
        #[serde(default)]
        path: Vec<FreeformPoint>,
        brush_size_mm: Option<f64>,
    },
    Fibonacci {
        count: Option<u32>,
        spread_mm: Option<f64>,
    },
    Fractal {
        iterations: Option<u32>,
        size_mm: Option<f64>,
    },
    SierpinskiTriangle {
        iterations: Option<u32>,
        size_mm: Option<f64>,
    },
    LithoOpc {
        sraf_width_mm: Option<f64>,
        sraf_distance_mm: Option<f64>,
    },
    Lissajous {
        rx: Option<f64>,
        ry: Option<f64>,
        #[serde(default)]
        delta_deg: f64,
        thickness_mm: Option<f64>,
    },
    Spiral {
        arms: Option<u32>,
        turns: Option<f64>,
        thickness_mm: Option<f64>,
    },
    Rosette {
        petals: Option<u32>,
        amplitude_mm: Option<f64>,
        thickness_mm: Option<f64>,
    },
    Zigzag {
        segments: Option<u32>,
        height_mm: Option<f64>,
        thickness_mm: Option<f64>,
    },
    DotSlit {
        dot_diameter_mm: Option<f64>,
        slit_width_mm: Option<f64>,
        separation_mm: Option<f64>,
    },
    Custom {
        threshold: Option<u8>,
        #[serde(default)]
        invert: bool,
    },
}

impl ApertureKind {
    pub fn name(&self) -> &'static str {
        match self {
            ApertureKind::Pinhole => "pinhole",
            ApertureKind::Polygon { .. } => "polygon",
            ApertureKind::ZonePlate { .. } => "zone plate",
            ApertureKind::PhotonSieve { .. } => "photon sieve",
            ApertureKind::Slit { .. } => "slit",
            ApertureKind::Cross { .. } => "cross",
            ApertureKind::SlitArray { .. } => "slit array",
            ApertureKind::DiffractionGrating { .. } => "diffraction grating",
            ApertureKind::Random { .. } => "random",
            ApertureKind::Annular { .. } => "annular",
            ApertureKind::MultiDot { .. } => "multi-dot",
            ApertureKind::Star { .. } => "star",
            ApertureKind::Waves { .. } => "waves",
            ApertureKind::YinYang { .. } => "yin-yang",
            ApertureKind::Ura { .. } => "URA",
            ApertureKind::Freeform { .. } => "freeform",
            ApertureKind::Fibonacci { .. } => "fibonacci",
            ApertureKind::Fractal { .. } => "fractal",
            ApertureKind::SierpinskiTriangle { .. } => "sierpinski triangle",
            ApertureKind::LithoOpc { .. } => "litho OPC",
            ApertureKind::Lissajous { .. } => "lissajous",
            ApertureKind::Spiral { .. } => "spiral",
            ApertureKind::Rosette { .. } => "rosette",
            ApertureKind::Zigzag { .. } => "zigzag",
            ApertureKind::DotSlit { .. } => "dot-slit",
            ApertureKind::Custom { .. } => "custom",
        }
    }

    /// Lateral spread parameter (separation, pattern spread or fractal size) as given.
    pub fn spread_mm(&self) -> Option<f64> {
        match self {
            ApertureKind::SlitArray { separation_mm, .. }
            | ApertureKind::DotSlit { separation_mm, .. } => *separation_mm,
            ApertureKind::Random { spread_mm, .. }
            | ApertureKind::MultiDot { spread_mm, .. }
            | ApertureKind::Fibonacci { spread_mm, .. } => *spread_mm,
            ApertureKind::Fractal { size_mm, .. }
            | ApertureKind::SierpinskiTriangle { size_mm, .. } => *size_mm,
            ApertureKind::LithoOpc {
                sraf_distance_mm, ..
            } => *sraf_distance_mm,
            _ => None,
        }
    }

    /// Line or slit width parameter as given.
    pub fn line_width_mm(&self) -> Option<f64> {
        match self {
            ApertureKind::Polygon { line_width_mm, .. } => *line_width_mm,
            ApertureKind::Slit { width_mm }
            | ApertureKind::Cross { width_mm }
            | ApertureKind::SlitArray { width_mm, .. } => *width_mm,
            ApertureKind::Waves { thickness_mm, .. }
            | ApertureKind::YinYang { thickness_mm, .. }
            | ApertureKind::Lissajous { thickness_mm, .. }
            | ApertureKind::Spiral { thickness_mm, .. }
            | ApertureKind::Rosette { thickness_mm, .. }
            | ApertureKind::Zigzag { thickness_mm, .. } => *thickness_mm,
            ApertureKind::DotSlit { slit_width_mm, .. } => *slit_width_mm,
            ApertureKind::LithoOpc { sraf_width_mm, .. } => *sraf_width_mm,
            _ => None,
        }
    }

    /// Kinds whose diffraction is governed by a line or slit width.
    pub fn is_line_kind(&self) -> bool {
        match self {
            ApertureKind::Polygon { style, .. } => *style == PolygonStyle::Lined,
            ApertureKind::Slit { .. }
            | ApertureKind::Cross { .. }
            | ApertureKind::Waves { .. }
            | ApertureKind::SlitArray { .. }
            | ApertureKind::Lissajous { .. }
            | ApertureKind::Spiral { .. }
            | ApertureKind::Rosette { .. }
            | ApertureKind::Zigzag { .. }
            | ApertureKind::DotSlit { .. } => true,
            _ => false,
        }
    }
}

/// A complete aperture plate description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApertureSpec {
    pub kind: ApertureKind,
    pub diameter_mm: f64,
    #[serde(default)]
    pub rotation_deg: f64,
    /// Seed for stochastic layouts; `None` or 0 uses the default seed
    #[serde(default)]
    pub seed: Option<u32>,
    #[serde(default)]
    pub obstruction: Option<SpiderVanes>,
}

impl ApertureSpec {
    pub fn new(kind: ApertureKind, diameter_mm: f64) -> Self {
        Self {
            kind,
            diameter_mm,
            rotation_deg: 0.0,
            seed: None,
            obstruction: None,
        }
    }

    pub fn pinhole(diameter_mm: f64) -> Self {
        Self::new(ApertureKind::Pinhole, diameter_mm)
    }

    pub fn with_rotation(mut self, degrees: f64) -> Self {
        self.rotation_deg = degrees;
        self
    }

    pub fn with_seed(mut self, seed: u32) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_obstruction(mut self, vanes: SpiderVanes) -> Self {
        self.obstruction = Some(vanes);
        self
    }

    pub fn validate(&self) -> Result<(), ApertureError> {
        if !(self.diameter_mm.is_finite() && self.diameter_mm > 0.0) {
            return Err(ApertureError::InvalidDiameter(self.diameter_mm));
        }
        Ok(())
    }

    /// Largest structural extent: diameter, spread or line width, whichever is bigger.
    pub fn extent_mm(&self) -> f64 {
        let spread = self.kind.spread_mm().unwrap_or(0.0);
        let width = self.kind.line_width_mm().unwrap_or(0.0);
        self.diameter_mm.max(spread).max(width)
    }

    /// Draw the aperture onto `ctx`: body (rotated), then the spider vanes.
    pub fn rasterize(&self, ctx: &mut RasterContext, params: &DrawParams<'_>) {
        let mut rng = Lcg32::from_optional_seed(self.seed);

        ctx.with_saved(|ctx| {
            ctx.rotate(self.rotation_deg);
            self.kind.draw(ctx, params, &mut rng);
        });

        if let Some(vanes) = self.obstruction.filter(|v| v.count > 0) {
            let scale = params.scale_px_per_mm;
            let width = positive_or(vanes.width_mm, 0.05) * scale;
            let length = params.diameter_mm * scale * 1.5;
            ctx.with_saved(|ctx| {
                ctx.rotate(vanes.rotation_deg);
                for i in 0..vanes.count {
                    let theta = i as f64 * std::f64::consts::TAU / vanes.count as f64;
                    ctx.with_saved(|ctx| {
                        ctx.rotate_radians(theta);
                        ctx.fill_rect(-width / 2.0, 0.0, width, length, Ink::Opaque);
                    });
                }
            });
        }
    }

    /// Rasterise onto a fresh `size × size` surface at `scale_px_per_mm`.
    pub fn render(
        &self,
        size: u32,
        scale_px_per_mm: f64,
        wavelength_mm: f64,
        focal_length_mm: f64,
        mask: Option<&BinaryMask>,
    ) -> Result<TransmittanceBuffer, RasterError> {
        self.render_rect(size, size, scale_px_per_mm, wavelength_mm, focal_length_mm, mask)
    }

    /// Rasterise onto a fresh `width × height` surface at `scale_px_per_mm`.
    pub fn render_rect(
        &self,
        width: u32,
        height: u32,
        scale_px_per_mm: f64,
        wavelength_mm: f64,
        focal_length_mm: f64,
        mask: Option<&BinaryMask>,
    ) -> Result<TransmittanceBuffer, RasterError> {
        let mut ctx = RasterContext::new(width, height)?;
        let params = DrawParams {
            scale_px_per_mm,
            diameter_mm: self.diameter_mm,
            wavelength_mm,
            focal_length_mm,
            mask,
        };
        self.rasterize(&mut ctx, &params);
        Ok(TransmittanceBuffer {
            data: ctx.into_transmittance(),
            px_per_mm: scale_px_per_mm,
        })
    }
}

/// Everything a shape needs besides its own parameters.
#[derive(Debug, Clone, Copy)]
pub struct DrawParams<'a> {
    pub scale_px_per_mm: f64,
    pub diameter_mm: f64,
    /// Design wavelength for zone-plate and photon-sieve radii
    pub wavelength_mm: f64,
    /// Design focal length for zone-plate and photon-sieve radii
    pub focal_length_mm: f64,
    /// Thresholded mask for the custom kind
    pub mask: Option<&'a BinaryMask>,
}

/// Something that can paint itself onto a raster surface.
pub trait Rasterizable {
    fn draw(&self, ctx: &mut RasterContext, params: &DrawParams<'_>, rng: &mut Lcg32);
}

/// Transmittance grid in `[0, 1]` sampled at `px_per_mm`.
#[derive(Debug, Clone)]
pub struct TransmittanceBuffer {
    pub data: Array2<f32>,
    pub px_per_mm: f64,
}

impl TransmittanceBuffer {
    /// Sum of transmittance over the grid, in pixels.
    pub fn open_pixels(&self) -> f64 {
        self.data.iter().map(|&v| v as f64).sum()
    }

    /// Open area in mm².
    pub fn open_area_mm2(&self) -> f64 {
        self.open_pixels() / (self.px_per_mm * self.px_per_mm)
    }
}

/// `value` when positive and finite, else `default`.
pub(crate) fn positive_or(value: Option<f64>, default: f64) -> f64 {
    match value {
        Some(v) if v.is_finite() && v > 0.0 => v,
        Some(v) => {
            warn!("ignoring degenerate aperture parameter {v}, using {default}");
            default
        }
        None => default,
    }
}

/// `value` when non-zero, else `default`.
pub(crate) fn count_or(value: Option<u32>, default: u32) -> u32 {
    match value {
        Some(v) if v > 0 => v,
        _ => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_validate_rejects_bad_diameter() {
        assert!(ApertureSpec::pinhole(0.3).validate().is_ok());
        assert_eq!(
            ApertureSpec::pinhole(0.0).validate(),
            Err(ApertureError::InvalidDiameter(0.0))
        );
        assert!(ApertureSpec::pinhole(f64::NAN).validate().is_err());
    }

    #[test]
    fn test_extent_picks_largest_feature() {
        let spec = ApertureSpec::new(
            ApertureKind::SlitArray {
                count: Some(2),
                width_mm: Some(0.1),
                separation_mm: Some(8.0),
            },
            5.0,
        );
        assert_eq!(spec.extent_mm(), 8.0);
        assert_eq!(ApertureSpec::pinhole(0.3).extent_mm(), 0.3);
    }

    #[test]
    fn test_pen_up_detection() {
        assert_eq!(FreeformPoint::new(0.5, -0.5).position(), Some((0.5, -0.5)));
        assert_eq!(FreeformPoint::pen_up().position(), None);
        assert_eq!(FreeformPoint::new(f64::NAN, 0.0).position(), None);
    }

    #[test]
    fn test_defaults_helpers() {
        assert_eq!(positive_or(None, 0.2), 0.2);
        assert_eq!(positive_or(Some(0.0), 0.2), 0.2);
        assert_eq!(positive_or(Some(-1.0), 0.2), 0.2);
        assert_eq!(positive_or(Some(0.5), 0.2), 0.5);
        assert_eq!(count_or(Some(0), 6), 6);
        assert_eq!(count_or(Some(8), 6), 8);
    }

    #[test]
    fn test_json_shape() {
        let json = r#"{
            "kind": {"type": "SLIT_ARRAY", "count": 3, "width_mm": 0.1},
            "diameter_mm": 5.0,
            "obstruction": {"count": 4, "width_mm": 0.05}
        }"#;
        let spec: ApertureSpec = serde_json::from_str(json).unwrap();
        assert_eq!(
            spec.kind,
            ApertureKind::SlitArray {
                count: Some(3),
                width_mm: Some(0.1),
                separation_mm: None
            }
        );
        assert_eq!(spec.rotation_deg, 0.0);
        assert_eq!(spec.obstruction.map(|v| v.count), Some(4));
    }

    #[test]
    fn test_render_pinhole_area() {
        let buffer = ApertureSpec::pinhole(1.0)
            .render(128, 100.0, 550e-6, 50.0, None)
            .unwrap();
        assert_relative_eq!(
            buffer.open_area_mm2(),
            std::f64::consts::PI * 0.25,
            max_relative = 0.01
        );
    }

    #[test]
    fn test_spider_vanes_block_light() {
        let plain = ApertureSpec::pinhole(1.0)
            .render(128, 100.0, 550e-6, 50.0, None)
            .unwrap();
        let vaned = ApertureSpec::pinhole(1.0)
            .with_obstruction(SpiderVanes {
                count: 4,
                width_mm: Some(0.05),
                rotation_deg: 0.0,
            })
            .render(128, 100.0, 550e-6, 50.0, None)
            .unwrap();

        // four 5 px struts of 50 px reach: about 1000 px blocked
        let blocked = plain.open_pixels() - vaned.open_pixels();
        assert!(blocked > 800.0 && blocked < 1100.0, "blocked {blocked}");
    }
}
