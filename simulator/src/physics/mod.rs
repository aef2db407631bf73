//! Closed-form pinhole optics.
//!
//! Everything here is an analytic estimate computed from a camera body and an
//! aperture description alone: blur budgets, the Rayleigh-optimal pinhole,
//! field of view, interference fringe spacing and the light-gathering open
//! area that feeds the T-stop. None of it touches a raster, so it is cheap
//! enough to recompute on every parameter change.
//!
//! Parameter defaults match the ones the rasteriser uses, so the numbers
//! describe the plate that will actually be drawn.

pub mod exposure;

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::aperture::{count_or, positive_or, ApertureKind, ApertureSpec, PolygonStyle};
use crate::hardware::camera::{CameraSpec, FULL_FRAME_DIAGONAL_MM, NM_TO_MM};

pub use exposure::{
    format_exposure_time, pinhole_exposure, ExposureError, ExposureWarning, PinholeExposure,
    ReferenceExposure,
};

/// Rayleigh coefficient for the optimal pinhole, `d = 1.9·√(fλ)`
pub const RAYLEIGH_FACTOR: f64 = 1.9;

/// Airy disk diameter coefficient, `2.44·λ·N`
pub const AIRY_DISK_FACTOR: f64 = 2.44;

/// Diffraction blur at or above this fraction of the geometric blur counts as diffraction limited
pub const DIFFRACTION_LIMIT_RATIO: f64 = 0.9;

/// Zone count assumed when sizing zone plates and photon sieves
pub const DEFAULT_DESIGN_ZONES: u32 = 10;

const MIN_FOCAL_LENGTH_MM: f64 = 0.1;
const MIN_WAVELENGTH_NM: f64 = 380.0;
const MIN_CRITICAL_DIMENSION_MM: f64 = 0.0001;

/// Qualitative visibility of two-beam interference fringes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InterferenceRating {
    /// Below 5 µm, washed out by the sensor
    Microscopic,
    VeryWeak,
    Visible,
    Strong,
    /// Wider than 1 mm
    VeryWide,
    /// Grating dispersion rather than two-beam fringes
    Spectroscopic,
}

impl InterferenceRating {
    /// Rating for a two-beam fringe period in mm.
    pub fn from_spacing(spacing_mm: f64) -> Self {
        if spacing_mm < 0.005 {
            InterferenceRating::Microscopic
        } else if spacing_mm < 0.02 {
            InterferenceRating::VeryWeak
        } else if spacing_mm < 0.1 {
            InterferenceRating::Visible
        } else if spacing_mm < 1.0 {
            InterferenceRating::Strong
        } else {
            InterferenceRating::VeryWide
        }
    }
}

impl std::fmt::Display for InterferenceRating {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            InterferenceRating::Microscopic => "Microscopic",
            InterferenceRating::VeryWeak => "Very weak",
            InterferenceRating::Visible => "Visible",
            InterferenceRating::Strong => "Strong",
            InterferenceRating::VeryWide => "Very wide",
            InterferenceRating::Spectroscopic => "Spectroscopic",
        };
        f.write_str(label)
    }
}

/// Analytic optics figures for one camera and aperture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhysicsSummary {
    /// Geometric shadow of the critical dimension, mm
    pub geometric_blur_mm: f64,
    /// Airy disk diameter, mm
    pub diffraction_blur_mm: f64,
    /// Quadrature sum of geometric and diffraction blur, mm
    pub total_blur_mm: f64,
    /// Rayleigh-optimal diameter (first Fresnel zone for zone plates), mm
    pub optimal_diameter_mm: f64,
    /// Focal length over critical dimension
    pub f_number: f64,
    /// Focal length over the equal-area circle diameter
    pub t_stop: f64,
    pub fov_h_deg: f64,
    pub fov_v_deg: f64,
    /// 35 mm equivalent focal length
    pub focal_length_35mm: f64,
    /// Rough outer extent of the plate, mm
    pub max_footprint_mm: f64,
    pub is_diffraction_limited: bool,
    /// Fringe period on the sensor for slit pairs, dot-slits and gratings
    pub fringe_spacing_mm: Option<f64>,
    pub interference: Option<InterferenceRating>,
    /// Dimension that governs diffraction, mm
    pub effective_diameter_mm: f64,
    /// Estimated light-gathering area, mm²
    pub open_area_mm2: f64,
}

/// Rayleigh-optimal pinhole diameter `1.9·√(fλ)` in mm.
pub fn optimal_diameter_mm(focal_length_mm: f64, wavelength_mm: f64) -> f64 {
    RAYLEIGH_FACTOR * (focal_length_mm * wavelength_mm).sqrt()
}

/// Diameter of a zone plate with `zones` Fresnel zones, `2·√(n·fλ)` in mm.
pub fn zone_plate_diameter_mm(zones: u32, focal_length_mm: f64, wavelength_mm: f64) -> f64 {
    2.0 * (zones.max(1) as f64 * focal_length_mm * wavelength_mm).sqrt()
}

/// Estimated open (light-transmitting) area of the plate in mm².
///
/// Analytic per kind; dense patterns use a fixed duty cycle of the bounding
/// circle. Spider vanes are ignored.
pub fn open_area_mm2(aperture: &ApertureSpec) -> f64 {
    let d = aperture.diameter_mm.max(0.0);
    let r = d / 2.0;
    let circle = PI * r * r;
    let dot_area = |diameter: f64| PI * (diameter / 2.0).powi(2);

    match &aperture.kind {
        ApertureKind::Pinhole => circle,
        ApertureKind::Polygon {
            sides,
            style,
            line_width_mm,
        } => {
            let n = count_or(*sides, 6).max(3) as f64;
            match style {
                PolygonStyle::Lined => {
                    let perimeter = n * d * (PI / n).sin();
                    perimeter * positive_or(*line_width_mm, 0.2)
                }
                PolygonStyle::Filled => 0.5 * n * r * r * (2.0 * PI / n).sin(),
            }
        }
        ApertureKind::ZonePlate { .. } => circle * 0.5,
        ApertureKind::PhotonSieve { .. } => circle * 0.35,
        ApertureKind::DiffractionGrating { .. } => circle * 0.5,
        ApertureKind::Slit { width_mm } => positive_or(*width_mm, 0.2) * d,
        ApertureKind::SlitArray {
            count, width_mm, ..
        } => count_or(*count, 2).max(2) as f64 * positive_or(*width_mm, 0.1) * d,
        ApertureKind::Cross { width_mm } => {
            let w = positive_or(*width_mm, 0.5);
            2.0 * w * d - w * w
        }
        ApertureKind::Annular { inner_diameter_mm } => {
            let inner = match inner_diameter_mm {
                Some(v) if v.is_finite() && *v >= 0.0 => *v,
                _ => d * 0.5,
            };
            PI * (r * r - (inner / 2.0).powi(2)).max(0.0)
        }
        ApertureKind::MultiDot {
            count, center_dot, ..
        } => {
            let dots = count_or(*count, 8) + u32::from(*center_dot);
            dots as f64 * dot_area(d)
        }
        ApertureKind::Random { count, .. } | ApertureKind::Fibonacci { count, .. } => {
            count_or(*count, 50) as f64 * dot_area(d)
        }
        ApertureKind::Ura { .. } => d * d * 0.5,
        ApertureKind::Waves {
            count,
            amplitude_mm,
            thickness_mm,
        } => wave_length_mm(d, *count, *amplitude_mm) * positive_or(*thickness_mm, 0.1),
        ApertureKind::YinYang {
            count,
            amplitude_mm,
            thickness_mm,
            dot_diameter_mm,
        } => {
            let stroke =
                wave_length_mm(d, *count, *amplitude_mm) * positive_or(*thickness_mm, 0.1);
            let dots = 2 * count_or(*count, 1);
            stroke + dots as f64 * dot_area(positive_or(*dot_diameter_mm, 0.2))
        }
        ApertureKind::LithoOpc { sraf_width_mm, .. } => {
            let cd = positive_or(Some(d), 1.0);
            let sraf = positive_or(*sraf_width_mm, cd * 0.25);
            let length = cd * 5.0;
            cd * length + 2.0 * sraf * length
        }
        ApertureKind::Fractal {
            iterations,
            size_mm,
        } => {
            let size = positive_or(*size_mm, 10.0);
            let depth = count_or(*iterations, 3).min(5) as i32;
            size * size * (8.0f64 / 9.0).powi(depth)
        }
        ApertureKind::SierpinskiTriangle {
            iterations,
            size_mm,
        } => {
            let size = positive_or(*size_mm, 5.0);
            let depth = count_or(*iterations, 3).min(6) as i32;
            3f64.sqrt() / 4.0 * size * size * 0.75f64.powi(depth)
        }
        ApertureKind::Lissajous { thickness_mm, .. }
        | ApertureKind::Spiral { thickness_mm, .. }
        | ApertureKind::Rosette { thickness_mm, .. } => d * 3.0 * positive_or(*thickness_mm, 0.1),
        ApertureKind::Zigzag {
            segments,
            height_mm,
            thickness_mm,
        } => {
            let w = positive_or(Some(d), 5.0);
            let h = positive_or(*height_mm, 2.0);
            let n = count_or(*segments, 5) as f64;
            n * (w / n).hypot(h) * positive_or(*thickness_mm, 0.2)
        }
        ApertureKind::DotSlit {
            dot_diameter_mm,
            slit_width_mm,
            ..
        } => dot_area(positive_or(*dot_diameter_mm, 0.2)) + positive_or(*slit_width_mm, 0.2) * d,
        ApertureKind::Freeform { .. } => d * d * 0.1,
        ApertureKind::Custom { .. } => d * d * 0.5,
        ApertureKind::Star { .. } => circle,
    }
}

/// Arc length of a sinusoid across `width` with `count` periods, approximated by its bounding zigzag.
fn wave_length_mm(width: f64, count: Option<u32>, amplitude_mm: Option<f64>) -> f64 {
    let width = positive_or(Some(width), 10.0);
    let amplitude = positive_or(amplitude_mm, 2.0);
    let waves = count_or(count, 1) as f64;
    width.hypot(2.0 * waves * amplitude)
}

/// The dimension that sets the diffraction angle: line width for stroked
/// kinds, cell size for URAs, half the line pitch for gratings, the diameter
/// otherwise.
pub fn critical_dimension_mm(aperture: &ApertureSpec) -> f64 {
    let d = aperture.diameter_mm;
    let crit = match &aperture.kind {
        ApertureKind::Polygon {
            style: PolygonStyle::Lined,
            line_width_mm,
            ..
        } => positive_or(*line_width_mm, 0.2),
        ApertureKind::Slit { width_mm } => positive_or(*width_mm, 0.2),
        ApertureKind::Cross { width_mm } => positive_or(*width_mm, 0.5),
        ApertureKind::SlitArray { width_mm, .. } => positive_or(*width_mm, 0.1),
        ApertureKind::Waves { thickness_mm, .. }
        | ApertureKind::YinYang { thickness_mm, .. }
        | ApertureKind::Lissajous { thickness_mm, .. }
        | ApertureKind::Spiral { thickness_mm, .. }
        | ApertureKind::Rosette { thickness_mm, .. } => positive_or(*thickness_mm, 0.1),
        ApertureKind::Zigzag { thickness_mm, .. } => positive_or(*thickness_mm, 0.2),
        ApertureKind::DotSlit { slit_width_mm, .. } => positive_or(*slit_width_mm, 0.2),
        ApertureKind::LithoOpc { .. } => positive_or(Some(d), 0.1),
        ApertureKind::Ura { rank } => {
            d / count_or(*rank, crate::aperture::ura::DEFAULT_RANK as u32) as f64
        }
        ApertureKind::DiffractionGrating { lines_per_mm, .. } => {
            0.5 / positive_or(*lines_per_mm, 5.0).max(0.1)
        }
        _ => d,
    };
    crit.max(MIN_CRITICAL_DIMENSION_MM)
}

fn max_footprint_mm(aperture: &ApertureSpec) -> f64 {
    let d = aperture.diameter_mm;
    match &aperture.kind {
        ApertureKind::Fractal { size_mm, .. } => positive_or(*size_mm, 10.0) * 1.2,
        ApertureKind::SierpinskiTriangle { size_mm, .. } => positive_or(*size_mm, 5.0) * 1.2,
        ApertureKind::MultiDot { spread_mm, .. } | ApertureKind::Fibonacci { spread_mm, .. } => {
            positive_or(*spread_mm, 2.0) * 1.2
        }
        ApertureKind::Waves { amplitude_mm, .. } | ApertureKind::YinYang { amplitude_mm, .. } => {
            positive_or(Some(d), 10.0).max(positive_or(*amplitude_mm, 2.0)) * 1.2
        }
        ApertureKind::Zigzag { height_mm, .. } => {
            positive_or(Some(d), 5.0).max(positive_or(*height_mm, 2.0)) * 1.2
        }
        ApertureKind::DotSlit { separation_mm, .. } => {
            positive_or(*separation_mm, 1.0) + positive_or(Some(d), 5.0)
        }
        _ => d * 1.5,
    }
}

fn fringes(
    aperture: &ApertureSpec,
    wavelength_mm: f64,
    focal_length_mm: f64,
) -> (Option<f64>, Option<InterferenceRating>) {
    match &aperture.kind {
        ApertureKind::SlitArray { separation_mm, .. } => {
            let spacing = wavelength_mm * focal_length_mm / positive_or(*separation_mm, 0.5);
            (Some(spacing), Some(InterferenceRating::from_spacing(spacing)))
        }
        ApertureKind::DotSlit { separation_mm, .. } => {
            let spacing = wavelength_mm * focal_length_mm / positive_or(*separation_mm, 1.0);
            (Some(spacing), Some(InterferenceRating::from_spacing(spacing)))
        }
        ApertureKind::DiffractionGrating { lines_per_mm, .. } => {
            let spacing = wavelength_mm * focal_length_mm * positive_or(*lines_per_mm, 5.0);
            (Some(spacing), Some(InterferenceRating::Spectroscopic))
        }
        _ => (None, None),
    }
}

/// Analytic optics summary for `aperture` mounted on `camera`.
///
/// Focal length and wavelength are clamped to at least 0.1 mm and 380 nm, so
/// degenerate input yields finite numbers rather than an error.
pub fn calculate_physics(camera: &CameraSpec, aperture: &ApertureSpec) -> PhysicsSummary {
    let f = camera.focal_length_mm.max(MIN_FOCAL_LENGTH_MM);
    let wavelength_mm = camera.wavelength_nm.max(MIN_WAVELENGTH_NM) * NM_TO_MM;

    let open_area = open_area_mm2(aperture);
    let equivalent_diameter = 2.0 * (open_area.max(0.0) / PI).sqrt();
    let t_stop = f / equivalent_diameter.max(0.001);

    let crit = critical_dimension_mm(aperture);
    let f_number = f / crit;
    let geometric_blur_mm = crit;
    let diffraction_blur_mm = AIRY_DISK_FACTOR * wavelength_mm * f_number;
    let total_blur_mm = geometric_blur_mm.hypot(diffraction_blur_mm);

    let optimal_diameter_mm = match &aperture.kind {
        ApertureKind::ZonePlate { zones, .. } | ApertureKind::PhotonSieve { zones } => {
            zone_plate_diameter_mm(count_or(*zones, DEFAULT_DESIGN_ZONES).max(1), f, wavelength_mm)
        }
        _ => optimal_diameter_mm(f, wavelength_mm),
    };

    let fov = |dim: f64| 2.0 * (dim / (2.0 * f)).atan().to_degrees();
    let diagonal = camera.sensor_diagonal_mm();
    let crop_factor = if diagonal > 0.0 {
        FULL_FRAME_DIAGONAL_MM / diagonal
    } else {
        1.0
    };

    let (fringe_spacing_mm, interference) = fringes(aperture, wavelength_mm, f);

    PhysicsSummary {
        geometric_blur_mm,
        diffraction_blur_mm,
        total_blur_mm,
        optimal_diameter_mm,
        f_number,
        t_stop,
        fov_h_deg: fov(camera.sensor_width_mm),
        fov_v_deg: fov(camera.sensor_height_mm),
        focal_length_35mm: f * crop_factor,
        max_footprint_mm: max_footprint_mm(aperture),
        is_diffraction_limited: diffraction_blur_mm >= DIFFRACTION_LIMIT_RATIO * geometric_blur_mm,
        fringe_spacing_mm,
        interference,
        effective_diameter_mm: crit,
        open_area_mm2: open_area,
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round() / scale
}

/// Resize the parameters that govern diffraction to the Rayleigh optimum for
/// `camera`, leaving everything else untouched.
///
/// Dot kinds get the optimal dot diameter, stroked kinds the optimal line
/// width (and a usable length when theirs is under 5 mm), zone plates the
/// diameter of a ten-zone plate. Kinds without a meaningful optimum come
/// back unchanged.
pub fn auto_optimize(aperture: &ApertureSpec, camera: &CameraSpec) -> ApertureSpec {
    let f = camera.focal_length_mm;
    let wavelength_mm = camera.wavelength_mm();
    let optimal = optimal_diameter_mm(f, wavelength_mm);
    let rounded = round_to(optimal, 3);
    let stroke_length = (camera.sensor_diagonal_mm() * 0.8).min(25.0);

    let mut out = aperture.clone();
    let mut stroked = false;
    match &mut out.kind {
        ApertureKind::Pinhole
        | ApertureKind::Fibonacci { .. }
        | ApertureKind::MultiDot { .. }
        | ApertureKind::Random { .. } => out.diameter_mm = rounded,
        ApertureKind::Polygon {
            style: PolygonStyle::Lined,
            line_width_mm,
            ..
        } => *line_width_mm = Some(rounded),
        ApertureKind::Slit { width_mm }
        | ApertureKind::Cross { width_mm }
        | ApertureKind::SlitArray { width_mm, .. } => {
            *width_mm = Some(rounded);
            stroked = true;
        }
        ApertureKind::Waves { thickness_mm, .. }
        | ApertureKind::YinYang { thickness_mm, .. }
        | ApertureKind::Lissajous { thickness_mm, .. }
        | ApertureKind::Spiral { thickness_mm, .. }
        | ApertureKind::Rosette { thickness_mm, .. }
        | ApertureKind::Zigzag { thickness_mm, .. } => {
            *thickness_mm = Some(rounded);
            stroked = true;
        }
        ApertureKind::DotSlit {
            dot_diameter_mm,
            slit_width_mm,
            ..
        } => {
            *slit_width_mm = Some(rounded);
            *dot_diameter_mm = Some(rounded);
        }
        ApertureKind::ZonePlate { zones, .. } | ApertureKind::PhotonSieve { zones } => {
            let zones = count_or(*zones, DEFAULT_DESIGN_ZONES);
            out.diameter_mm = round_to(zone_plate_diameter_mm(zones, f, wavelength_mm), 3);
        }
        ApertureKind::Annular { inner_diameter_mm } => {
            *inner_diameter_mm = Some(round_to(optimal * 4.0, 3));
            out.diameter_mm = round_to(optimal * 6.0, 3);
        }
        ApertureKind::Ura { rank } => {
            let rank = count_or(*rank, crate::aperture::ura::DEFAULT_RANK as u32);
            out.diameter_mm = round_to(optimal * rank as f64, 3);
        }
        ApertureKind::LithoOpc { sraf_width_mm, .. } => {
            *sraf_width_mm = Some(round_to(optimal * 0.5, 3));
            out.diameter_mm = round_to(optimal * 4.0, 3);
        }
        _ => {}
    }
    if stroked && out.diameter_mm < 5.0 {
        out.diameter_mm = stroke_length;
    }
    out
}

/// Turn `aperture` into a Young's double slit tuned for `camera`.
///
/// Slit width is the Rayleigh optimum, the separation puts the fringe period
/// at 0.3 mm on the sensor, and the slits run 10% past the sensor height
/// (at least 5 mm). Rotation, seed and obstruction are kept.
pub fn optimize_double_slit(aperture: &ApertureSpec, camera: &CameraSpec) -> ApertureSpec {
    let summary = calculate_physics(camera, aperture);
    let wavelength_mm = camera.wavelength_mm();
    let separation = round_to(wavelength_mm * camera.focal_length_mm / 0.3, 3);

    ApertureSpec {
        kind: ApertureKind::SlitArray {
            count: Some(2),
            width_mm: Some(round_to(summary.optimal_diameter_mm, 4)),
            separation_mm: Some(separation),
        },
        diameter_mm: (camera.sensor_height_mm * 1.1).max(5.0),
        ..aperture.clone()
    }
}
