//! Per-kind drawing rules.
//!
//! Each aperture kind paints white (open) shapes onto a black surface. All
//! sizes arrive in millimetres and are converted with the pixel scale of the
//! [`DrawParams`]. Missing parameters fall back to the defaults noted on each
//! function.

use std::f64::consts::{PI, TAU};

use tiny_skia::{FillRule, LineCap, LineJoin, PathBuilder};

use super::raster::{circle_path, polyline};
use super::{
    count_or, generate_ura, positive_or, ApertureKind, DrawParams, FreeformPoint,
    GratingOrientation, Ink, Lcg32, MultiDotPattern, PolygonStyle, RasterContext, Rasterizable,
    ZonePlateProfile,
};

/// Zone plates never draw more than this many rings.
const MAX_ZONE_RINGS: i64 = 3000;
/// Spiral turns beyond this are indistinguishable at any raster size.
const MAX_SPIRAL_TURNS: f64 = 200.0;
const MAX_SPIRAL_ARMS: u32 = 64;

impl Rasterizable for ApertureKind {
    fn draw(&self, ctx: &mut RasterContext, p: &DrawParams<'_>, rng: &mut Lcg32) {
        let s = p.scale_px_per_mm;
        let d = p.diameter_mm;

        match self {
            ApertureKind::Pinhole => ctx.fill_circle(0.0, 0.0, d * s / 2.0, Ink::Open),
            ApertureKind::Polygon {
                sides,
                style,
                line_width_mm,
            } => draw_polygon(ctx, p, *sides, *style, *line_width_mm),
            ApertureKind::ZonePlate { profile, .. } => draw_zone_plate(ctx, p, *profile),
            ApertureKind::PhotonSieve { zones } => draw_photon_sieve(ctx, p, *zones, rng),
            ApertureKind::Slit { width_mm } => {
                let w = positive_or(*width_mm, 0.2) * s;
                let len = positive_or(Some(d), 5.0) * s;
                ctx.fill_rect(-len / 2.0, -w / 2.0, len, w, Ink::Open);
            }
            ApertureKind::Cross { width_mm } => {
                let w = positive_or(*width_mm, 0.5) * s;
                let len = d * s;
                ctx.fill_rect(-w / 2.0, -len / 2.0, w, len, Ink::Open);
                ctx.fill_rect(-len / 2.0, -w / 2.0, len, w, Ink::Open);
            }
            ApertureKind::SlitArray {
                count,
                width_mm,
                separation_mm,
            } => {
                let n = count_or(*count, 2).max(2);
                let w = positive_or(*width_mm, 0.1) * s;
                let h = positive_or(Some(d), 5.0) * s;
                let spacing = positive_or(*separation_mm, 0.5) * s;
                let start = -((n - 1) as f64) * spacing / 2.0;
                for i in 0..n {
                    let x = start + i as f64 * spacing - w / 2.0;
                    ctx.fill_rect(x, -h / 2.0, w, h, Ink::Open);
                }
            }
            ApertureKind::DiffractionGrating {
                lines_per_mm,
                orientation,
            } => draw_grating(ctx, p, *lines_per_mm, *orientation),
            ApertureKind::Random { count, spread_mm } => {
                let n = count_or(*count, 50);
                let spread = positive_or(*spread_mm, d) * s / 2.0;
                let base = positive_or(Some(d), 0.1) * s / 4.0;
                for _ in 0..n {
                    let r = spread * rng.next_unit().sqrt();
                    let th = TAU * rng.next_unit();
                    let size = base * (0.5 + 1.5 * rng.next_unit());
                    ctx.fill_circle(r * th.cos(), r * th.sin(), size, Ink::Open);
                }
            }
            ApertureKind::Annular { inner_diameter_mm } => {
                let inner = non_negative_or(*inner_diameter_mm, d * 0.5);
                draw_annulus(ctx, d * s / 2.0, inner * s / 2.0);
            }
            ApertureKind::MultiDot {
                pattern,
                count,
                spread_mm,
                center_dot,
            } => draw_multi_dot(ctx, p, *pattern, *count, *spread_mm, *center_dot, rng),
            ApertureKind::Star {
                spikes,
                inner_diameter_mm,
            } => {
                let inner = non_negative_or(*inner_diameter_mm, d * 0.4);
                draw_star(ctx, count_or(*spikes, 5), d * s / 2.0, inner * s / 2.0);
            }
            ApertureKind::Waves {
                count,
                amplitude_mm,
                thickness_mm,
            } => {
                draw_waves(ctx, p, *count, *amplitude_mm, *thickness_mm, None);
            }
            ApertureKind::YinYang {
                count,
                amplitude_mm,
                thickness_mm,
                dot_diameter_mm,
            } => {
                let dot = positive_or(*dot_diameter_mm, 0.2);
                draw_waves(ctx, p, *count, *amplitude_mm, *thickness_mm, Some(dot));
            }
            ApertureKind::Ura { rank } => {
                let rank = count_or(*rank, super::ura::DEFAULT_RANK as u32) as usize;
                let cell = d * s / rank as f64;
                let offset = d * s / 2.0;
                for ((i, j), &open) in generate_ura(rank).indexed_iter() {
                    if open {
                        let x = j as f64 * cell - offset;
                        let y = i as f64 * cell - offset;
                        ctx.fill_rect(x, y, cell, cell, Ink::Open);
                    }
                }
            }
            ApertureKind::Freeform {
                path,
                brush_size_mm,
            } => draw_freeform(ctx, p, path, *brush_size_mm),
            ApertureKind::Fibonacci { count, spread_mm } => {
                let n = count_or(*count, 50);
                let max_r = positive_or(*spread_mm, 2.0) * s;
                let dot_r = positive_or(Some(d), 0.1) * s / 2.0;
                let golden = PI * (3.0 - 5f64.sqrt());
                for i in 0..n {
                    let r = max_r * (i as f64 / n as f64).sqrt();
                    let th = i as f64 * golden;
                    ctx.fill_circle(r * th.cos(), r * th.sin(), dot_r, Ink::Open);
                }
            }
            ApertureKind::Fractal {
                iterations,
                size_mm,
            } => {
                let size = positive_or(*size_mm, 10.0) * s;
                let depth = count_or(*iterations, 3).min(5);
                draw_carpet(ctx, 0.0, 0.0, size, depth);
            }
            ApertureKind::SierpinskiTriangle {
                iterations,
                size_mm,
            } => {
                let size = positive_or(*size_mm, 5.0) * s;
                let depth = count_or(*iterations, 3).min(6);
                let r = size / 3f64.sqrt();
                draw_sierpinski(
                    ctx,
                    [(0.0, -r), (size / 2.0, r / 2.0), (-size / 2.0, r / 2.0)],
                    depth,
                );
            }
            ApertureKind::LithoOpc {
                sraf_width_mm,
                sraf_distance_mm,
            } => {
                let cd_mm = positive_or(Some(d), 1.0);
                let cd = cd_mm * s;
                let h = cd * 5.0;
                ctx.fill_rect(-cd / 2.0, -h / 2.0, cd, h, Ink::Open);

                let sraf_w = positive_or(*sraf_width_mm, cd_mm * 0.25) * s;
                let sraf_d = positive_or(*sraf_distance_mm, 1.0) * s;
                ctx.fill_rect(-cd / 2.0 - sraf_d - sraf_w, -h / 2.0, sraf_w, h, Ink::Open);
                ctx.fill_rect(cd / 2.0 + sraf_d, -h / 2.0, sraf_w, h, Ink::Open);
            }
            ApertureKind::Lissajous {
                rx,
                ry,
                delta_deg,
                thickness_mm,
            } => {
                let rx = positive_or(*rx, 3.0);
                let ry = positive_or(*ry, 2.0);
                let delta = if delta_deg.is_finite() {
                    delta_deg.to_radians()
                } else {
                    0.0
                };
                let r = d * s / 2.0;
                let steps = 500;
                let points: Vec<(f64, f64)> = (0..=steps)
                    .map(|i| {
                        let t = i as f64 / steps as f64 * TAU;
                        (r * (rx * t + delta).sin(), r * (ry * t).sin())
                    })
                    .collect();
                stroke_round(ctx, &points, false, positive_or(*thickness_mm, 0.1) * s);
            }
            ApertureKind::Spiral {
                arms,
                turns,
                thickness_mm,
            } => {
                let arms = count_or(*arms, 1).min(MAX_SPIRAL_ARMS);
                let turns = positive_or(*turns, 3.0).min(MAX_SPIRAL_TURNS);
                let max_r = d * s / 2.0;
                let width = positive_or(*thickness_mm, 0.1) * s;
                let steps = 100.0 * turns;
                for a in 0..arms {
                    let start = a as f64 * TAU / arms as f64;
                    let points: Vec<(f64, f64)> = (0..=steps.floor() as usize)
                        .map(|i| {
                            let t = i as f64 / steps;
                            let th = start + t * TAU * turns;
                            (t * max_r * th.cos(), t * max_r * th.sin())
                        })
                        .collect();
                    stroke_round(ctx, &points, false, width);
                }
            }
            ApertureKind::Rosette {
                petals,
                amplitude_mm,
                thickness_mm,
            } => {
                let petals = count_or(*petals, 5) as f64;
                let r_base = d * s / 2.0;
                let amp = positive_or(*amplitude_mm, d / 2.0 * 0.3) * s;
                let steps = 360;
                let points: Vec<(f64, f64)> = (0..=steps)
                    .map(|i| {
                        let th = i as f64 / steps as f64 * TAU;
                        let r = r_base + amp * (petals * th).cos();
                        (r * th.cos(), r * th.sin())
                    })
                    .collect();
                stroke_round(ctx, &points, true, positive_or(*thickness_mm, 0.1) * s);
            }
            ApertureKind::Zigzag {
                segments,
                height_mm,
                thickness_mm,
            } => {
                let w = positive_or(Some(d), 5.0) * s;
                let h = positive_or(*height_mm, 2.0) * s;
                let n = count_or(*segments, 5);
                let step = w / n as f64;
                let points: Vec<(f64, f64)> = std::iter::once((-w / 2.0, h / 2.0))
                    .chain((1..=n).map(|i| {
                        let y = if i % 2 == 0 { h / 2.0 } else { -h / 2.0 };
                        (-w / 2.0 + i as f64 * step, y)
                    }))
                    .collect();
                if let Some(path) = polyline(&points, false) {
                    let width = positive_or(*thickness_mm, 0.2) * s;
                    ctx.stroke_path(&path, width, LineCap::Round, LineJoin::Miter, Ink::Open);
                }
            }
            ApertureKind::DotSlit {
                dot_diameter_mm,
                slit_width_mm,
                separation_mm,
            } => {
                let dot_r = positive_or(*dot_diameter_mm, 0.2) * s / 2.0;
                let slit_w = positive_or(*slit_width_mm, 0.2) * s;
                let slit_l = positive_or(Some(d), 5.0) * s;
                let dist = positive_or(*separation_mm, 1.0) * s;
                ctx.fill_circle(-dist / 2.0, 0.0, dot_r, Ink::Open);
                ctx.fill_rect(dist / 2.0 - slit_w / 2.0, -slit_l / 2.0, slit_w, slit_l, Ink::Open);
            }
            ApertureKind::Custom { .. } => {
                // Threshold and invert are applied when the mask is built
                if let Some(mask) = p.mask {
                    let size = d * s;
                    ctx.draw_image(mask.pixmap(), -size / 2.0, -size / 2.0, size, size);
                }
            }
        }
    }
}

/// `value` when non-negative and finite, else `default`. Zero is a valid inner diameter.
fn non_negative_or(value: Option<f64>, default: f64) -> f64 {
    match value {
        Some(v) if v.is_finite() && v >= 0.0 => v,
        _ => default,
    }
}

fn stroke_round(ctx: &mut RasterContext, points: &[(f64, f64)], close: bool, width: f64) {
    if let Some(path) = polyline(points, close) {
        ctx.stroke_path(&path, width, LineCap::Round, LineJoin::Round, Ink::Open);
    }
}

fn draw_polygon(
    ctx: &mut RasterContext,
    p: &DrawParams<'_>,
    sides: Option<u32>,
    style: PolygonStyle,
    line_width_mm: Option<f64>,
) {
    let n = count_or(sides, 6).max(3);
    let r = p.diameter_mm * p.scale_px_per_mm / 2.0;
    let points: Vec<(f64, f64)> = (0..=n)
        .map(|i| {
            let th = i as f64 * TAU / n as f64 - PI / 2.0;
            (r * th.cos(), r * th.sin())
        })
        .collect();
    let Some(path) = polyline(&points, true) else {
        return;
    };

    match style {
        PolygonStyle::Filled => ctx.fill_path(&path, FillRule::Winding, Ink::Open),
        PolygonStyle::Lined => {
            let width = positive_or(line_width_mm, 0.2) * p.scale_px_per_mm;
            ctx.stroke_path(&path, width, LineCap::Butt, LineJoin::Miter, Ink::Open);
        }
    }
}

fn draw_annulus(ctx: &mut RasterContext, r_outer: f64, r_inner: f64) {
    let mut pb = PathBuilder::new();
    if r_outer > 0.0 {
        pb.push_circle(0.0, 0.0, r_outer as f32);
    }
    if r_inner > 0.0 {
        pb.push_circle(0.0, 0.0, r_inner as f32);
    }
    if let Some(path) = pb.finish() {
        ctx.fill_path(&path, FillRule::EvenOdd, Ink::Open);
    }
}

fn draw_grating(
    ctx: &mut RasterContext,
    p: &DrawParams<'_>,
    lines_per_mm: Option<f64>,
    orientation: GratingOrientation,
) {
    let r = p.diameter_mm * p.scale_px_per_mm / 2.0;
    let lpmm = positive_or(lines_per_mm, 5.0).max(0.1);
    let pitch = p.scale_px_per_mm / lpmm;
    let thickness = pitch * 0.5;
    let count = (2.0 * r / pitch).ceil() as usize;

    ctx.with_saved(|ctx| {
        ctx.clip_circle(0.0, 0.0, r);
        let mut rule = |ctx: &mut RasterContext, angle: f64| {
            ctx.with_saved(|ctx| {
                ctx.rotate_radians(angle);
                for i in 0..count {
                    ctx.fill_rect(-r + i as f64 * pitch, -r, thickness, 2.0 * r, Ink::Open);
                }
            });
        };
        if matches!(orientation, GratingOrientation::Vertical | GratingOrientation::Grid) {
            rule(ctx, 0.0);
        }
        if matches!(orientation, GratingOrientation::Horizontal | GratingOrientation::Grid) {
            rule(ctx, PI / 2.0);
        }
    });
}

fn draw_zone_plate(ctx: &mut RasterContext, p: &DrawParams<'_>, profile: ZonePlateProfile) {
    let s = p.scale_px_per_mm;
    let lambda_f = p.wavelength_mm * p.focal_length_mm;
    let max_r = p.diameter_mm * s / 2.0;

    match profile {
        ZonePlateProfile::Binary => {
            let max_n = ((p.diameter_mm / 2.0).powi(2) / lambda_f).floor() as i64;
            let drawn = max_n.min(MAX_ZONE_RINGS);
            let outer = max_n.max(1);
            let inner = (max_n - drawn).max(1);
            // Outermost first so every smaller disc overwrites the centre
            for n in (inner..=outer).rev() {
                let r = (n as f64 * lambda_f).sqrt() * s;
                let ink = if n % 2 == 1 { Ink::Open } else { Ink::Opaque };
                ctx.fill_circle(0.0, 0.0, r, ink);
            }
        }
        ZonePlateProfile::Sinusoidal => {
            let step = 0.5;
            let mut r = 0.0;
            while r < max_r {
                let r_mm = r / s;
                let t = (1.0 + (PI * r_mm * r_mm / lambda_f).cos()) / 2.0;
                if let Some(path) = circle_path(0.0, 0.0, r) {
                    ctx.stroke_path(&path, step + 0.1, LineCap::Butt, LineJoin::Miter, Ink::Partial(t));
                }
                r += step;
            }
        }
        ZonePlateProfile::Spiral => {
            let step = 0.5;
            let mut r = 0.0;
            while r < max_r {
                let r_mm = r / s;
                let phase = PI * r_mm * r_mm / lambda_f;
                let mut th = 0.0;
                while th < TAU {
                    if (phase + th).cos() > 0.0 {
                        ctx.fill_rect(r * th.cos(), r * th.sin(), 1.5, 1.5, Ink::Open);
                    }
                    th += 0.05;
                }
                r += step;
            }
        }
    }
}

fn draw_photon_sieve(
    ctx: &mut RasterContext,
    p: &DrawParams<'_>,
    zones: Option<u32>,
    rng: &mut Lcg32,
) {
    let s = p.scale_px_per_mm;
    let lambda_f = p.wavelength_mm * p.focal_length_mm;
    let max_r = p.diameter_mm / 2.0;
    let zones = count_or(zones, 15);

    for n in 1..=zones * 4 {
        let nf = n as f64;
        let r_centre = ((nf + 0.5) * lambda_f).sqrt();
        let r_width = ((nf + 1.0) * lambda_f).sqrt() - (nf * lambda_f).sqrt();
        if r_centre > max_r {
            break;
        }
        if n % 2 == 0 {
            continue;
        }
        let hole_d = 1.53 * r_width;
        let hole_r_px = hole_d * s / 2.0;
        if hole_r_px < 0.2 {
            continue;
        }
        let holes = (TAU * r_centre / (hole_d * 1.5)).floor() as usize;
        let r_px = r_centre * s;
        for k in 0..holes {
            let th = k as f64 / holes as f64 * TAU + rng.next_unit() * 0.5;
            ctx.fill_circle(r_px * th.cos(), r_px * th.sin(), hole_r_px, Ink::Open);
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn draw_multi_dot(
    ctx: &mut RasterContext,
    p: &DrawParams<'_>,
    pattern: MultiDotPattern,
    count: Option<u32>,
    spread_mm: Option<f64>,
    center_dot: bool,
    rng: &mut Lcg32,
) {
    let s = p.scale_px_per_mm;
    let n = count_or(count, 8);
    let spread = positive_or(spread_mm, 2.0) * s;
    let dot_r = positive_or(Some(p.diameter_mm), 0.2) * s / 2.0;

    if center_dot {
        ctx.fill_circle(0.0, 0.0, dot_r, Ink::Open);
    }

    match pattern {
        MultiDotPattern::Ring => {
            for i in 0..n {
                let th = i as f64 / n as f64 * TAU;
                ctx.fill_circle(spread * th.cos(), spread * th.sin(), dot_r, Ink::Open);
            }
        }
        MultiDotPattern::Grid => {
            let side = (n as f64).sqrt().ceil() as u32;
            let spacing = spread * 2.0 / (side.saturating_sub(1).max(1)) as f64;
            let start = -((side - 1) as f64) * spacing / 2.0;
            let cells = (0..side).flat_map(|r| (0..side).map(move |c| (r, c)));
            for (r, c) in cells.take(n as usize) {
                let x = start + c as f64 * spacing;
                let y = start + r as f64 * spacing;
                ctx.fill_circle(x, y, dot_r, Ink::Open);
            }
        }
        MultiDotPattern::Concentric => {
            let rings = 5u32;
            let weight_total = (rings * (rings + 1) / 2) as f64;
            for ring in 1..=rings {
                let rad = ring as f64 / rings as f64 * spread;
                let dots = ((n as f64 * ring as f64 / weight_total).floor() as u32).max(3);
                let stagger = (ring % 2) as f64 * PI / dots as f64;
                for k in 0..dots {
                    let th = k as f64 / dots as f64 * TAU + stagger;
                    ctx.fill_circle(rad * th.cos(), rad * th.sin(), dot_r, Ink::Open);
                }
            }
        }
        MultiDotPattern::Random => {
            for _ in 0..n {
                let r = spread * rng.next_unit().sqrt();
                let th = TAU * rng.next_unit();
                ctx.fill_circle(r * th.cos(), r * th.sin(), dot_r, Ink::Open);
            }
        }
        MultiDotPattern::Line => {
            let step = spread * 2.0 / (n.saturating_sub(1).max(1)) as f64;
            for i in 0..n {
                ctx.fill_circle(-spread + i as f64 * step, 0.0, dot_r, Ink::Open);
            }
        }
    }
}

fn draw_star(ctx: &mut RasterContext, spikes: u32, outer: f64, inner: f64) {
    let step = PI / spikes as f64;
    let mut rot = PI / 2.0 * 3.0;
    let mut points = vec![(0.0, -outer)];
    for _ in 0..spikes {
        points.push((rot.cos() * outer, rot.sin() * outer));
        rot += step;
        points.push((rot.cos() * inner, rot.sin() * inner));
        rot += step;
    }
    points.push((0.0, -outer));
    if let Some(path) = polyline(&points, true) {
        ctx.fill_path(&path, FillRule::Winding, Ink::Open);
    }
}

fn draw_waves(
    ctx: &mut RasterContext,
    p: &DrawParams<'_>,
    count: Option<u32>,
    amplitude_mm: Option<f64>,
    thickness_mm: Option<f64>,
    dot_diameter_mm: Option<f64>,
) {
    let s = p.scale_px_per_mm;
    let width = positive_or(Some(p.diameter_mm), 10.0) * s;
    let thickness = positive_or(thickness_mm, 0.1) * s;
    let amplitude = positive_or(amplitude_mm, 2.0) * s;
    let waves = count_or(count, 1);

    let steps = 100 * waves as usize;
    let points: Vec<(f64, f64)> = (0..=steps)
        .map(|i| {
            let x_norm = i as f64 / steps as f64;
            let angle = x_norm * TAU * waves as f64;
            ((x_norm - 0.5) * width, amplitude / 2.0 * angle.sin())
        })
        .collect();
    stroke_round(ctx, &points, false, thickness);

    if let Some(dot) = dot_diameter_mm {
        let dot_r = dot * s / 2.0;
        for w in 0..waves {
            for phase in [0.25, 0.75] {
                let x_norm = (w as f64 + phase) / waves as f64;
                ctx.fill_circle((x_norm - 0.5) * width, 0.0, dot_r, Ink::Open);
            }
        }
    }
}

fn draw_carpet(ctx: &mut RasterContext, x: f64, y: f64, size: f64, depth: u32) {
    let third = size / 3.0;
    if depth == 0 || third < 0.5 {
        ctx.fill_rect(x - size / 2.0, y - size / 2.0, size, size, Ink::Open);
        return;
    }
    for dx in -1..=1 {
        for dy in -1..=1 {
            if dx == 0 && dy == 0 {
                continue;
            }
            draw_carpet(
                ctx,
                x + dx as f64 * third,
                y + dy as f64 * third,
                third,
                depth - 1,
            );
        }
    }
}

fn draw_sierpinski(ctx: &mut RasterContext, [a, b, c]: [(f64, f64); 3], depth: u32) {
    let edge = ((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)).sqrt();
    if depth == 0 || edge < 1.0 {
        if let Some(path) = polyline(&[a, b, c], true) {
            ctx.fill_path(&path, FillRule::Winding, Ink::Open);
        }
        return;
    }
    let mid = |p: (f64, f64), q: (f64, f64)| ((p.0 + q.0) / 2.0, (p.1 + q.1) / 2.0);
    let (ab, bc, ca) = (mid(a, b), mid(b, c), mid(c, a));
    draw_sierpinski(ctx, [a, ab, ca], depth - 1);
    draw_sierpinski(ctx, [ab, b, bc], depth - 1);
    draw_sierpinski(ctx, [ca, bc, c], depth - 1);
}

fn draw_freeform(
    ctx: &mut RasterContext,
    p: &DrawParams<'_>,
    path: &[FreeformPoint],
    brush_size_mm: Option<f64>,
) {
    let half_extent = positive_or(Some(p.diameter_mm), 10.0) * p.scale_px_per_mm / 2.0;
    let width = positive_or(brush_size_mm, 0.5) * p.scale_px_per_mm;

    for stroke in split_strokes(path) {
        let points: Vec<(f64, f64)> = stroke
            .iter()
            .map(|&(x, y)| (x * half_extent, y * half_extent))
            .collect();
        stroke_round(ctx, &points, false, width);
    }
}

/// Split a freeform path at pen-up sentinels into independent strokes.
pub fn split_strokes(path: &[FreeformPoint]) -> Vec<Vec<(f64, f64)>> {
    let mut strokes = Vec::new();
    let mut current = Vec::new();
    for point in path {
        match point.position() {
            Some(xy) => current.push(xy),
            None => {
                if !current.is_empty() {
                    strokes.push(std::mem::take(&mut current));
                }
            }
        }
    }
    if !current.is_empty() {
        strokes.push(current);
    }
    strokes
}
