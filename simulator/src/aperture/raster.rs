//! Raster surface that aperture shapes are drawn onto.
//!
//! A [`RasterContext`] wraps a tiny-skia [`Pixmap`] that starts fully black
//! (opaque, zero transmittance) with the drawing origin in the middle of the
//! surface. Shapes paint white where light passes. The context keeps a current
//! transform and an optional clip, both of which can be scoped with
//! [`RasterContext::with_saved`] the way a canvas save/restore pair works.
//!
//! Coordinates passed to the drawing methods are in pixels relative to the
//! current transform.

use image::RgbaImage;
use ndarray::Array2;
use shared::image_proc::green_transmittance;
use thiserror::Error;
use tiny_skia::{
    Color, FillRule, FilterQuality, LineCap, LineJoin, Mask, Paint, Path, PathBuilder, Pixmap,
    PixmapPaint, Rect, Stroke, Transform,
};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RasterError {
    #[error("cannot allocate a {width}x{height} raster surface")]
    Allocation { width: u32, height: u32 },
}

/// What a drawing operation paints.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Ink {
    /// Fully transmitting (white)
    Open,
    /// Fully blocking (black)
    Opaque,
    /// White blended over the existing value with the given coverage in `[0, 1]`
    Partial(f64),
}

impl Ink {
    fn paint(self) -> Paint<'static> {
        let mut paint = Paint::default();
        paint.anti_alias = true;
        match self {
            Ink::Open => paint.set_color_rgba8(255, 255, 255, 255),
            Ink::Opaque => paint.set_color_rgba8(0, 0, 0, 255),
            Ink::Partial(alpha) => {
                let a = (alpha.clamp(0.0, 1.0) * 255.0).round() as u8;
                paint.set_color_rgba8(255, 255, 255, a)
            }
        }
        paint
    }
}

pub struct RasterContext {
    pixmap: Pixmap,
    transform: Transform,
    clip: Option<Mask>,
}

impl std::fmt::Debug for RasterContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RasterContext")
            .field("width", &self.pixmap.width())
            .field("height", &self.pixmap.height())
            .field("transform", &self.transform)
            .field("clipped", &self.clip.is_some())
            .finish()
    }
}

impl RasterContext {
    /// Allocate a black `width × height` surface with the origin at its centre.
    pub fn new(width: u32, height: u32) -> Result<Self, RasterError> {
        let mut pixmap =
            Pixmap::new(width, height).ok_or(RasterError::Allocation { width, height })?;
        pixmap.fill(Color::BLACK);

        Ok(Self {
            pixmap,
            transform: Transform::from_translate(width as f32 / 2.0, height as f32 / 2.0),
            clip: None,
        })
    }

    pub fn width(&self) -> u32 {
        self.pixmap.width()
    }

    pub fn height(&self) -> u32 {
        self.pixmap.height()
    }

    /// Rotate subsequent drawing by `degrees` (clockwise on screen).
    pub fn rotate(&mut self, degrees: f64) {
        self.transform = self
            .transform
            .pre_concat(Transform::from_rotate(degrees as f32));
    }

    pub fn rotate_radians(&mut self, radians: f64) {
        self.rotate(radians.to_degrees());
    }

    pub fn translate(&mut self, dx: f64, dy: f64) {
        self.transform = self
            .transform
            .pre_concat(Transform::from_translate(dx as f32, dy as f32));
    }

    /// Run `draw` with the current transform and clip restored afterwards.
    pub fn with_saved<R>(&mut self, draw: impl FnOnce(&mut Self) -> R) -> R {
        let transform = self.transform;
        let clip = self.clip.clone();
        let result = draw(self);
        self.transform = transform;
        self.clip = clip;
        result
    }

    /// Restrict subsequent drawing to a circle.
    pub fn clip_circle(&mut self, cx: f64, cy: f64, radius: f64) {
        let Some(mut mask) = Mask::new(self.width(), self.height()) else {
            return;
        };
        if let Some(path) = circle_path(cx, cy, radius) {
            mask.fill_path(&path, FillRule::Winding, true, self.transform);
        }
        self.clip = Some(mask);
    }

    pub fn fill_circle(&mut self, cx: f64, cy: f64, radius: f64, ink: Ink) {
        if let Some(path) = circle_path(cx, cy, radius) {
            self.fill_path(&path, FillRule::Winding, ink);
        }
    }

    pub fn fill_rect(&mut self, x: f64, y: f64, w: f64, h: f64, ink: Ink) {
        if let Some(rect) = Rect::from_xywh(x as f32, y as f32, w as f32, h as f32) {
            self.pixmap
                .fill_rect(rect, &ink.paint(), self.transform, self.clip.as_ref());
        }
    }

    pub fn fill_path(&mut self, path: &Path, rule: FillRule, ink: Ink) {
        self.pixmap
            .fill_path(path, &ink.paint(), rule, self.transform, self.clip.as_ref());
    }

    /// Stroke `path` with a line `width` pixels wide. Non-positive widths draw nothing.
    pub fn stroke_path(&mut self, path: &Path, width: f64, cap: LineCap, join: LineJoin, ink: Ink) {
        if !(width.is_finite() && width > 0.0) {
            return;
        }
        let stroke = Stroke {
            width: width as f32,
            line_cap: cap,
            line_join: join,
            ..Stroke::default()
        };
        self.pixmap.stroke_path(
            path,
            &ink.paint(),
            &stroke,
            self.transform,
            self.clip.as_ref(),
        );
    }

    /// Draw `image` scaled into the rectangle `(x, y, w, h)`.
    pub fn draw_image(&mut self, image: &Pixmap, x: f64, y: f64, w: f64, h: f64) {
        if image.width() == 0 || image.height() == 0 || w <= 0.0 || h <= 0.0 {
            return;
        }
        let placement = self
            .transform
            .pre_concat(Transform::from_translate(x as f32, y as f32))
            .pre_concat(Transform::from_scale(
                (w / image.width() as f64) as f32,
                (h / image.height() as f64) as f32,
            ));
        let paint = PixmapPaint {
            quality: FilterQuality::Bilinear,
            ..PixmapPaint::default()
        };
        self.pixmap
            .draw_pixmap(0, 0, image.as_ref(), &paint, placement, self.clip.as_ref());
    }

    /// Read the surface back as transmittance in `[0, 1]`, shape `(height, width)`.
    pub fn into_transmittance(self) -> Array2<f32> {
        let (width, height) = (self.width(), self.height());
        // The surface is opaque everywhere, so premultiplied bytes equal straight RGBA
        match RgbaImage::from_raw(width, height, self.pixmap.take()) {
            Some(img) => green_transmittance(&img),
            None => Array2::zeros((height as usize, width as usize)),
        }
    }
}

/// Circle path, `None` for non-positive or non-finite radii.
pub fn circle_path(cx: f64, cy: f64, radius: f64) -> Option<Path> {
    if !(radius.is_finite() && radius > 0.0) {
        return None;
    }
    PathBuilder::from_circle(cx as f32, cy as f32, radius as f32)
}

/// Open or closed polyline through `points`; `None` with fewer than two points.
pub fn polyline(points: &[(f64, f64)], close: bool) -> Option<Path> {
    let (first, rest) = points.split_first()?;
    if rest.is_empty() {
        return None;
    }
    let mut pb = PathBuilder::new();
    pb.move_to(first.0 as f32, first.1 as f32);
    for &(x, y) in rest {
        pb.line_to(x as f32, y as f32);
    }
    if close {
        pb.close();
    }
    pb.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_new_surface_is_opaque() {
        let ctx = RasterContext::new(8, 6).unwrap();
        let t = ctx.into_transmittance();
        assert_eq!(t.dim(), (6, 8));
        assert!(t.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_zero_size_fails() {
        assert_eq!(
            RasterContext::new(0, 10).unwrap_err(),
            RasterError::Allocation {
                width: 0,
                height: 10
            }
        );
    }

    #[test]
    fn test_circle_area_matches_pi_r_squared() {
        let mut ctx = RasterContext::new(101, 101).unwrap();
        ctx.fill_circle(0.0, 0.0, 30.0, Ink::Open);
        let t = ctx.into_transmittance();
        let area: f32 = t.sum();
        assert_relative_eq!(area, std::f32::consts::PI * 900.0, max_relative = 0.01);
        assert_eq!(t[[50, 50]], 1.0);
        assert_eq!(t[[0, 0]], 0.0);
    }

    #[test]
    fn test_opaque_ink_cuts_hole() {
        let mut ctx = RasterContext::new(64, 64).unwrap();
        ctx.fill_rect(-20.0, -20.0, 40.0, 40.0, Ink::Open);
        ctx.fill_rect(-5.0, -5.0, 10.0, 10.0, Ink::Opaque);
        let t = ctx.into_transmittance();
        assert_eq!(t[[32, 32]], 0.0);
        assert_eq!(t[[32, 20]], 1.0);
    }

    #[test]
    fn test_partial_ink_blends() {
        let mut ctx = RasterContext::new(16, 16).unwrap();
        ctx.fill_rect(-8.0, -8.0, 16.0, 16.0, Ink::Partial(0.5));
        let t = ctx.into_transmittance();
        assert_relative_eq!(t[[8, 8]], 0.5, epsilon = 0.01);
    }

    #[test]
    fn test_clip_is_scoped() {
        let mut ctx = RasterContext::new(64, 64).unwrap();
        ctx.with_saved(|ctx| {
            ctx.clip_circle(0.0, 0.0, 10.0);
            ctx.fill_rect(-32.0, -32.0, 64.0, 64.0, Ink::Open);
        });
        ctx.fill_rect(-32.0, -32.0, 4.0, 4.0, Ink::Open);
        let t = ctx.into_transmittance();
        assert_eq!(t[[32, 32]], 1.0);
        assert_eq!(t[[32, 60]], 0.0);
        assert_eq!(t[[1, 1]], 1.0);
    }

    #[test]
    fn test_rotation_turns_bar() {
        let mut ctx = RasterContext::new(64, 64).unwrap();
        ctx.rotate(90.0);
        ctx.fill_rect(-20.0, -2.0, 40.0, 4.0, Ink::Open);
        let t = ctx.into_transmittance();
        assert_eq!(t[[15, 32]], 1.0);
        assert_eq!(t[[32, 15]], 0.0);
    }

    #[test]
    fn test_polyline_needs_two_points() {
        assert!(polyline(&[(0.0, 0.0)], false).is_none());
        assert!(polyline(&[(0.0, 0.0), (1.0, 1.0)], false).is_some());
    }
}
