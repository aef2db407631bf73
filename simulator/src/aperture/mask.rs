//! Imported bitmap masks for the custom aperture kind.
//!
//! A mask image is reduced to pure black and white: a pixel is open when the
//! mean of its R, G and B values exceeds the threshold, and the result may be
//! inverted. An absent or undecodable mask is not an error for a simulation
//! run; callers log the failure and draw a blank aperture.

use image::RgbaImage;
use thiserror::Error;
use tiny_skia::{IntSize, Pixmap};

pub const DEFAULT_THRESHOLD: u8 = 128;

#[derive(Error, Debug)]
pub enum MaskError {
    #[error("mask image could not be decoded: {0}")]
    Decode(#[from] image::ImageError),
    #[error("mask image is empty")]
    Empty,
}

/// Thresholded black/white mask ready to be drawn.
#[derive(Debug, Clone)]
pub struct BinaryMask {
    pixmap: Pixmap,
}

impl BinaryMask {
    /// Threshold an RGBA image.
    pub fn from_image(img: &RgbaImage, threshold: u8, invert: bool) -> Result<Self, MaskError> {
        let (width, height) = img.dimensions();
        let size = IntSize::from_wh(width, height).ok_or(MaskError::Empty)?;

        let data: Vec<u8> = img
            .pixels()
            .flat_map(|p| {
                let mean = (p[0] as u32 + p[1] as u32 + p[2] as u32) as f32 / 3.0;
                let open = (mean > threshold as f32) != invert;
                let v = if open { 255 } else { 0 };
                [v, v, v, 255]
            })
            .collect();

        let pixmap = Pixmap::from_vec(data, size).ok_or(MaskError::Empty)?;
        Ok(Self { pixmap })
    }

    /// Decode encoded image bytes (PNG) and threshold them.
    pub fn decode(bytes: &[u8], threshold: u8, invert: bool) -> Result<Self, MaskError> {
        let img = image::load_from_memory(bytes)?.to_rgba8();
        Self::from_image(&img, threshold, invert)
    }

    pub fn pixmap(&self) -> &Pixmap {
        &self.pixmap
    }

    /// Fraction of open pixels.
    pub fn open_fraction(&self) -> f64 {
        let pixels = self.pixmap.pixels();
        let open = pixels.iter().filter(|p| p.green() > 0).count();
        open as f64 / pixels.len().max(1) as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn gradient() -> RgbaImage {
        RgbaImage::from_fn(4, 1, |x, _| {
            let v = (x * 80) as u8; // 0, 80, 160, 240
            Rgba([v, v, v, 255])
        })
    }

    #[test]
    fn test_threshold() {
        let mask = BinaryMask::from_image(&gradient(), DEFAULT_THRESHOLD, false).unwrap();
        let greens: Vec<u8> = mask.pixmap().pixels().iter().map(|p| p.green()).collect();
        assert_eq!(greens, vec![0, 0, 255, 255]);
        assert_eq!(mask.open_fraction(), 0.5);
    }

    #[test]
    fn test_invert() {
        let mask = BinaryMask::from_image(&gradient(), 100, true).unwrap();
        let greens: Vec<u8> = mask.pixmap().pixels().iter().map(|p| p.green()).collect();
        assert_eq!(greens, vec![255, 255, 0, 0]);
    }

    #[test]
    fn test_garbage_bytes_fail_to_decode() {
        assert!(matches!(
            BinaryMask::decode(b"not an image", 128, false),
            Err(MaskError::Decode(_))
        ));
    }

    #[test]
    fn test_empty_image() {
        let img = RgbaImage::new(0, 0);
        assert!(matches!(
            BinaryMask::from_image(&img, 128, false),
            Err(MaskError::Empty)
        ));
    }
}
