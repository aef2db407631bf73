//! 2D convolution for image planes
//!
//! Two tools live here:
//!
//! - [`FftConvolver`]: linear convolution of an image plane with a kernel of
//!   the same or smaller size via a padded power-of-two FFT. Pixels outside
//!   the image are filled according to an [`EdgeMode`]; clamp-to-edge avoids
//!   dark borders when a wide kernel pulls light in from outside the frame.
//! - [`gaussian_blur`]: separable Gaussian filter for small blur radii where
//!   an FFT would be wasted effort.

use log::debug;
use ndarray::{Array2, ArrayView2, Zip};
use rustfft::num_complex::Complex32;

use crate::algo::fft::{fft_shift, next_power_of_two, Fft2dPlan, FftError};

/// How to fill samples that fall outside the source plane
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EdgeMode {
    /// Repeat the nearest edge pixel
    Extend,
    /// Use a fixed value
    Constant(f32),
}

/// FFT linear convolution for a fixed image size.
///
/// The image is placed in the middle of a `next_pow2(w) × next_pow2(h)`
/// grid. The kernel is placed so that its centre pixel `(kh/2, kw/2)` lands on
/// the grid centre, then quadrant-shifted so that centre becomes the origin.
/// A unit impulse at the kernel centre therefore reproduces the image.
#[derive(Debug, Clone)]
pub struct FftConvolver {
    width: usize,
    height: usize,
    fft_width: usize,
    fft_height: usize,
    offset_x: usize,
    offset_y: usize,
    forward: Fft2dPlan,
    inverse: Fft2dPlan,
}

impl FftConvolver {
    /// Plan convolutions of `width × height` planes.
    pub fn new(width: usize, height: usize) -> Result<Self, FftError> {
        let fft_width = next_power_of_two(width);
        let fft_height = next_power_of_two(height);
        debug!("FFT convolver {width}x{height} padded to {fft_width}x{fft_height}");

        Ok(Self {
            width,
            height,
            fft_width,
            fft_height,
            offset_x: (fft_width - width) / 2,
            offset_y: (fft_height - height) / 2,
            forward: Fft2dPlan::forward(fft_height, fft_width)?,
            inverse: Fft2dPlan::inverse(fft_height, fft_width)?,
        })
    }

    /// Padded FFT grid shape as (rows, cols)
    pub fn fft_dim(&self) -> (usize, usize) {
        (self.fft_height, self.fft_width)
    }

    /// Convolve `image` with `kernel`.
    ///
    /// # Arguments
    /// * `image` - Plane of shape `(height, width)` this convolver was built for
    /// * `kernel` - Kernel no larger than the padded grid
    /// * `edge` - Fill rule for the padding around the image
    ///
    /// # Returns
    /// The convolved plane, same shape as `image`
    pub fn convolve(
        &self,
        image: &ArrayView2<f32>,
        kernel: &ArrayView2<f32>,
        edge: EdgeMode,
    ) -> Result<Array2<f32>, FftError> {
        let (rows, cols) = image.dim();
        if rows != self.height || cols != self.width {
            return Err(self.mismatch(rows, cols));
        }
        let (k_rows, k_cols) = kernel.dim();
        if k_rows > self.fft_height || k_cols > self.fft_width {
            return Err(self.mismatch(k_rows, k_cols));
        }

        let mut image_spectrum = self.padded_image(image, edge);
        self.forward.process(&mut image_spectrum)?;

        let mut kernel_spectrum = self.centred_kernel(kernel);
        self.forward.process(&mut kernel_spectrum)?;

        Zip::from(&mut image_spectrum)
            .and(&kernel_spectrum)
            .par_for_each(|a, &b| *a *= b);
        self.inverse.process(&mut image_spectrum)?;

        Ok(Array2::from_shape_fn((rows, cols), |(y, x)| {
            image_spectrum[[y + self.offset_y, x + self.offset_x]].re
        }))
    }

    fn mismatch(&self, rows: usize, cols: usize) -> FftError {
        FftError::ShapeMismatch {
            expected_rows: self.height,
            expected_cols: self.width,
            rows,
            cols,
        }
    }

    fn padded_image(&self, image: &ArrayView2<f32>, edge: EdgeMode) -> Array2<Complex32> {
        let max_y = self.height as isize - 1;
        let max_x = self.width as isize - 1;

        Array2::from_shape_fn((self.fft_height, self.fft_width), |(fy, fx)| {
            let y = fy as isize - self.offset_y as isize;
            let x = fx as isize - self.offset_x as isize;
            let inside = (0..=max_y).contains(&y) && (0..=max_x).contains(&x);
            let value = match edge {
                _ if inside => image[[y as usize, x as usize]],
                EdgeMode::Extend => image[[y.clamp(0, max_y) as usize, x.clamp(0, max_x) as usize]],
                EdgeMode::Constant(c) => c,
            };
            Complex32::new(value, 0.0)
        })
    }

    fn centred_kernel(&self, kernel: &ArrayView2<f32>) -> Array2<Complex32> {
        let (k_rows, k_cols) = kernel.dim();
        let off_y = self.fft_height / 2 - k_rows / 2;
        let off_x = self.fft_width / 2 - k_cols / 2;

        let mut placed = Array2::<Complex32>::zeros((self.fft_height, self.fft_width));
        placed
            .slice_mut(ndarray::s![off_y..off_y + k_rows, off_x..off_x + k_cols])
            .zip_mut_with(kernel, |dst, &src| *dst = Complex32::new(src, 0.0));

        fft_shift(&placed)
    }
}

/// Normalised 1D Gaussian taps covering ±3σ.
///
/// Returns a single unit tap when `sigma` is not positive.
pub fn gaussian_kernel_1d(sigma: f32) -> Vec<f32> {
    if sigma.is_nan() || sigma <= 0.0 {
        return vec![1.0];
    }
    let radius = (3.0 * sigma).ceil() as isize;
    let two_sigma_sq = 2.0 * sigma * sigma;
    let mut taps: Vec<f32> = (-radius..=radius)
        .map(|i| (-(i * i) as f32 / two_sigma_sq).exp())
        .collect();
    let sum: f32 = taps.iter().sum();
    taps.iter_mut().for_each(|t| *t /= sum);
    taps
}

fn blur_lane(src: ndarray::ArrayView1<f32>, mut dst: ndarray::ArrayViewMut1<f32>, taps: &[f32]) {
    let len = src.len() as isize;
    let radius = (taps.len() / 2) as isize;
    for i in 0..len {
        let mut acc = 0.0;
        for (t, &w) in taps.iter().enumerate() {
            let j = (i + t as isize - radius).clamp(0, len - 1);
            acc += src[j as usize] * w;
        }
        dst[i as usize] = acc;
    }
}

/// Separable Gaussian blur with extend-edge handling.
///
/// # Arguments
/// * `plane` - Input plane
/// * `sigma` - Standard deviation in pixels
pub fn gaussian_blur(plane: &ArrayView2<f32>, sigma: f32) -> Array2<f32> {
    let taps = gaussian_kernel_1d(sigma);
    if taps.len() == 1 || plane.is_empty() {
        return plane.to_owned();
    }

    let mut horizontal = Array2::zeros(plane.raw_dim());
    Zip::from(horizontal.rows_mut())
        .and(plane.rows())
        .par_for_each(|dst, src| blur_lane(src, dst, &taps));

    let mut out = Array2::zeros(plane.raw_dim());
    Zip::from(out.columns_mut())
        .and(horizontal.columns())
        .par_for_each(|dst, src| blur_lane(src, dst, &taps));

    out
}
