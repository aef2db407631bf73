//! Two-dimensional complex FFT on power-of-two grids.
//!
//! Transforms are computed as a pass of 1D transforms over every row followed
//! by a pass over every column. Buffers are single precision (`Complex32`).
//! The inverse transform is normalised by `1/(rows × cols)`, so a forward
//! transform followed by an inverse one returns the original field.
//!
//! Diffraction code works with spectra whose zero frequency sits in the
//! middle of the grid; [`fft_shift`] performs the quadrant swap that moves
//! the origin between the corner and the centre.

use std::sync::Arc;

use ndarray::parallel::prelude::*;
use ndarray::{Array2, Axis};
use rustfft::num_complex::Complex32;
use rustfft::{Fft, FftPlanner};
use thiserror::Error;

pub use rustfft::FftDirection;

/// Errors raised when a grid cannot be transformed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FftError {
    #[error("FFT dimensions must be non-zero powers of two, got {rows}x{cols}")]
    NotPowerOfTwo { rows: usize, cols: usize },
    #[error("plan is for {expected_rows}x{expected_cols} grids but received {rows}x{cols}")]
    ShapeMismatch {
        expected_rows: usize,
        expected_cols: usize,
        rows: usize,
        cols: usize,
    },
}

/// True when `n` is a non-zero power of two.
pub fn is_power_of_two(n: usize) -> bool {
    n != 0 && n.is_power_of_two()
}

/// Smallest power of two greater than or equal to `n` (1 for `n == 0`).
pub fn next_power_of_two(n: usize) -> usize {
    n.max(1).next_power_of_two()
}

/// A reusable 2D transform plan for a fixed grid shape and direction.
///
/// Planning is the expensive part of rustfft; the spectral band loop builds
/// one plan per grid size and reuses it for every band.
#[derive(Clone)]
pub struct Fft2dPlan {
    rows: usize,
    cols: usize,
    direction: FftDirection,
    row_fft: Arc<dyn Fft<f32>>,
    col_fft: Arc<dyn Fft<f32>>,
}

impl std::fmt::Debug for Fft2dPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fft2dPlan")
            .field("rows", &self.rows)
            .field("cols", &self.cols)
            .field("direction", &self.direction)
            .finish()
    }
}

impl Fft2dPlan {
    /// Plan a transform for `rows × cols` grids.
    ///
    /// # Errors
    /// [`FftError::NotPowerOfTwo`] if either dimension is not a power of two.
    pub fn new(rows: usize, cols: usize, direction: FftDirection) -> Result<Self, FftError> {
        if !is_power_of_two(rows) || !is_power_of_two(cols) {
            return Err(FftError::NotPowerOfTwo { rows, cols });
        }

        let mut planner = FftPlanner::<f32>::new();
        let row_fft = planner.plan_fft(cols, direction);
        let col_fft = planner.plan_fft(rows, direction);

        Ok(Self {
            rows,
            cols,
            direction,
            row_fft,
            col_fft,
        })
    }

    /// Plan a forward transform.
    pub fn forward(rows: usize, cols: usize) -> Result<Self, FftError> {
        Self::new(rows, cols, FftDirection::Forward)
    }

    /// Plan an inverse (normalised) transform.
    pub fn inverse(rows: usize, cols: usize) -> Result<Self, FftError> {
        Self::new(rows, cols, FftDirection::Inverse)
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn direction(&self) -> FftDirection {
        self.direction
    }

    /// Transform `data` in place.
    pub fn process(&self, data: &mut Array2<Complex32>) -> Result<(), FftError> {
        let (rows, cols) = data.dim();
        if rows != self.rows || cols != self.cols {
            return Err(FftError::ShapeMismatch {
                expected_rows: self.rows,
                expected_cols: self.cols,
                rows,
                cols,
            });
        }

        transform_rows(data, &self.row_fft);

        // Columns are transformed as rows of the transposed grid
        let mut transposed = data.t().as_standard_layout().into_owned();
        transform_rows(&mut transposed, &self.col_fft);
        data.assign(&transposed.t());

        if self.direction == FftDirection::Inverse {
            let norm = 1.0 / (rows * cols) as f32;
            data.par_mapv_inplace(|v| v * norm);
        }

        Ok(())
    }
}

fn transform_rows(data: &mut Array2<Complex32>, fft: &Arc<dyn Fft<f32>>) {
    data.axis_iter_mut(Axis(0))
        .into_par_iter()
        .for_each(|mut row| match row.as_slice_mut() {
            Some(slice) => fft.process(slice),
            None => {
                let mut buffer = row.to_vec();
                fft.process(&mut buffer);
                row.iter_mut()
                    .zip(buffer)
                    .for_each(|(dst, src)| *dst = src);
            }
        });
}

/// Swap quadrants so that index `(0, 0)` moves to `(rows/2, cols/2)`.
///
/// For the even grid sizes used throughout the simulator the shift is its own
/// inverse.
pub fn fft_shift<T: Clone>(data: &Array2<T>) -> Array2<T> {
    let (rows, cols) = data.dim();
    let half_rows = rows / 2;
    let half_cols = cols / 2;
    Array2::from_shape_fn((rows, cols), |(y, x)| {
        data[[(y + rows - half_rows) % rows, (x + cols - half_cols) % cols]].clone()
    })
}

/// In-place [`fft_shift`]. Odd dimensions fall back to a shifted copy.
pub fn fft_shift_in_place<T: Clone>(data: &mut Array2<T>) {
    let (rows, cols) = data.dim();
    if rows % 2 != 0 || cols % 2 != 0 {
        let shifted = fft_shift(data);
        data.assign(&shifted);
        return;
    }
    let half_rows = rows / 2;
    let half_cols = cols / 2;
    for y in 0..half_rows {
        for x in 0..cols {
            data.swap([y, x], [y + half_rows, (x + half_cols) % cols]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn real_grid(rows: usize, cols: usize) -> Array2<Complex32> {
        Array2::from_shape_fn((rows, cols), |(y, x)| {
            Complex32::new(((y * 7 + x * 3) % 11) as f32 * 0.25, 0.0)
        })
    }

    #[test]
    fn test_next_power_of_two() {
        assert_eq!(next_power_of_two(0), 1);
        assert_eq!(next_power_of_two(1), 1);
        assert_eq!(next_power_of_two(341), 512);
        assert_eq!(next_power_of_two(512), 512);
        assert_eq!(next_power_of_two(768), 1024);
    }

    #[test]
    fn test_rejects_non_power_of_two() {
        assert_eq!(
            Fft2dPlan::forward(12, 16).unwrap_err(),
            FftError::NotPowerOfTwo { rows: 12, cols: 16 }
        );
    }

    #[test]
    fn test_rejects_wrong_shape() {
        let plan = Fft2dPlan::forward(8, 8).unwrap();
        let mut data = Array2::<Complex32>::zeros((4, 8));
        assert!(matches!(
            plan.process(&mut data),
            Err(FftError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_forward_then_inverse_is_identity() {
        let original = real_grid(16, 32);
        let mut data = original.clone();

        Fft2dPlan::forward(16, 32).unwrap().process(&mut data).unwrap();
        Fft2dPlan::inverse(16, 32).unwrap().process(&mut data).unwrap();

        for (a, b) in data.iter().zip(original.iter()) {
            assert_abs_diff_eq!(a.re, b.re, epsilon = 1e-4);
            assert_abs_diff_eq!(a.im, b.im, epsilon = 1e-4);
        }
    }

    #[test]
    fn test_dc_term_is_sum() {
        let mut data = real_grid(8, 8);
        let total: f32 = data.iter().map(|c| c.re).sum();

        Fft2dPlan::forward(8, 8).unwrap().process(&mut data).unwrap();

        assert_abs_diff_eq!(data[[0, 0]].re, total, epsilon = 1e-3);
        assert_abs_diff_eq!(data[[0, 0]].im, 0.0, epsilon = 1e-3);
    }

    #[test]
    fn test_impulse_has_flat_spectrum() {
        let mut data = Array2::<Complex32>::zeros((8, 16));
        data[[0, 0]] = Complex32::new(1.0, 0.0);

        Fft2dPlan::forward(8, 16).unwrap().process(&mut data).unwrap();

        for value in data.iter() {
            assert_abs_diff_eq!(value.norm(), 1.0, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_in_place_shift_matches_copy() {
        let data = Array2::from_shape_fn((4, 8), |(y, x)| (y * 8 + x) as i32);
        let mut in_place = data.clone();
        fft_shift_in_place(&mut in_place);
        assert_eq!(in_place, fft_shift(&data));

        let odd = Array2::from_shape_fn((3, 5), |(y, x)| (y * 5 + x) as i32);
        let mut odd_in_place = odd.clone();
        fft_shift_in_place(&mut odd_in_place);
        assert_eq!(odd_in_place, fft_shift(&odd));
    }

    #[test]
    fn test_fft_shift_moves_origin_to_centre() {
        let mut data = Array2::<i32>::zeros((4, 6));
        data[[0, 0]] = 1;
        let shifted = fft_shift(&data);
        assert_eq!(shifted[[2, 3]], 1);

        // Even sizes: applying it twice restores the grid
        let restored = fft_shift(&shifted);
        assert_eq!(restored, data);
    }
}
