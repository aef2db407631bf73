//! Numerical building blocks used across the simulator.
//!
//! - **fft**: power-of-two 2D complex FFT with quadrant shifting
//! - **parallel**: deterministic chunk-seeded parallel array processing

pub mod fft;
pub mod parallel;

pub use fft::{
    fft_shift, fft_shift_in_place, is_power_of_two, next_power_of_two, Fft2dPlan, FftDirection,
    FftError,
};
pub use parallel::fill_row_bands_seeded;
