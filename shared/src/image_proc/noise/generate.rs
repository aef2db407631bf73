//! Noise generation utilities for sensor simulation.
//!
//! Provides a Box-Muller standard normal distribution and a helper that fills
//! a whole plane with independent deviates. Fields are generated in parallel
//! row chunks, each with its own deterministically derived RNG, so a given
//! seed always reproduces the same field.

use crate::algo::fill_row_bands_seeded;
use ndarray::Array2;
use rand::{thread_rng, Rng, RngCore};
use rand_distr::Distribution;

/// Standard normal deviates via the Box-Muller transform.
///
/// Draws two uniforms `u, v` in `(0, 1)` and returns
/// `sqrt(-2 ln u) · cos(2πv)`. Only one of the pair is used per sample.
#[derive(Debug, Clone, Copy, Default)]
pub struct BoxMuller;

impl Distribution<f64> for BoxMuller {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        let mut u: f64 = 0.0;
        while u == 0.0 {
            u = rng.gen();
        }
        let mut v: f64 = 0.0;
        while v == 0.0 {
            v = rng.gen();
        }
        (-2.0 * u.ln()).sqrt() * (2.0 * std::f64::consts::PI * v).cos()
    }
}

/// Generate a `(height, width)` plane of standard normal deviates.
///
/// # Arguments
/// * `size` - Tuple of (height, width)
/// * `seed` - Base seed; a random seed is drawn when `None`
pub fn standard_normal_field(size: (usize, usize), seed: Option<u64>) -> Array2<f32> {
    let seed = seed.unwrap_or(thread_rng().next_u64());

    fill_row_bands_seeded(Array2::zeros(size), seed, Some(64), |chunk, rng| {
        chunk
            .iter_mut()
            .for_each(|v| *v = BoxMuller.sample(rng) as f32);
    })
}
