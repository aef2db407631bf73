//! Noise primitives for sensor simulation.

pub mod generate;

pub use generate::{standard_normal_field, BoxMuller};
