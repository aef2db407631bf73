//! Camera body and sensor models

pub mod camera;
pub mod sensor_model;

pub use camera::{CameraError, CameraKind, CameraPreset, CameraSpec};
pub use sensor_model::{apply_sensor_effects, SensorEffects};
