//! Lensless (pinhole and coded-aperture) camera simulation
//!
//! This crate rasterises thin aperture plates, propagates light through them
//! with scalar diffraction or ray optics, and images a scene through the
//! resulting point spread function onto a simulated sensor. Closed-form
//! pinhole optics (blur budget, optimal diameter, exposure) live alongside.

pub mod aperture;
pub mod config;
pub mod hardware;
pub mod image_proc;
pub mod optics;
pub mod physics;
pub mod shared_args;
pub mod sims;

// Re-exports for easier access
pub use aperture::{ApertureKind, ApertureSpec};
pub use config::SimulationConfig;
pub use hardware::camera::CameraSpec;
pub use optics::{EngineMode, PropagationMethod};
pub use physics::{calculate_physics, PhysicsSummary};
pub use sims::{run_simulation, SimulationEvent, SimulationRequest, SimulationWorker};
