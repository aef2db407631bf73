//! Simulation runs: the pipeline itself and the background worker that hosts it.

pub mod pipeline;
pub mod worker;

pub use pipeline::{
    run_simulation, run_with_events, MaskSource, RenderOptions, SimulationError, SimulationEvent,
    SimulationOutput, SimulationRequest,
};
pub use worker::{Runner, SimulationWorker, WorkerError};
