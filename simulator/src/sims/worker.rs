//! Background execution of simulation runs.
//!
//! A [`SimulationWorker`] runs one request at a time on a dedicated thread and
//! streams its events back over a channel. Submitting a new request
//! supersedes the previous one: the old thread cannot be stopped, but its
//! events are tagged with a stale generation and never reach the caller.
//! A panic inside a run is caught and surfaced as [`WorkerError::Crashed`],
//! separate from a graceful [`SimulationEvent::Failed`].

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{debug, warn};
use thiserror::Error;

use super::pipeline::{
    run_simulation, SimulationError, SimulationEvent, SimulationOutput, SimulationRequest,
};
use crate::config::SimulationConfig;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkerError {
    #[error("simulation worker crashed: {0}")]
    Crashed(String),
    #[error("simulation worker disconnected without a result")]
    Disconnected,
}

/// The function a worker runs for each request.
pub type Runner = Arc<
    dyn Fn(
            &SimulationRequest,
            &SimulationConfig,
            &mut dyn FnMut(&str, f32),
        ) -> Result<SimulationOutput, SimulationError>
        + Send
        + Sync,
>;

enum WorkerMessage {
    Event(SimulationEvent),
    Crashed(String),
}

struct ActiveRun {
    generation: u64,
    receiver: Receiver<(u64, WorkerMessage)>,
    handle: JoinHandle<()>,
}

/// Runs simulations off the calling thread, last request wins.
pub struct SimulationWorker {
    config: Arc<SimulationConfig>,
    runner: Runner,
    generation: Arc<AtomicU64>,
    active: Option<ActiveRun>,
}

impl SimulationWorker {
    pub fn new(config: SimulationConfig) -> Self {
        Self::with_runner(config, Arc::new(run_simulation))
    }

    /// Worker that executes `runner` instead of the full pipeline.
    pub fn with_runner(config: SimulationConfig, runner: Runner) -> Self {
        Self {
            config: Arc::new(config),
            runner,
            generation: Arc::new(AtomicU64::new(0)),
            active: None,
        }
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Generation of the most recent submission (0 before the first).
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Start `request` in the background, superseding any run in flight.
    ///
    /// # Returns
    /// The generation number of the new run
    pub fn submit(&mut self, request: SimulationRequest) -> u64 {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(previous) = self.active.take() {
            if !previous.handle.is_finished() {
                debug!(
                    "superseding simulation run {} with {generation}",
                    previous.generation
                );
            }
        }

        let (sender, receiver) = unbounded();
        let config = Arc::clone(&self.config);
        let runner = Arc::clone(&self.runner);
        let current = Arc::clone(&self.generation);

        let handle = std::thread::spawn(move || {
            execute(generation, &current, &runner, &request, &config, &sender);
        });

        self.active = Some(ActiveRun {
            generation,
            receiver,
            handle,
        });
        generation
    }

    /// Block until the current run finishes, forwarding its progress to `on_progress`.
    ///
    /// # Returns
    /// The terminal event: [`SimulationEvent::Completed`] or [`SimulationEvent::Failed`]
    pub fn recv_terminal(
        &mut self,
        on_progress: &mut dyn FnMut(&str, f32),
    ) -> Result<SimulationEvent, WorkerError> {
        let Some(active) = self.active.take() else {
            return Err(WorkerError::Disconnected);
        };

        let result = loop {
            let Ok((generation, message)) = active.receiver.recv() else {
                break Err(WorkerError::Disconnected);
            };
            if generation != active.generation {
                continue;
            }
            match message {
                WorkerMessage::Event(SimulationEvent::Progress { label, percent }) => {
                    on_progress(&label, percent)
                }
                WorkerMessage::Event(terminal) => break Ok(terminal),
                WorkerMessage::Crashed(reason) => break Err(WorkerError::Crashed(reason)),
            }
        };

        if active.handle.join().is_err() {
            warn!("simulation thread {} did not exit cleanly", active.generation);
        }
        result
    }

    /// Submit `request` and wait for its terminal event.
    pub fn run_blocking(
        &mut self,
        request: SimulationRequest,
        on_progress: &mut dyn FnMut(&str, f32),
    ) -> Result<SimulationEvent, WorkerError> {
        self.submit(request);
        self.recv_terminal(on_progress)
    }
}

fn execute(
    generation: u64,
    current: &AtomicU64,
    runner: &Runner,
    request: &SimulationRequest,
    config: &SimulationConfig,
    sender: &Sender<(u64, WorkerMessage)>,
) {
    let is_current = || current.load(Ordering::SeqCst) == generation;

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        runner(request, config, &mut |label, percent| {
            if is_current() {
                let event = SimulationEvent::Progress {
                    label: label.to_string(),
                    percent,
                };
                // The receiver is gone once the run has been superseded
                let _ = sender.send((generation, WorkerMessage::Event(event)));
            }
        })
    }));

    let message = match outcome {
        Ok(Ok(output)) => WorkerMessage::Event(SimulationEvent::Completed(output)),
        Ok(Err(e)) => {
            warn!("simulation run {generation} failed: {e}");
            WorkerMessage::Event(SimulationEvent::Failed {
                error: e.to_string(),
            })
        }
        Err(payload) => {
            let reason = panic_message(payload.as_ref());
            warn!("simulation run {generation} panicked: {reason}");
            WorkerMessage::Crashed(reason)
        }
    };

    if is_current() {
        let _ = sender.send((generation, message));
    } else {
        debug!("discarding result of superseded simulation run {generation}");
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aperture::ApertureSpec;
    use crate::hardware::CameraSpec;
    use crate::optics::PropagationMethod;
    use crate::sims::pipeline::RenderOptions;
    use image::RgbaImage;
    use std::sync::Barrier;

    fn request() -> SimulationRequest {
        SimulationRequest::new(CameraSpec::new(50.0, 36.0, 24.0), ApertureSpec::pinhole(0.3))
            .with_options(RenderOptions {
                resolution: 8,
                ..RenderOptions::default()
            })
    }

    fn runner<F>(f: F) -> Runner
    where
        F: Fn(
                &SimulationRequest,
                &SimulationConfig,
                &mut dyn FnMut(&str, f32),
            ) -> Result<SimulationOutput, SimulationError>
            + Send
            + Sync
            + 'static,
    {
        Arc::new(f)
    }

    fn stub_runner() -> Runner {
        runner(|_request, _config, progress| {
            progress("half", 50.0);
            Ok(SimulationOutput {
                image: RgbaImage::new(8, 8),
                method: PropagationMethod::Fresnel,
            })
        })
    }

    #[test]
    fn test_completes_with_progress() {
        let mut worker = SimulationWorker::with_runner(SimulationConfig::preview(), stub_runner());
        let mut seen = Vec::new();
        let event = worker
            .run_blocking(request(), &mut |label, pct| seen.push((label.to_string(), pct)))
            .unwrap();

        assert_eq!(seen, vec![("half".to_string(), 50.0)]);
        match event {
            SimulationEvent::Completed(output) => {
                assert_eq!(output.method, PropagationMethod::Fresnel)
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(worker.generation(), 1);
    }

    #[test]
    fn test_graceful_failure_is_an_event() {
        let failing = runner(|_, _, _| {
            Err(SimulationError::EmptyOutput {
                width: 0,
                height: 0,
            })
        });
        let mut worker = SimulationWorker::with_runner(SimulationConfig::preview(), failing);
        let event = worker.run_blocking(request(), &mut |_, _| {}).unwrap();
        assert!(matches!(event, SimulationEvent::Failed { .. }));
    }

    #[test]
    fn test_panic_is_crash() {
        let crashing = runner(|_, _, _| panic!("grid allocation failed"));
        let mut worker = SimulationWorker::with_runner(SimulationConfig::preview(), crashing);
        assert_eq!(
            worker.run_blocking(request(), &mut |_, _| {}).err(),
            Some(WorkerError::Crashed("grid allocation failed".to_string()))
        );
    }

    #[test]
    fn test_recv_without_submit() {
        let mut worker = SimulationWorker::new(SimulationConfig::preview());
        assert_eq!(
            worker.recv_terminal(&mut |_, _| {}).err(),
            Some(WorkerError::Disconnected)
        );
    }

    #[test]
    fn test_last_request_wins() {
        let gate = Arc::new(Barrier::new(2));
        let runner_gate = Arc::clone(&gate);
        let gated = runner(move |request, _, progress| {
            // The first request blocks until the second has been submitted
            if request.aperture.diameter_mm > 1.0 {
                runner_gate.wait();
                progress("stale", 10.0);
            }
            Ok(SimulationOutput {
                image: RgbaImage::new(request.aperture.diameter_mm as u32 + 1, 1),
                method: PropagationMethod::Asm,
            })
        });
        let mut worker = SimulationWorker::with_runner(SimulationConfig::preview(), gated);

        let mut slow = request();
        slow.aperture.diameter_mm = 5.0;
        worker.submit(slow);
        let second = worker.submit(request());
        gate.wait();

        let mut seen = Vec::new();
        let event = worker
            .recv_terminal(&mut |label, _| seen.push(label.to_string()))
            .unwrap();
        assert_eq!(second, 2);
        assert!(seen.is_empty());
        match event {
            SimulationEvent::Completed(output) => assert_eq!(output.image.width(), 1),
            other => panic!("unexpected {other:?}"),
        }
    }
}
