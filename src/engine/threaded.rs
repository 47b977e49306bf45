// Threaded control loop
//
// Two threads joined by lock-free SPSC rings:
// - acquisition thread: owns the capture source; pops a tune request, captures
//   (may block on the receiver), pushes the result back
// - control thread: owns the coordinator and the switch transport; runs the
//   cycles strictly one after another
//
// Exactly one capture is in flight at a time, so both rings only ever hold a
// single element; the coordinator's single-writer ordering is preserved.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use rtrb::{Consumer, Producer, RingBuffer};

use crate::error::PipelineError;
use crate::spectrum::capture::Capture;

use super::backend::{CaptureSource, SwitchTransport, TimeSource};
use super::coordinator::{Coordinator, Observer, RequestSender};
use super::runner::{ControlLoop, RunSummary};

/// Idle wait while a ring is empty
const POLL_INTERVAL: Duration = Duration::from_micros(250);

type CaptureResult = Result<Capture, PipelineError>;

/// Control-thread side of the acquisition rings.
struct RingSource {
    tune_tx: Producer<f64>,
    capture_rx: Consumer<CaptureResult>,
    shutdown: Arc<AtomicBool>,
    recorded: bool,
}

impl CaptureSource for RingSource {
    fn capture(&mut self, center_hz: f64) -> Result<Capture, PipelineError> {
        if self.tune_tx.push(center_hz).is_err() {
            return Err(PipelineError::InvariantViolation {
                details: "tune request ring full with a capture already in flight".to_string(),
            });
        }
        loop {
            if let Ok(result) = self.capture_rx.pop() {
                return result;
            }
            if self.shutdown.load(Ordering::Acquire) {
                return Err(PipelineError::CaptureFailed {
                    details: "shutdown while waiting for capture".to_string(),
                });
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    fn is_recorded(&self) -> bool {
        self.recorded
    }
}

fn run_acquisition<S: CaptureSource>(
    mut source: S,
    mut tune_rx: Consumer<f64>,
    mut capture_tx: Producer<CaptureResult>,
    shutdown: Arc<AtomicBool>,
) {
    log::info!("[Acquisition] Thread started");
    while !shutdown.load(Ordering::Acquire) {
        let center_hz = match tune_rx.pop() {
            Ok(center_hz) => center_hz,
            Err(_) => {
                thread::sleep(POLL_INTERVAL);
                continue;
            }
        };
        let mut result = source.capture(center_hz);
        while let Err(rtrb::PushError::Full(pending)) = capture_tx.push(result) {
            if shutdown.load(Ordering::Acquire) {
                break;
            }
            result = pending;
            thread::sleep(POLL_INTERVAL);
        }
    }
    log::info!("[Acquisition] Thread stopped");
}

/// Handle to a running threaded control loop.
pub struct ControlLoopHandle {
    shutdown: Arc<AtomicBool>,
    observer: Observer,
    requests: RequestSender,
    control: Option<JoinHandle<Result<RunSummary, PipelineError>>>,
    acquisition: Option<JoinHandle<()>>,
}

impl ControlLoopHandle {
    pub fn observer(&self) -> &Observer {
        &self.observer
    }

    pub fn requests(&self) -> &RequestSender {
        &self.requests
    }

    pub fn is_running(&self) -> bool {
        !self.shutdown.load(Ordering::Acquire)
    }

    /// Ask both threads to stop after the current cycle
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::Release);
    }

    /// Wait for both threads and return the control thread's summary
    pub fn join(mut self) -> Result<RunSummary, PipelineError> {
        let summary = match self.control.take() {
            Some(handle) => handle.join().unwrap_or_else(|_| {
                Err(PipelineError::InvariantViolation {
                    details: "control thread panicked".to_string(),
                })
            }),
            None => Ok(RunSummary::default()),
        };
        self.stop();
        if let Some(handle) = self.acquisition.take() {
            if handle.join().is_err() {
                log::error!("[ControlLoop] Acquisition thread panicked");
            }
        }
        summary
    }
}

impl Drop for ControlLoopHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Start the acquisition and control threads
///
/// # Arguments
/// * `max_cycles` - stop after this many cycles; `None` runs until `stop()`
///
/// # Returns
/// Handle for observing, submitting requests, and stopping the loop
pub fn spawn_control_loop<S, T>(
    coordinator: Coordinator,
    source: S,
    transport: T,
    clock: Arc<dyn TimeSource>,
    max_cycles: Option<u64>,
) -> ControlLoopHandle
where
    S: CaptureSource + 'static,
    T: SwitchTransport + 'static,
{
    let shutdown = Arc::new(AtomicBool::new(false));
    let (tune_tx, tune_rx) = RingBuffer::new(1);
    let (capture_tx, capture_rx) = RingBuffer::new(1);
    let observer = coordinator.observer();
    let requests = coordinator.request_sender();
    let recorded = source.is_recorded();

    let acquisition = {
        let shutdown = Arc::clone(&shutdown);
        thread::spawn(move || run_acquisition(source, tune_rx, capture_tx, shutdown))
    };

    let control = {
        let shutdown = Arc::clone(&shutdown);
        thread::spawn(move || {
            let ring = RingSource {
                tune_tx,
                capture_rx,
                shutdown: Arc::clone(&shutdown),
                recorded,
            };
            let mut control = ControlLoop::new(coordinator, ring, transport, clock);
            log::info!("[ControlLoop] Thread started");

            let mut result = Ok(());
            while !shutdown.load(Ordering::Acquire) {
                if max_cycles.is_some_and(|max| control.summary().cycles >= max) {
                    break;
                }
                if let Err(err) = control.step() {
                    result = Err(err);
                    break;
                }
            }
            shutdown.store(true, Ordering::Release);

            let summary = control.summary();
            log::info!(
                "[ControlLoop] Thread stopped after {} cycles ({} switches)",
                summary.cycles,
                summary.switches
            );
            result.map(|()| summary)
        })
    };

    ControlLoopHandle {
        shutdown,
        observer,
        requests,
        control: Some(control),
        acquisition: Some(acquisition),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::engine::backend::ManualClock;
    use crate::engine::sim::{SimSettings, SyntheticSource};
    use crate::engine::transport::RecordingTransport;
    use crate::switching::{PolicyRequest, PortId};

    fn setup() -> (Coordinator, SyntheticSource, Arc<ManualClock>) {
        let mut config = AppConfig::default();
        config.sweep.start_hz = 100e6;
        config.sweep.end_hz = 104e6;
        config.sweep.window_bandwidth_hz = 2e6;
        config.stitch.fft_size = 256;
        let coordinator = Coordinator::new(&config).unwrap();

        let clock = Arc::new(ManualClock::new());
        let source = SyntheticSource::new(
            SimSettings {
                sample_rate_hz: 2e6,
                fft_size: 256,
                ..SimSettings::default()
            },
            Arc::clone(&clock),
        )
        .unwrap();
        (coordinator, source, clock)
    }

    #[test]
    fn test_runs_requested_cycles() {
        let (coordinator, source, clock) = setup();
        let handle = spawn_control_loop(coordinator, source, RecordingTransport::new(), clock, Some(9));
        let observer = handle.observer().clone();
        let summary = handle.join().unwrap();

        assert_eq!(summary.cycles, 9);
        assert_eq!(summary.dropped, 0);
        assert_eq!(summary.sweeps_completed, 3);
        assert_eq!(observer.telemetry().captures_processed, 9);
        assert!(observer.spectrum().as_of().is_some());
    }

    #[test]
    fn test_request_from_other_thread() {
        let (coordinator, source, clock) = setup();
        let transport = RecordingTransport::new();
        let applied = transport.handle();
        // Queued before the first cycle
        coordinator
            .submit(PolicyRequest::SelectPort { port: "A2".into() })
            .unwrap();
        let handle = spawn_control_loop(coordinator, source, transport, clock, Some(3));
        let summary = handle.join().unwrap();

        assert_eq!(summary.switches, 1);
        assert_eq!(applied.applied(), vec![(PortId(1), "A2".to_string())]);
    }

    #[test]
    fn test_stop_ends_unbounded_loop() {
        let (coordinator, source, clock) = setup();
        let handle = spawn_control_loop(coordinator, source, RecordingTransport::new(), clock, None);
        thread::sleep(Duration::from_millis(20));
        handle.stop();
        assert!(!handle.is_running());
        assert!(handle.join().is_ok());
    }
}
