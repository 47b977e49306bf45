// ControlLoop - single-threaded driver around the coordinator
//
// Owns the capture source and switch transport and runs one cycle per call:
// capture at the planned centre, process, hand any switch command to the
// transport, acknowledge. Used directly by the CLI and the simulator, and by
// the threaded loop's control thread.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;

use crate::error::PipelineError;
use crate::spectrum::capture::Capture;

use super::backend::{CaptureSource, SwitchTransport, TimeSource};
use super::coordinator::{Coordinator, CycleOutcome};

/// Totals for a run of cycles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct RunSummary {
    pub cycles: u64,
    pub switches: u64,
    pub transport_failures: u64,
    pub dropped: u64,
    pub sweeps_completed: u64,
}

impl RunSummary {
    fn absorb(&mut self, outcome: &CycleOutcome, switched: Option<bool>) {
        self.cycles += 1;
        if outcome.dropped.is_some() {
            self.dropped += 1;
        }
        match switched {
            Some(true) => self.switches += 1,
            Some(false) => self.transport_failures += 1,
            None => {}
        }
    }
}

pub struct ControlLoop<S, T> {
    coordinator: Coordinator,
    source: S,
    transport: T,
    clock: Arc<dyn TimeSource>,
    summary: RunSummary,
}

impl<S: CaptureSource, T: SwitchTransport> ControlLoop<S, T> {
    pub fn new(coordinator: Coordinator, source: S, transport: T, clock: Arc<dyn TimeSource>) -> Self {
        Self {
            coordinator,
            source,
            transport,
            clock,
            summary: RunSummary::default(),
        }
    }

    pub fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }

    pub fn coordinator_mut(&mut self) -> &mut Coordinator {
        &mut self.coordinator
    }

    pub fn summary(&self) -> RunSummary {
        self.summary
    }

    pub fn into_parts(self) -> (Coordinator, S, T) {
        (self.coordinator, self.source, self.transport)
    }

    /// Capture at the planned centre and run one cycle
    pub fn step(&mut self) -> Result<CycleOutcome, PipelineError> {
        let center = self.coordinator.next_center_frequency();
        let captured = self.source.capture(center);
        self.handle(captured)
    }

    /// Run one cycle for a capture obtained elsewhere
    ///
    /// # Returns
    /// * `Err(PipelineError)` - fatal only; data and transient I/O failures are
    ///   reported in the outcome
    pub fn handle(
        &mut self,
        captured: Result<Capture, PipelineError>,
    ) -> Result<CycleOutcome, PipelineError> {
        let outcome = match captured {
            Ok(capture) if self.source.is_recorded() => self.coordinator.process_recorded(capture)?,
            Ok(capture) => self.coordinator.process(capture)?,
            Err(err) => self.coordinator.process_failure(err, self.clock.now())?,
        };

        let switched = match &outcome.command {
            Some(command) => {
                let started = Instant::now();
                let result = self.transport.set_port(command.to, &command.to_label);
                let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
                self.coordinator
                    .telemetry()
                    .record_transport_latency(latency_ms);
                let ok = result.is_ok();
                self.coordinator.acknowledge(command, result)?;
                Some(ok)
            }
            None => None,
        };

        self.summary.absorb(&outcome, switched);
        self.summary.sweeps_completed = self.coordinator.plan().cycles_completed();
        Ok(outcome)
    }

    /// Run `cycles` cycles, stopping early on a fatal error
    pub fn run_cycles(&mut self, cycles: u64) -> Result<RunSummary, PipelineError> {
        for _ in 0..cycles {
            self.step()?;
        }
        log::info!(
            "[ControlLoop] {} cycles: {} switches, {} dropped, {} sweeps",
            self.summary.cycles,
            self.summary.switches,
            self.summary.dropped,
            self.summary.sweeps_completed
        );
        Ok(self.summary)
    }
}
