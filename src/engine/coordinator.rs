//! Coordinator: one evaluation cycle per capture.
//!
//! Each cycle runs to completion before the next capture is accepted:
//! apply queued requests, verify the tune, stitch, advance the sweep, compute
//! band metrics over fresh bins, evaluate the switching policy, publish the
//! snapshots. Readers get immutable `Arc` snapshots through `watch`
//! channels, so they never see a half-applied cycle and never block it.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, watch};

use crate::analysis::metrics::{BandMetric, MetricEngine, SpectrumSlice};
use crate::analysis::noise_floor::percentile_db;
use crate::config::AppConfig;
use crate::error::{
    log_config_error, log_pipeline_error, ConfigError, ErrorCode, PipelineError,
    PipelineErrorKind,
};
use crate::frequency::{format_frequency, FrequencyRange};
use crate::spectrum::capture::Capture;
use crate::spectrum::stitcher::Stitcher;
use crate::spectrum::wideband::WidebandSpectrum;
use crate::sweep::SweepPlan;
use crate::switching::modes::ModeKind;
use crate::switching::policy::{EvaluationInput, PolicyEngine, PolicyRequest, SwitchCommand};
use crate::switching::ports::PortSet;
use crate::switching::state::{AnomalyStatus, SwitchState};
use crate::telemetry::{ControlEvent, SwitchEvent, TelemetryHub, TelemetrySnapshot};

/// Result of one cycle.
#[derive(Debug, Clone)]
pub struct CycleOutcome {
    /// Stitched view after this cycle
    pub spectrum: Arc<WidebandSpectrum>,
    /// Band metrics; empty when the capture was dropped
    pub metrics: Vec<BandMetric>,
    /// Switch to hand to the transport, then `acknowledge`
    pub command: Option<SwitchCommand>,
    /// Capture rejected this cycle (data or transient I/O)
    pub dropped: Option<PipelineError>,
    /// Centre frequency the sweep wants next
    pub next_center_hz: f64,
}

/// Cloneable handle for submitting requests from other threads.
#[derive(Clone)]
pub struct RequestSender {
    ports: PortSet,
    tx: mpsc::UnboundedSender<PolicyRequest>,
}

impl RequestSender {
    /// Validate `request` now and queue it for the next evaluation boundary
    ///
    /// # Returns
    /// * `Err(ConfigError)` - invalid mode or unknown port; nothing is queued
    pub fn submit(&self, request: PolicyRequest) -> Result<(), ConfigError> {
        match &request {
            PolicyRequest::SetMode { mode } => {
                mode.build(&self.ports)?;
            }
            PolicyRequest::SelectPort { port } => {
                self.ports.resolve(port)?;
            }
        }
        self.tx.send(request).map_err(|_| {
            ConfigError::invalid("request", "coordinator is no longer running")
        })
    }
}

/// Read-only view for display and reporting layers.
#[derive(Clone)]
pub struct Observer {
    spectrum: watch::Receiver<Arc<WidebandSpectrum>>,
    state: watch::Receiver<SwitchState>,
    telemetry: Arc<TelemetryHub>,
}

impl Observer {
    /// Latest published stitched spectrum
    pub fn spectrum(&self) -> Arc<WidebandSpectrum> {
        Arc::clone(&self.spectrum.borrow())
    }

    /// Latest published switch state
    pub fn state(&self) -> SwitchState {
        self.state.borrow().clone()
    }

    pub fn switch_log(&self) -> Vec<SwitchEvent> {
        self.telemetry.switch_log()
    }

    pub fn telemetry(&self) -> TelemetrySnapshot {
        self.telemetry.snapshot()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ControlEvent> {
        self.telemetry.subscribe()
    }

    /// Receiver notified on every spectrum publish
    pub fn spectrum_updates(&self) -> watch::Receiver<Arc<WidebandSpectrum>> {
        self.spectrum.clone()
    }
}

/// Wires sweep, stitcher, metric engine, and policy into one control loop.
pub struct Coordinator {
    plan: SweepPlan,
    stitcher: Stitcher,
    metric_engine: MetricEngine,
    policy: PolicyEngine,
    bands: Vec<FrequencyRange>,
    noise_floor_percentile: f64,
    tune_tolerance_hz: f64,
    max_capture_retries: u32,
    attempts: u32,
    last_tuned_hz: f64,
    requests: RequestSender,
    request_rx: mpsc::UnboundedReceiver<PolicyRequest>,
    spectrum_tx: watch::Sender<Arc<WidebandSpectrum>>,
    state_tx: watch::Sender<SwitchState>,
    telemetry: Arc<TelemetryHub>,
}

impl Coordinator {
    /// Build every component from a configuration
    ///
    /// # Returns
    /// * `Err(ConfigError)` - configuration invalid; nothing is started
    pub fn new(config: &AppConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let plan = config.sweep_plan()?;
        let stitcher = Stitcher::new(config.stitcher_settings()?).map_err(|err| {
            ConfigError::invalid("stitch", err.message())
        })?;
        let policy = config.policy_engine()?;
        let bands = config.analysis_bands()?;

        let (tx, request_rx) = mpsc::unbounded_channel();
        let requests = RequestSender {
            ports: policy.ports().clone(),
            tx,
        };
        let (spectrum_tx, _) = watch::channel(stitcher.snapshot());
        let (state_tx, _) = watch::channel(policy.state().clone());
        let telemetry = Arc::new(TelemetryHub::new(
            256,
            config.switching.switch_log_capacity,
            256,
        ));

        log::info!(
            "[Coordinator] Ready: {} steps per sweep, revisit {:?}, {} analysis band(s)",
            plan.steps(),
            plan.revisit_latency(config.capture_duration()),
            bands.len()
        );

        Ok(Self {
            last_tuned_hz: plan.next_center_frequency(),
            plan,
            stitcher,
            metric_engine: config.metric_engine(),
            policy,
            bands,
            noise_floor_percentile: config.metrics.noise_floor_percentile,
            tune_tolerance_hz: config.sweep.tune_tolerance_hz,
            max_capture_retries: config.sweep.max_capture_retries,
            attempts: 0,
            requests,
            request_rx,
            spectrum_tx,
            state_tx,
            telemetry,
        })
    }

    /// Centre frequency the receiver should capture next
    pub fn next_center_frequency(&self) -> f64 {
        self.plan.next_center_frequency()
    }

    pub fn plan(&self) -> &SweepPlan {
        &self.plan
    }

    pub fn state(&self) -> &SwitchState {
        self.policy.state()
    }

    pub fn spectrum(&self) -> Arc<WidebandSpectrum> {
        self.stitcher.snapshot()
    }

    pub fn telemetry(&self) -> Arc<TelemetryHub> {
        Arc::clone(&self.telemetry)
    }

    pub fn observer(&self) -> Observer {
        Observer {
            spectrum: self.spectrum_tx.subscribe(),
            state: self.state_tx.subscribe(),
            telemetry: Arc::clone(&self.telemetry),
        }
    }

    pub fn request_sender(&self) -> RequestSender {
        self.requests.clone()
    }

    /// Queue a mode change or port selection for the next cycle
    pub fn submit(&self, request: PolicyRequest) -> Result<(), ConfigError> {
        self.requests.submit(request)
    }

    /// Clear the peak-hold envelope and republish the spectrum
    pub fn reset_peaks(&mut self) {
        self.stitcher.reset_peaks();
        self.spectrum_tx.send_replace(self.stitcher.snapshot());
    }

    /// Run one full cycle for a capture
    ///
    /// # Returns
    /// * `Ok(CycleOutcome)` - including cycles whose capture was dropped
    /// * `Err(PipelineError::InvariantViolation)` - the loop must stop
    pub fn process(&mut self, capture: Capture) -> Result<CycleOutcome, PipelineError> {
        let now = capture.timestamp;
        self.apply_requests(now);

        let requested = self.plan.next_center_frequency();
        let ingested = if (capture.center_hz - requested).abs() > self.tune_tolerance_hz {
            Err(PipelineError::UnexpectedCenter {
                requested_hz: requested,
                actual_hz: capture.center_hz,
            })
        } else {
            self.stitcher.ingest(&capture)
        };

        match ingested {
            Ok(spectrum) => {
                self.attempts = 0;
                self.advance_plan();
                self.last_tuned_hz = capture.center_hz;
                self.telemetry.record_capture_processed();

                let metrics = self.evaluate_bands(&spectrum, now);
                for metric in &metrics {
                    log::debug!(
                        "[Coordinator] {} occupancy={:.3} flatness={:.3} floor={:.1} dB",
                        metric.band,
                        metric.occupancy,
                        metric.flatness,
                        metric.noise_floor_db
                    );
                }
                let command = self.evaluate_policy(now, capture.center_hz, Some(&metrics));
                self.publish(spectrum.clone());
                Ok(CycleOutcome {
                    spectrum,
                    metrics,
                    command,
                    dropped: None,
                    next_center_hz: self.plan.next_center_frequency(),
                })
            }
            Err(err) if err.kind() == PipelineErrorKind::InvariantViolation => {
                log_pipeline_error(&err, "stitch");
                Err(err)
            }
            Err(err) => self.drop_capture(err, capture.center_hz, now),
        }
    }

    /// Run one cycle for a capture whose centre the source chose
    ///
    /// The sweep cursor first moves to the step matching the capture's centre,
    /// so a dropped recorded capture does not push later ones off the plan.
    /// Centres matching no step fall through to the normal tune check.
    pub fn process_recorded(&mut self, capture: Capture) -> Result<CycleOutcome, PipelineError> {
        if let Some(index) = self.plan.step_near(capture.center_hz, self.tune_tolerance_hz) {
            if index != self.plan.cursor() {
                self.attempts = 0;
                if self.plan.seek(index) {
                    self.telemetry.publish(ControlEvent::SweepCycleCompleted {
                        cycles: self.plan.cycles_completed(),
                    });
                }
            }
        }
        self.process(capture)
    }

    /// Account for a capture the source failed to deliver
    pub fn process_failure(
        &mut self,
        err: PipelineError,
        now: Duration,
    ) -> Result<CycleOutcome, PipelineError> {
        if err.is_fatal() {
            log_pipeline_error(&err, "capture source");
            return Err(err);
        }
        self.apply_requests(now);
        let center = self.plan.next_center_frequency();
        self.drop_capture(err, center, now)
    }

    /// Evaluate the policy without new spectral data
    pub fn tick(&mut self, now: Duration) -> Option<SwitchCommand> {
        self.apply_requests(now);
        let command = self.evaluate_policy(now, self.last_tuned_hz, None);
        self.state_tx.send_replace(self.policy.state().clone());
        command
    }

    /// Report the transport result for a command from this coordinator
    ///
    /// # Returns
    /// * `Err(PipelineError::InvariantViolation)` - command does not match
    ///   the current state
    pub fn acknowledge(
        &mut self,
        command: &SwitchCommand,
        result: Result<(), PipelineError>,
    ) -> Result<(), PipelineError> {
        match result {
            Ok(()) => {
                let from_label = self.policy.ports().label(command.from);
                self.policy.commit(command)?;
                let event = SwitchEvent::from_command(command, from_label);
                log::info!(
                    "[Coordinator] Switch {} -> {} at {:?} ({} mode)",
                    event.from_port,
                    event.to_port,
                    event.at,
                    event.mode
                );
                self.telemetry.publish(ControlEvent::Switch(event));
            }
            Err(err) => {
                log_pipeline_error(&err, "switch transport");
                self.telemetry.publish(ControlEvent::TransportFailure {
                    at: command.issued_at,
                    port: command.to_label.clone(),
                    code: err.code(),
                    details: err.message(),
                });
                if err.is_fatal() {
                    return Err(err);
                }
            }
        }
        self.state_tx.send_replace(self.policy.state().clone());
        Ok(())
    }

    fn apply_requests(&mut self, now: Duration) {
        while let Ok(request) = self.request_rx.try_recv() {
            let before = self.policy.state().mode;
            match self.policy.apply(&request, now) {
                Ok(()) => {
                    let after = self.policy.state().mode;
                    if before != after {
                        self.telemetry.publish(ControlEvent::ModeChanged {
                            from: before,
                            to: after,
                        });
                    }
                }
                Err(err) => {
                    log_config_error(&err, "policy request");
                    self.telemetry.publish(ControlEvent::RequestRejected {
                        code: err.code(),
                        message: err.message(),
                    });
                }
            }
        }
    }

    fn advance_plan(&mut self) {
        if self.plan.advance() {
            self.telemetry.publish(ControlEvent::SweepCycleCompleted {
                cycles: self.plan.cycles_completed(),
            });
        }
    }

    fn drop_capture(
        &mut self,
        err: PipelineError,
        center_hz: f64,
        now: Duration,
    ) -> Result<CycleOutcome, PipelineError> {
        log::warn!(
            "[Coordinator] Dropped capture at {}: {}",
            format_frequency(center_hz),
            err.message()
        );
        self.telemetry.publish(ControlEvent::CaptureDropped {
            at: now,
            center_hz,
            code: err.code(),
            reason: err.message(),
        });

        self.attempts += 1;
        if self.attempts >= self.max_capture_retries.max(1) {
            let skipped = self.plan.next_center_frequency();
            log::warn!(
                "[Coordinator] Skipping step at {} after {} attempts",
                format_frequency(skipped),
                self.attempts
            );
            self.telemetry.publish(ControlEvent::StepSkipped {
                center_hz: skipped,
                attempts: self.attempts,
            });
            self.attempts = 0;
            self.advance_plan();
        }

        let command = self.evaluate_policy(now, self.last_tuned_hz, None);
        let spectrum = self.stitcher.snapshot();
        self.state_tx.send_replace(self.policy.state().clone());
        Ok(CycleOutcome {
            spectrum,
            metrics: Vec::new(),
            command,
            dropped: Some(err),
            next_center_hz: self.plan.next_center_frequency(),
        })
    }

    fn evaluate_bands(&self, spectrum: &WidebandSpectrum, now: Duration) -> Vec<BandMetric> {
        self.bands
            .iter()
            .map(|band| {
                let powers = spectrum.fresh_power_in(band);
                let floor_db = percentile_db(&powers, self.noise_floor_percentile);
                let slice = SpectrumSlice {
                    band: *band,
                    powers: &powers,
                    at: now,
                };
                self.metric_engine.evaluate(&slice, floor_db)
            })
            .collect()
    }

    fn evaluate_policy(
        &mut self,
        now: Duration,
        tuned_hz: f64,
        metrics: Option<&[BandMetric]>,
    ) -> Option<SwitchCommand> {
        let was_suppressed = self.policy.state().anomaly == AnomalyStatus::Suppressed;
        let outcome = self.policy.evaluate(&EvaluationInput {
            now,
            tuned_hz,
            metrics,
        });

        if let Some(metric) = outcome.suppressed {
            if !was_suppressed {
                log::warn!(
                    "[Coordinator] Anomaly on {} during cool-down: occupancy={:.3} flatness={:.3}",
                    metric.band,
                    metric.occupancy,
                    metric.flatness
                );
                self.telemetry.publish(ControlEvent::AnomalySuppressed {
                    at: now,
                    band: metric.band,
                    occupancy: metric.occupancy,
                    flatness: metric.flatness,
                });
            }
        }
        outcome.command
    }

    fn publish(&self, spectrum: Arc<WidebandSpectrum>) {
        self.spectrum_tx.send_replace(spectrum);
        self.state_tx.send_replace(self.policy.state().clone());
    }

    /// Active mode tag
    pub fn mode(&self) -> ModeKind {
        self.policy.state().mode
    }
}
