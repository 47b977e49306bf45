// PolicyEngine - antenna port selection state machine
//
// One transition function, one exhaustive match over the active mode:
// - Manual: hold, or move to the requested port
// - Frequency: port of the first range containing the tuned frequency
// - Time: next slot once the current slot's dwell has elapsed
// - Event: fall back after `n_confirm` consecutive breaching cycles, then
//   cool down
//
// `evaluate` only proposes a `SwitchCommand`. The port changes when the
// caller reports a successful transport via `commit`; on failure nothing is
// committed and the same proposal comes back at the next evaluation.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::analysis::metrics::BandMetric;
use crate::error::{ConfigError, PipelineError};
use crate::frequency::FrequencyRange;
use crate::switching::modes::{ModeKind, ModeSpec, SwitchMode};
use crate::switching::ports::{PortId, PortRef, PortSet};
use crate::switching::state::{AnomalyStatus, SwitchState};

/// External request, applied at the next evaluation boundary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "request", rename_all = "snake_case")]
pub enum PolicyRequest {
    /// Replace the active mode
    SetMode { mode: ModeSpec },
    /// Select a port directly (enters Manual mode)
    SelectPort { port: PortRef },
}

/// Inputs of one evaluation cycle
#[derive(Debug, Clone, Copy)]
pub struct EvaluationInput<'a> {
    pub now: Duration,
    /// Centre frequency of the capture just processed
    pub tuned_hz: f64,
    /// Band metrics of this cycle; `None` when the cycle produced none
    /// (dropped capture), which leaves anomaly confirmation untouched
    pub metrics: Option<&'a [BandMetric]>,
}

/// Why a switch was proposed
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "trigger", rename_all = "snake_case")]
pub enum SwitchReason {
    ManualRequest,
    FrequencyRange {
        range: FrequencyRange,
        tuned_hz: f64,
    },
    /// Current port is not the active slot's port (mode entry or retry)
    ScheduleAlign { slot: usize },
    DwellElapsed { slot: usize, dwell_ms: u64 },
    AnomalyConfirmed {
        band: FrequencyRange,
        occupancy: f64,
        flatness: f64,
        consecutive: u32,
    },
}

/// Proposed port change
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SwitchCommand {
    pub from: PortId,
    pub to: PortId,
    pub to_label: String,
    pub mode: ModeKind,
    pub reason: SwitchReason,
    #[serde(with = "crate::spectrum::capture::millis")]
    pub issued_at: Duration,
}

/// Result of one evaluation
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PolicyOutcome {
    pub command: Option<SwitchCommand>,
    /// Confirmed anomaly not acted upon because of cool-down
    pub suppressed: Option<BandMetric>,
}

/// Switching policy engine; sole owner of `SwitchState`
pub struct PolicyEngine {
    ports: PortSet,
    mode: SwitchMode,
    state: SwitchState,
    manual_target: Option<PortId>,
    slot_started_at: Option<Duration>,
}

impl PolicyEngine {
    /// Create an engine on `initial_port` in `mode`
    ///
    /// # Returns
    /// * `Err(ConfigError::PortOutOfRange)` - `initial_port` not in `ports`
    pub fn new(ports: PortSet, initial_port: PortId, mode: SwitchMode) -> Result<Self, ConfigError> {
        ports.check(initial_port)?;
        let mut state = SwitchState::new(initial_port, ports.label(initial_port), mode.kind());
        if let SwitchMode::Time(schedule) = &mode {
            state.time_slot = Some(schedule.entry_index(initial_port).unwrap_or(0));
        }
        log::info!(
            "[Policy] Starting on port {} in {} mode",
            state.port_label,
            state.mode
        );
        Ok(Self {
            ports,
            mode,
            state,
            manual_target: None,
            slot_started_at: None,
        })
    }

    pub fn ports(&self) -> &PortSet {
        &self.ports
    }

    pub fn mode(&self) -> &SwitchMode {
        &self.mode
    }

    pub fn state(&self) -> &SwitchState {
        &self.state
    }

    /// Apply an external request
    ///
    /// # Returns
    /// * `Err(ConfigError)` - request rejected; mode and port are unchanged
    pub fn apply(&mut self, request: &PolicyRequest, now: Duration) -> Result<(), ConfigError> {
        match request {
            PolicyRequest::SetMode { mode } => {
                let built = mode.build(&self.ports)?;
                self.enter_mode(built, now);
                Ok(())
            }
            PolicyRequest::SelectPort { port } => {
                let target = self.ports.resolve(port)?;
                if self.state.mode != ModeKind::Manual {
                    self.enter_mode(SwitchMode::Manual, now);
                }
                self.manual_target = Some(target);
                log::info!(
                    "[Policy] Manual selection of port {}",
                    self.ports.label(target)
                );
                Ok(())
            }
        }
    }

    fn enter_mode(&mut self, mode: SwitchMode, now: Duration) {
        let previous = self.state.mode;
        self.state.mode = mode.kind();
        self.state.mode_entered_at = Some(now);
        self.state.confirm_count = 0;
        self.state.anomaly = AnomalyStatus::Clear;
        self.state.cooldown_until = None;
        self.state.hold_remaining = None;
        self.manual_target = None;

        self.state.time_slot = match &mode {
            SwitchMode::Time(schedule) => {
                self.slot_started_at = Some(now);
                Some(schedule.entry_index(self.state.port).unwrap_or(0))
            }
            _ => {
                self.slot_started_at = None;
                None
            }
        };

        self.mode = mode;
        log::info!("[Policy] Mode {} -> {}", previous, self.state.mode);
    }

    /// Run the active mode's transition function for one cycle
    pub fn evaluate(&mut self, input: &EvaluationInput<'_>) -> PolicyOutcome {
        let now = input.now;
        let current = self.state.port;

        let (target, suppressed) = match &self.mode {
            SwitchMode::Manual => (
                self.manual_target
                    .filter(|target| *target != current)
                    .map(|target| (target, SwitchReason::ManualRequest)),
                None,
            ),

            SwitchMode::Frequency(table) => (
                table
                    .lookup(input.tuned_hz)
                    .filter(|rule| rule.port != current)
                    .map(|rule| {
                        (
                            rule.port,
                            SwitchReason::FrequencyRange {
                                range: rule.range,
                                tuned_hz: input.tuned_hz,
                            },
                        )
                    }),
                None,
            ),

            SwitchMode::Time(schedule) => {
                let index = self.state.time_slot.unwrap_or(0);
                let slot = schedule.slot(index);
                let started = *self.slot_started_at.get_or_insert(now);
                let elapsed = now.saturating_sub(started);
                self.state.hold_remaining = Some(slot.dwell.saturating_sub(elapsed));

                if slot.port != current {
                    (Some((slot.port, SwitchReason::ScheduleAlign { slot: index })), None)
                } else if elapsed >= slot.dwell {
                    let next = schedule.next_index(index);
                    let next_port = schedule.slot(next).port;
                    if next_port == current {
                        // Consecutive slots on the same port: no switch needed
                        self.state.time_slot = Some(next);
                        self.slot_started_at = Some(now);
                        (None, None)
                    } else {
                        (
                            Some((
                                next_port,
                                SwitchReason::DwellElapsed {
                                    slot: next,
                                    dwell_ms: slot.dwell.as_millis() as u64,
                                },
                            )),
                            None,
                        )
                    }
                } else {
                    (None, None)
                }
            }

            SwitchMode::Event(policy) => {
                let state = &mut self.state;
                let mut worst = None;
                if let Some(metrics) = input.metrics {
                    worst = metrics
                        .iter()
                        .filter(|m| m.breaches(policy.occupancy_threshold, policy.flatness_threshold))
                        .max_by(|a, b| a.occupancy.total_cmp(&b.occupancy))
                        .copied();
                    if worst.is_some() {
                        state.confirm_count = state.confirm_count.saturating_add(1);
                    } else {
                        state.confirm_count = 0;
                    }
                }

                state.hold_remaining = state.cooldown_until.map(|until| until.saturating_sub(now));

                match worst {
                    Some(metric) if state.confirm_count >= policy.n_confirm => {
                        if state.in_cooldown(now) {
                            state.anomaly = AnomalyStatus::Suppressed;
                            (None, Some(metric))
                        } else {
                            state.anomaly = AnomalyStatus::Confirmed;
                            let reason = SwitchReason::AnomalyConfirmed {
                                band: metric.band,
                                occupancy: metric.occupancy,
                                flatness: metric.flatness,
                                consecutive: state.confirm_count,
                            };
                            (Some((policy.fallback_after(current), reason)), None)
                        }
                    }
                    Some(_) => {
                        state.anomaly = AnomalyStatus::Building;
                        (None, None)
                    }
                    None if input.metrics.is_some() => {
                        state.anomaly = AnomalyStatus::Clear;
                        (None, None)
                    }
                    None => (None, None),
                }
            }
        };

        let command = target.map(|(to, reason)| SwitchCommand {
            from: current,
            to,
            to_label: self.ports.label(to),
            mode: self.state.mode,
            reason,
            issued_at: now,
        });
        if let Some(cmd) = &command {
            log::debug!(
                "[Policy] Proposing {} -> {} ({:?})",
                self.ports.label(cmd.from),
                cmd.to_label,
                cmd.reason
            );
        }

        PolicyOutcome {
            command,
            suppressed,
        }
    }

    /// Record a switch the transport has acknowledged
    ///
    /// # Returns
    /// * `Err(PipelineError::InvariantViolation)` - the command does not start
    ///   from the current port (stale or foreign command)
    pub fn commit(&mut self, command: &SwitchCommand) -> Result<(), PipelineError> {
        if command.from != self.state.port {
            return Err(PipelineError::InvariantViolation {
                details: format!(
                    "switch command from {} but current port is {}",
                    command.from, self.state.port
                ),
            });
        }
        self.ports
            .check(command.to)
            .map_err(|e| PipelineError::InvariantViolation {
                details: e.to_string(),
            })?;

        let at = command.issued_at;
        self.state.port = command.to;
        self.state.port_label = command.to_label.clone();
        self.state.last_switch_at = Some(at);
        self.state.switch_count += 1;

        match (&self.mode, &command.reason) {
            (SwitchMode::Manual, _) => {
                self.manual_target = None;
            }
            (SwitchMode::Time(schedule), SwitchReason::DwellElapsed { slot, .. })
            | (SwitchMode::Time(schedule), SwitchReason::ScheduleAlign { slot }) => {
                self.state.time_slot = Some(*slot % schedule.len());
                self.slot_started_at = Some(at);
                self.state.hold_remaining = Some(schedule.slot(*slot).dwell);
            }
            (SwitchMode::Event(policy), _) => {
                self.state.confirm_count = 0;
                self.state.cooldown_until = Some(at + policy.cooldown);
                self.state.hold_remaining = Some(policy.cooldown);
            }
            _ => {}
        }

        log::info!(
            "[Policy] Switched to port {} ({} mode)",
            self.state.port_label,
            self.state.mode
        );
        Ok(())
    }
}

#[cfg(test)]
#[path = "policy_tests.rs"]
mod tests;
