//! Control-loop event types published to observers (display, CLI, logs).

use std::time::Duration;

use serde::Serialize;

use crate::frequency::FrequencyRange;
use crate::switching::{ModeKind, SwitchCommand, SwitchReason};

/// One committed antenna switch, as kept in the rolling switch log.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SwitchEvent {
    #[serde(with = "crate::spectrum::capture::millis")]
    pub at: Duration,
    pub mode: ModeKind,
    pub from_port: String,
    pub to_port: String,
    pub reason: SwitchReason,
}

impl SwitchEvent {
    pub fn from_command(command: &SwitchCommand, from_label: String) -> Self {
        Self {
            at: command.issued_at,
            mode: command.mode,
            from_port: from_label,
            to_port: command.to_label.clone(),
            reason: command.reason.clone(),
        }
    }
}

/// Everything the coordinator reports while running.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ControlEvent {
    Switch(SwitchEvent),
    TransportFailure {
        #[serde(with = "crate::spectrum::capture::millis")]
        at: Duration,
        port: String,
        code: i32,
        details: String,
    },
    CaptureDropped {
        #[serde(with = "crate::spectrum::capture::millis")]
        at: Duration,
        center_hz: f64,
        code: i32,
        reason: String,
    },
    StepSkipped {
        center_hz: f64,
        attempts: u32,
    },
    AnomalySuppressed {
        #[serde(with = "crate::spectrum::capture::millis")]
        at: Duration,
        band: FrequencyRange,
        occupancy: f64,
        flatness: f64,
    },
    ModeChanged {
        from: ModeKind,
        to: ModeKind,
    },
    RequestRejected {
        code: i32,
        message: String,
    },
    SweepCycleCompleted {
        cycles: u64,
    },
    TransportLatency {
        avg_ms: f64,
        max_ms: f64,
        sample_count: usize,
    },
}
