// Switch state - the externally observable side of the policy engine

use std::time::Duration;

use serde::Serialize;

use crate::switching::modes::ModeKind;
use crate::switching::ports::PortId;

/// Progress of anomaly confirmation in Event mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyStatus {
    /// No breaching cycle in the current run
    #[default]
    Clear,
    /// Breaching, fewer than `n_confirm` consecutive cycles so far
    Building,
    /// Confirmed and acted upon (switch proposed)
    Confirmed,
    /// Confirmed during cool-down; reported, not acted upon
    Suppressed,
}

/// Current antenna selection and mode bookkeeping
///
/// Only the policy engine mutates this; everyone else gets clones.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SwitchState {
    pub port: PortId,
    pub port_label: String,
    pub mode: ModeKind,
    /// When the last committed switch happened
    pub last_switch_at: Option<Duration>,
    /// When the current mode was entered
    pub mode_entered_at: Option<Duration>,
    /// Time left on the active dwell (Time) or cool-down (Event) timer
    pub hold_remaining: Option<Duration>,
    /// Consecutive breaching evaluation cycles (Event)
    pub confirm_count: u32,
    pub cooldown_until: Option<Duration>,
    pub anomaly: AnomalyStatus,
    /// Active slot of the time schedule
    pub time_slot: Option<usize>,
    /// Committed switches since start
    pub switch_count: u64,
}

impl SwitchState {
    pub fn new(port: PortId, port_label: String, mode: ModeKind) -> Self {
        Self {
            port,
            port_label,
            mode,
            last_switch_at: None,
            mode_entered_at: None,
            hold_remaining: None,
            confirm_count: 0,
            cooldown_until: None,
            anomaly: AnomalyStatus::Clear,
            time_slot: None,
            switch_count: 0,
        }
    }

    pub fn in_cooldown(&self, now: Duration) -> bool {
        self.cooldown_until.is_some_and(|until| now < until)
    }
}
