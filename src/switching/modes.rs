// Switching modes - the tagged variants the policy engine matches on
//
// `ModeSpec` is the unvalidated request form (labels, raw Hz, milliseconds)
// as it arrives from configuration or an external caller. `SwitchMode` is the
// validated form held by the policy engine; building one is the only way to
// change mode, so an invalid request never replaces the active mode.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::frequency::{serde_hz, FrequencyRange, MAX_TUNABLE_HZ, MIN_TUNABLE_HZ};
use crate::switching::ports::{PortId, PortRef, PortSet};

/// Mode tag without its parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModeKind {
    Manual,
    Frequency,
    Time,
    Event,
}

impl fmt::Display for ModeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ModeKind::Manual => "manual",
            ModeKind::Frequency => "frequency",
            ModeKind::Time => "time",
            ModeKind::Event => "event",
        };
        f.write_str(name)
    }
}

/// One row of the frequency-mode table
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FrequencyRule {
    pub range: FrequencyRange,
    pub port: PortId,
}

/// Ordered (range -> port) table; first match wins
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrequencyTable {
    rules: Vec<FrequencyRule>,
}

impl FrequencyTable {
    /// Validated table: non-empty, ports in the set, ranges tunable and disjoint
    pub fn new(rules: Vec<FrequencyRule>, ports: &PortSet) -> Result<Self, ConfigError> {
        if rules.is_empty() {
            return Err(ConfigError::EmptyRangeTable);
        }
        for (i, rule) in rules.iter().enumerate() {
            ports.check(rule.port)?;
            let range = rule.range;
            if range.low_hz < MIN_TUNABLE_HZ || range.high_hz > MAX_TUNABLE_HZ {
                return Err(ConfigError::InvalidRange {
                    low_hz: range.low_hz,
                    high_hz: range.high_hz,
                });
            }
            if let Some(earlier) = rules[..i].iter().find(|r| r.range.overlaps(&range)) {
                return Err(ConfigError::OverlappingRanges {
                    first: earlier.range.to_string(),
                    second: range.to_string(),
                });
            }
        }
        Ok(Self { rules })
    }

    /// Table without validation; lookup stays deterministic (first match)
    pub fn unchecked(rules: Vec<FrequencyRule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[FrequencyRule] {
        &self.rules
    }

    /// First rule whose range contains `hz`
    pub fn lookup(&self, hz: f64) -> Option<&FrequencyRule> {
        self.rules.iter().find(|rule| rule.range.contains(hz))
    }
}

/// One step of the time-mode cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeSlot {
    pub port: PortId,
    pub dwell: Duration,
}

/// Cyclic list of (port, dwell) slots
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimeSchedule {
    slots: Vec<TimeSlot>,
}

impl TimeSchedule {
    pub fn new(slots: Vec<TimeSlot>, ports: &PortSet) -> Result<Self, ConfigError> {
        if slots.is_empty() {
            return Err(ConfigError::EmptySchedule);
        }
        for (i, slot) in slots.iter().enumerate() {
            ports.check(slot.port)?;
            if slot.dwell.is_zero() {
                return Err(ConfigError::invalid(
                    format!("time slot {} dwell", i),
                    "must be greater than zero",
                ));
            }
        }
        Ok(Self { slots })
    }

    /// Same dwell for every port in `order`
    pub fn uniform(order: &[PortId], dwell: Duration, ports: &PortSet) -> Result<Self, ConfigError> {
        let slots = order.iter().map(|&port| TimeSlot { port, dwell }).collect();
        Self::new(slots, ports)
    }

    pub fn slots(&self) -> &[TimeSlot] {
        &self.slots
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slot(&self, index: usize) -> TimeSlot {
        self.slots[index % self.slots.len()]
    }

    pub fn next_index(&self, index: usize) -> usize {
        (index + 1) % self.slots.len()
    }

    /// Slot to start from when entering the mode on `port`
    pub fn entry_index(&self, port: PortId) -> Option<usize> {
        self.slots.iter().position(|slot| slot.port == port)
    }
}

/// Anomaly-triggered switching parameters
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventPolicy {
    pub fallback_order: Vec<PortId>,
    /// Consecutive breaching cycles required to confirm an anomaly
    pub n_confirm: u32,
    pub cooldown: Duration,
    pub occupancy_threshold: f64,
    pub flatness_threshold: f64,
}

impl EventPolicy {
    pub fn validate(&self, ports: &PortSet) -> Result<(), ConfigError> {
        if self.fallback_order.len() < 2 {
            return Err(ConfigError::InvalidFallbackOrder {
                reason: "at least two ports are required".to_string(),
            });
        }
        for (i, port) in self.fallback_order.iter().enumerate() {
            ports.check(*port)?;
            if self.fallback_order[..i].contains(port) {
                return Err(ConfigError::InvalidFallbackOrder {
                    reason: format!("port {} listed twice", ports.label(*port)),
                });
            }
        }
        if self.n_confirm == 0 {
            return Err(ConfigError::invalid("n_confirm", "must be at least 1"));
        }
        for (field, value) in [
            ("occupancy_threshold", self.occupancy_threshold),
            ("flatness_threshold", self.flatness_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::invalid(field, format!("{} is outside [0, 1]", value)));
            }
        }
        Ok(())
    }

    /// Next port in the fallback order after `current`, never `current` itself
    pub fn fallback_after(&self, current: PortId) -> PortId {
        match self.fallback_order.iter().position(|p| *p == current) {
            Some(i) => self.fallback_order[(i + 1) % self.fallback_order.len()],
            None => self.fallback_order[0],
        }
    }
}

/// Validated mode with its parameters
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SwitchMode {
    Manual,
    Frequency(FrequencyTable),
    Time(TimeSchedule),
    Event(EventPolicy),
}

impl SwitchMode {
    pub fn kind(&self) -> ModeKind {
        match self {
            SwitchMode::Manual => ModeKind::Manual,
            SwitchMode::Frequency(_) => ModeKind::Frequency,
            SwitchMode::Time(_) => ModeKind::Time,
            SwitchMode::Event(_) => ModeKind::Event,
        }
    }
}

/// Frequency-table row as written in configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RangeSpec {
    #[serde(with = "serde_hz")]
    pub low_hz: f64,
    #[serde(with = "serde_hz")]
    pub high_hz: f64,
    pub port: PortRef,
}

/// Time-mode slot as written in configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SlotSpec {
    pub port: PortRef,
    pub dwell_ms: u64,
}

/// Unvalidated mode request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ModeSpec {
    Manual,
    Frequency {
        ranges: Vec<RangeSpec>,
    },
    Time {
        slots: Vec<SlotSpec>,
    },
    Event {
        fallback_order: Vec<PortRef>,
        n_confirm: u32,
        cooldown_ms: u64,
        occupancy_threshold: f64,
        flatness_threshold: f64,
    },
}

impl ModeSpec {
    pub fn kind(&self) -> ModeKind {
        match self {
            ModeSpec::Manual => ModeKind::Manual,
            ModeSpec::Frequency { .. } => ModeKind::Frequency,
            ModeSpec::Time { .. } => ModeKind::Time,
            ModeSpec::Event { .. } => ModeKind::Event,
        }
    }

    /// Resolve ports and validate parameters against `ports`
    pub fn build(&self, ports: &PortSet) -> Result<SwitchMode, ConfigError> {
        match self {
            ModeSpec::Manual => Ok(SwitchMode::Manual),
            ModeSpec::Frequency { ranges } => {
                let rules = ranges
                    .iter()
                    .map(|spec| {
                        Ok(FrequencyRule {
                            range: FrequencyRange::new(spec.low_hz, spec.high_hz)?,
                            port: ports.resolve(&spec.port)?,
                        })
                    })
                    .collect::<Result<Vec<_>, ConfigError>>()?;
                FrequencyTable::new(rules, ports).map(SwitchMode::Frequency)
            }
            ModeSpec::Time { slots } => {
                let slots = slots
                    .iter()
                    .map(|spec| {
                        Ok(TimeSlot {
                            port: ports.resolve(&spec.port)?,
                            dwell: Duration::from_millis(spec.dwell_ms),
                        })
                    })
                    .collect::<Result<Vec<_>, ConfigError>>()?;
                TimeSchedule::new(slots, ports).map(SwitchMode::Time)
            }
            ModeSpec::Event {
                fallback_order,
                n_confirm,
                cooldown_ms,
                occupancy_threshold,
                flatness_threshold,
            } => {
                let policy = EventPolicy {
                    fallback_order: ports.resolve_all(fallback_order)?,
                    n_confirm: *n_confirm,
                    cooldown: Duration::from_millis(*cooldown_ms),
                    occupancy_threshold: *occupancy_threshold,
                    flatness_threshold: *flatness_threshold,
                };
                policy.validate(ports)?;
                Ok(SwitchMode::Event(policy))
            }
        }
    }
}
