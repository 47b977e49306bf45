// Switching module - antenna port selection
//
// Architecture:
// - ports: labelled port set (Opera Cake A1-B4 by default)
// - modes: Manual / Frequency / Time / Event as a tagged variant
// - state: observable SwitchState
// - policy: PolicyEngine, the single transition function over the modes

pub mod modes;
pub mod policy;
pub mod ports;
pub mod state;

pub use modes::{
    EventPolicy, FrequencyRule, FrequencyTable, ModeKind, ModeSpec, RangeSpec, SlotSpec,
    SwitchMode, TimeSchedule, TimeSlot,
};
pub use policy::{
    EvaluationInput, PolicyEngine, PolicyOutcome, PolicyRequest, SwitchCommand, SwitchReason,
};
pub use ports::{PortId, PortRef, PortSet, OPERA_CAKE_PORTS};
pub use state::{AnomalyStatus, SwitchState};
