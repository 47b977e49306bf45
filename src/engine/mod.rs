//! Engine: the coordinator and everything that drives it.
//!
//! `backend` defines the seams to the receiver, the RF switch and the clock.
//! `coordinator` runs one cycle per capture. `runner` and `threaded` drive the
//! coordinator single-threaded or across an acquisition/control thread pair.
//! `sim`, `replay` and `transport` provide concrete sources and switches.
//! `latency` times switch commands outside the control loop.

pub mod backend;
pub mod coordinator;
pub mod latency;
pub mod replay;
pub mod runner;
pub mod sim;
pub mod threaded;
pub mod transport;

pub use backend::{CaptureSource, ManualClock, SwitchTransport, SystemTimeSource, TimeSource};
pub use coordinator::{Coordinator, CycleOutcome, Observer, RequestSender};
pub use latency::{LatencyBenchmark, LatencyReport, LatencyStats};
pub use replay::ReplaySource;
pub use runner::{ControlLoop, RunSummary};
pub use sim::{Interferer, SimSettings, SyntheticSource, Tone};
pub use threaded::{spawn_control_loop, ControlLoopHandle};
pub use transport::{CommandTransport, RecordingTransport, TransportLog};
