//! Boundary traits for the collaborators the core does not own.
//!
//! The receiver and the RF switch sit behind these traits; the coordinator
//! only ever sees `Capture` values going in and `SwitchCommand`s going out.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::error::PipelineError;
use crate::spectrum::capture::Capture;
use crate::switching::ports::PortId;

/// Receiver side: tune to a centre frequency and return one capture.
///
/// Blocking is allowed; the threaded loop calls this off the control thread.
pub trait CaptureSource: Send {
    fn capture(&mut self, center_hz: f64) -> Result<Capture, PipelineError>;

    /// Recorded sources ignore the requested centre; the sweep follows the
    /// centres they deliver instead.
    fn is_recorded(&self) -> bool {
        false
    }
}

/// RF switch side: apply a port, acknowledge or fail.
pub trait SwitchTransport: Send {
    fn set_port(&mut self, port: PortId, label: &str) -> Result<(), PipelineError>;
}

impl<S: CaptureSource + ?Sized> CaptureSource for Box<S> {
    fn capture(&mut self, center_hz: f64) -> Result<Capture, PipelineError> {
        (**self).capture(center_hz)
    }

    fn is_recorded(&self) -> bool {
        (**self).is_recorded()
    }
}

impl<T: SwitchTransport + ?Sized> SwitchTransport for Box<T> {
    fn set_port(&mut self, port: PortId, label: &str) -> Result<(), PipelineError> {
        (**self).set_port(port, label)
    }
}

/// Monotonic time since pipeline start.
pub trait TimeSource: Send + Sync {
    fn now(&self) -> Duration;
}

/// Wall-clock time source backed by `Instant`.
pub struct SystemTimeSource {
    start: Instant,
}

impl SystemTimeSource {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for SystemTimeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for SystemTimeSource {
    fn now(&self) -> Duration {
        self.start.elapsed()
    }
}

/// Manually advanced clock for simulation and tests.
#[derive(Default)]
pub struct ManualClock {
    nanos: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        self.nanos
            .fetch_add(by.as_nanos().min(u64::MAX as u128) as u64, Ordering::SeqCst);
    }

    pub fn set(&self, to: Duration) {
        self.nanos
            .store(to.as_nanos().min(u64::MAX as u128) as u64, Ordering::SeqCst);
    }
}

impl TimeSource for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::new();
        assert_eq!(clock.now(), Duration::ZERO);
        clock.advance(Duration::from_millis(250));
        clock.advance(Duration::from_millis(250));
        assert_eq!(clock.now(), Duration::from_millis(500));
        clock.set(Duration::from_secs(3));
        assert_eq!(clock.now(), Duration::from_secs(3));
    }

    #[test]
    fn test_system_time_source_is_monotonic() {
        let source = SystemTimeSource::new();
        let a = source.now();
        let b = source.now();
        assert!(b >= a);
    }
}
