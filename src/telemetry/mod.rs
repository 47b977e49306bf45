//! Control-loop telemetry: rolling switch log, event broadcast, counters.
//!
//! The hub is shared (`Arc`) between the coordinator, which publishes, and any
//! number of read-only observers. Publishing never blocks on observers: the
//! broadcast channel drops the oldest events for slow subscribers.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tokio::sync::broadcast;

pub mod events;

pub use events::{ControlEvent, SwitchEvent};

/// Counters and recent history for CLI/observer reporting.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TelemetrySnapshot {
    pub switch_log: Vec<SwitchEvent>,
    pub recent: Vec<ControlEvent>,
    pub captures_processed: u64,
    pub captures_dropped: u64,
    pub steps_skipped: u64,
    pub switches: u64,
    pub transport_failures: u64,
    pub dropped_history: u64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Rolling window of transport command latencies.
struct LatencyTracker {
    samples: VecDeque<f64>,
    max_samples: usize,
}

impl LatencyTracker {
    fn new(max_samples: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(max_samples),
            max_samples: max_samples.max(1),
        }
    }

    fn observe(&mut self, value_ms: f64) -> (f64, f64, usize) {
        if self.samples.len() == self.max_samples {
            self.samples.pop_front();
        }
        self.samples.push_back(value_ms.abs());

        let count = self.samples.len();
        let sum: f64 = self.samples.iter().sum();
        let max = self.samples.iter().copied().fold(0.0_f64, f64::max);
        (sum / count as f64, max, count)
    }
}

/// Broadcast-based hub retaining a bounded switch log and event history.
pub struct TelemetryHub {
    tx: broadcast::Sender<ControlEvent>,
    switch_log: Mutex<VecDeque<SwitchEvent>>,
    switch_log_capacity: usize,
    history: Mutex<VecDeque<ControlEvent>>,
    history_capacity: usize,
    latency: Mutex<LatencyTracker>,
    captures_processed: AtomicU64,
    captures_dropped: AtomicU64,
    steps_skipped: AtomicU64,
    switches: AtomicU64,
    transport_failures: AtomicU64,
    dropped_history: AtomicU64,
}

impl TelemetryHub {
    pub fn new(channel_capacity: usize, switch_log_capacity: usize, history_capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(channel_capacity.max(1));
        Self {
            tx,
            switch_log: Mutex::new(VecDeque::with_capacity(switch_log_capacity)),
            switch_log_capacity: switch_log_capacity.max(1),
            history: Mutex::new(VecDeque::with_capacity(history_capacity)),
            history_capacity: history_capacity.max(1),
            latency: Mutex::new(LatencyTracker::new(32)),
            captures_processed: AtomicU64::new(0),
            captures_dropped: AtomicU64::new(0),
            steps_skipped: AtomicU64::new(0),
            switches: AtomicU64::new(0),
            transport_failures: AtomicU64::new(0),
            dropped_history: AtomicU64::new(0),
        }
    }

    /// Publish to subscribers and the bounded history.
    pub fn publish(&self, event: ControlEvent) {
        match &event {
            ControlEvent::Switch(switch) => {
                self.switches.fetch_add(1, Ordering::Relaxed);
                let mut log = lock(&self.switch_log);
                if log.len() == self.switch_log_capacity {
                    log.pop_front();
                }
                log.push_back(switch.clone());
            }
            ControlEvent::TransportFailure { .. } => {
                self.transport_failures.fetch_add(1, Ordering::Relaxed);
            }
            ControlEvent::CaptureDropped { .. } => {
                self.captures_dropped.fetch_add(1, Ordering::Relaxed);
            }
            ControlEvent::StepSkipped { .. } => {
                self.steps_skipped.fetch_add(1, Ordering::Relaxed);
            }
            _ => {}
        }

        {
            let mut history = lock(&self.history);
            if history.len() == self.history_capacity {
                history.pop_front();
                self.dropped_history.fetch_add(1, Ordering::Relaxed);
            }
            history.push_back(event.clone());
        }

        // No subscribers is fine
        let _ = self.tx.send(event);
    }

    pub fn record_capture_processed(&self) {
        self.captures_processed.fetch_add(1, Ordering::Relaxed);
    }

    /// Track a switch command round trip and publish the rolling stats.
    pub fn record_transport_latency(&self, latency_ms: f64) {
        let (avg_ms, max_ms, sample_count) = lock(&self.latency).observe(latency_ms);
        self.publish(ControlEvent::TransportLatency {
            avg_ms,
            max_ms,
            sample_count,
        });
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ControlEvent> {
        self.tx.subscribe()
    }

    /// Switch events, oldest first.
    pub fn switch_log(&self) -> Vec<SwitchEvent> {
        lock(&self.switch_log).iter().cloned().collect()
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            switch_log: self.switch_log(),
            recent: lock(&self.history).iter().cloned().collect(),
            captures_processed: self.captures_processed.load(Ordering::Relaxed),
            captures_dropped: self.captures_dropped.load(Ordering::Relaxed),
            steps_skipped: self.steps_skipped.load(Ordering::Relaxed),
            switches: self.switches.load(Ordering::Relaxed),
            transport_failures: self.transport_failures.load(Ordering::Relaxed),
            dropped_history: self.dropped_history.load(Ordering::Relaxed),
        }
    }
}

impl Default for TelemetryHub {
    fn default() -> Self {
        Self::new(256, 64, 256)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::switching::{ModeKind, SwitchReason};

    fn switch_event(ms: u64) -> ControlEvent {
        ControlEvent::Switch(SwitchEvent {
            at: Duration::from_millis(ms),
            mode: ModeKind::Manual,
            from_port: "A1".into(),
            to_port: "A2".into(),
            reason: SwitchReason::ManualRequest,
        })
    }

    #[test]
    fn test_switch_log_is_bounded() {
        let hub = TelemetryHub::new(16, 3, 16);
        for ms in 0..5 {
            hub.publish(switch_event(ms));
        }
        let log = hub.switch_log();
        assert_eq!(log.len(), 3);
        assert_eq!(log[0].at, Duration::from_millis(2));
        assert_eq!(hub.snapshot().switches, 5);
    }

    #[test]
    fn test_counters_follow_event_kinds() {
        let hub = TelemetryHub::default();
        hub.publish(ControlEvent::CaptureDropped {
            at: Duration::ZERO,
            center_hz: 1e8,
            code: 4003,
            reason: "short".into(),
        });
        hub.publish(ControlEvent::TransportFailure {
            at: Duration::ZERO,
            port: "B1".into(),
            code: 4002,
            details: "timeout".into(),
        });
        hub.publish(ControlEvent::StepSkipped {
            center_hz: 1e8,
            attempts: 3,
        });
        hub.record_capture_processed();

        let snapshot = hub.snapshot();
        assert_eq!(snapshot.captures_dropped, 1);
        assert_eq!(snapshot.transport_failures, 1);
        assert_eq!(snapshot.steps_skipped, 1);
        assert_eq!(snapshot.captures_processed, 1);
        assert_eq!(snapshot.recent.len(), 3);
    }

    #[test]
    fn test_history_overflow_counted() {
        let hub = TelemetryHub::new(16, 4, 2);
        for cycles in 0..5 {
            hub.publish(ControlEvent::SweepCycleCompleted { cycles });
        }
        let snapshot = hub.snapshot();
        assert_eq!(snapshot.recent.len(), 2);
        assert_eq!(snapshot.dropped_history, 3);
    }

    #[test]
    fn test_subscriber_receives_events() {
        let hub = TelemetryHub::default();
        let mut rx = hub.subscribe();
        hub.publish(switch_event(7));
        assert_eq!(rx.try_recv().unwrap(), switch_event(7));
    }

    #[test]
    fn test_latency_rolls_up() {
        let hub = TelemetryHub::default();
        hub.record_transport_latency(10.0);
        hub.record_transport_latency(30.0);
        match hub.snapshot().recent.last() {
            Some(ControlEvent::TransportLatency {
                avg_ms,
                max_ms,
                sample_count,
            }) => {
                assert_eq!((*avg_ms, *max_ms, *sample_count), (20.0, 30.0, 2));
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
