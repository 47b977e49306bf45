// Switch latency benchmark
//
// Alternates the RF switch between two ports for a number of cycles, waiting
// `dwell` after each command, and reports min/max/average command latency.
// Failed commands still contribute their latency and are counted separately.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::error::{log_pipeline_error, ConfigError};
use crate::switching::ports::{PortId, PortRef, PortSet};

use super::backend::SwitchTransport;

/// Min/max/average over the measured commands, in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LatencyStats {
    pub min_ms: f64,
    pub max_ms: f64,
    pub avg_ms: f64,
}

impl LatencyStats {
    /// `None` when nothing was measured
    pub fn from_samples(samples: &[f64]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        let min_ms = samples.iter().copied().fold(f64::INFINITY, f64::min);
        let max_ms = samples.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let avg_ms = samples.iter().sum::<f64>() / samples.len() as f64;
        Some(Self {
            min_ms,
            max_ms,
            avg_ms,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LatencyReport {
    /// Port labels in alternation order
    pub ports: [String; 2],
    /// Full cycles run (one command to each port)
    pub cycles: u32,
    /// Per-command latency in issue order
    pub samples_ms: Vec<f64>,
    pub failures: u32,
    pub stats: Option<LatencyStats>,
}

pub struct LatencyBenchmark {
    ports: [(PortId, String); 2],
    cycles: u32,
    dwell: Duration,
    stop: Arc<AtomicBool>,
}

impl LatencyBenchmark {
    /// # Arguments
    /// * `ports` - the two ports to alternate between
    /// * `cycles` - each cycle switches to both ports once
    /// * `dwell` - wait after every command
    ///
    /// # Returns
    /// * `Err(ConfigError)` - unknown port, or both entries name the same port
    pub fn new(
        port_set: &PortSet,
        ports: [&PortRef; 2],
        cycles: u32,
        dwell: Duration,
    ) -> Result<Self, ConfigError> {
        let first = port_set.resolve(ports[0])?;
        let second = port_set.resolve(ports[1])?;
        if first == second {
            return Err(ConfigError::invalid(
                "latency.ports",
                format!("{} given twice", port_set.label(first)),
            ));
        }
        Ok(Self {
            ports: [
                (first, port_set.label(first)),
                (second, port_set.label(second)),
            ],
            cycles,
            dwell,
            stop: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Flag that ends the run after the command in progress
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    pub fn run<T: SwitchTransport + ?Sized>(&self, transport: &mut T) -> LatencyReport {
        let mut samples_ms = Vec::with_capacity(2 * self.cycles as usize);
        let mut failures = 0;
        let mut cycles = 0;

        'cycles: for _ in 0..self.cycles {
            for (port, label) in &self.ports {
                if self.stop.load(Ordering::Acquire) {
                    break 'cycles;
                }
                let started = Instant::now();
                let result = transport.set_port(*port, label);
                let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
                samples_ms.push(latency_ms);
                match result {
                    Ok(()) => {
                        tracing::debug!(port = %label, latency_ms, "[Latency] switched");
                    }
                    Err(err) => {
                        failures += 1;
                        log_pipeline_error(&err, "latency benchmark");
                    }
                }
                if !self.dwell.is_zero() {
                    thread::sleep(self.dwell);
                }
            }
            cycles += 1;
        }

        let stats = LatencyStats::from_samples(&samples_ms);
        if let Some(stats) = stats {
            log::info!(
                "[Latency] {} commands: min {:.2} ms, max {:.2} ms, avg {:.2} ms, {} failed",
                samples_ms.len(),
                stats.min_ms,
                stats.max_ms,
                stats.avg_ms,
                failures
            );
        }
        LatencyReport {
            ports: [self.ports[0].1.clone(), self.ports[1].1.clone()],
            cycles,
            samples_ms,
            failures,
            stats,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::transport::RecordingTransport;

    fn benchmark(cycles: u32) -> LatencyBenchmark {
        let ports = PortSet::default();
        LatencyBenchmark::new(
            &ports,
            [&PortRef::from("A4"), &PortRef::from("B4")],
            cycles,
            Duration::ZERO,
        )
        .unwrap()
    }

    #[test]
    fn test_alternates_between_ports() {
        let mut transport = RecordingTransport::new();
        let applied = transport.handle();
        let report = benchmark(3).run(&mut transport);

        assert_eq!(report.cycles, 3);
        assert_eq!(report.samples_ms.len(), 6);
        assert_eq!(report.failures, 0);
        let labels: Vec<String> = applied.applied().into_iter().map(|(_, label)| label).collect();
        assert_eq!(labels, ["A4", "B4", "A4", "B4", "A4", "B4"]);

        let stats = report.stats.unwrap();
        assert!(stats.min_ms <= stats.avg_ms && stats.avg_ms <= stats.max_ms);
    }

    #[test]
    fn test_failures_counted_and_still_timed() {
        let mut transport = RecordingTransport::failing(2);
        let report = benchmark(2).run(&mut transport);
        assert_eq!(report.failures, 2);
        assert_eq!(report.samples_ms.len(), 4);
    }

    #[test]
    fn test_stop_flag_ends_run() {
        let bench = benchmark(10);
        bench.stop_flag().store(true, Ordering::Release);
        let report = bench.run(&mut RecordingTransport::new());
        assert_eq!(report.cycles, 0);
        assert!(report.samples_ms.is_empty());
        assert_eq!(report.stats, None);
    }

    #[test]
    fn test_stats_from_samples() {
        let stats = LatencyStats::from_samples(&[4.0, 1.0, 7.0]).unwrap();
        assert_eq!(stats.min_ms, 1.0);
        assert_eq!(stats.max_ms, 7.0);
        assert_eq!(stats.avg_ms, 4.0);
    }

    #[test]
    fn test_rejects_same_or_unknown_port() {
        let ports = PortSet::default();
        assert!(LatencyBenchmark::new(
            &ports,
            [&PortRef::from("A1"), &PortRef::from(0usize)],
            1,
            Duration::ZERO
        )
        .is_err());
        assert!(LatencyBenchmark::new(
            &ports,
            [&PortRef::from("A1"), &PortRef::from("C9")],
            1,
            Duration::ZERO
        )
        .is_err());
    }
}
