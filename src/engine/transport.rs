// Switch transports
//
// RecordingTransport keeps every applied port in memory (simulation, tests).
// CommandTransport shells out to an external switch utility, e.g.
// `hackrf_operacake`, and treats a non-zero exit as a failed command.

use std::process::Command;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use crate::error::PipelineError;
use crate::switching::ports::PortId;

use super::backend::SwitchTransport;

/// Shared view of what a `RecordingTransport` applied.
#[derive(Clone, Default)]
pub struct TransportLog {
    applied: Arc<Mutex<Vec<(PortId, String)>>>,
}

impl TransportLog {
    /// Ports applied successfully, oldest first
    pub fn applied(&self) -> Vec<(PortId, String)> {
        self.applied
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// In-memory transport; can be told to fail its next N commands.
#[derive(Default)]
pub struct RecordingTransport {
    log: TransportLog,
    failures_left: u32,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transport whose first `failures` commands are not acknowledged
    pub fn failing(failures: u32) -> Self {
        Self {
            log: TransportLog::default(),
            failures_left: failures,
        }
    }

    pub fn handle(&self) -> TransportLog {
        self.log.clone()
    }
}

impl SwitchTransport for RecordingTransport {
    fn set_port(&mut self, port: PortId, label: &str) -> Result<(), PipelineError> {
        if self.failures_left > 0 {
            self.failures_left -= 1;
            return Err(PipelineError::TransportFailed {
                port: label.to_string(),
                details: "no acknowledgement".to_string(),
            });
        }
        self.log
            .applied
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((port, label.to_string()));
        Ok(())
    }
}

/// Runs `program args... <label>` for every switch.
pub struct CommandTransport {
    program: String,
    args: Vec<String>,
}

impl CommandTransport {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// `hackrf_operacake -o 0 -a <port>`
    pub fn operacake(board_address: u8) -> Self {
        Self::new(
            "hackrf_operacake",
            vec![
                "-o".to_string(),
                board_address.to_string(),
                "-a".to_string(),
            ],
        )
    }
}

impl SwitchTransport for CommandTransport {
    fn set_port(&mut self, port: PortId, label: &str) -> Result<(), PipelineError> {
        let started = Instant::now();
        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(label)
            .output()
            .map_err(|err| PipelineError::TransportFailed {
                port: label.to_string(),
                details: format!("failed to run {}: {}", self.program, err),
            })?;

        if !output.status.success() {
            return Err(PipelineError::TransportFailed {
                port: label.to_string(),
                details: format!(
                    "{} exited with {}: {}",
                    self.program,
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }

        tracing::debug!(
            port = %port,
            label,
            elapsed_ms = started.elapsed().as_secs_f64() * 1000.0,
            "switch command acknowledged"
        );
        Ok(())
    }
}
