// Pipeline error types and constants

use crate::error::ErrorCode;
use log::{error, warn};
use std::fmt;

/// Pipeline error code constants
///
/// Error code range: 4001-4006
pub struct PipelineErrorCodes {}

impl PipelineErrorCodes {
    /// Capture source failed to deliver a capture
    pub const CAPTURE_FAILED: i32 = 4001;

    /// Switch transport failed to apply a port
    pub const TRANSPORT_FAILED: i32 = 4002;

    /// Capture bin count differs from the configured FFT size
    pub const BIN_COUNT_MISMATCH: i32 = 4003;

    /// Capture metadata or bins are unusable
    pub const MALFORMED_CAPTURE: i32 = 4004;

    /// Capture was taken at a different centre than requested
    pub const UNEXPECTED_CENTER: i32 = 4005;

    /// Internal invariant broken (programming defect)
    pub const INVARIANT_VIOLATION: i32 = 4006;
}

/// Coarse classification used to pick the recovery strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineErrorKind {
    /// Retried at the next tick, state held at last-known-good
    TransientIo,
    /// Offending capture dropped, spectrum untouched
    Data,
    /// Fails loudly; the control loop must stop
    InvariantViolation,
}

/// Log a pipeline error at a level matching its kind
pub fn log_pipeline_error(err: &PipelineError, context: &str) {
    match err.kind() {
        PipelineErrorKind::InvariantViolation => error!(
            "Pipeline error in {}: code={}, kind=invariant, message={}",
            context,
            err.code(),
            err.message()
        ),
        kind => warn!(
            "Pipeline error in {}: code={}, kind={:?}, message={}",
            context,
            err.code(),
            kind,
            err.message()
        ),
    }
}

/// Runtime errors raised while acquiring, stitching, or switching
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineError {
    /// Capture acquisition failed
    CaptureFailed { details: String },

    /// Switch command was not acknowledged
    TransportFailed { port: String, details: String },

    /// Bin count mismatch
    BinCountMismatch { expected: usize, actual: usize },

    /// Malformed capture
    MalformedCapture { reason: String },

    /// Tuner was not at the requested centre frequency
    UnexpectedCenter { requested_hz: f64, actual_hz: f64 },

    /// Internal invariant broken
    InvariantViolation { details: String },
}

impl PipelineError {
    pub fn kind(&self) -> PipelineErrorKind {
        match self {
            PipelineError::CaptureFailed { .. } | PipelineError::TransportFailed { .. } => {
                PipelineErrorKind::TransientIo
            }
            PipelineError::BinCountMismatch { .. }
            | PipelineError::MalformedCapture { .. }
            | PipelineError::UnexpectedCenter { .. } => PipelineErrorKind::Data,
            PipelineError::InvariantViolation { .. } => PipelineErrorKind::InvariantViolation,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.kind() == PipelineErrorKind::InvariantViolation
    }
}

impl ErrorCode for PipelineError {
    fn code(&self) -> i32 {
        match self {
            PipelineError::CaptureFailed { .. } => PipelineErrorCodes::CAPTURE_FAILED,
            PipelineError::TransportFailed { .. } => PipelineErrorCodes::TRANSPORT_FAILED,
            PipelineError::BinCountMismatch { .. } => PipelineErrorCodes::BIN_COUNT_MISMATCH,
            PipelineError::MalformedCapture { .. } => PipelineErrorCodes::MALFORMED_CAPTURE,
            PipelineError::UnexpectedCenter { .. } => PipelineErrorCodes::UNEXPECTED_CENTER,
            PipelineError::InvariantViolation { .. } => PipelineErrorCodes::INVARIANT_VIOLATION,
        }
    }

    fn message(&self) -> String {
        match self {
            PipelineError::CaptureFailed { details } => format!("Capture failed: {}", details),
            PipelineError::TransportFailed { port, details } => {
                format!("Switch to {} failed: {}", port, details)
            }
            PipelineError::BinCountMismatch { expected, actual } => {
                format!("Capture has {} bins, expected {}", actual, expected)
            }
            PipelineError::MalformedCapture { reason } => {
                format!("Malformed capture: {}", reason)
            }
            PipelineError::UnexpectedCenter {
                requested_hz,
                actual_hz,
            } => format!(
                "Capture centre {:.1} Hz does not match requested {:.1} Hz",
                actual_hz, requested_hz
            ),
            PipelineError::InvariantViolation { details } => {
                format!("Invariant violated: {}", details)
            }
        }
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PipelineError (code {}): {}", self.code(), self.message())
    }
}

impl std::error::Error for PipelineError {}

impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        PipelineError::CaptureFailed {
            details: err.to_string(),
        }
    }
}
